//! Headless player for exercising a running host: joins, wanders and shoots
//! for a while, then quits through the joystick quit action and prints the
//! summary the host sends back.

use clap::Parser;
use log::{debug, info, warn};
use rand::Rng;
use shared::protocol::PROTOCOL_VERSION;
use shared::{InputSnapshot, MoveKeys, Packet, PlayerProfile, Weapon};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout};

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless bot player")]
struct Args {
    /// Host address
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Player name
    #[arg(short, long, default_value = "bot")]
    name: String,

    /// Weapon to carry
    #[arg(long, default_value = "Pistol")]
    weapon: Weapon,

    /// Seconds to play before quitting
    #[arg(short, long, default_value = "10")]
    duration: u64,
}

fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

async fn send(socket: &UdpSocket, packet: &Packet, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    socket.send_to(&packet.encode()?, addr).await?;
    Ok(())
}

/// A random heading, changed every couple of seconds.
fn wander<R: Rng>(rng: &mut R) -> MoveKeys {
    MoveKeys {
        forward: rng.gen_bool(0.5),
        back: rng.gen_bool(0.2),
        left: rng.gen_bool(0.4),
        right: rng.gen_bool(0.4),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let server_addr: SocketAddr = args.server.parse()?;
    info!("Bot socket bound to {}", socket.local_addr()?);

    let profile = PlayerProfile {
        weapon: args.weapon,
        ..PlayerProfile::named(&args.name)
    };
    send(
        &socket,
        &Packet::Join {
            client_version: PROTOCOL_VERSION,
            profile,
        },
        server_addr,
    )
    .await?;

    let mut buf = vec![0u8; 65_507];
    let player_id = loop {
        let (len, _) = timeout(Duration::from_secs(3), socket.recv_from(&mut buf)).await??;
        match Packet::decode(&buf[..len]) {
            Ok(Packet::Welcome { player_id, tick }) => {
                info!("Joined as player {} at tick {}", player_id, tick);
                break player_id;
            }
            Ok(Packet::Disconnected { reason }) => return Err(reason.into()),
            Ok(other) => debug!("Ignoring {:?} while joining", other),
            Err(e) => warn!("Failed to deserialize response: {}", e),
        }
    };

    let mut rng = rand::thread_rng();
    let mut input = InputSnapshot::default();
    let mut sequence = 0u32;
    let mut ticker = interval(Duration::from_millis(50));
    let frames = args.duration * 20;

    for frame in 0..=frames {
        ticker.tick().await;

        if frame % 40 == 0 {
            input.keys = wander(&mut rng);
        }
        input.space = frame % 10 < 5;
        input.joystick.quit = frame == frames;

        sequence += 1;
        send(
            &socket,
            &Packet::Input {
                sequence,
                timestamp: get_timestamp(),
                input,
            },
            server_addr,
        )
        .await?;

        // Drain whatever arrived without blocking the input cadence.
        while let Ok(Ok((len, _))) = timeout(Duration::from_millis(1), socket.recv_from(&mut buf)).await {
            match Packet::decode(&buf[..len]) {
                Ok(Packet::Killed { victim, killer }) if victim == player_id => {
                    info!("Killed by player {}", killer)
                }
                Ok(Packet::Killed { victim, killer }) if killer == player_id => {
                    info!("Got player {}", victim)
                }
                Ok(Packet::QuitAcknowledged { summary }) => {
                    info!(
                        "Quit acknowledged: {} kills, {} deaths, {} xp",
                        summary.kills, summary.deaths, summary.xp
                    );
                    return Ok(());
                }
                Ok(Packet::Disconnected { reason }) => return Err(reason.into()),
                Ok(_) => {}
                Err(e) => warn!("Failed to deserialize packet: {}", e),
            }
        }
    }

    // The acknowledgement may still be in flight.
    let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf)).await??;
    if let Ok(Packet::QuitAcknowledged { summary }) = Packet::decode(&buf[..len]) {
        info!("Quit acknowledged: {} kills, {} deaths", summary.kills, summary.deaths);
    } else {
        send(&socket, &Packet::Leave, server_addr).await?;
        info!("Left without acknowledgement");
    }

    Ok(())
}
