use clap::Parser;
use host::game::HostGame;
use host::network::{Server, ServerMessage};
use host::session::PeerManager;
use log::{error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{GameConfig, SceneMap};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Authoritative host for an arena session")]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Maximum number of players
    #[arg(short, long, default_value = "16")]
    max_players: usize,

    /// Seconds of silence before a peer is dropped
    #[arg(long, default_value = "5")]
    timeout_secs: u64,

    /// Map file (JSON). Without one, a ring of spawn points is generated.
    #[arg(long)]
    map: Option<PathBuf>,

    /// Gameplay tuning file (JSON); missing fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Minimum milliseconds between two shots
    #[arg(long)]
    fire_rate_ms: Option<u64>,

    /// Movement impulse per second
    #[arg(long)]
    movement_speed: Option<f32>,

    /// Milliseconds between death and respawn
    #[arg(long)]
    respawn_delay_ms: Option<u64>,

    /// Damage dealt by one bullet
    #[arg(long)]
    bullet_damage: Option<u32>,

    /// Seed for spawn selection (random if omitted)
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn game_config(&self) -> Result<GameConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            None => GameConfig::default(),
        };

        if let Some(fire_rate_ms) = self.fire_rate_ms {
            config.fire_rate_ms = fire_rate_ms;
        }
        if let Some(movement_speed) = self.movement_speed {
            config.movement_speed = movement_speed;
        }
        if let Some(respawn_delay_ms) = self.respawn_delay_ms {
            config.respawn_delay_ms = respawn_delay_ms;
        }
        if let Some(bullet_damage) = self.bullet_damage {
            config.bullet_damage = bullet_damage;
        }
        Ok(config)
    }

    fn scene(&self) -> Result<SceneMap, Box<dyn std::error::Error>> {
        match &self.map {
            Some(path) => Ok(SceneMap::load(path)?),
            None => Ok(SceneMap::with_spawn_ring(self.max_players.max(1), 12.0)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.tick_rate == 0 {
        return Err("tick rate must be at least 1".into());
    }

    let config = args.game_config()?;
    let scene = match args.scene() {
        Ok(scene) => scene,
        Err(e) => {
            error!("Cannot start session: {}", e);
            return Err(e);
        }
    };
    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    info!(
        "Starting host: {} Hz, up to {} players, fire rate {} ms, respawn {} ms",
        args.tick_rate, args.max_players, config.fire_rate_ms, config.respawn_delay_ms
    );

    let game = HostGame::new(config, scene, rng)?;
    let peers = PeerManager::new(args.max_players, Duration::from_secs(args.timeout_secs));
    let address = format!("{}:{}", args.host, args.port);
    let tick_duration = Duration::from_secs_f64(1.0 / f64::from(args.tick_rate));

    let mut server = Server::new(&address, tick_duration, peers, game).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            let _ = shutdown.send(ServerMessage::Shutdown);
        }
    });

    server.run().await?;

    // Give the sender task a moment to flush the disconnect notices.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
