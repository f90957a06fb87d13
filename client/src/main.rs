use clap::Parser;
use client::game::ClientGame;
use client::input::{InputManager, RawInput};
use client::network::{NetCommand, NetEvent, NetworkLink};
use client::rendering::{Hud, Renderer, ShopPanel};
use client::shop::{Catalog, InMemoryLedger, Notice, Ownership, Shop, Unlock};
use log::{error, info, warn};
use macroquad::prelude::*;
use shared::protocol::PROTOCOL_VERSION;
use shared::{GameConfig, Packet, PlayerProfile, Weapon};
use std::time::{Duration, Instant};

/// How long a shop notice stays on screen.
const NOTICE_DURATION: Duration = Duration::from_secs(3);

/// Join is repeated until the Host answers.
const JOIN_RETRY: Duration = Duration::from_secs(1);

/// Frame time is capped so a stalled window does not produce one huge step.
const MAX_FRAME_DT: f32 = 1.0 / 20.0;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Player name
    #[arg(short, long, default_value = "player")]
    name: String,

    /// Player color as #rrggbb
    #[arg(short, long, default_value = "#4287f5")]
    color: String,

    /// Weapon to start with
    #[arg(long, default_value = "Pistol")]
    weapon: Weapon,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Starting token balance of the local wallet
    #[arg(long, default_value = "100")]
    tokens: u64,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    width: usize,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    height: usize,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: format!("Arena - {}", args.name),
        window_width: args.width as i32,
        window_height: args.height as i32,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }
    info!("Controls: WASD or hold left mouse to move, Space or right mouse to fire");
    info!("Tab opens the shop, 1-9 buys, Q or Esc quits");

    let catalog = Catalog::standard();
    let shop = Shop::new(InMemoryLedger::with_balance(args.tokens), "arena", catalog.clone());
    let mut link = match NetworkLink::connect(&args.server, args.fake_ping, shop) {
        Ok(link) => link,
        Err(e) => {
            error!("Failed to start networking: {}", e);
            return;
        }
    };

    let profile = PlayerProfile {
        color: args.color.clone(),
        weapon: args.weapon,
        ..PlayerProfile::named(&args.name)
    };
    let join = Packet::Join {
        client_version: PROTOCOL_VERSION,
        profile,
    };

    let mut game = ClientGame::new(GameConfig::default());
    let mut input_manager = InputManager::new();
    let mut renderer = Renderer::new(args.width, args.height);
    let mut shop_panel = ShopPanel::new();

    let start = Instant::now();
    let mut last_join: Option<Instant> = None;
    let mut balance: u128 = 0;
    let mut owned = Ownership::default();
    let mut notice: Option<(Notice, Instant)> = None;
    let mut purchasing = false;

    loop {
        let now = start.elapsed().as_millis() as u64;
        let dt = get_frame_time().min(MAX_FRAME_DT);

        if game.local_id().is_none()
            && game.disconnect_reason().is_none()
            && last_join.map_or(true, |sent| sent.elapsed() >= JOIN_RETRY)
        {
            link.send(join.clone());
            last_join = Some(Instant::now());
        }

        for event in link.poll() {
            match event {
                NetEvent::Packet(packet) => game.handle_packet(packet, now),
                NetEvent::Notice(shop_notice) => {
                    purchasing = false;
                    notice = Some((shop_notice, Instant::now()));
                }
                NetEvent::Purchased(item) => {
                    let equipped = match &item.unlock {
                        Unlock::Weapon(weapon) => game.equip_weapon(*weapon),
                        Unlock::Color(color) => game.set_color(color),
                    };
                    if let Err(e) = equipped {
                        warn!("Could not equip {}: {}", item.name, e);
                    }
                }
                NetEvent::Balance(value) => balance = value,
                NetEvent::Owned(value) => owned = value,
                NetEvent::Error(e) => error!("Network error: {}", e),
            }
        }

        if let Some(summary) = game.quit_summary() {
            renderer.render_summary(summary);
            if is_key_pressed(KeyCode::Escape) {
                break;
            }
            next_frame().await;
            continue;
        }
        if let Some(reason) = game.disconnect_reason() {
            renderer.render_disconnected(reason);
            if is_key_pressed(KeyCode::Escape) {
                break;
            }
            next_frame().await;
            continue;
        }

        let raw = RawInput::sample();
        let (actions, to_send) = input_manager.update(&raw);

        if actions.toggle_shop {
            shop_panel.toggle();
            if shop_panel.is_open() {
                link.command(NetCommand::RefreshBalance);
            }
        }
        if actions.prev_page {
            shop_panel.prev_page();
        }
        if actions.next_page {
            shop_panel.next_page(&catalog);
        }
        if let Some((kind, id)) = actions.pick.and_then(|slot| shop_panel.pick(&catalog, slot)) {
            purchasing = true;
            link.command(NetCommand::Purchase { kind, id });
        }

        if game.is_connected() {
            if let Some(input) = to_send {
                link.send(Packet::Input {
                    sequence: input.sequence,
                    timestamp: input.timestamp,
                    input: input.input,
                });
            }
        }

        if let Err(e) = game.frame(now, dt, Some(input_manager.current_input())) {
            warn!("Frame update failed: {}", e);
        }
        for update in game.drain_owner_updates() {
            link.send(Packet::OwnerUpdate { update });
        }

        if notice.as_ref().is_some_and(|(_, shown)| shown.elapsed() >= NOTICE_DURATION) {
            notice = None;
        }

        let players = game.players();
        let hud = Hud {
            local_id: game.local_id(),
            kill_feed: game.kill_feed().collect(),
            balance,
            owned: &owned,
            notice: notice.as_ref().map(|(notice, _)| notice),
            catalog: &catalog,
            shop: &shop_panel,
            purchasing,
            fake_ping_ms: args.fake_ping,
        };
        renderer.render(&players, game.bullets(), &hud);

        next_frame().await;
    }

    if game.is_connected() {
        link.send(Packet::Leave);
    }
    link.shutdown();
}
