//! # Arena Host Library
//!
//! The authoritative side of a session. The Host runs one Host-role entity
//! controller per player, resolves every bullet hit, schedules respawns and
//! publishes the results to all Clients as replicated field updates.
//!
//! ## Authority
//!
//! Health, death, kill and death counters, positions and animations are
//! written only here. Clients send two things: their held input, and writes
//! to their own profile. Both are checked against the sending peer before
//! they touch the simulation.
//!
//! ## Architecture
//!
//! ### Single-Threaded Game Loop
//! All simulation happens inside one `select!` loop that alternates between
//! network events and fixed-rate ticks. Network I/O runs on separate tasks
//! connected through unbounded channels, so the game state never needs a
//! lock.
//!
//! ### Tick Order
//! Each tick runs, in order:
//! 1. Respawns that have come due
//! 2. Controller updates (movement impulse, fire, quit, publish)
//! 3. New bullets enter the projectile field
//! 4. Body integration
//! 5. Bullet flight and hit resolution, then kill credit
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! Peer lifecycle, newest-input tracking and timeouts.
//!
//! ### Game Module (`game`)
//! The per-tick orchestration of controllers, combat and respawns.
//!
//! ### Projectile Module (`projectile`)
//! Bullet trajectories and hit detection.
//!
//! ### Network Module (`network`)
//! UDP transport and the main loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use host::game::HostGame;
//! use host::network::Server;
//! use host::session::PeerManager;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use shared::{GameConfig, SceneMap};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let game = HostGame::new(
//!         GameConfig::default(),
//!         SceneMap::with_spawn_ring(8, 12.0),
//!         StdRng::from_entropy(),
//!     )?;
//!     let peers = PeerManager::new(8, Duration::from_secs(5));
//!
//!     let mut server = Server::new("127.0.0.1:8080", Duration::from_millis(16), peers, game).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod network;
pub mod projectile;
pub mod session;
