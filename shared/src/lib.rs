//! # Shared Game Core
//!
//! The networked-authority core used by both the Host and its Clients: the
//! replicated per-player state, the per-player entity controller, the
//! Host-only combat resolver and the spawn/respawn machinery.
//!
//! Every peer runs one [`controller::EntityController`] per connected player.
//! Which branch of the controller runs is decided by an explicit [`Role`]
//! handed to it at construction, never by a global query.
//!
//! ## Module Organization
//!
//! - `state`: Peer State Store with field-level write authority
//! - `controller`: per-frame movement, fire, quit and replication logic
//! - `combat`: damage application, death and kill credit (Host only)
//! - `spawn` / `respawn`: spawn point selection and cancellable respawns
//! - `input`: the normalized input snapshot and edge detection
//! - `physics`: vectors, the body abstraction and collider tags
//! - `protocol`: packets exchanged between peers
//! - `config`: gameplay tuning

pub mod combat;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod input;
pub mod physics;
pub mod protocol;
pub mod respawn;
pub mod spawn;
pub mod state;
pub mod weapon;

pub use combat::{CombatResolver, HitOutcome, IgnoreReason};
pub use config::GameConfig;
pub use controller::{EntityController, Frame, MotionState};
pub use error::{GameError, MapError, ParseError, SpawnError, StoreError};
pub use events::{GameEvent, GameHooks, QuitSummary};
pub use input::{EdgeDetector, InputSnapshot, JoystickState, MoveKeys};
pub use physics::{BodyKind, ColliderKind, ColliderTag, CollisionEvent, KinematicBody, PhysicsBody, Vec3};
pub use protocol::Packet;
pub use respawn::RespawnScheduler;
pub use spawn::{select_free_spawn, select_spawn, spawn_points, SceneGraph, SceneMap};
pub use state::{FieldUpdate, PeerStateStore, StateKey, StateValue, Writer};
pub use weapon::{AnimationTag, Weapon};

use serde::{Deserialize, Serialize};
use std::fmt;

pub type PlayerId = u32;

pub const MAX_HEALTH: u8 = 100;
pub const PLAYER_RADIUS: f32 = 0.6;
pub const PLAYER_LINEAR_DAMPING: f32 = 12.0;
/// Muzzle position relative to the player origin, before rotation.
pub const WEAPON_OFFSET: Vec3 = Vec3 {
    x: -0.2,
    y: 1.4,
    z: 0.8,
};

/// Which side of the session a peer is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Host,
    Client,
}

impl Role {
    pub fn is_host(&self) -> bool {
        matches!(self, Role::Host)
    }
}

/// Display metadata chosen by the player. The combat core only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub name: String,
    pub address: String,
    pub color: String,
    pub league: String,
    pub weapon: Weapon,
    pub xp: u32,
}

impl PlayerProfile {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl Default for PlayerProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: String::new(),
            color: "#4287f5".to_string(),
            league: "private".to_string(),
            weapon: Weapon::default(),
            xp: 0,
        }
    }
}

/// Unique per shot: shots from one player are rate-limited, so their
/// creation timestamps never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BulletId {
    pub owner: PlayerId,
    pub created_at: u64,
}

impl fmt::Display for BulletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.owner, self.created_at)
    }
}

/// Creation-time snapshot of a fired projectile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BulletRecord {
    pub id: BulletId,
    pub position: Vec3,
    pub angle: f32,
    pub owner: PlayerId,
}
