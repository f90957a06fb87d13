use serde::{Deserialize, Serialize};

/// Gameplay tuning shared by every peer in a session.
///
/// Kept apart from runtime settings such as bind address or tick rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Minimum milliseconds between two accepted shots of one player.
    pub fire_rate_ms: u64,
    /// Impulse per second applied while moving.
    pub movement_speed: f32,
    /// Delay between a death and the matching respawn.
    pub respawn_delay_ms: u64,
    pub bullet_damage: u32,
    /// Bullet travel speed in units per second.
    pub bullet_speed: f32,
    pub bullet_lifetime_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            fire_rate_ms: 380,
            movement_speed: 202.0,
            respawn_delay_ms: 2000,
            bullet_damage: 10,
            bullet_speed: 20.0,
            bullet_lifetime_ms: 1000,
        }
    }
}
