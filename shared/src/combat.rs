//! Host-only resolution of projectile hits.
//!
//! The resolver is the only writer of `health`, `dead` and `deaths`. Because
//! only the Host evaluates collisions, no two peers ever race on them.

use crate::controller::EntityController;
use crate::error::StoreError;
use crate::events::GameHooks;
use crate::physics::{ColliderKind, CollisionEvent, PhysicsBody};
use crate::respawn::RespawnScheduler;
use crate::state::{PeerStateStore, StateValue};
use crate::{PlayerId, Role};
use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotHost,
    NotABullet,
    /// Health not replicated yet.
    UnknownHealth,
    AlreadyDead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    Ignored(IgnoreReason),
    Damaged { health: u8 },
    Killed { killer: PlayerId },
}

#[derive(Debug, Clone, Copy)]
pub struct CombatResolver {
    role: Role,
}

impl CombatResolver {
    pub fn new(role: Role) -> Self {
        Self { role }
    }

    /// Applies one collision event to `victim`.
    ///
    /// Hits on an entity whose health is already 0 are no-ops, so a burst
    /// of hits in one frame still produces a single death and a single
    /// scheduled respawn.
    pub fn resolve<B: PhysicsBody, H: GameHooks>(
        &self,
        victim: &mut EntityController<B>,
        event: &CollisionEvent,
        store: &mut PeerStateStore,
        respawns: &mut RespawnScheduler,
        now: u64,
        hooks: &mut H,
    ) -> Result<HitOutcome, StoreError> {
        if !self.role.is_host() {
            return Ok(HitOutcome::Ignored(IgnoreReason::NotHost));
        }
        if event.other.kind != ColliderKind::Bullet {
            return Ok(HitOutcome::Ignored(IgnoreReason::NotABullet));
        }

        let id = victim.id();
        let health = match store.health(id) {
            Some(0) => return Ok(HitOutcome::Ignored(IgnoreReason::AlreadyDead)),
            Some(health) => health,
            None => return Ok(HitOutcome::Ignored(IgnoreReason::UnknownHealth)),
        };

        let remaining = i64::from(health) - i64::from(event.other.damage);
        if remaining <= 0 {
            victim.die(store)?;
            respawns.schedule(id, now);
            info!("Player {} killed by player {}", id, event.other.owner);
            hooks.on_killed(id, event.other.owner);
            Ok(HitOutcome::Killed {
                killer: event.other.owner,
            })
        } else {
            let health = remaining as u8;
            store.set(id, StateValue::Health(health))?;
            debug!(
                "Player {} hit by player {} for {} ({} left)",
                id, event.other.owner, event.other.damage, health
            );
            Ok(HitOutcome::Damaged { health })
        }
    }
}
