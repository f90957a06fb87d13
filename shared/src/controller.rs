//! Per-player entity controller.
//!
//! One controller exists per connected player on every peer. The Host-role
//! controller simulates, fires and publishes; the Client-role controller
//! follows whatever position the Host last published.

use crate::config::GameConfig;
use crate::error::StoreError;
use crate::events::{GameHooks, QuitSummary};
use crate::input::{EdgeDetector, InputSnapshot};
use crate::physics::{PhysicsBody, Vec3};
use crate::state::{PeerStateStore, StateValue};
use crate::weapon::AnimationTag;
use crate::{BulletId, BulletRecord, PlayerId, Role, MAX_HEALTH, WEAPON_OFFSET};
use log::{debug, info};

/// Timing of the frame being processed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// Milliseconds on the session clock.
    pub now_ms: u64,
    /// Seconds since the previous frame.
    pub dt: f32,
}

/// Motion state; orthogonal to alive/dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionState {
    #[default]
    Idle,
    Moving,
    Firing,
}

pub struct EntityController<B: PhysicsBody> {
    id: PlayerId,
    role: Role,
    body: B,
    fire_rate_ms: u64,
    movement_speed: f32,
    motion: MotionState,
    facing: f32,
    animation: AnimationTag,
    last_shot: Option<u64>,
    quit_edge: EdgeDetector,
}

impl<B: PhysicsBody> EntityController<B> {
    pub fn new(id: PlayerId, role: Role, config: &GameConfig, body: B) -> Self {
        Self {
            id,
            role,
            body,
            fire_rate_ms: config.fire_rate_ms,
            movement_speed: config.movement_speed,
            motion: MotionState::Idle,
            facing: 0.0,
            animation: AnimationTag::Idle,
            last_shot: None,
            quit_edge: EdgeDetector::new(),
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn body(&self) -> &B {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut B {
        &mut self.body
    }

    pub fn motion(&self) -> MotionState {
        self.motion
    }

    pub fn facing(&self) -> f32 {
        self.facing
    }

    pub fn animation(&self) -> AnimationTag {
        self.animation
    }

    /// Runs one frame for this entity.
    ///
    /// `input` is the input driving this entity: sampled locally for the
    /// player's own entity, forwarded by the player's peer on the Host, and
    /// `None` for remote entities on a Client.
    pub fn update<H: GameHooks>(
        &mut self,
        store: &mut PeerStateStore,
        frame: Frame,
        input: Option<&InputSnapshot>,
        hooks: &mut H,
    ) -> Result<AnimationTag, StoreError> {
        if store.is_dead(self.id).unwrap_or(false) {
            self.motion = MotionState::Idle;
            self.animation = AnimationTag::Death;
            if !self.role.is_host() {
                self.follow_published_position(store);
            }
            return Ok(self.animation);
        }

        let input = input.copied().unwrap_or_default();
        let firing = input.fire_intent();
        let angle = input.movement_angle();

        if let Some(angle) = angle {
            self.facing = angle;
            let impulse = Vec3::from_yaw(angle).scale(self.movement_speed * frame.dt);
            self.body.apply_impulse(impulse);
        }

        self.motion = match (angle.is_some(), firing) {
            (_, true) => MotionState::Firing,
            (true, false) => MotionState::Moving,
            (false, false) => MotionState::Idle,
        };
        self.animation = AnimationTag::select(angle.is_some(), firing, true);

        if firing && self.role.is_host() {
            self.try_fire(frame.now_ms, hooks);
        }

        if self.quit_edge.rising(input.quit_requested()) && self.role.is_host() {
            let summary = QuitSummary {
                player: self.id,
                kills: store.kills(self.id).unwrap_or(0),
                deaths: store.deaths(self.id).unwrap_or(0),
                xp: store.profile(self.id).map(|p| p.xp).unwrap_or(0),
            };
            info!("Player {} quit ({} kills, {} deaths)", self.id, summary.kills, summary.deaths);
            hooks.on_quit(summary);
        }

        if self.role.is_host() {
            store.set(self.id, StateValue::Position(self.body.position()))?;
            if store.animation(self.id) != Some(self.animation) {
                store.set(self.id, StateValue::Animation(self.animation))?;
            }
        } else {
            self.follow_published_position(store);
        }

        Ok(self.animation)
    }

    /// Accepts at most one shot per fire-rate interval. Excess requests are
    /// dropped.
    fn try_fire<H: GameHooks>(&mut self, now: u64, hooks: &mut H) -> bool {
        if let Some(last) = self.last_shot {
            if now.saturating_sub(last) <= self.fire_rate_ms {
                return false;
            }
        }
        self.last_shot = Some(now);

        let muzzle = self.muzzle_position();
        let bullet = BulletRecord {
            id: BulletId {
                owner: self.id,
                created_at: now,
            },
            position: muzzle,
            angle: self.facing,
            owner: self.id,
        };
        debug!("Player {} fired {}", self.id, bullet.id);
        hooks.on_fire(bullet);
        true
    }

    fn muzzle_position(&self) -> Vec3 {
        let (sin, cos) = self.facing.sin_cos();
        let offset = Vec3::new(
            WEAPON_OFFSET.x * cos + WEAPON_OFFSET.z * sin,
            WEAPON_OFFSET.y,
            -WEAPON_OFFSET.x * sin + WEAPON_OFFSET.z * cos,
        );
        self.body.position().add(&offset)
    }

    fn follow_published_position(&mut self, store: &PeerStateStore) {
        if let Some(position) = store.position(self.id) {
            self.body.set_position(position);
        }
    }

    /// Alive to Dead: freeze the body and record the death.
    pub fn die(&mut self, store: &mut PeerStateStore) -> Result<(), StoreError> {
        let deaths = store.deaths(self.id).unwrap_or(0) + 1;
        store.set(self.id, StateValue::Deaths(deaths))?;
        store.set(self.id, StateValue::Dead(true))?;
        store.set(self.id, StateValue::Health(0))?;
        store.set(self.id, StateValue::Animation(AnimationTag::Death))?;

        self.body.set_enabled(false);
        self.motion = MotionState::Idle;
        self.animation = AnimationTag::Death;
        info!("Player {} died (death #{})", self.id, deaths);
        Ok(())
    }

    /// Dead to Alive at `spawn`, or the initial placement after joining.
    pub fn respawn(&mut self, store: &mut PeerStateStore, spawn: Vec3) -> Result<(), StoreError> {
        self.body.set_position(spawn);
        self.body.set_enabled(true);

        store.set(self.id, StateValue::Position(spawn))?;
        store.set(self.id, StateValue::Health(MAX_HEALTH))?;
        store.set(self.id, StateValue::Dead(false))?;
        store.set(self.id, StateValue::Animation(AnimationTag::Idle))?;

        self.animation = AnimationTag::Idle;
        info!(
            "Player {} spawned at ({:.1}, {:.1}, {:.1})",
            self.id, spawn.x, spawn.y, spawn.z
        );
        Ok(())
    }
}
