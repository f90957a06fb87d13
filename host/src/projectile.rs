//! Bullet trajectories and hit detection on the Host.
//!
//! Accepted shots are handed over here as [`BulletRecord`]s. Each bullet flies
//! straight along its angle until it enters a player body other than its
//! owner's, or its lifetime runs out. Hits are reported as collision events
//! for the combat resolver; everything else about a bullet stays in here.

use shared::{BulletRecord, ColliderTag, CollisionEvent, GameConfig, KinematicBody, PlayerId, Vec3, PLAYER_RADIUS};

#[derive(Debug, Clone)]
pub struct Projectile {
    pub record: BulletRecord,
    pub position: Vec3,
    direction: Vec3,
}

pub struct ProjectileField {
    bullets: Vec<Projectile>,
    speed: f32,
    lifetime_ms: u64,
    damage: u32,
}

impl ProjectileField {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            bullets: Vec::new(),
            speed: config.bullet_speed,
            lifetime_ms: config.bullet_lifetime_ms,
            damage: config.bullet_damage,
        }
    }

    pub fn spawn(&mut self, record: BulletRecord) {
        self.bullets.push(Projectile {
            record,
            position: record.position,
            direction: Vec3::from_yaw(record.angle),
        });
    }

    pub fn bullets(&self) -> &[Projectile] {
        &self.bullets
    }

    pub fn len(&self) -> usize {
        self.bullets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bullets.is_empty()
    }

    /// Drops every bullet fired by `owner`, e.g. when the owner leaves.
    pub fn remove_owned_by(&mut self, owner: PlayerId) {
        self.bullets.retain(|bullet| bullet.record.owner != owner);
    }

    /// Sub-steps needed so a bullet never skips over a player body.
    fn required_substeps(&self, dt: f32) -> u32 {
        const SAFETY_FACTOR: f32 = 0.5;

        let max_movement_per_step = PLAYER_RADIUS * SAFETY_FACTOR;
        let max_movement_this_tick = self.speed * dt;

        if max_movement_this_tick > max_movement_per_step {
            (max_movement_this_tick / max_movement_per_step).ceil() as u32
        } else {
            1
        }
    }

    /// Advances every bullet by `dt` and returns the hits, at most one per
    /// bullet. Bullets that hit or expire are removed.
    pub fn step(&mut self, now: u64, dt: f32, bodies: &[(PlayerId, &KinematicBody)]) -> Vec<CollisionEvent> {
        let lifetime_ms = self.lifetime_ms;
        self.bullets
            .retain(|bullet| now.saturating_sub(bullet.record.id.created_at) < lifetime_ms);

        let substeps = self.required_substeps(dt);
        let substep_distance = self.speed * dt / substeps as f32;
        let damage = self.damage;
        let mut hits = Vec::new();

        self.bullets.retain_mut(|bullet| {
            for _ in 0..substeps {
                bullet.position = bullet.position.add(&bullet.direction.scale(substep_distance));

                let victim = bodies
                    .iter()
                    .find(|(id, body)| *id != bullet.record.owner && body.contains(&bullet.position));

                if let Some((victim, _)) = victim {
                    hits.push(CollisionEvent {
                        victim: *victim,
                        other: ColliderTag::bullet(bullet.record.owner, damage),
                    });
                    return false;
                }
            }
            true
        });

        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{BodyKind, BulletId, PhysicsBody};

    fn record(owner: PlayerId, created_at: u64, position: Vec3, angle: f32) -> BulletRecord {
        BulletRecord {
            id: BulletId { owner, created_at },
            position,
            angle,
            owner,
        }
    }

    fn body_at(x: f32, z: f32) -> KinematicBody {
        KinematicBody::new(BodyKind::Dynamic, Vec3::new(x, 0.0, z))
    }

    #[test]
    fn test_bullet_hits_body_in_path() {
        let mut field = ProjectileField::new(&GameConfig::default());
        field.spawn(record(1, 0, Vec3::ZERO, 0.0));
        let shooter = body_at(0.0, 0.0);
        let target = body_at(0.0, 2.0);
        let bodies = [(1, &shooter), (2, &target)];

        let mut hits = Vec::new();
        let mut now = 0;
        for _ in 0..30 {
            now += 16;
            hits.extend(field.step(now, 0.016, &bodies));
        }

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].victim, 2);
        assert_eq!(hits[0].other, ColliderTag::bullet(1, 10));
        assert!(field.is_empty());
    }

    #[test]
    fn test_bullet_travels_along_angle() {
        let mut field = ProjectileField::new(&GameConfig::default());
        field.spawn(record(1, 0, Vec3::ZERO, std::f32::consts::FRAC_PI_2));

        field.step(100, 0.1, &[]);

        let bullet = &field.bullets()[0];
        assert_approx_eq!(bullet.position.x, 2.0, 1e-4);
        assert_approx_eq!(bullet.position.z, 0.0, 1e-4);
    }

    #[test]
    fn test_bullet_ignores_owner() {
        let mut field = ProjectileField::new(&GameConfig::default());
        field.spawn(record(1, 0, Vec3::ZERO, 0.0));
        let shooter = body_at(0.0, 0.0);

        let hits = field.step(16, 0.016, &[(1, &shooter)]);

        assert!(hits.is_empty());
        assert_eq!(field.len(), 1);
    }

    #[test]
    fn test_fast_bullet_does_not_tunnel() {
        let mut field = ProjectileField::new(&GameConfig::default());
        field.spawn(record(1, 0, Vec3::ZERO, 0.0));
        let target = body_at(0.0, 3.0);

        // One big step covers 5 units, far more than the body's width.
        let hits = field.step(250, 0.25, &[(2, &target)]);

        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_disabled_body_not_hit() {
        let mut field = ProjectileField::new(&GameConfig::default());
        field.spawn(record(1, 0, Vec3::ZERO, 0.0));
        let mut target = body_at(0.0, 0.5);
        target.set_enabled(false);

        let hits = field.step(100, 0.1, &[(2, &target)]);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_bullets_expire() {
        let mut field = ProjectileField::new(&GameConfig::default());
        field.spawn(record(1, 0, Vec3::ZERO, 0.0));

        field.step(999, 0.016, &[]);
        assert_eq!(field.len(), 1);

        field.step(1000, 0.016, &[]);
        assert!(field.is_empty());
    }

    #[test]
    fn test_remove_owned_by() {
        let mut field = ProjectileField::new(&GameConfig::default());
        field.spawn(record(1, 0, Vec3::ZERO, 0.0));
        field.spawn(record(2, 0, Vec3::ZERO, 0.0));

        field.remove_owned_by(1);

        assert_eq!(field.len(), 1);
        assert_eq!(field.bullets()[0].record.owner, 2);
    }

    #[test]
    fn test_substep_calculation() {
        let field = ProjectileField::new(&GameConfig::default());
        assert_eq!(field.required_substeps(1.0 / 1000.0), 1);
        assert!(field.required_substeps(1.0 / 30.0) > 1);
    }
}
