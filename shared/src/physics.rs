//! Minimal rigid-body model shared by the Host simulation and Client replicas.
//!
//! The controller only talks to bodies through [`PhysicsBody`]; [`KinematicBody`]
//! is the in-repo implementation used by both peers.

use crate::PlayerId;
use serde::{Deserialize, Serialize};

///Represents a vector in 3D space.
/// `y` is up; the arena floor is the `x`/`z` plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    ///Unit vector on the floor plane pointing along a yaw angle.
    /// An angle of zero faces `+z`.
    pub fn from_yaw(angle: f32) -> Vec3 {
        Vec3 {
            x: angle.sin(),
            y: 0.0,
            z: angle.cos(),
        }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    ///Returns the normalized vector.
    pub fn normalize(&self) -> Vec3 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vec3::ZERO
        } else {
            self.scale(1.0 / mag)
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vec3 {
        Vec3 {
            x: self.x * scalar,
            y: self.y * scalar,
            z: self.z * scalar,
        }
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3 {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }

    /// Distance on the floor plane, ignoring height.
    pub fn planar_distance(&self, other: &Vec3) -> f32 {
        let dx = other.x - self.x;
        let dz = other.z - self.z;
        (dx * dx + dz * dz).sqrt()
    }
}

/// Operations the entity controller needs from a physics body.
pub trait PhysicsBody {
    fn position(&self) -> Vec3;
    /// Teleports the body; no interpolation.
    fn set_position(&mut self, position: Vec3);
    fn apply_impulse(&mut self, impulse: Vec3);
    /// A disabled body neither moves nor takes part in collisions.
    fn set_enabled(&mut self, enabled: bool);
    fn is_enabled(&self) -> bool;
}

/// How a body is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Integrated from impulses (the Host's bodies).
    Dynamic,
    /// Only moved by `set_position` (Client replicas).
    KinematicPosition,
}

/// Capsule-shaped player body with linear damping and locked rotation.
#[derive(Debug, Clone)]
pub struct KinematicBody {
    pub kind: BodyKind,
    pub position: Vec3,
    pub velocity: Vec3,
    pub linear_damping: f32,
    pub radius: f32,
    enabled: bool,
}

impl KinematicBody {
    pub fn new(kind: BodyKind, position: Vec3) -> Self {
        Self {
            kind,
            position,
            velocity: Vec3::ZERO,
            linear_damping: crate::PLAYER_LINEAR_DAMPING,
            radius: crate::PLAYER_RADIUS,
            enabled: true,
        }
    }

    /// Advances the body by `dt` seconds.
    pub fn simulate(&mut self, dt: f32) {
        if !self.enabled || self.kind != BodyKind::Dynamic {
            return;
        }

        self.position = self.position.add(&self.velocity.scale(dt));

        // Same damping model as rapier: v *= 1 / (1 + dt * damping)
        self.velocity = self.velocity.scale(1.0 / (1.0 + dt * self.linear_damping));
    }

    /// Whether a point on the floor plane lies inside this body's capsule.
    pub fn contains(&self, point: &Vec3) -> bool {
        self.enabled && self.position.planar_distance(point) < self.radius
    }
}

impl PhysicsBody for KinematicBody {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn set_position(&mut self, position: Vec3) {
        self.position = position;
        if self.kind == BodyKind::Dynamic {
            self.velocity = Vec3::ZERO;
        }
    }

    fn apply_impulse(&mut self, impulse: Vec3) {
        if self.enabled && self.kind == BodyKind::Dynamic {
            self.velocity = self.velocity.add(&impulse);
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.velocity = Vec3::ZERO;
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Type tag attached to every collider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColliderKind {
    Bullet,
    Player,
    Scenery,
}

/// Metadata of the object a player body collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColliderTag {
    pub kind: ColliderKind,
    pub damage: u32,
    pub owner: PlayerId,
}

impl ColliderTag {
    pub fn bullet(owner: PlayerId, damage: u32) -> Self {
        Self {
            kind: ColliderKind::Bullet,
            damage,
            owner,
        }
    }
}

/// Intersection reported by the physics collaborator for a player body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionEvent {
    pub victim: PlayerId,
    pub other: ColliderTag,
}
