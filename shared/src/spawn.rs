//! Spawn point discovery and selection.

use crate::error::{MapError, SpawnError};
use crate::physics::Vec3;
use log::info;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Upper bound of the `spawn_N` scan.
pub const MAX_SPAWN_POINTS: usize = 1000;

/// Named objects of the loaded level.
pub trait SceneGraph {
    fn object_position(&self, name: &str) -> Option<Vec3>;
}

/// Positions of `spawn_0`, `spawn_1`, ... up to the first missing index.
pub fn spawn_points<S: SceneGraph + ?Sized>(scene: &S) -> Vec<Vec3> {
    (0..MAX_SPAWN_POINTS)
        .map(|index| scene.object_position(&format!("spawn_{}", index)))
        .take_while(Option::is_some)
        .flatten()
        .collect()
}

/// Picks one spawn point uniformly at random.
pub fn select_spawn<S: SceneGraph + ?Sized, R: Rng + ?Sized>(
    scene: &S,
    rng: &mut R,
) -> Result<Vec3, SpawnError> {
    let spawns = spawn_points(scene);
    if spawns.is_empty() {
        return Err(SpawnError::NoSpawnPoints);
    }
    Ok(spawns[rng.gen_range(0..spawns.len())])
}

/// Like [`select_spawn`], but prefers points with no occupant within
/// `clearance`. Falls back to every spawn point when all are taken.
pub fn select_free_spawn<S: SceneGraph + ?Sized, R: Rng + ?Sized>(
    scene: &S,
    rng: &mut R,
    occupied: &[Vec3],
    clearance: f32,
) -> Result<Vec3, SpawnError> {
    let spawns = spawn_points(scene);
    if spawns.is_empty() {
        return Err(SpawnError::NoSpawnPoints);
    }

    let free: Vec<Vec3> = spawns
        .iter()
        .copied()
        .filter(|spawn| occupied.iter().all(|o| o.planar_distance(spawn) >= clearance))
        .collect();
    let candidates = if free.is_empty() { &spawns } else { &free };

    Ok(candidates[rng.gen_range(0..candidates.len())])
}

/// Level description: named object positions, loadable from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneMap {
    pub objects: HashMap<String, Vec3>,
}

impl SceneMap {
    /// `count` spawn points evenly spaced on a circle around the origin.
    pub fn with_spawn_ring(count: usize, radius: f32) -> Self {
        let objects = (0..count)
            .map(|index| {
                let angle = index as f32 / count as f32 * std::f32::consts::TAU;
                let position = Vec3::from_yaw(angle).scale(radius);
                (format!("spawn_{}", index), position)
            })
            .collect();
        Self { objects }
    }

    /// Loads a map file and checks that it has at least one spawn point.
    pub fn load(path: &Path) -> Result<Self, MapError> {
        let contents = std::fs::read_to_string(path)?;
        let map = Self::from_json(&contents)?;
        info!(
            "Loaded map {} with {} spawn points",
            path.display(),
            spawn_points(&map).len()
        );
        Ok(map)
    }

    pub fn from_json(contents: &str) -> Result<Self, MapError> {
        let map: SceneMap = serde_json::from_str(contents)?;
        map.validate()?;
        Ok(map)
    }

    pub fn validate(&self) -> Result<(), SpawnError> {
        if spawn_points(self).is_empty() {
            Err(SpawnError::NoSpawnPoints)
        } else {
            Ok(())
        }
    }
}

impl SceneGraph for SceneMap {
    fn object_position(&self, name: &str) -> Option<Vec3> {
        self.objects.get(name).copied()
    }
}
