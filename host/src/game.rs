//! The Host's authoritative simulation.
//!
//! [`HostGame`] owns one Host-role controller per player, the canonical Peer
//! State Store, the projectile field and the respawn schedule. The network
//! layer feeds it joins, leaves and inputs and calls [`HostGame::step`] at a
//! fixed rate; everything it produces for the Clients comes out either as
//! queued field updates or as returned [`GameEvent`]s.

use crate::projectile::ProjectileField;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use shared::{
    select_free_spawn, BodyKind, CombatResolver, EntityController, FieldUpdate, Frame, GameConfig,
    GameError, GameEvent, InputSnapshot, KinematicBody, PeerStateStore, PhysicsBody, PlayerId,
    PlayerProfile, RespawnScheduler, Role, SceneMap, StateValue, StoreError, Vec3, Writer,
    PLAYER_RADIUS,
};
use std::collections::{BTreeMap, HashMap};

/// Player id of the Host itself. Clients are numbered from 1.
pub const HOST_PEER_ID: PlayerId = 0;

/// Every this many ticks the published delta is replaced by a full
/// snapshot, so a Client that lost a datagram converges again.
pub const RESYNC_INTERVAL: u32 = 30;

/// Spawn points closer than this to a living player count as occupied.
const SPAWN_CLEARANCE: f32 = PLAYER_RADIUS * 2.0;

pub struct HostGame {
    tick: u32,
    config: GameConfig,
    store: PeerStateStore,
    controllers: BTreeMap<PlayerId, EntityController<KinematicBody>>,
    inputs: HashMap<PlayerId, InputSnapshot>,
    combat: CombatResolver,
    respawns: RespawnScheduler,
    projectiles: ProjectileField,
    scene: SceneMap,
    rng: StdRng,
}

impl HostGame {
    /// Fails when the scene has no spawn points.
    pub fn new(config: GameConfig, scene: SceneMap, rng: StdRng) -> Result<Self, GameError> {
        scene.validate()?;

        Ok(Self {
            tick: 0,
            store: PeerStateStore::new(Writer::host(HOST_PEER_ID)),
            controllers: BTreeMap::new(),
            inputs: HashMap::new(),
            combat: CombatResolver::new(Role::Host),
            respawns: RespawnScheduler::new(config.respawn_delay_ms),
            projectiles: ProjectileField::new(&config),
            scene,
            rng,
            config,
        })
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn store(&self) -> &PeerStateStore {
        &self.store
    }

    pub fn projectiles(&self) -> &ProjectileField {
        &self.projectiles
    }

    pub fn respawns(&self) -> &RespawnScheduler {
        &self.respawns
    }

    pub fn controller(&self, id: PlayerId) -> Option<&EntityController<KinematicBody>> {
        self.controllers.get(&id)
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.controllers.keys().copied().collect()
    }

    pub fn player_count(&self) -> usize {
        self.controllers.len()
    }

    /// Creates the entity for a newly joined player and places it on a
    /// spawn point.
    ///
    /// The profile is recorded as written by the player's own peer. It goes
    /// in at revision 0 so the peer's first own write always supersedes it.
    pub fn add_player(&mut self, id: PlayerId, profile: PlayerProfile) -> Result<(), GameError> {
        if self.controllers.contains_key(&id) {
            return Err(GameError::DuplicatePlayer(id));
        }

        let name = profile.name.clone();
        self.store.apply_remote(FieldUpdate {
            player: id,
            value: StateValue::Profile(profile),
            revision: 0,
            writer: Writer::client(id),
        })?;
        self.store.set(id, StateValue::Kills(0))?;
        self.store.set(id, StateValue::Deaths(0))?;

        let spawn = self.pick_spawn(id)?;
        let body = KinematicBody::new(BodyKind::Dynamic, spawn);
        let mut controller = EntityController::new(id, Role::Host, &self.config, body);
        controller.respawn(&mut self.store, spawn)?;

        self.controllers.insert(id, controller);
        info!("Player {} ('{}') entered the arena", id, name);
        Ok(())
    }

    /// Drops every trace of a player, including a pending respawn and the
    /// bullets it still has in flight.
    pub fn remove_player(&mut self, id: PlayerId) -> bool {
        if self.controllers.remove(&id).is_none() {
            return false;
        }

        if self.respawns.cancel(id) {
            debug!("Cancelled pending respawn of player {}", id);
        }
        self.inputs.remove(&id);
        self.projectiles.remove_owned_by(id);
        self.store.remove_player(id);
        info!("Player {} left the arena", id);
        true
    }

    /// Input the player's peer currently holds; used on every tick until
    /// replaced.
    pub fn set_input(&mut self, id: PlayerId, input: InputSnapshot) {
        if self.controllers.contains_key(&id) {
            self.inputs.insert(id, input);
        }
    }

    /// Applies an owner-authored write forwarded by peer `from`.
    ///
    /// A peer may only speak for itself, so the update's writer has to be
    /// that peer. Returns whether the update was newer than what is held.
    pub fn apply_owner_update(&mut self, from: PlayerId, update: FieldUpdate) -> Result<bool, StoreError> {
        let key = update.value.key();
        if update.writer != Writer::client(from) {
            warn!(
                "Peer {} tried to write {:?} of player {} as {}",
                from, key, update.player, update.writer
            );
            return Err(StoreError::Unauthorized {
                player: update.player,
                key,
                writer: update.writer,
            });
        }
        if !self.controllers.contains_key(&update.player) {
            return Ok(false);
        }
        self.store.apply_remote(update)
    }

    /// Advances the session to `now` (session clock, ms); `dt` is the time
    /// since the previous tick in seconds.
    ///
    /// Returns the fire, kill and quit events raised during the tick in the
    /// order they happened.
    pub fn step(&mut self, now: u64, dt: f32) -> Result<Vec<GameEvent>, GameError> {
        let mut events: Vec<GameEvent> = Vec::new();

        for id in self.respawns.due(now) {
            if !self.controllers.contains_key(&id) {
                continue;
            }
            let spawn = self.pick_spawn(id)?;
            if let Some(controller) = self.controllers.get_mut(&id) {
                controller.respawn(&mut self.store, spawn)?;
            }
        }

        let frame = Frame { now_ms: now, dt };
        for (id, controller) in self.controllers.iter_mut() {
            controller.update(&mut self.store, frame, self.inputs.get(id), &mut events)?;
        }

        for event in &events {
            if let GameEvent::Fired(bullet) = event {
                self.projectiles.spawn(*bullet);
            }
        }

        for controller in self.controllers.values_mut() {
            controller.body_mut().simulate(dt);
        }

        let hits = {
            let bodies: Vec<(PlayerId, &KinematicBody)> = self
                .controllers
                .iter()
                .map(|(id, controller)| (*id, controller.body()))
                .collect();
            self.projectiles.step(now, dt, &bodies)
        };

        let first_kill = events.len();
        for hit in &hits {
            if let Some(victim) = self.controllers.get_mut(&hit.victim) {
                self.combat
                    .resolve(victim, hit, &mut self.store, &mut self.respawns, now, &mut events)?;
            }
        }
        for event in &events[first_kill..] {
            if let GameEvent::Killed { victim, killer } = event {
                self.credit_kill(*victim, *killer)?;
            }
        }

        self.tick = self.tick.wrapping_add(1);
        if self.tick % 60 == 0 && !self.controllers.is_empty() {
            debug!(
                "Tick {}: {} players, {} bullets, {} respawns pending",
                self.tick,
                self.controllers.len(),
                self.projectiles.len(),
                self.respawns.len()
            );
        }

        Ok(events)
    }

    fn credit_kill(&mut self, victim: PlayerId, killer: PlayerId) -> Result<(), StoreError> {
        if victim == killer {
            return Ok(());
        }
        // The shooter may have left while the bullet was in flight.
        if let Some(kills) = self.store.kills(killer) {
            self.store.set(killer, StateValue::Kills(kills + 1))?;
        }
        Ok(())
    }

    fn pick_spawn(&mut self, id: PlayerId) -> Result<Vec3, GameError> {
        let occupied: Vec<Vec3> = self
            .controllers
            .iter()
            .filter(|(other, controller)| **other != id && controller.body().is_enabled())
            .map(|(_, controller)| controller.body().position())
            .collect();

        Ok(select_free_spawn(
            &self.scene,
            &mut self.rng,
            &occupied,
            SPAWN_CLEARANCE,
        )?)
    }

    /// Field writes made since the last call, for the next state delta.
    pub fn drain_updates(&mut self) -> Vec<FieldUpdate> {
        self.store.drain_outgoing()
    }

    /// What to broadcast after a tick: the fresh writes, or everything held
    /// on a resync tick. Either way the outgoing queue is emptied.
    pub fn publish_updates(&mut self) -> Vec<FieldUpdate> {
        let fresh = self.store.drain_outgoing();
        if self.tick % RESYNC_INTERVAL == 0 {
            self.store.snapshot()
        } else {
            fresh
        }
    }

    /// Full state for a peer that just joined.
    pub fn snapshot(&self) -> Vec<FieldUpdate> {
        self.store.snapshot()
    }

    /// Tears the session down: pending respawns and bullets are dropped.
    pub fn end_session(&mut self) {
        let cancelled = self.respawns.clear();
        let players = self.controllers.len();
        for id in self.player_ids() {
            self.remove_player(id);
        }
        info!(
            "Session ended after {} ticks ({} players, {} respawns cancelled)",
            self.tick, players, cancelled
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use shared::{MoveKeys, StateKey, MAX_HEALTH};

    const DT: f32 = 1.0 / 60.0;
    const TICK_MS: u64 = 16;

    fn game() -> HostGame {
        let scene = SceneMap::with_spawn_ring(4, 10.0);
        HostGame::new(GameConfig::default(), scene, StdRng::seed_from_u64(3)).unwrap()
    }

    fn firing() -> InputSnapshot {
        InputSnapshot {
            space: true,
            ..InputSnapshot::default()
        }
    }

    /// Puts `target` right in front of `shooter` (facing +z).
    fn line_up(game: &mut HostGame, shooter: PlayerId, target: PlayerId) {
        game.controllers
            .get_mut(&shooter)
            .unwrap()
            .body_mut()
            .set_position(Vec3::ZERO);
        game.controllers
            .get_mut(&target)
            .unwrap()
            .body_mut()
            .set_position(Vec3::new(0.0, 0.0, 3.0));
    }

    #[test]
    fn test_new_rejects_scene_without_spawns() {
        let result = HostGame::new(GameConfig::default(), SceneMap::default(), StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(GameError::Spawn(_))));
    }

    #[test]
    fn test_add_player_initial_state() {
        let mut game = game();
        game.add_player(1, PlayerProfile::named("ana")).unwrap();

        let store = game.store();
        assert_eq!(store.health(1), Some(MAX_HEALTH));
        assert_eq!(store.is_dead(1), Some(false));
        assert_eq!(store.kills(1), Some(0));
        assert_eq!(store.deaths(1), Some(0));
        assert_eq!(store.profile(1).map(|p| p.name.as_str()), Some("ana"));
        assert!(store.position(1).is_some());
    }

    #[test]
    fn test_duplicate_player_rejected() {
        let mut game = game();
        game.add_player(1, PlayerProfile::default()).unwrap();
        assert_eq!(
            game.add_player(1, PlayerProfile::default()),
            Err(GameError::DuplicatePlayer(1))
        );
    }

    #[test]
    fn test_players_spawn_apart() {
        let mut game = game();
        for id in 1..=4 {
            game.add_player(id, PlayerProfile::default()).unwrap();
        }

        let positions: Vec<Vec3> = (1..=4).map(|id| game.store().position(id).unwrap()).collect();
        for (i, a) in positions.iter().enumerate() {
            for b in &positions[i + 1..] {
                assert!(a.planar_distance(b) > SPAWN_CLEARANCE);
            }
        }
    }

    #[test]
    fn test_movement_updates_published_position() {
        let mut game = game();
        game.add_player(1, PlayerProfile::default()).unwrap();
        let start = game.store().position(1).unwrap();

        let input = InputSnapshot {
            keys: MoveKeys {
                right: true,
                ..MoveKeys::default()
            },
            ..InputSnapshot::default()
        };
        game.set_input(1, input);

        let mut now = 0;
        for _ in 0..30 {
            now += TICK_MS;
            game.step(now, DT).unwrap();
        }

        let end = game.store().position(1).unwrap();
        assert!(end.x > start.x);
    }

    #[test]
    fn test_shooting_damages_target_and_credits_kill() {
        let mut game = game();
        game.add_player(1, PlayerProfile::default()).unwrap();
        game.add_player(2, PlayerProfile::default()).unwrap();
        line_up(&mut game, 1, 2);
        game.set_input(1, firing());

        let mut events = Vec::new();
        let mut now = 0;
        // 10 damage per hit: ten hits kill. Fire rate allows one shot per 381 ms.
        while now < 5_000 && game.store().is_dead(2) != Some(true) {
            now += TICK_MS;
            events.extend(game.step(now, DT).unwrap());
            line_up(&mut game, 1, 2);
        }

        assert_eq!(game.store().is_dead(2), Some(true));
        assert_eq!(game.store().deaths(2), Some(1));
        assert_eq!(game.store().kills(1), Some(1));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, GameEvent::Killed { victim: 2, killer: 1 }))
                .count(),
            1
        );
        assert!(game.respawns().is_pending(2));
    }

    #[test]
    fn test_respawn_after_delay() {
        let mut game = game();
        game.add_player(1, PlayerProfile::default()).unwrap();
        {
            let controller = game.controllers.get_mut(&1).unwrap();
            controller.die(&mut game.store).unwrap();
        }
        game.respawns.schedule(1, 1_000);

        game.step(2_999, DT).unwrap();
        assert_eq!(game.store().is_dead(1), Some(true));

        game.step(3_000, DT).unwrap();
        assert_eq!(game.store().is_dead(1), Some(false));
        assert_eq!(game.store().health(1), Some(MAX_HEALTH));
        assert!(game.controller(1).unwrap().body().is_enabled());
    }

    #[test]
    fn test_remove_player_cancels_respawn() {
        let mut game = game();
        game.add_player(1, PlayerProfile::default()).unwrap();
        game.respawns.schedule(1, 0);

        assert!(game.remove_player(1));
        assert!(!game.respawns().is_pending(1));
        assert!(game.store().players().is_empty());
        assert!(!game.remove_player(1));

        // Nothing left to respawn.
        game.step(5_000, DT).unwrap();
        assert_eq!(game.player_count(), 0);
    }

    #[test]
    fn test_owner_update_accepted_and_relayed() {
        let mut game = game();
        game.add_player(1, PlayerProfile::named("old")).unwrap();
        game.drain_updates();

        let update = FieldUpdate {
            player: 1,
            value: StateValue::Profile(PlayerProfile::named("new")),
            revision: 1,
            writer: Writer::client(1),
        };
        assert_eq!(game.apply_owner_update(1, update), Ok(true));
        assert_eq!(game.store().profile(1).map(|p| p.name.as_str()), Some("new"));
        assert!(game
            .drain_updates()
            .iter()
            .any(|u| u.value.key() == StateKey::Profile));
    }

    #[test]
    fn test_owner_update_cannot_impersonate() {
        let mut game = game();
        game.add_player(1, PlayerProfile::default()).unwrap();
        game.add_player(2, PlayerProfile::default()).unwrap();

        let forged = FieldUpdate {
            player: 2,
            value: StateValue::Profile(PlayerProfile::named("pwned")),
            revision: 5,
            writer: Writer::client(2),
        };
        assert!(game.apply_owner_update(1, forged).is_err());

        let health = FieldUpdate {
            player: 1,
            value: StateValue::Health(100),
            revision: 5,
            writer: Writer::client(1),
        };
        assert!(game.apply_owner_update(1, health).is_err());
    }

    #[test]
    fn test_quit_reported_as_event() {
        let mut game = game();
        game.add_player(1, PlayerProfile::default()).unwrap();
        let mut input = InputSnapshot::default();
        input.joystick.quit = true;
        game.set_input(1, input);

        let first = game.step(16, DT).unwrap();
        let second = game.step(32, DT).unwrap();

        assert!(matches!(first.as_slice(), [GameEvent::Quit(summary)] if summary.player == 1));
        assert!(second.is_empty());
    }

    #[test]
    fn test_end_session_clears_everything() {
        let mut game = game();
        game.add_player(1, PlayerProfile::default()).unwrap();
        game.add_player(2, PlayerProfile::default()).unwrap();
        game.respawns.schedule(2, 0);

        game.end_session();

        assert_eq!(game.player_count(), 0);
        assert!(game.respawns().is_empty());
        assert!(game.projectiles().is_empty());
    }

    #[test]
    fn test_lost_delta_recovered_by_resync() {
        let mut game = game();
        game.add_player(1, PlayerProfile::default()).unwrap();
        game.add_player(2, PlayerProfile::default()).unwrap();

        let mut replica = PeerStateStore::new(Writer::client(1));
        let mut now = TICK_MS;
        game.step(now, DT).unwrap();
        for update in game.publish_updates() {
            replica.apply_remote(update).unwrap();
        }
        assert_eq!(replica.is_dead(2), Some(false));

        {
            let controller = game.controllers.get_mut(&2).unwrap();
            controller.die(&mut game.store).unwrap();
        }
        let lost = game.publish_updates();
        assert!(lost.iter().any(|update| update.value == StateValue::Dead(true)));

        loop {
            now += TICK_MS;
            game.step(now, DT).unwrap();
            for update in game.publish_updates() {
                replica.apply_remote(update).unwrap();
            }
            if game.tick() % RESYNC_INTERVAL == 0 {
                break;
            }
            assert_eq!(replica.is_dead(2), Some(false));
        }

        assert_eq!(replica.is_dead(2), Some(true));
        assert_eq!(replica.health(2), Some(0));
        assert_eq!(replica.deaths(2), Some(1));
        assert_eq!(replica.snapshot(), game.snapshot());
    }

    #[test]
    fn test_resync_does_not_resend_drained_writes() {
        let mut game = game();
        game.add_player(1, PlayerProfile::default()).unwrap();
        let mut now = 0;
        while game.tick() % RESYNC_INTERVAL != RESYNC_INTERVAL - 1 {
            now += TICK_MS;
            game.step(now, DT).unwrap();
            game.publish_updates();
        }
        now += TICK_MS;
        game.step(now, DT).unwrap();
        assert_eq!(game.publish_updates(), game.snapshot());
        assert!(game.drain_updates().is_empty());
    }

    #[test]
    fn test_tick_counter_advances() {
        let mut game = game();
        game.step(16, DT).unwrap();
        game.step(32, DT).unwrap();
        assert_eq!(game.tick(), 2);
    }
}
