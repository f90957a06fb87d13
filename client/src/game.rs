//! Client-side replica of the session.
//!
//! The Client never decides health, deaths or positions. It applies the
//! Host's field updates to its own Peer State Store and runs one Client-role
//! controller per player, which snaps each body to the last published
//! position. The only fields it writes are its own player's profile.

use log::{debug, info, warn};
use shared::{
    AnimationTag, BodyKind, BulletRecord, EntityController, FieldUpdate, Frame, GameConfig,
    GameEvent, InputSnapshot, KinematicBody, Packet, PeerStateStore, PhysicsBody, PlayerId,
    PlayerProfile, QuitSummary, Role, StateValue, StoreError, Vec3, Weapon, Writer,
};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Kill feed entries kept on screen.
const KILL_FEED_LEN: usize = 5;

/// A bullet as drawn by this Client. Flight is extrapolated from the
/// creation snapshot; hits are only ever decided by the Host.
#[derive(Debug, Clone, Copy)]
pub struct ClientBullet {
    pub record: BulletRecord,
    pub position: Vec3,
    received_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillFeedEntry {
    pub victim: String,
    pub killer: String,
    pub at: u64,
}

/// Everything the renderer needs to draw one player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerView {
    pub id: PlayerId,
    pub position: Vec3,
    pub facing: f32,
    pub health: u8,
    pub dead: bool,
    pub kills: u32,
    pub deaths: u32,
    pub name: String,
    pub color: String,
    pub weapon: Weapon,
    pub animation: AnimationTag,
    pub is_local: bool,
}

pub struct ClientGame {
    config: GameConfig,
    local_id: Option<PlayerId>,
    store: PeerStateStore,
    controllers: BTreeMap<PlayerId, EntityController<KinematicBody>>,
    /// Players the Host announced as gone. Ids are never reused in a
    /// session, so anything still in flight for them is ignored.
    departed: HashSet<PlayerId>,
    bullets: Vec<ClientBullet>,
    kill_feed: VecDeque<KillFeedEntry>,
    quit_summary: Option<QuitSummary>,
    disconnect_reason: Option<String>,
    tick: u32,
}

impl ClientGame {
    pub fn new(config: GameConfig) -> Self {
        Self {
            config,
            local_id: None,
            // Re-identified once the Host assigns our id.
            store: PeerStateStore::new(Writer::client(0)),
            controllers: BTreeMap::new(),
            departed: HashSet::new(),
            bullets: Vec::new(),
            kill_feed: VecDeque::new(),
            quit_summary: None,
            disconnect_reason: None,
            tick: 0,
        }
    }

    pub fn local_id(&self) -> Option<PlayerId> {
        self.local_id
    }

    pub fn is_connected(&self) -> bool {
        self.local_id.is_some() && self.disconnect_reason.is_none()
    }

    pub fn store(&self) -> &PeerStateStore {
        &self.store
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn bullets(&self) -> &[ClientBullet] {
        &self.bullets
    }

    pub fn kill_feed(&self) -> impl Iterator<Item = &KillFeedEntry> {
        self.kill_feed.iter()
    }

    /// Set once the Host has acknowledged our quit.
    pub fn quit_summary(&self) -> Option<&QuitSummary> {
        self.quit_summary.as_ref()
    }

    pub fn disconnect_reason(&self) -> Option<&str> {
        self.disconnect_reason.as_deref()
    }

    /// Applies one packet from the Host. `now` is this Client's clock in ms.
    pub fn handle_packet(&mut self, packet: Packet, now: u64) {
        match packet {
            Packet::Welcome { player_id, tick } => {
                info!("Joined as player {} (host tick {})", player_id, tick);
                self.local_id = Some(player_id);
                self.tick = tick;
                self.store.set_local_writer(Writer::client(player_id));
            }

            Packet::Snapshot { tick, updates } => {
                debug!("Snapshot with {} fields at tick {}", updates.len(), tick);
                self.tick = tick;
                self.apply_updates(updates);
            }

            Packet::StateDelta { tick, updates, .. } => {
                self.tick = self.tick.max(tick);
                self.apply_updates(updates);
            }

            Packet::Fired { bullet } if self.departed.contains(&bullet.owner) => {
                debug!("Ignoring bullet of departed player {}", bullet.owner);
            }

            Packet::Fired { bullet } => {
                self.bullets.push(ClientBullet {
                    record: bullet,
                    position: bullet.position,
                    received_at: now,
                });
            }

            Packet::Killed { victim, killer } => {
                let entry = KillFeedEntry {
                    victim: self.display_name(victim),
                    killer: self.display_name(killer),
                    at: now,
                };
                info!("{} killed {}", entry.killer, entry.victim);
                self.kill_feed.push_back(entry);
                while self.kill_feed.len() > KILL_FEED_LEN {
                    self.kill_feed.pop_front();
                }
            }

            Packet::PlayerLeft { player_id } => {
                info!("Player {} left", player_id);
                self.departed.insert(player_id);
                self.controllers.remove(&player_id);
                self.store.remove_player(player_id);
                self.bullets.retain(|bullet| bullet.record.owner != player_id);
            }

            Packet::QuitAcknowledged { summary } => {
                info!(
                    "Quit acknowledged: {} kills, {} deaths, {} xp",
                    summary.kills, summary.deaths, summary.xp
                );
                self.quit_summary = Some(summary);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.disconnect_reason = Some(reason);
            }

            other => warn!("Unexpected packet from host: {:?}", other),
        }
    }

    fn apply_updates(&mut self, updates: Vec<FieldUpdate>) {
        for update in updates {
            let player = update.player;
            if self.departed.contains(&player) {
                debug!("Ignoring update for departed player {}", player);
                continue;
            }
            if let Err(e) = self.store.apply_remote(update) {
                warn!("Dropped update for player {}: {}", player, e);
                continue;
            }
            self.ensure_controller(player);
        }
    }

    fn ensure_controller(&mut self, id: PlayerId) {
        if self.controllers.contains_key(&id) {
            return;
        }
        let spawn = self.store.position(id).unwrap_or(Vec3::ZERO);
        let body = KinematicBody::new(BodyKind::KinematicPosition, spawn);
        self.controllers
            .insert(id, EntityController::new(id, Role::Client, &self.config, body));
        debug!("Tracking player {}", id);
    }

    /// Runs one render frame: every controller follows the replicated state,
    /// and bullets in flight move on.
    ///
    /// `input` is the locally sampled input; it only affects our own
    /// entity's facing and animation, never its position.
    pub fn frame(&mut self, now: u64, dt: f32, input: Option<&InputSnapshot>) -> Result<(), StoreError> {
        // Client-role controllers never raise hooks.
        let mut events: Vec<GameEvent> = Vec::new();
        let frame = Frame { now_ms: now, dt };

        for (id, controller) in self.controllers.iter_mut() {
            let own_input = if Some(*id) == self.local_id { input } else { None };
            controller.update(&mut self.store, frame, own_input, &mut events)?;
        }

        let lifetime = self.config.bullet_lifetime_ms;
        let speed = self.config.bullet_speed;
        self.bullets.retain_mut(|bullet| {
            let age = now.saturating_sub(bullet.received_at);
            if age >= lifetime {
                return false;
            }
            let travelled = speed * age as f32 / 1000.0;
            bullet.position = bullet
                .record
                .position
                .add(&Vec3::from_yaw(bullet.record.angle).scale(travelled));
            true
        });

        Ok(())
    }

    /// Switches our weapon. The change goes out with the next
    /// [`drain_owner_updates`](Self::drain_owner_updates).
    pub fn equip_weapon(&mut self, weapon: Weapon) -> Result<(), StoreError> {
        self.update_profile(|profile| profile.weapon = weapon)
    }

    pub fn set_color(&mut self, color: &str) -> Result<(), StoreError> {
        self.update_profile(|profile| profile.color = color.to_string())
    }

    fn update_profile<F: FnOnce(&mut PlayerProfile)>(&mut self, change: F) -> Result<(), StoreError> {
        let Some(id) = self.local_id else {
            return Ok(());
        };
        let mut profile = self.store.profile(id).cloned().unwrap_or_default();
        change(&mut profile);
        self.store.set(id, StateValue::Profile(profile))
    }

    /// Our own profile writes, ready to be sent to the Host.
    pub fn drain_owner_updates(&mut self) -> Vec<FieldUpdate> {
        self.store.drain_outgoing()
    }

    fn display_name(&self, id: PlayerId) -> String {
        match self.store.profile(id) {
            Some(profile) if !profile.name.is_empty() => profile.name.clone(),
            _ => format!("Player {}", id),
        }
    }

    /// Players with a known position, ordered by id.
    pub fn players(&self) -> Vec<PlayerView> {
        self.controllers
            .iter()
            .filter_map(|(id, controller)| {
                let position = self.store.position(*id)?;
                let profile = self.store.profile(*id).cloned().unwrap_or_default();
                Some(PlayerView {
                    id: *id,
                    position,
                    facing: controller.facing(),
                    health: self.store.health(*id).unwrap_or(0),
                    dead: self.store.is_dead(*id).unwrap_or(false),
                    kills: self.store.kills(*id).unwrap_or(0),
                    deaths: self.store.deaths(*id).unwrap_or(0),
                    name: self.display_name(*id),
                    color: profile.color,
                    weapon: profile.weapon,
                    animation: self.store.animation(*id).unwrap_or(controller.animation()),
                    is_local: Some(*id) == self.local_id,
                })
            })
            .collect()
    }

    pub fn body_position(&self, id: PlayerId) -> Option<Vec3> {
        self.controllers.get(&id).map(|controller| controller.body().position())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::MAX_HEALTH;

    /// A Host-side store producing the updates a real Host would send.
    fn host_updates(player: PlayerId, position: Vec3) -> Vec<FieldUpdate> {
        let mut host = PeerStateStore::new(Writer::host(0));
        host.set(player, StateValue::Position(position)).unwrap();
        host.set(player, StateValue::Health(MAX_HEALTH)).unwrap();
        host.set(player, StateValue::Dead(false)).unwrap();
        host.drain_outgoing()
    }

    fn joined(id: PlayerId) -> ClientGame {
        let mut game = ClientGame::new(GameConfig::default());
        game.handle_packet(Packet::Welcome { player_id: id, tick: 10 }, 0);
        game
    }

    #[test]
    fn test_welcome_sets_identity() {
        let game = joined(4);
        assert_eq!(game.local_id(), Some(4));
        assert_eq!(game.store().local_writer(), Writer::client(4));
        assert!(game.is_connected());
    }

    #[test]
    fn test_snapshot_creates_replicas_that_follow_host() {
        let mut game = joined(1);
        game.handle_packet(
            Packet::Snapshot {
                tick: 10,
                updates: host_updates(2, Vec3::new(3.0, 0.0, -1.0)),
            },
            0,
        );

        game.frame(16, 0.016, None).unwrap();

        assert_eq!(game.body_position(2), Some(Vec3::new(3.0, 0.0, -1.0)));
        let players = game.players();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].health, MAX_HEALTH);
        assert!(!players[0].is_local);
    }

    #[test]
    fn test_local_input_never_moves_own_body() {
        let mut game = joined(1);
        game.handle_packet(
            Packet::Snapshot {
                tick: 10,
                updates: host_updates(1, Vec3::new(1.0, 0.0, 1.0)),
            },
            0,
        );
        let mut input = InputSnapshot::default();
        input.keys.right = true;

        for frame in 1..10 {
            game.frame(frame * 16, 0.016, Some(&input)).unwrap();
        }

        assert_eq!(game.body_position(1), Some(Vec3::new(1.0, 0.0, 1.0)));
        assert_eq!(game.players()[0].animation, AnimationTag::Run);
    }

    #[test]
    fn test_forged_host_fields_rejected() {
        let mut game = joined(1);
        let forged = FieldUpdate {
            player: 2,
            value: StateValue::Health(100),
            revision: 1,
            writer: Writer::client(2),
        };

        game.handle_packet(
            Packet::StateDelta {
                tick: 11,
                timestamp: 0,
                updates: vec![forged],
            },
            0,
        );

        assert_eq!(game.store().health(2), None);
    }

    #[test]
    fn test_equip_weapon_produces_owner_update() {
        let mut game = joined(3);

        game.equip_weapon(Weapon::Sniper).unwrap();
        let updates = game.drain_owner_updates();

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].writer, Writer::client(3));
        match &updates[0].value {
            StateValue::Profile(profile) => assert_eq!(profile.weapon, Weapon::Sniper),
            other => panic!("Unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_profile_change_before_welcome_is_ignored() {
        let mut game = ClientGame::new(GameConfig::default());
        game.set_color("#ffffff").unwrap();
        assert!(game.drain_owner_updates().is_empty());
    }

    #[test]
    fn test_kill_feed_uses_names_and_is_bounded() {
        let mut game = joined(1);
        let profile = FieldUpdate {
            player: 2,
            value: StateValue::Profile(PlayerProfile::named("rook")),
            revision: 0,
            writer: Writer::client(2),
        };
        game.handle_packet(
            Packet::Snapshot {
                tick: 10,
                updates: vec![profile],
            },
            0,
        );

        for i in 0..7 {
            game.handle_packet(Packet::Killed { victim: 3, killer: 2 }, i);
        }

        let feed: Vec<&KillFeedEntry> = game.kill_feed().collect();
        assert_eq!(feed.len(), KILL_FEED_LEN);
        assert_eq!(feed[0].killer, "rook");
        assert_eq!(feed[0].victim, "Player 3");
    }

    #[test]
    fn test_bullets_fly_and_expire() {
        let mut game = joined(1);
        let bullet = BulletRecord {
            id: shared::BulletId {
                owner: 2,
                created_at: 0,
            },
            position: Vec3::ZERO,
            angle: 0.0,
            owner: 2,
        };
        game.handle_packet(Packet::Fired { bullet }, 1_000);

        game.frame(1_500, 0.016, None).unwrap();
        assert_eq!(game.bullets().len(), 1);
        assert!((game.bullets()[0].position.z - 10.0).abs() < 1e-3);

        game.frame(2_000, 0.016, None).unwrap();
        assert!(game.bullets().is_empty());
    }

    #[test]
    fn test_player_left_drops_replica() {
        let mut game = joined(1);
        game.handle_packet(
            Packet::Snapshot {
                tick: 10,
                updates: host_updates(2, Vec3::ZERO),
            },
            0,
        );

        game.handle_packet(Packet::PlayerLeft { player_id: 2 }, 0);

        assert!(game.players().is_empty());
        assert_eq!(game.store().position(2), None);
    }

    #[test]
    fn test_late_delta_after_player_left_is_ignored() {
        let mut game = joined(1);
        game.handle_packet(
            Packet::StateDelta {
                tick: 11,
                timestamp: 0,
                updates: host_updates(2, Vec3::ZERO),
            },
            0,
        );
        let late = host_updates(2, Vec3::new(1.0, 0.0, 1.0));

        game.handle_packet(Packet::PlayerLeft { player_id: 2 }, 0);
        game.handle_packet(
            Packet::StateDelta {
                tick: 12,
                timestamp: 0,
                updates: late,
            },
            0,
        );
        let bullet = BulletRecord {
            id: shared::BulletId {
                owner: 2,
                created_at: 0,
            },
            position: Vec3::ZERO,
            angle: 0.0,
            owner: 2,
        };
        game.handle_packet(Packet::Fired { bullet }, 0);
        game.frame(16, 0.016, None).unwrap();

        assert!(game.players().is_empty());
        assert_eq!(game.store().position(2), None);
        assert_eq!(game.body_position(2), None);
        assert!(game.bullets().is_empty());
    }

    #[test]
    fn test_quit_acknowledged_and_disconnect() {
        let mut game = joined(1);
        let summary = QuitSummary {
            player: 1,
            kills: 2,
            deaths: 1,
            xp: 0,
        };
        game.handle_packet(Packet::QuitAcknowledged { summary }, 0);
        assert_eq!(game.quit_summary(), Some(&summary));

        game.handle_packet(
            Packet::Disconnected {
                reason: "Host shut down".to_string(),
            },
            0,
        );
        assert!(!game.is_connected());
        assert_eq!(game.disconnect_reason(), Some("Host shut down"));
    }
}
