//! Peer State Store: per-player replicated fields with enforced write authority.
//!
//! Every field has exactly one authority. Combat fields and the published
//! position belong to the Host; the profile belongs to the player's own peer.
//! Local writes by anyone else are rejected, and so are remote updates that
//! claim a writer without authority over the field.
//!
//! Replication is last-writer-wins per field, ordered by a revision stamped by
//! the writer. Updates can arrive late, twice or out of order; an update that
//! is not newer than what the store already holds is ignored.

use crate::error::StoreError;
use crate::physics::Vec3;
use crate::weapon::AnimationTag;
use crate::{PlayerId, PlayerProfile, Role};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StateKey {
    Health,
    Dead,
    Deaths,
    Kills,
    Position,
    Profile,
    Animation,
}

/// Who is allowed to write a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    Host,
    /// The peer controlling the player the field belongs to.
    Owner,
}

impl StateKey {
    pub fn authority(self) -> Authority {
        match self {
            StateKey::Profile => Authority::Owner,
            StateKey::Health
            | StateKey::Dead
            | StateKey::Deaths
            | StateKey::Kills
            | StateKey::Position
            | StateKey::Animation => Authority::Host,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateValue {
    Health(u8),
    Dead(bool),
    Deaths(u32),
    Kills(u32),
    Position(Vec3),
    Profile(PlayerProfile),
    Animation(AnimationTag),
}

impl StateValue {
    pub fn key(&self) -> StateKey {
        match self {
            StateValue::Health(_) => StateKey::Health,
            StateValue::Dead(_) => StateKey::Dead,
            StateValue::Deaths(_) => StateKey::Deaths,
            StateValue::Kills(_) => StateKey::Kills,
            StateValue::Position(_) => StateKey::Position,
            StateValue::Profile(_) => StateKey::Profile,
            StateValue::Animation(_) => StateKey::Animation,
        }
    }
}

/// Identity of the peer performing a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Writer {
    pub role: Role,
    pub peer: PlayerId,
}

impl Writer {
    pub fn host(peer: PlayerId) -> Self {
        Self {
            role: Role::Host,
            peer,
        }
    }

    pub fn client(peer: PlayerId) -> Self {
        Self {
            role: Role::Client,
            peer,
        }
    }

    /// Whether this writer may set `key` on `player`.
    pub fn may_write(&self, player: PlayerId, key: StateKey) -> bool {
        match key.authority() {
            Authority::Host => self.role.is_host(),
            Authority::Owner => self.peer == player,
        }
    }
}

impl fmt::Display for Writer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} peer {}", self.role, self.peer)
    }
}

/// One replicated field write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub player: PlayerId,
    pub value: StateValue,
    pub revision: u64,
    pub writer: Writer,
}

#[derive(Debug, Clone)]
struct Entry {
    value: StateValue,
    revision: u64,
    writer: Writer,
}

/// Replicated per-player state as seen by one peer.
#[derive(Debug, Clone)]
pub struct PeerStateStore {
    local: Writer,
    entries: HashMap<(PlayerId, StateKey), Entry>,
    outgoing: HashMap<(PlayerId, StateKey), FieldUpdate>,
    next_revision: u64,
}

impl PeerStateStore {
    pub fn new(local: Writer) -> Self {
        Self {
            local,
            entries: HashMap::new(),
            outgoing: HashMap::new(),
            next_revision: 1,
        }
    }

    pub fn local_writer(&self) -> Writer {
        self.local
    }

    /// Re-identifies the local peer, e.g. once the Host has assigned an id.
    pub fn set_local_writer(&mut self, local: Writer) {
        self.local = local;
    }

    /// Writes a field as the local peer and queues it for replication.
    pub fn set(&mut self, player: PlayerId, value: StateValue) -> Result<(), StoreError> {
        let key = value.key();
        if !self.local.may_write(player, key) {
            return Err(StoreError::Unauthorized {
                player,
                key,
                writer: self.local,
            });
        }

        let revision = self.next_revision;
        self.next_revision += 1;

        let update = FieldUpdate {
            player,
            value: value.clone(),
            revision,
            writer: self.local,
        };
        self.entries.insert(
            (player, key),
            Entry {
                value,
                revision,
                writer: self.local,
            },
        );
        self.outgoing.insert((player, key), update);
        Ok(())
    }

    /// Applies a write received from another peer.
    ///
    /// Returns `Ok(false)` for stale or duplicate updates. On the Host,
    /// accepted owner-authored updates are queued again so they reach the
    /// other peers.
    pub fn apply_remote(&mut self, update: FieldUpdate) -> Result<bool, StoreError> {
        let key = update.value.key();
        if !update.writer.may_write(update.player, key) {
            warn!(
                "Rejected {:?} update for player {} from {}",
                key, update.player, update.writer
            );
            return Err(StoreError::Unauthorized {
                player: update.player,
                key,
                writer: update.writer,
            });
        }

        if let Some(existing) = self.entries.get(&(update.player, key)) {
            if existing.writer == update.writer && existing.revision >= update.revision {
                debug!(
                    "Ignoring stale {:?} update for player {} (rev {} <= {})",
                    key, update.player, update.revision, existing.revision
                );
                return Ok(false);
            }
        }

        self.entries.insert(
            (update.player, key),
            Entry {
                value: update.value.clone(),
                revision: update.revision,
                writer: update.writer,
            },
        );

        if self.local.role.is_host() && key.authority() == Authority::Owner {
            self.outgoing.insert((update.player, key), update);
        }

        Ok(true)
    }

    /// Most recently observed value, or `None` if nothing has arrived yet.
    pub fn get(&self, player: PlayerId, key: StateKey) -> Option<&StateValue> {
        self.entries.get(&(player, key)).map(|entry| &entry.value)
    }

    pub fn health(&self, player: PlayerId) -> Option<u8> {
        match self.get(player, StateKey::Health) {
            Some(StateValue::Health(health)) => Some(*health),
            _ => None,
        }
    }

    pub fn is_dead(&self, player: PlayerId) -> Option<bool> {
        match self.get(player, StateKey::Dead) {
            Some(StateValue::Dead(dead)) => Some(*dead),
            _ => None,
        }
    }

    pub fn deaths(&self, player: PlayerId) -> Option<u32> {
        match self.get(player, StateKey::Deaths) {
            Some(StateValue::Deaths(deaths)) => Some(*deaths),
            _ => None,
        }
    }

    pub fn kills(&self, player: PlayerId) -> Option<u32> {
        match self.get(player, StateKey::Kills) {
            Some(StateValue::Kills(kills)) => Some(*kills),
            _ => None,
        }
    }

    pub fn position(&self, player: PlayerId) -> Option<Vec3> {
        match self.get(player, StateKey::Position) {
            Some(StateValue::Position(position)) => Some(*position),
            _ => None,
        }
    }

    pub fn profile(&self, player: PlayerId) -> Option<&PlayerProfile> {
        match self.get(player, StateKey::Profile) {
            Some(StateValue::Profile(profile)) => Some(profile),
            _ => None,
        }
    }

    pub fn animation(&self, player: PlayerId) -> Option<AnimationTag> {
        match self.get(player, StateKey::Animation) {
            Some(StateValue::Animation(tag)) => Some(*tag),
            _ => None,
        }
    }

    /// Ids of every player with at least one field, ascending.
    pub fn players(&self) -> Vec<PlayerId> {
        let mut players: Vec<PlayerId> = self.entries.keys().map(|(player, _)| *player).collect();
        players.sort_unstable();
        players.dedup();
        players
    }

    pub fn remove_player(&mut self, player: PlayerId) {
        self.entries.retain(|(id, _), _| *id != player);
        self.outgoing.retain(|(id, _), _| *id != player);
    }

    /// Takes the writes queued since the last drain, one per field.
    pub fn drain_outgoing(&mut self) -> Vec<FieldUpdate> {
        let mut updates: Vec<FieldUpdate> = self.outgoing.drain().map(|(_, update)| update).collect();
        updates.sort_by_key(|update| (update.player, update.value.key()));
        updates
    }

    /// Every field currently held, for bringing a new peer up to date.
    pub fn snapshot(&self) -> Vec<FieldUpdate> {
        let mut updates: Vec<FieldUpdate> = self
            .entries
            .iter()
            .map(|((player, _), entry)| FieldUpdate {
                player: *player,
                value: entry.value.clone(),
                revision: entry.revision,
                writer: entry.writer,
            })
            .collect();
        updates.sort_by_key(|update| (update.player, update.value.key()));
        updates
    }
}
