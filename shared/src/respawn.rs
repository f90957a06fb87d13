use crate::PlayerId;
use log::debug;
use std::collections::HashMap;

/// Deferred respawns keyed by player, evaluated against simulated time.
///
/// A player has at most one pending respawn. Entries can be cancelled when a
/// player leaves, and the whole schedule is dropped at session end.
#[derive(Debug, Clone)]
pub struct RespawnScheduler {
    delay_ms: u64,
    pending: HashMap<PlayerId, u64>,
}

impl RespawnScheduler {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            pending: HashMap::new(),
        }
    }

    /// Schedules a respawn `delay_ms` after `now`. Returns false if the
    /// player already has one pending.
    pub fn schedule(&mut self, player: PlayerId, now: u64) -> bool {
        if self.pending.contains_key(&player) {
            return false;
        }
        let due_at = now.saturating_add(self.delay_ms);
        debug!("Respawn of player {} scheduled for {}", player, due_at);
        self.pending.insert(player, due_at);
        true
    }

    pub fn cancel(&mut self, player: PlayerId) -> bool {
        self.pending.remove(&player).is_some()
    }

    pub fn is_pending(&self, player: PlayerId) -> bool {
        self.pending.contains_key(&player)
    }

    pub fn due_at(&self, player: PlayerId) -> Option<u64> {
        self.pending.get(&player).copied()
    }

    /// Removes and returns every player whose respawn time has come.
    pub fn due(&mut self, now: u64) -> Vec<PlayerId> {
        let mut ready: Vec<PlayerId> = self
            .pending
            .iter()
            .filter(|(_, due_at)| **due_at <= now)
            .map(|(player, _)| *player)
            .collect();
        ready.sort_unstable();

        for player in &ready {
            self.pending.remove(player);
        }
        ready
    }

    /// Drops every pending respawn, returning how many were cancelled.
    pub fn clear(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
