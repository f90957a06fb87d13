//! Callback hooks raised by the core.
//!
//! The core never simulates bullets, persists scores or tears a session down;
//! it only reports that one of these things should happen.

use crate::{BulletRecord, PlayerId};
use serde::{Deserialize, Serialize};

/// Stats handed over when a player quits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuitSummary {
    pub player: PlayerId,
    pub kills: u32,
    pub deaths: u32,
    pub xp: u32,
}

pub trait GameHooks {
    fn on_fire(&mut self, bullet: BulletRecord);
    fn on_killed(&mut self, victim: PlayerId, killer: PlayerId);
    fn on_quit(&mut self, summary: QuitSummary);
}

#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Fired(BulletRecord),
    Killed { victim: PlayerId, killer: PlayerId },
    Quit(QuitSummary),
}

/// Collects hook calls in the order they were raised.
impl GameHooks for Vec<GameEvent> {
    fn on_fire(&mut self, bullet: BulletRecord) {
        self.push(GameEvent::Fired(bullet));
    }

    fn on_killed(&mut self, victim: PlayerId, killer: PlayerId) {
        self.push(GameEvent::Killed { victim, killer });
    }

    fn on_quit(&mut self, summary: QuitSummary) {
        self.push(GameEvent::Quit(summary));
    }
}
