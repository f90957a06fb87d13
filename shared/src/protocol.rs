//! Datagrams exchanged between Clients and the Host, bincode encoded.

use crate::events::QuitSummary;
use crate::input::InputSnapshot;
use crate::state::FieldUpdate;
use crate::{BulletRecord, PlayerId, PlayerProfile};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Client -> Host
    Join {
        client_version: u32,
        profile: PlayerProfile,
    },
    Input {
        sequence: u32,
        timestamp: u64,
        input: InputSnapshot,
    },
    /// Owner-authored field write, e.g. a weapon change.
    OwnerUpdate {
        update: FieldUpdate,
    },
    Leave,

    // Host -> Client
    Welcome {
        player_id: PlayerId,
        tick: u32,
    },
    /// Full store contents for a newly joined peer.
    Snapshot {
        tick: u32,
        updates: Vec<FieldUpdate>,
    },
    StateDelta {
        tick: u32,
        timestamp: u64,
        updates: Vec<FieldUpdate>,
    },
    Fired {
        bullet: BulletRecord,
    },
    Killed {
        victim: PlayerId,
        killer: PlayerId,
    },
    /// The player's entity is gone; replicas drop its fields.
    PlayerLeft {
        player_id: PlayerId,
    },
    QuitAcknowledged {
        summary: QuitSummary,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Packet, bincode::Error> {
        bincode::deserialize(bytes)
    }
}
