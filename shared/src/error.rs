use crate::state::{StateKey, Writer};
use crate::PlayerId;
use thiserror::Error;

/// Rejected Peer State Store operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("{writer} may not write {key:?} of player {player}")]
    Unauthorized {
        player: PlayerId,
        key: StateKey,
        writer: Writer,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpawnError {
    #[error("scene has no spawn points (expected objects named spawn_0, spawn_1, ...)")]
    NoSpawnPoints,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown weapon '{0}'")]
    UnknownWeapon(String),
    #[error("unknown animation '{0}'")]
    UnknownAnimation(String),
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error("failed to read map file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid map file: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

/// Failures while advancing the Host's simulation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GameError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("player {0} is already in the session")]
    DuplicatePlayer(PlayerId),
}
