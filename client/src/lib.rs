//! # Arena Client Library
//!
//! The Client side of a host-authoritative session. A Client never decides
//! combat or movement: it sends its input to the Host, applies the field
//! updates the Host publishes, and draws the result.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The local replica: a Peer State Store fed by the Host, one Client-role
//! entity controller per player, visual bullets and the kill feed.
//!
//! ### Input Module (`input`)
//! Keyboard and mouse sampling, the mouse joystick, and sequenced input
//! ready for the wire.
//!
//! ### Network Module (`network`)
//! A tokio runtime on its own thread owning the UDP socket and the shop,
//! bridged to the frame loop with channels.
//!
//! ### Rendering Module (`rendering`)
//! Top-down view of the arena, HUD and the shop overlay.
//!
//! ### Shop Module (`shop`)
//! Catalog, affordability checks and the approve-then-buy purchase flow
//! against a token ledger.
//!
//! ## Frame Loop
//!
//! ```text
//! poll network events -> apply packets to the replica
//! sample input        -> send Input, handle shop keys
//! frame the replica   -> send our own profile writes
//! render
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
pub mod shop;
