//! Peer registry for the Host's session.
//!
//! This module tracks the Clients taking part in the session:
//! - Peer lifecycle (join, leave, timeout)
//! - Sequence numbers of the inputs each peer forwards
//! - Capacity limits and address lookup for routing replies
//!
//! Inputs are level state (which keys are held), so only the newest input
//! per peer matters. Late or duplicated datagrams carrying an older sequence
//! number are rejected here; accepted inputs are held by the game.

use log::info;
use shared::PlayerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A Client connected to this Host
#[derive(Debug)]
pub struct Peer {
    /// Player id assigned by the Host at join
    pub id: PlayerId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this peer
    pub last_seen: Instant,
    /// Sequence number of the newest input accepted
    pub last_input_sequence: u32,
}

impl Peer {
    pub fn new(id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            last_input_sequence: 0,
        }
    }

    /// Accepts `sequence` if it is newer than the last accepted one.
    ///
    /// Returns false for out-of-order or duplicate packets.
    pub fn record_input(&mut self, sequence: u32) -> bool {
        self.last_seen = Instant::now();
        if sequence <= self.last_input_sequence {
            return false;
        }
        self.last_input_sequence = sequence;
        true
    }

    /// Checks if the peer has exceeded the connection timeout
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all peers of the session
///
/// Ids start at 1 and are never reused within a session; id 0 is the Host
/// itself.
pub struct PeerManager {
    peers: HashMap<PlayerId, Peer>,
    next_peer_id: PlayerId,
    max_peers: usize,
    timeout: Duration,
}

impl PeerManager {
    pub fn new(max_peers: usize, timeout: Duration) -> Self {
        Self {
            peers: HashMap::new(),
            next_peer_id: 1,
            max_peers,
            timeout,
        }
    }

    /// Attempts to register a new peer
    ///
    /// Returns Some(player_id) if successful, None if the session is full.
    pub fn add_peer(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        if self.peers.len() >= self.max_peers {
            return None;
        }

        let id = self.next_peer_id;
        self.next_peer_id += 1;

        info!("Peer {} joined from {}", id, addr);
        self.peers.insert(id, Peer::new(id, addr));

        Some(id)
    }

    /// Removes a peer; returns false if it was already gone.
    pub fn remove_peer(&mut self, id: &PlayerId) -> bool {
        if let Some(peer) = self.peers.remove(id) {
            info!("Peer {} left", peer.id);
            true
        } else {
            false
        }
    }

    pub fn find_peer_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.peers
            .iter()
            .find(|(_, peer)| peer.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn addr_of(&self, id: PlayerId) -> Option<SocketAddr> {
        self.peers.get(&id).map(|peer| peer.addr)
    }

    /// Checks a forwarded input's sequence. Returns false if the peer is
    /// unknown or the input is stale.
    pub fn record_input(&mut self, id: PlayerId, sequence: u32) -> bool {
        self.peers
            .get_mut(&id)
            .map(|peer| peer.record_input(sequence))
            .unwrap_or(false)
    }

    /// Marks a peer as alive.
    pub fn touch(&mut self, id: PlayerId) {
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.last_seen = Instant::now();
        }
    }

    /// Removes and returns every peer silent for longer than the timeout.
    pub fn check_timeouts(&mut self) -> Vec<PlayerId> {
        let timeout = self.timeout;
        let timed_out: Vec<PlayerId> = self
            .peers
            .iter()
            .filter(|(_, peer)| peer.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for id in &timed_out {
            self.remove_peer(id);
        }

        timed_out
    }

    /// All peer ids and addresses, for broadcasting.
    pub fn peer_addrs(&self) -> Vec<(PlayerId, SocketAddr)> {
        self.peers
            .iter()
            .map(|(id, peer)| (*id, peer.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn manager(max_peers: usize) -> PeerManager {
        PeerManager::new(max_peers, Duration::from_secs(5))
    }

    #[test]
    fn test_peer_creation() {
        let peer = Peer::new(1, test_addr());
        assert_eq!(peer.id, 1);
        assert_eq!(peer.last_input_sequence, 0);
    }

    #[test]
    fn test_out_of_order_input_dropped() {
        let mut peer = Peer::new(1, test_addr());

        assert!(peer.record_input(2));
        assert!(!peer.record_input(1));
        assert!(!peer.record_input(2));

        assert_eq!(peer.last_input_sequence, 2);
    }

    #[test]
    fn test_peer_timeout() {
        let mut peer = Peer::new(1, test_addr());
        assert!(!peer.is_timed_out(Duration::from_secs(1)));

        peer.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(peer.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_add_peers_assigns_increasing_ids() {
        let mut manager = manager(3);

        assert_eq!(manager.add_peer(test_addr()), Some(1));
        assert_eq!(manager.add_peer(test_addr2()), Some(2));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_capacity_enforced() {
        let mut manager = manager(1);

        assert!(manager.add_peer(test_addr()).is_some());
        assert!(manager.add_peer(test_addr2()).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_ids_not_reused() {
        let mut manager = manager(2);
        let first = manager.add_peer(test_addr()).unwrap();
        assert!(manager.remove_peer(&first));
        assert!(!manager.remove_peer(&first));

        assert_eq!(manager.add_peer(test_addr()), Some(2));
        assert!(!manager.is_empty());
    }

    #[test]
    fn test_find_peer_by_addr() {
        let mut manager = manager(2);
        let id = manager.add_peer(test_addr()).unwrap();

        assert_eq!(manager.find_peer_by_addr(test_addr()), Some(id));
        assert_eq!(manager.find_peer_by_addr(test_addr2()), None);
        assert_eq!(manager.addr_of(id), Some(test_addr()));
    }

    #[test]
    fn test_record_input_by_id() {
        let mut manager = manager(2);
        let id = manager.add_peer(test_addr()).unwrap();

        assert!(manager.record_input(id, 1));
        assert!(!manager.record_input(id, 1));
        assert!(!manager.record_input(99, 1));
    }

    #[test]
    fn test_check_timeouts_removes_silent_peers() {
        let mut manager = PeerManager::new(2, Duration::from_millis(10));
        let id = manager.add_peer(test_addr()).unwrap();
        manager.peers.get_mut(&id).unwrap().last_seen = Instant::now() - Duration::from_secs(1);

        assert_eq!(manager.check_timeouts(), vec![id]);
        assert!(manager.is_empty());
    }
}
