//! Host network layer: UDP I/O and the fixed-rate tick loop.
//!
//! Three background tasks do the I/O: one receives and decodes datagrams,
//! one encodes and sends whatever the game loop queues, and one watches for
//! silent peers. The loop in [`Server::run`] owns the [`HostGame`] and is the
//! only place the simulation is touched.

use crate::game::HostGame;
use crate::session::PeerManager;
use log::{debug, error, info, warn};
use shared::protocol::PROTOCOL_VERSION;
use shared::{GameEvent, Packet, PlayerId, PlayerProfile};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Largest datagram we accept; full snapshots can exceed a few KB.
const MAX_DATAGRAM: usize = 65_507;

/// Upper bound on a tick's delta time, in seconds.
const MAX_DELTA_TIME: f32 = 1.0 / 20.0;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    PeerTimeout { player_id: PlayerId },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    BroadcastPacket { packet: Packet, exclude: Option<PlayerId> },
}

/// The Host: owns the socket, the peer registry and the game.
pub struct Server {
    socket: Arc<UdpSocket>,
    peers: Arc<RwLock<PeerManager>>,
    game: HostGame,
    tick_duration: Duration,
    started: Instant,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        peers: PeerManager,
        game: HostGame,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Host listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            peers: Arc::new(RwLock::new(peers)),
            game,
            tick_duration,
            started: Instant::now(),
            server_tx,
            server_rx,
            game_tx,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle for stopping the loop from outside, e.g. on Ctrl-C.
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn game(&self) -> &HostGame {
        &self.game
    }

    /// Milliseconds since the Host started; the session clock.
    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match Packet::decode(&buffer[..len]) {
                        Ok(packet) => {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                debug!("Game loop gone, stopping receiver");
                                break;
                            }
                        }
                        Err(_) => warn!("Failed to deserialize packet from {}", addr),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };
        let socket = Arc::clone(&self.socket);
        let peers = Arc::clone(&self.peers);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        send_packet_impl(&socket, &packet, addr).await;
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let peer_addrs = peers.read().await.peer_addrs();
                        for (player_id, addr) in peer_addrs {
                            if Some(player_id) != exclude {
                                send_packet_impl(&socket, &packet, addr).await;
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors peer timeouts
    fn spawn_timeout_checker(&self) {
        let peers = Arc::clone(&self.peers);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = peers.write().await.check_timeouts();
                for player_id in timed_out {
                    if server_tx.send(ServerMessage::PeerTimeout { player_id }).is_err() {
                        return;
                    }
                }
            }
        });
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<PlayerId>) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket { packet, exclude }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    async fn peer_at(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.peers.read().await.find_peer_by_addr(addr)
    }

    /// Processes one incoming packet
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Join {
                client_version,
                profile,
            } => self.handle_join(client_version, profile, addr).await,

            Packet::Input {
                sequence, input, ..
            } => {
                let Some(player_id) = self.peer_at(addr).await else {
                    debug!("Input from unknown address {}", addr);
                    return;
                };
                let accepted = self
                    .peers
                    .write()
                    .await
                    .record_input(player_id, sequence);
                if accepted {
                    self.game.set_input(player_id, input);
                }
            }

            Packet::OwnerUpdate { update } => {
                let Some(player_id) = self.peer_at(addr).await else {
                    return;
                };
                self.peers.write().await.touch(player_id);
                if let Err(e) = self.game.apply_owner_update(player_id, update) {
                    warn!("Rejected owner update from peer {}: {}", player_id, e);
                }
            }

            Packet::Leave => {
                if let Some(player_id) = self.peer_at(addr).await {
                    self.peers.write().await.remove_peer(&player_id);
                    self.drop_player(player_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from peer at {}", addr);
            }
        }
    }

    async fn handle_join(&mut self, client_version: u32, profile: PlayerProfile, addr: SocketAddr) {
        info!(
            "Peer joining from {} as '{}' (version: {})",
            addr, profile.name, client_version
        );

        if client_version != PROTOCOL_VERSION {
            self.send_packet(
                Packet::Disconnected {
                    reason: format!(
                        "Protocol version {} not supported (host speaks {})",
                        client_version, PROTOCOL_VERSION
                    ),
                },
                addr,
            );
            return;
        }

        // A re-join from the same address replaces the old entity.
        if let Some(existing_id) = self.peer_at(addr).await {
            info!("Removing existing peer {} from {}", existing_id, addr);
            self.peers.write().await.remove_peer(&existing_id);
            self.drop_player(existing_id);
        }

        let Some(player_id) = self.peers.write().await.add_peer(addr) else {
            self.send_packet(
                Packet::Disconnected {
                    reason: "Host full".to_string(),
                },
                addr,
            );
            return;
        };

        if let Err(e) = self.game.add_player(player_id, profile) {
            error!("Could not add player {}: {}", player_id, e);
            self.peers.write().await.remove_peer(&player_id);
            self.send_packet(
                Packet::Disconnected {
                    reason: e.to_string(),
                },
                addr,
            );
            return;
        }

        let tick = self.game.tick();
        self.send_packet(Packet::Welcome { player_id, tick }, addr);
        self.send_packet(
            Packet::Snapshot {
                tick,
                updates: self.game.snapshot(),
            },
            addr,
        );
    }

    /// Removes a player whose peer is already gone from the registry.
    fn drop_player(&mut self, player_id: PlayerId) {
        if self.game.remove_player(player_id) {
            self.broadcast_packet(Packet::PlayerLeft { player_id }, None);
        }
    }

    /// Runs one simulation tick and queues its output.
    async fn run_tick(&mut self, dt: f32) {
        let now = self.now_ms();
        let events = match self.game.step(now, dt) {
            Ok(events) => events,
            Err(e) => {
                error!("Tick {} failed: {}", self.game.tick(), e);
                Vec::new()
            }
        };

        let updates = self.game.publish_updates();
        if !updates.is_empty() {
            let packet = Packet::StateDelta {
                tick: self.game.tick(),
                timestamp: wall_clock_ms(),
                updates,
            };
            self.broadcast_packet(packet, None);
        }

        for event in events {
            match event {
                GameEvent::Fired(bullet) => self.broadcast_packet(Packet::Fired { bullet }, None),
                GameEvent::Killed { victim, killer } => {
                    self.broadcast_packet(Packet::Killed { victim, killer }, None)
                }
                GameEvent::Quit(summary) => {
                    let addr = self.peers.read().await.addr_of(summary.player);
                    if let Some(addr) = addr {
                        self.send_packet(Packet::QuitAcknowledged { summary }, addr);
                    }
                    self.peers.write().await.remove_peer(&summary.player);
                    self.drop_player(summary.player);
                }
            }
        }
    }

    fn shutdown(&mut self) {
        info!("Host shutting down");
        self.broadcast_packet(
            Packet::Disconnected {
                reason: "Host shut down".to_string(),
            },
            None,
        );
        self.game.end_session();
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Host started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::PeerTimeout { player_id }) => {
                            info!("Peer {} timed out", player_id);
                            self.drop_player(player_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            self.shutdown();
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let mut dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    if dt > MAX_DELTA_TIME {
                        warn!("Large delta time ({:.3}s), capping to {:.3}s", dt, MAX_DELTA_TIME);
                        dt = MAX_DELTA_TIME;
                    }

                    self.run_tick(dt).await;
                },
            }
        }

        Ok(())
    }
}

async fn send_packet_impl(socket: &UdpSocket, packet: &Packet, addr: SocketAddr) {
    let data = match packet.encode() {
        Ok(data) => data,
        Err(e) => {
            error!("Failed to encode packet for {}: {}", addr, e);
            return;
        }
    };
    if let Err(e) = socket.send_to(&data, addr).await {
        error!("Failed to send packet to {}: {}", addr, e);
    }
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::{GameConfig, InputSnapshot, SceneMap};

    async fn test_server() -> Server {
        let game = HostGame::new(
            GameConfig::default(),
            SceneMap::with_spawn_ring(4, 8.0),
            StdRng::seed_from_u64(9),
        )
        .unwrap();
        let peers = PeerManager::new(2, Duration::from_secs(5));
        Server::new("127.0.0.1:0", Duration::from_millis(16), peers, game)
            .await
            .unwrap()
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn join(name: &str) -> Packet {
        Packet::Join {
            client_version: PROTOCOL_VERSION,
            profile: PlayerProfile::named(name),
        }
    }

    /// Everything queued for the sender task so far.
    fn queued(server: &mut Server) -> Vec<GameMessage> {
        let rx = server.game_rx.as_mut().unwrap();
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[tokio::test]
    async fn test_join_sends_welcome_then_snapshot() {
        let mut server = test_server().await;

        server.handle_packet(join("ivy"), addr(9000)).await;

        let messages = queued(&mut server);
        assert_eq!(messages.len(), 2);
        match &messages[0] {
            GameMessage::SendPacket {
                packet: Packet::Welcome { player_id, .. },
                addr: to,
            } => {
                assert_eq!(*player_id, 1);
                assert_eq!(*to, addr(9000));
            }
            other => panic!("Unexpected message {:?}", other),
        }
        match &messages[1] {
            GameMessage::SendPacket {
                packet: Packet::Snapshot { updates, .. },
                ..
            } => assert!(!updates.is_empty()),
            other => panic!("Unexpected message {:?}", other),
        }
        assert_eq!(server.game().player_count(), 1);
    }

    #[tokio::test]
    async fn test_wrong_version_rejected() {
        let mut server = test_server().await;
        let packet = Packet::Join {
            client_version: PROTOCOL_VERSION + 1,
            profile: PlayerProfile::default(),
        };

        server.handle_packet(packet, addr(9000)).await;

        assert!(matches!(
            queued(&mut server).as_slice(),
            [GameMessage::SendPacket {
                packet: Packet::Disconnected { .. },
                ..
            }]
        ));
        assert_eq!(server.game().player_count(), 0);
    }

    #[tokio::test]
    async fn test_full_host_rejects_join() {
        let mut server = test_server().await;
        server.handle_packet(join("a"), addr(9000)).await;
        server.handle_packet(join("b"), addr(9001)).await;
        queued(&mut server);

        server.handle_packet(join("c"), addr(9002)).await;

        assert!(matches!(
            queued(&mut server).as_slice(),
            [GameMessage::SendPacket {
                packet: Packet::Disconnected { .. },
                ..
            }]
        ));
        assert_eq!(server.game().player_count(), 2);
    }

    #[tokio::test]
    async fn test_rejoin_replaces_entity() {
        let mut server = test_server().await;
        server.handle_packet(join("a"), addr(9000)).await;
        server.handle_packet(join("a"), addr(9000)).await;

        assert_eq!(server.game().player_ids(), vec![2]);
    }

    #[tokio::test]
    async fn test_leave_removes_player_and_notifies() {
        let mut server = test_server().await;
        server.handle_packet(join("a"), addr(9000)).await;
        queued(&mut server);

        server.handle_packet(Packet::Leave, addr(9000)).await;

        assert_eq!(server.game().player_count(), 0);
        assert!(matches!(
            queued(&mut server).as_slice(),
            [GameMessage::BroadcastPacket {
                packet: Packet::PlayerLeft { player_id: 1 },
                exclude: None,
            }]
        ));
    }

    #[tokio::test]
    async fn test_tick_broadcasts_state_delta() {
        let mut server = test_server().await;
        server.handle_packet(join("a"), addr(9000)).await;
        queued(&mut server);

        server.run_tick(0.016).await;

        let messages = queued(&mut server);
        assert!(messages.iter().any(|m| matches!(
            m,
            GameMessage::BroadcastPacket {
                packet: Packet::StateDelta { .. },
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_quit_acknowledged_and_player_removed() {
        let mut server = test_server().await;
        server.handle_packet(join("a"), addr(9000)).await;
        queued(&mut server);

        let mut input = InputSnapshot::default();
        input.joystick.quit = true;
        server
            .handle_packet(
                Packet::Input {
                    sequence: 1,
                    timestamp: 0,
                    input,
                },
                addr(9000),
            )
            .await;
        server.run_tick(0.016).await;

        let messages = queued(&mut server);
        assert!(messages.iter().any(|m| matches!(
            m,
            GameMessage::SendPacket {
                packet: Packet::QuitAcknowledged { summary },
                ..
            } if summary.player == 1
        )));
        assert_eq!(server.game().player_count(), 0);
        assert!(server.peers.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_input_from_unknown_address_ignored() {
        let mut server = test_server().await;
        let packet = Packet::Input {
            sequence: 1,
            timestamp: 0,
            input: InputSnapshot::default(),
        };

        server.handle_packet(packet, addr(9999)).await;

        assert!(queued(&mut server).is_empty());
    }

    #[test]
    fn test_wall_clock_is_recent() {
        // 2020-01-01 in ms
        assert!(wall_clock_ms() > 1_577_836_800_000);
    }
}
