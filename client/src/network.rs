//! Networking for the Client.
//!
//! macroquad owns the main thread, so the UDP socket lives on its own thread
//! running a tokio runtime. The frame loop talks to it through two unbounded
//! channels: [`NetCommand`]s go in, [`NetEvent`]s come out. The shop lives on
//! the same thread since its ledger calls are async.

use crate::shop::{CatalogItem, InMemoryLedger, ItemKind, Notice, Ownership, Shop};
use log::{debug, error, info, warn};
use shared::Packet;
use std::net::SocketAddr;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::sleep;

const MAX_DATAGRAM: usize = 65_507;

/// Requests from the frame loop.
#[derive(Debug, Clone)]
pub enum NetCommand {
    Send(Packet),
    Purchase { kind: ItemKind, id: u32 },
    RefreshBalance,
    Shutdown,
}

/// What the network thread reports back.
#[derive(Debug, Clone)]
pub enum NetEvent {
    Packet(Packet),
    Notice(Notice),
    Purchased(CatalogItem),
    /// Ledger balance in base units.
    Balance(u128),
    Owned(Ownership),
    Error(String),
}

pub struct NetworkLink {
    commands: mpsc::UnboundedSender<NetCommand>,
    events: mpsc::UnboundedReceiver<NetEvent>,
    thread: Option<JoinHandle<()>>,
}

impl NetworkLink {
    /// Binds a socket and starts the network thread.
    pub fn connect(
        server_addr: &str,
        fake_ping_ms: u64,
        shop: Shop<InMemoryLedger>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let server_addr: SocketAddr = server_addr.parse()?;
        let std_socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
        std_socket.set_nonblocking(true)?;
        info!("Client socket bound to {}", std_socket.local_addr()?);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let thread = std::thread::Builder::new()
            .name("network".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to start network runtime: {}", e);
                        let _ = event_tx.send(NetEvent::Error(e.to_string()));
                        return;
                    }
                };

                runtime.block_on(async move {
                    let socket = match UdpSocket::from_std(std_socket) {
                        Ok(socket) => socket,
                        Err(e) => {
                            error!("Failed to register socket: {}", e);
                            let _ = event_tx.send(NetEvent::Error(e.to_string()));
                            return;
                        }
                    };
                    let task = NetworkTask {
                        socket,
                        server_addr,
                        fake_ping_ms,
                        shop,
                        events: event_tx,
                    };
                    task.run(command_rx).await;
                });
            })?;

        Ok(Self {
            commands: command_tx,
            events: event_rx,
            thread: Some(thread),
        })
    }

    pub fn send(&self, packet: Packet) {
        self.command(NetCommand::Send(packet));
    }

    pub fn command(&self, command: NetCommand) {
        if self.commands.send(command).is_err() {
            warn!("Network thread is gone");
        }
    }

    /// Everything that arrived since the last call.
    pub fn poll(&mut self) -> Vec<NetEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Stops the network thread after it has flushed pending sends.
    pub fn shutdown(&mut self) {
        let _ = self.commands.send(NetCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Network thread panicked");
            }
        }
    }
}

impl Drop for NetworkLink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct NetworkTask {
    socket: UdpSocket,
    server_addr: SocketAddr,
    fake_ping_ms: u64,
    shop: Shop<InMemoryLedger>,
    events: mpsc::UnboundedSender<NetEvent>,
}

impl NetworkTask {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<NetCommand>) {
        let mut buffer = vec![0u8; MAX_DATAGRAM];

        self.refresh_balance().await;

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, addr)) if addr == self.server_addr => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match Packet::decode(&buffer[..len]) {
                                Ok(packet) => self.emit(NetEvent::Packet(packet)),
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        }
                        Ok((_, addr)) => debug!("Ignoring datagram from {}", addr),
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                }

                command = commands.recv() => {
                    match command {
                        Some(NetCommand::Send(packet)) => {
                            if let Err(e) = self.send_packet(&packet).await {
                                error!("Error sending packet: {}", e);
                            }
                        }
                        Some(NetCommand::Purchase { kind, id }) => self.purchase(kind, id).await,
                        Some(NetCommand::RefreshBalance) => self.refresh_balance().await,
                        Some(NetCommand::Shutdown) | None => {
                            info!("Network thread stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = packet.encode()?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn purchase(&self, kind: ItemKind, id: u32) {
        let result = self.shop.purchase(kind, id).await;
        self.emit(NetEvent::Notice(Notice::for_purchase(&result)));
        if let Ok(item) = result {
            self.emit(NetEvent::Purchased(item));
        }
        self.emit(NetEvent::Balance(self.shop.balance()));
        self.emit(NetEvent::Owned(self.shop.owned()));
    }

    async fn refresh_balance(&self) {
        match self.shop.refresh_balance().await {
            Ok(balance) => self.emit(NetEvent::Balance(balance)),
            Err(e) => warn!("Could not read balance: {}", e),
        }
        match self.shop.refresh_owned().await {
            Ok(owned) => self.emit(NetEvent::Owned(owned)),
            Err(e) => warn!("Could not read owned items: {}", e),
        }
    }

    fn emit(&self, event: NetEvent) {
        if self.events.send(event).is_err() {
            debug!("Frame loop is gone, dropping event");
        }
    }
}
