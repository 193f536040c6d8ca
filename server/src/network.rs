//! Server network layer handling UDP communications and match timer coordination

use crate::client_manager::{ClientManager, JoinError, CLIENT_TIMEOUT};
use crate::config::MatchConfig;
use crate::game::TimerHandle;
use crate::lifecycle::{MatchController, Outgoing, Target};
use crate::score::ScoreSink;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, Phase, Slot};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    /// Reply to a specific address, joined or not
    SendPacket { packet: Packet, addr: SocketAddr },
    /// Match traffic, resolved against the slot bindings at send time
    Dispatch(Outgoing),
}

/// The real interval backing the match's current timer handle
struct ArmedTimer {
    epoch: u64,
    interval: Interval,
}

/// Main server coordinating networking and the match
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    controller: MatchController,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: MatchConfig,
        max_clients: usize,
        scores: Box<dyn ScoreSink>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            controller: MatchController::new(config, scores),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle for stopping a running server with [`ServerMessage::Shutdown`]
    pub fn control_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
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
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::Dispatch(Outgoing { target, packet }) => {
                        let addrs = {
                            let clients_guard = clients.read().await;
                            resolve_target(&clients_guard, target)
                        };

                        for addr in addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that reports silent clients once per second
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let clients_guard = clients.read().await;
                    clients_guard.timed_out_clients(CLIENT_TIMEOUT)
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Queues everything the controller produced since the last flush
    fn flush_outbox(&mut self) {
        for outgoing in self.controller.drain_outbox() {
            if let Err(e) = self.game_tx.send(GameMessage::Dispatch(outgoing)) {
                error!("Failed to queue match packet: {}", e);
            }
        }
    }

    /// Processes incoming packets and drives the match controller
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Join { name } => {
                info!("Join request from {} as {:?}", addr, name);
                if let Some(existing_id) = self.find_client(addr).await {
                    info!("Replacing existing session {} from {}", existing_id, addr);
                    self.disconnect_client(existing_id).await;
                }

                let result = {
                    let mut clients = self.clients.write().await;
                    match clients.add_client(addr) {
                        Some(client_id) => clients
                            .claim_slot(client_id, &name)
                            .map(|slot| (client_id, slot, claimed_name(&clients, slot, &name)))
                            .map_err(|e| (Some(client_id), e)),
                        None => Err((None, JoinError::ServerFull)),
                    }
                };

                match result {
                    Ok((client_id, slot, name)) => {
                        self.send_packet(Packet::Joined { slot }, addr);
                        self.controller.join(slot, &name, client_id);
                    }
                    Err((client_id, e)) => self.reject(addr, client_id, e).await,
                }
            }

            Packet::RequestAiMatch { name } => {
                info!("AI match request from {} as {:?}", addr, name);
                let existing = self.find_client(addr).await;
                let upgrading = match existing {
                    Some(client_id) => self.can_upgrade_to_ai(client_id).await,
                    None => false,
                };
                if let (Some(existing_id), false) = (existing, upgrading) {
                    info!("Replacing existing session {} from {}", existing_id, addr);
                    self.disconnect_client(existing_id).await;
                }

                let result = {
                    let mut clients = self.clients.write().await;
                    let client_id = match existing.filter(|_| upgrading) {
                        Some(client_id) => Some(client_id),
                        None => clients.add_client(addr),
                    };
                    match client_id {
                        Some(client_id) => clients
                            .claim_ai_match(client_id, &name)
                            .map(|slot| (client_id, claimed_name(&clients, slot, &name)))
                            .map_err(|e| (Some(client_id), e)),
                        None => Err((None, JoinError::ServerFull)),
                    }
                };

                match result {
                    Ok((client_id, name)) => {
                        self.send_packet(Packet::Joined { slot: Slot::One }, addr);
                        if upgrading {
                            self.controller.leave(Slot::One);
                        }
                        self.controller.start_ai_match(&name, client_id);
                    }
                    Err((client_id, e)) if !upgrading => self.reject(addr, client_id, e).await,
                    Err((_, e)) => {
                        warn!("Upgrade to AI match refused for {}: {}", addr, e);
                        self.send_packet(Packet::Rejected { reason: e.to_string() }, addr);
                    }
                }
            }

            Packet::ChangeDirection { direction } => {
                if let Some(slot) = self.touch_bound(addr).await {
                    self.controller.change_direction(slot, direction);
                }
            }

            Packet::RequestRestart => {
                if let Some(slot) = self.touch_bound(addr).await {
                    self.controller.request_restart(slot);
                }
            }

            Packet::Heartbeat => {
                if self.touch(addr).await.is_none() {
                    debug!("Heartbeat from unknown address {}", addr);
                }
            }

            Packet::Disconnect => {
                if let Some(client_id) = self.find_client(addr).await {
                    self.disconnect_client(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }

        self.flush_outbox();
    }

    async fn find_client(&self, addr: SocketAddr) -> Option<u32> {
        self.clients.read().await.find_client_by_addr(addr)
    }

    /// Refreshes the sender's activity timestamp
    async fn touch(&self, addr: SocketAddr) -> Option<u32> {
        let mut clients = self.clients.write().await;
        let client_id = clients.find_client_by_addr(addr)?;
        clients.touch(client_id);
        Some(client_id)
    }

    /// Like [`Server::touch`] but yields the slot the sender holds
    async fn touch_bound(&self, addr: SocketAddr) -> Option<Slot> {
        let client_id = self.touch(addr).await?;
        let slot = self.clients.read().await.client_slot(client_id);
        if slot.is_none() {
            debug!("Ignoring match input from unjoined client {}", client_id);
        }
        slot
    }

    /// A client waiting alone in slot one may switch to an AI opponent
    async fn can_upgrade_to_ai(&self, client_id: u32) -> bool {
        let holds_first = self.clients.read().await.client_slot(client_id) == Some(Slot::One);
        holds_first
            && self.controller.phase() == Phase::Idle
            && self.controller.game().slot(Slot::Two).is_none()
    }

    async fn reject(&mut self, addr: SocketAddr, client_id: Option<u32>, error: JoinError) {
        warn!("Rejected {}: {}", addr, error);
        if let Some(client_id) = client_id {
            self.clients.write().await.remove_client(&client_id);
        }
        self.send_packet(
            Packet::Rejected {
                reason: error.to_string(),
            },
            addr,
        );
    }

    /// Drops a session and runs the leave transition for its slot
    async fn disconnect_client(&mut self, client_id: u32) {
        let freed = self.clients.write().await.remove_client(&client_id);

        if let Some(slot) = freed {
            if let Some(ai_slot) = self.controller.leave(slot) {
                self.clients.write().await.release_slot(ai_slot);
            }
            self.flush_outbox();
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut armed: Option<ArmedTimer> = None;

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.disconnect_client(client_id).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle countdown and tick timers
                epoch = next_timer(&mut armed) => {
                    self.controller.on_timer(epoch);
                    self.flush_outbox();

                    let tick = self.controller.game().tick();
                    if tick > 0 && tick % 60 == 0 && self.controller.phase() == Phase::Running {
                        let client_count = self.clients.read().await.len();
                        debug!("Tick {}: {} clients", tick, client_count);
                    }
                },
            }

            sync_timer(&mut armed, self.controller.timer());
        }

        Ok(())
    }
}

/// Name as stored by the registry after trimming
fn claimed_name(clients: &ClientManager, slot: Slot, requested: &str) -> String {
    clients
        .claim(slot)
        .map(|claim| claim.name.clone())
        .unwrap_or_else(|| requested.trim().to_string())
}

/// Addresses a match packet should reach
fn resolve_target(clients: &ClientManager, target: Target) -> Vec<SocketAddr> {
    match target {
        Target::All => clients
            .bound_client_addrs()
            .into_iter()
            .map(|(_, addr)| addr)
            .collect(),
        Target::Slot(slot) => clients.slot_addr(slot).into_iter().collect(),
    }
}

/// Makes `armed` follow the controller's timer handle
///
/// A new epoch replaces the interval so its first firing is one full period
/// away; a cancelled handle drops it.
fn sync_timer(armed: &mut Option<ArmedTimer>, handle: Option<TimerHandle>) {
    match handle {
        Some(handle) if armed.as_ref().map(|timer| timer.epoch) != Some(handle.epoch) => {
            let mut interval = interval_at(Instant::now() + handle.period, handle.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            *armed = Some(ArmedTimer {
                epoch: handle.epoch,
                interval,
            });
        }
        Some(_) => {}
        None => *armed = None,
    }
}

/// Waits for the next firing of the armed timer; pends forever when idle
async fn next_timer(armed: &mut Option<ArmedTimer>) -> u64 {
    match armed {
        Some(timer) => {
            timer.interval.tick().await;
            timer.epoch
        }
        None => std::future::pending().await,
    }
}
