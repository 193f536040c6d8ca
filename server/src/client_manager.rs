//! Connection tracking and player slot assignment for the match server
//!
//! This module handles the server-side bookkeeping of connected clients, including:
//! - Client connection lifecycle (connect, disconnect, timeout)
//! - Binding at most one occupant to each of the two player slots
//! - Reserving the second slot for the AI opponent in AI matches
//! - Display name validation and uniqueness across slots
//!
//! The client manager is the only place that decides who holds a slot. The
//! lifecycle controller receives an already-accepted `(slot, name)` binding.

use log::info;
use shared::Slot;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Display name given to the scripted opponent
pub const AI_NAME: &str = "Snakebot";

/// Inactivity window after which a silent client is considered gone
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Represents a connected client
///
/// Each client maintains:
/// - Connection metadata (ID, address, last activity)
/// - The slot it currently holds, if it has joined
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Slot held by this client, if any
    pub slot: Option<Slot>,
}

impl Client {
    /// Creates a new, not yet joined client marked as recently active
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            slot: None,
        }
    }

    /// Refreshes the activity timestamp
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no packets have been received from this client
    /// within the specified timeout duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Who holds a slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Holder {
    Client(u32),
    Ai,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotClaim {
    pub name: String,
    pub holder: Holder,
}

/// Reasons a join request is refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("Server full")]
    ServerFull,
    #[error("Unknown client")]
    UnknownClient,
    #[error("Already joined")]
    AlreadyJoined,
    #[error("Both player slots are taken")]
    SlotsFull,
    #[error("Name must not be empty")]
    EmptyName,
    #[error("Name already in use")]
    NameTaken,
}

/// Manages all connected clients and the two player slots
///
/// Connections are capped at `max_clients`; slots are capped at two by
/// construction. A client may be connected without holding a slot, in
/// which case it receives no match traffic.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<u32, Client>,
    /// Slot one and slot two
    slots: [Option<SlotClaim>; 2],
    /// Next available client ID for new connections
    next_client_id: u32,
    /// Maximum number of concurrent connections allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// Client IDs start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            slots: [None, None],
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client and frees the slot it held
    ///
    /// Returns the freed slot so the caller can run the leave transition.
    /// Returns None if the client held no slot or was already gone.
    pub fn remove_client(&mut self, client_id: &u32) -> Option<Slot> {
        let client = self.clients.remove(client_id)?;
        info!("Client {} disconnected", client.id);

        let slot = client.slot?;
        self.slots[slot.index()] = None;
        Some(slot)
    }

    /// Finds a client ID by their network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Marks a client as alive; returns false for an unknown ID
    pub fn touch(&mut self, client_id: u32) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.touch();
                true
            }
            None => false,
        }
    }

    /// Binds a client to the first free slot under the given name
    pub fn claim_slot(&mut self, client_id: u32, name: &str) -> Result<Slot, JoinError> {
        let client = self
            .clients
            .get(&client_id)
            .ok_or(JoinError::UnknownClient)?;
        if client.slot.is_some() {
            return Err(JoinError::AlreadyJoined);
        }

        let slot = Slot::BOTH
            .into_iter()
            .find(|slot| self.slots[slot.index()].is_none())
            .ok_or(JoinError::SlotsFull)?;
        let name = self.validate_name(name, None)?;

        self.bind(client_id, slot, name);
        Ok(slot)
    }

    /// Binds a client to slot one and reserves slot two for the AI
    ///
    /// A client already waiting alone in slot one may upgrade to an AI match.
    pub fn claim_ai_match(&mut self, client_id: u32, name: &str) -> Result<Slot, JoinError> {
        let current = self
            .clients
            .get(&client_id)
            .ok_or(JoinError::UnknownClient)?
            .slot;
        if current == Some(Slot::Two) {
            return Err(JoinError::AlreadyJoined);
        }

        let first_taken = current.is_none() && self.slots[Slot::One.index()].is_some();
        if first_taken || self.slots[Slot::Two.index()].is_some() {
            return Err(JoinError::SlotsFull);
        }
        let name = self.validate_name(name, current)?;

        self.bind(client_id, Slot::One, name);
        self.slots[Slot::Two.index()] = Some(SlotClaim {
            name: AI_NAME.to_string(),
            holder: Holder::Ai,
        });
        info!("Slot 2 reserved for AI opponent");

        Ok(Slot::One)
    }

    /// Frees a slot without touching any connection; used for the AI slot
    pub fn release_slot(&mut self, slot: Slot) {
        if let Some(claim) = self.slots[slot.index()].take() {
            if let Holder::Client(client_id) = claim.holder {
                if let Some(client) = self.clients.get_mut(&client_id) {
                    client.slot = None;
                }
            }
        }
    }

    pub fn claim(&self, slot: Slot) -> Option<&SlotClaim> {
        self.slots[slot.index()].as_ref()
    }

    pub fn client_slot(&self, client_id: u32) -> Option<Slot> {
        self.clients.get(&client_id).and_then(|client| client.slot)
    }

    /// Address of the human holding `slot`
    pub fn slot_addr(&self, slot: Slot) -> Option<SocketAddr> {
        match self.claim(slot)?.holder {
            Holder::Client(client_id) => self.clients.get(&client_id).map(|client| client.addr),
            Holder::Ai => None,
        }
    }

    /// Addresses of every client currently holding a slot
    ///
    /// Used for broadcasting match updates; unjoined connections are skipped.
    pub fn bound_client_addrs(&self) -> Vec<(Slot, SocketAddr)> {
        Slot::BOTH
            .into_iter()
            .filter_map(|slot| self.slot_addr(slot).map(|addr| (slot, addr)))
            .collect()
    }

    /// Lists clients that have been silent for longer than `timeout`
    ///
    /// The clients are not removed here: the caller runs the full disconnect
    /// path so the match sees the departure.
    pub fn timed_out_clients(&self, timeout: Duration) -> Vec<u32> {
        self.clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Trims `name` and checks it against the other slot holders
    fn validate_name(&self, name: &str, own_slot: Option<Slot>) -> Result<String, JoinError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(JoinError::EmptyName);
        }

        let taken = name.eq_ignore_ascii_case(AI_NAME)
            || Slot::BOTH
                .into_iter()
                .filter(|slot| Some(*slot) != own_slot)
                .filter_map(|slot| self.claim(slot))
                .any(|claim| claim.name.eq_ignore_ascii_case(name));
        if taken {
            return Err(JoinError::NameTaken);
        }

        Ok(name.to_string())
    }

    fn bind(&mut self, client_id: u32, slot: Slot, name: String) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.slot = Some(slot);
        }
        info!("Client {} joined slot {} as {}", client_id, slot.number(), name);
        self.slots[slot.index()] = Some(SlotClaim {
            name,
            holder: Holder::Client(client_id),
        });
    }
}
