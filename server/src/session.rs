//! Per-connection transport state
//!
//! Every accepted reliable connection gets a [`Session`] keyed by a freshly
//! allocated [`ClientId`]. The session tracks:
//! - the peer address of the reliable stream
//! - the datagram port advertised during the handshake
//! - the highest accepted unreliable sequence number
//! - the outbound sequence counter stamped on frames sent to the client
//! - the account attached by a successful authentication
//!
//! Disconnects are two-phase. [`SessionTable::mark_pending_disconnect`] only
//! flags the session; it stays visible to handlers and systems until the end
//! of the iteration calls [`SessionTable::drain_pending_disconnects`].

use log::{info, warn};
use shared::{ClientId, SequenceCounter, SequenceWindow};
use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

#[derive(Debug)]
pub struct Session {
    pub id: ClientId,
    /// Peer address of the reliable stream
    pub remote_addr: SocketAddr,
    /// Port the client receives datagrams on, known once the handshake completed
    pub datagram_port: Option<u16>,
    pub pending_disconnect: bool,
    /// Account name attached by a successful authentication
    pub account: Option<String>,
    pub last_seen: Instant,
    inbound: SequenceWindow,
    outbound: SequenceCounter,
}

impl Session {
    pub fn new(id: ClientId, remote_addr: SocketAddr) -> Self {
        Self {
            id,
            remote_addr,
            datagram_port: None,
            pending_disconnect: false,
            account: None,
            last_seen: Instant::now(),
            inbound: SequenceWindow::new(),
            outbound: SequenceCounter::new(),
        }
    }

    /// True once the handshake bound a datagram endpoint
    pub fn is_established(&self) -> bool {
        self.datagram_port.is_some()
    }

    pub fn datagram_endpoint(&self) -> Option<SocketAddr> {
        self.datagram_port
            .map(|port| SocketAddr::new(self.remote_addr.ip(), port))
    }

    pub fn last_accepted_sequence(&self) -> u64 {
        self.inbound.last_accepted()
    }
}

pub struct SessionTable {
    sessions: BTreeMap<ClientId, Session>,
    /// Resolves the sender of an inbound datagram
    endpoints: HashMap<SocketAddr, ClientId>,
    next_client_id: u32,
    max_clients: usize,
}

impl SessionTable {
    /// Identities start at 1 and are never reused
    pub fn new(max_clients: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            endpoints: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.max_clients
    }

    /// Creates a session for a freshly accepted reliable connection
    pub fn allocate(&mut self, remote_addr: SocketAddr) -> ClientId {
        let id = ClientId(self.next_client_id);
        self.next_client_id += 1;
        self.sessions.insert(id, Session::new(id, remote_addr));
        info!("Session {} allocated for {}", id, remote_addr);
        id
    }

    /// Records the advertised datagram port and maps `(address, port)` to `id`,
    /// replacing whatever endpoint the session had before
    pub fn bind_datagram_endpoint(&mut self, id: ClientId, address: IpAddr, port: u16) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            return false;
        };
        if let Some(previous) = session.datagram_endpoint() {
            if self.endpoints.get(&previous) == Some(&id) {
                self.endpoints.remove(&previous);
            }
        }
        session.datagram_port = Some(port);

        let endpoint = SocketAddr::new(address, port);
        if let Some(other) = self.endpoints.insert(endpoint, id) {
            if other != id {
                warn!(
                    "Endpoint {} rebound from session {} to {}",
                    endpoint, other, id
                );
            }
        }
        info!("Session {} bound datagram endpoint {}", id, endpoint);
        true
    }

    pub fn resolve(&self, endpoint: SocketAddr) -> Option<ClientId> {
        self.endpoints.get(&endpoint).copied()
    }

    /// Accepts `sequence` iff it is strictly greater than the last accepted
    /// one for `id`. Unknown identities are always rejected.
    pub fn validate_and_advance(&mut self, id: ClientId, sequence: u64) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                let accepted = session.inbound.accept(sequence);
                if accepted {
                    session.last_seen = Instant::now();
                }
                accepted
            }
            None => false,
        }
    }

    /// Next sequence number for a frame sent to `id`
    pub fn next_outbound_sequence(&mut self, id: ClientId) -> Option<u64> {
        self.sessions
            .get_mut(&id)
            .map(|session| session.outbound.next())
    }

    pub fn mark_pending_disconnect(&mut self, id: ClientId) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                if !session.pending_disconnect {
                    info!("Session {} marked for disconnect", id);
                }
                session.pending_disconnect = true;
                true
            }
            None => false,
        }
    }

    pub fn is_pending_disconnect(&self, id: ClientId) -> bool {
        self.sessions
            .get(&id)
            .is_some_and(|session| session.pending_disconnect)
    }

    /// Removes every session marked for disconnect and returns them in
    /// identity order
    pub fn drain_pending_disconnects(&mut self) -> Vec<Session> {
        let pending: Vec<ClientId> = self
            .sessions
            .values()
            .filter(|session| session.pending_disconnect)
            .map(|session| session.id)
            .collect();

        pending
            .into_iter()
            .filter_map(|id| self.remove(id))
            .collect()
    }

    pub fn remove(&mut self, id: ClientId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        if let Some(endpoint) = session.datagram_endpoint() {
            if self.endpoints.get(&endpoint) == Some(&id) {
                self.endpoints.remove(&endpoint);
            }
        }
        info!("Session {} removed", id);
        Some(session)
    }

    pub fn get(&self, id: ClientId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Established sessions that are not on their way out
    pub fn broadcast_targets(&self) -> Vec<ClientId> {
        self.sessions
            .values()
            .filter(|session| session.is_established() && !session.pending_disconnect)
            .map(|session| session.id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
