//! State threaded through every handler and system
//!
//! The context is built once at startup and owned by the control loop. It
//! replaces any global network manager: handlers and systems only reach the
//! session table, the world and the collaborators through it.

use crate::login::LoginService;
use crate::session::{Session, SessionTable};
use crate::store::PlayerStore;
use crate::world::World;
use log::{debug, error, info};
use shared::{ClientId, MessageType, Payload};

/// One queued outbound message. The transport stamps the header.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Send {
        to: ClientId,
        message_type: MessageType,
        payload: Payload,
    },
    Broadcast {
        message_type: MessageType,
        payload: Payload,
        exclude: Option<ClientId>,
    },
}

impl Outgoing {
    pub fn message_type(&self) -> MessageType {
        match self {
            Outgoing::Send { message_type, .. } | Outgoing::Broadcast { message_type, .. } => {
                *message_type
            }
        }
    }
}

/// Outbound sink filled during dispatch and systems, drained by the transport
#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Outgoing>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, to: ClientId, message_type: MessageType, payload: Payload) {
        self.queue.push(Outgoing::Send {
            to,
            message_type,
            payload,
        });
    }

    pub fn broadcast(
        &mut self,
        message_type: MessageType,
        payload: Payload,
        exclude: Option<ClientId>,
    ) {
        self.queue.push(Outgoing::Broadcast {
            message_type,
            payload,
            exclude,
        });
    }

    pub fn drain(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.queue)
    }

    pub fn pending(&self) -> &[Outgoing] {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

pub struct ServerContext {
    pub sessions: SessionTable,
    pub world: World,
    pub outbox: Outbox,
    pub store: Box<dyn PlayerStore + Send>,
    pub logins: Box<dyn LoginService + Send>,
    /// Command lines waiting for the shell
    pub console: Vec<String>,
    /// Cleared to stop the loop after the current iteration
    pub running: bool,
}

impl ServerContext {
    pub fn new(
        max_clients: usize,
        store: Box<dyn PlayerStore + Send>,
        logins: Box<dyn LoginService + Send>,
    ) -> Self {
        Self {
            sessions: SessionTable::new(max_clients),
            world: World::new(),
            outbox: Outbox::new(),
            store,
            logins,
            console: Vec::new(),
            running: true,
        }
    }

    /// First phase of a disconnect: tells everyone else the entity is going
    /// away and flags the session. Nothing is removed until teardown.
    pub fn request_disconnect(&mut self, id: ClientId) {
        if !self.sessions.contains(id) || self.sessions.is_pending_disconnect(id) {
            return;
        }
        if self.world.contains(id) {
            let mut payload = Payload::new();
            payload.write_id(id);
            self.outbox
                .broadcast(MessageType::DestroyEntity, payload, Some(id));
        }
        self.sessions.mark_pending_disconnect(id);
    }

    /// Second phase, run after the outbox was flushed: persists and removes
    /// the entity, then releases the account
    pub fn teardown(&mut self, session: &Session) {
        if self.world.contains(session.id) {
            self.persist(session.id);
            self.world.despawn(session.id);
        }
        if let Some(account) = &session.account {
            self.logins.logout(account);
        }
        info!("Client {} disconnected", session.id);
    }

    /// Writes one entity to the store; failures are logged
    pub fn persist(&mut self, id: ClientId) -> bool {
        let Some(record) = self.world.record(id) else {
            return false;
        };
        let name = record.name.clone();
        match self.store.save(record) {
            Ok(()) => {
                debug!("Persisted {} '{}'", id, name);
                true
            }
            Err(e) => {
                error!("Failed to persist {} '{}': {}", id, name, e);
                false
            }
        }
    }

    /// Returns how many entities were written
    pub fn persist_all(&mut self) -> usize {
        let saved = self
            .world
            .ids()
            .into_iter()
            .filter(|id| self.persist(*id))
            .count();
        if saved > 0 {
            info!("Persisted {} entities", saved);
        }
        saved
    }
}
