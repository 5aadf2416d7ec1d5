//! Fan-out of server events to connected sessions.
//!
//! The hub describes *what* to send as a list of [`Delivery`] values; the
//! [`Broadcaster`] owns the per-connection outbound queues and turns each
//! delivery into encoded frames for the sessions in its [`Audience`].

use log::{debug, error};
use shared::{ServerEvent, SessionId};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Only(SessionId),
    AllExcept(SessionId),
}

impl Audience {
    pub fn includes(self, session_id: SessionId) -> bool {
        match self {
            Audience::All => true,
            Audience::Only(target) => target == session_id,
            Audience::AllExcept(excluded) => excluded != session_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub audience: Audience,
    pub event: ServerEvent,
}

impl Delivery {
    pub fn to_all(event: ServerEvent) -> Self {
        Self {
            audience: Audience::All,
            event,
        }
    }

    pub fn to_session(session_id: SessionId, event: ServerEvent) -> Self {
        Self {
            audience: Audience::Only(session_id),
            event,
        }
    }

    pub fn to_all_except(session_id: SessionId, event: ServerEvent) -> Self {
        Self {
            audience: Audience::AllExcept(session_id),
            event,
        }
    }
}

/// Outbound queue of one connection, carrying encoded frames.
pub type Outbound = mpsc::UnboundedSender<String>;

#[derive(Debug, Default)]
pub struct Broadcaster {
    connections: BTreeMap<SessionId, Outbound>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, session_id: SessionId, outbound: Outbound) {
        self.connections.insert(session_id, outbound);
    }

    /// Dropping the queue lets the connection's writer task finish.
    pub fn unregister(&mut self, session_id: SessionId) -> bool {
        self.connections.remove(&session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Encodes the event once and queues it for every session in the
    /// audience. Returns the number of sessions it was queued for.
    pub fn dispatch(&self, delivery: &Delivery) -> usize {
        let frame = match delivery.event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode {} event: {}", delivery.event.name(), e);
                return 0;
            }
        };

        let mut queued = 0;
        for (session_id, outbound) in &self.connections {
            if !delivery.audience.includes(*session_id) {
                continue;
            }
            // A closed queue means the connection is going away; its
            // disconnect event is already on its way to the hub.
            if outbound.send(frame.clone()).is_err() {
                debug!(
                    "Dropping {} for closing session {}",
                    delivery.event.name(),
                    session_id
                );
                continue;
            }
            queued += 1;
        }
        queued
    }

    pub fn dispatch_all(&self, deliveries: &[Delivery]) {
        for delivery in deliveries {
            self.dispatch(delivery);
        }
    }
}
