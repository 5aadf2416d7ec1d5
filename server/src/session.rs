//! Per-connection session record and its lifecycle.
//!
//! ```text
//! Connected --new player--> Active --update position--> Active
//!     |                        |
//!     +------ disconnect ------+--> Disconnected (terminal)
//! ```
//!
//! The record only tracks the lifecycle. The bound player itself lives in the
//! registry and is looked up by session id.

use crate::error::ProtocolViolation;
use shared::SessionId;
use std::net::IpAddr;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No player bound yet.
    Connected,
    /// A player is bound.
    Active,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    /// Client network identity, used as the rate-limit key.
    pub addr: IpAddr,
    pub connected_at: Instant,
    state: SessionState,
}

impl Session {
    pub fn new(id: SessionId, addr: IpAddr) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            state: SessionState::Connected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Fails unless the session is waiting for its player.
    pub fn ensure_unbound(&self) -> Result<(), ProtocolViolation> {
        match self.state {
            SessionState::Connected => Ok(()),
            SessionState::Active => Err(ProtocolViolation::AlreadyRegistered(self.id)),
            SessionState::Disconnected => Err(ProtocolViolation::UnknownSession(self.id)),
        }
    }

    /// Fails unless a player is bound.
    pub fn ensure_active(&self) -> Result<(), ProtocolViolation> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Connected => Err(ProtocolViolation::NotRegistered(self.id)),
            SessionState::Disconnected => Err(ProtocolViolation::UnknownSession(self.id)),
        }
    }

    /// `Connected -> Active`.
    pub fn activate(&mut self) -> Result<(), ProtocolViolation> {
        self.ensure_unbound()?;
        self.state = SessionState::Active;
        Ok(())
    }

    /// Any state `-> Disconnected`. Returns the state it left.
    pub fn close(&mut self) -> SessionState {
        std::mem::replace(&mut self.state, SessionState::Disconnected)
    }
}
