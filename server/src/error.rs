//! Why an inbound event was dropped.
//!
//! No rejection is fatal; every one is a terminal drop. Only two policy
//! rejections are signaled back to the sender, see [`Rejection::notice`].

use crate::rate_limiter::RateLimited;
use shared::{ServerEvent, SessionId, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Rejection {
    #[error("invalid payload: {0}")]
    Validation(#[from] ValidationError),
    #[error("policy: {0}")]
    Policy(#[from] PolicyRejection),
    #[error("rate limited: {0}")]
    RateLimited(#[from] RateLimited),
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolViolation),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyRejection {
    #[error("username {0:?} is not allowed")]
    InvalidUsername(String),
    #[error("username {0:?} is already taken")]
    UsernameTaken(String),
    #[error("rename to {0:?} refused")]
    RenameRefused(String),
    #[error("chat message failed moderation")]
    ProfaneMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("session {0} is not connected")]
    UnknownSession(SessionId),
    #[error("session {0} already has a player")]
    AlreadyRegistered(SessionId),
    #[error("session {0} has no player")]
    NotRegistered(SessionId),
}

impl Rejection {
    /// Event to send back to the sender, if this rejection is signaled.
    pub fn notice(&self) -> Option<ServerEvent> {
        match self {
            Rejection::Policy(PolicyRejection::InvalidUsername(_)) => {
                Some(ServerEvent::InvalidUsername)
            }
            Rejection::Policy(PolicyRejection::UsernameTaken(_)) => {
                Some(ServerEvent::UsernameTaken)
            }
            _ => None,
        }
    }
}
