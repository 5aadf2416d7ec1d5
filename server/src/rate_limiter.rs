//! Fixed-window admission control keyed by client network identity.
//!
//! Identity is the peer IP address rather than the session, so a client that
//! reconnects from the same address keeps its remaining budget.

use log::warn;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const CHAT_WINDOW: Duration = Duration::from_secs(1);
pub const CHAT_MAX_EVENTS: u32 = 3;
pub const POSITION_WINDOW: Duration = Duration::from_secs(5);
pub const POSITION_MAX_EVENTS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Chat,
    Position,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKind::Chat => write!(f, "chat"),
            LimitKind::Position => write!(f, "update position"),
        }
    }
}

/// An event was refused because a window is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} limit reached")]
pub struct RateLimited {
    pub kind: LimitKind,
    /// True for the first refusal in the current window.
    pub first_breach: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Limited { first_breach: bool },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    opened: Instant,
    used: u32,
    breach_reported: bool,
}

impl Window {
    fn open(now: Instant) -> Self {
        Self {
            opened: now,
            used: 0,
            breach_reported: false,
        }
    }
}

/// Counts events per identity inside a fixed window. A window opens on the
/// first event after the previous one expired.
pub struct FixedWindowLimiter {
    usage: HashMap<IpAddr, Window>,
    window: Duration,
    max_events: u32,
    prune_counter: u8,
}

impl FixedWindowLimiter {
    pub fn new(window: Duration, max_events: u32) -> Self {
        debug_assert!(window != Duration::ZERO);
        Self {
            usage: HashMap::new(),
            window,
            max_events,
            prune_counter: 0,
        }
    }

    /// Records an attempt by `ip` at `now`.
    pub fn check(&mut self, ip: IpAddr, now: Instant) -> Admission {
        let window = self.window;
        let max_events = self.max_events;

        let entry = self.usage.entry(ip).or_insert_with(|| Window::open(now));
        if now.duration_since(entry.opened) >= window {
            *entry = Window::open(now);
        }

        let admission = if entry.used < max_events {
            entry.used += 1;
            Admission::Admitted
        } else {
            let first_breach = !entry.breach_reported;
            entry.breach_reported = true;
            Admission::Limited { first_breach }
        };

        self.prune_counter = self.prune_counter.wrapping_add(1);
        if self.prune_counter == 0 {
            self.prune(now);
        }

        admission
    }

    /// Drops identities whose window has expired.
    pub fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.usage
            .retain(|_, entry| now.duration_since(entry.opened) < window);
    }

    pub fn len(&self) -> usize {
        self.usage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usage.is_empty()
    }
}

/// The two limiters and the order in which events consult them.
pub struct AdmissionControl {
    chat: FixedWindowLimiter,
    position: FixedWindowLimiter,
}

impl Default for AdmissionControl {
    fn default() -> Self {
        Self::new(
            FixedWindowLimiter::new(CHAT_WINDOW, CHAT_MAX_EVENTS),
            FixedWindowLimiter::new(POSITION_WINDOW, POSITION_MAX_EVENTS),
        )
    }
}

impl AdmissionControl {
    pub fn new(chat: FixedWindowLimiter, position: FixedWindowLimiter) -> Self {
        Self { chat, position }
    }

    /// Chat events pass the chat window and then the position window. The
    /// position window is only consulted (and charged) once the chat window
    /// admitted the event. A chat refused by the position window still uses
    /// up its chat slot.
    pub fn admit_chat(&mut self, ip: IpAddr, now: Instant) -> Result<(), RateLimited> {
        Self::gate(&mut self.chat, LimitKind::Chat, ip, now)?;
        Self::gate(&mut self.position, LimitKind::Position, ip, now)
    }

    pub fn admit_position(&mut self, ip: IpAddr, now: Instant) -> Result<(), RateLimited> {
        Self::gate(&mut self.position, LimitKind::Position, ip, now)
    }

    fn gate(
        limiter: &mut FixedWindowLimiter,
        kind: LimitKind,
        ip: IpAddr,
        now: Instant,
    ) -> Result<(), RateLimited> {
        match limiter.check(ip, now) {
            Admission::Admitted => Ok(()),
            Admission::Limited { first_breach } => {
                if first_breach {
                    warn!("IP {} has reached the {} limit", ip, kind);
                }
                Err(RateLimited { kind, first_breach })
            }
        }
    }
}
