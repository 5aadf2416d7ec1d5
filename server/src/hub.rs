//! The session hub: owns every piece of shared state and drives the session
//! state machine.
//!
//! All mutation of the registry, presence map and chat log goes through one
//! `&mut Hub`, and the network layer feeds the hub from a single task. That
//! serialisation is what makes registration check-then-set atomic: two
//! sessions racing for the same username are simply handled one after the
//! other.
//!
//! Every handler returns either the deliveries to fan out or a [`Rejection`]
//! describing why the event was dropped. Handlers never partially apply an
//! event; all checks run before the first mutation.

use crate::broadcast::Delivery;
use crate::chat::ChatLog;
use crate::error::{PolicyRejection, ProtocolViolation, Rejection};
use crate::moderation::Moderator;
use crate::presence::PresenceTracker;
use crate::rate_limiter::AdmissionControl;
use crate::registry::{PlayerRegistry, RegistryError};
use crate::session::Session;
use log::{debug, info, warn};
use shared::{ChatMessage, ClientEvent, Player, PositionUpdate, ServerEvent, SessionId};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;

pub type Outcome = Result<Vec<Delivery>, Rejection>;

pub struct Hub {
    seed: f64,
    sessions: HashMap<SessionId, Session>,
    registry: PlayerRegistry,
    presence: PresenceTracker,
    chat_log: ChatLog,
    limits: AdmissionControl,
    moderator: Moderator,
}

impl Hub {
    pub fn new(seed: f64) -> Self {
        Self::with_parts(seed, Moderator::default(), AdmissionControl::default())
    }

    pub fn with_parts(seed: f64, moderator: Moderator, limits: AdmissionControl) -> Self {
        Self {
            seed,
            sessions: HashMap::new(),
            registry: PlayerRegistry::new(),
            presence: PresenceTracker::new(),
            chat_log: ChatLog::new(),
            limits,
            moderator,
        }
    }

    pub fn seed(&self) -> f64 {
        self.seed
    }

    pub fn session(&self, session_id: SessionId) -> Option<&Session> {
        self.sessions.get(&session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn chat_log(&self) -> &ChatLog {
        &self.chat_log
    }

    /// Opens a session. The new connection receives the seed.
    pub fn connect(&mut self, session_id: SessionId, addr: IpAddr) -> Vec<Delivery> {
        if self.sessions.contains_key(&session_id) {
            warn!("Session {} is already connected", session_id);
            return Vec::new();
        }

        info!("A user connected: {} from {}", session_id, addr);
        self.sessions.insert(session_id, Session::new(session_id, addr));
        vec![Delivery::to_session(session_id, ServerEvent::Seed(self.seed))]
    }

    /// Decodes one raw frame and handles it.
    pub fn handle_frame(&mut self, session_id: SessionId, frame: &str, now: Instant) -> Outcome {
        let event = ClientEvent::decode(frame)?;
        self.handle(session_id, event, now)
    }

    pub fn handle(&mut self, session_id: SessionId, event: ClientEvent, now: Instant) -> Outcome {
        debug!("Session {} sent {}", session_id, event.name());
        match event {
            ClientEvent::NewPlayer(player) => self.register(session_id, player),
            ClientEvent::ChatMessage(text) => self.chat(session_id, text, now),
            ClientEvent::UpdatePosition(player) => self.update_position(session_id, player, now),
        }
    }

    /// Closes a session and releases its player. Always announces the
    /// departure, even if no player was ever bound.
    pub fn disconnect(&mut self, session_id: SessionId) -> Vec<Delivery> {
        let Some(mut session) = self.sessions.remove(&session_id) else {
            debug!("Ignoring disconnect of unknown session {}", session_id);
            return Vec::new();
        };

        let previous = session.close();
        self.registry.remove(session_id);
        self.presence.remove(session_id);
        info!(
            "A user disconnected: {} after {:?} (was {:?})",
            session_id,
            session.connected_at.elapsed(),
            previous
        );

        let mut deliveries = vec![Delivery::to_all(ServerEvent::PlayerDisconnected(
            session_id,
        ))];
        deliveries.extend(self.membership_deliveries());
        deliveries
    }

    fn register(&mut self, session_id: SessionId, player: Player) -> Outcome {
        let session = self
            .sessions
            .get(&session_id)
            .ok_or(ProtocolViolation::UnknownSession(session_id))?;

        if !self
            .moderator
            .screen_username(&player.username)
            .is_admissible()
        {
            return Err(PolicyRejection::InvalidUsername(player.username).into());
        }
        session.ensure_unbound()?;

        let username = player.username.clone();
        self.registry
            .bind(session_id, player)
            .map_err(|e| registry_rejection(session_id, e))?;
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.activate()?;
        }
        self.presence.mark_online(session_id, &username);

        let mut deliveries = self.membership_deliveries().to_vec();
        deliveries.push(Delivery::to_session(
            session_id,
            ServerEvent::UsernameChosen(username),
        ));
        Ok(deliveries)
    }

    fn update_position(&mut self, session_id: SessionId, player: Player, now: Instant) -> Outcome {
        let session = self
            .sessions
            .get(&session_id)
            .ok_or(ProtocolViolation::UnknownSession(session_id))?;

        self.limits.admit_position(session.addr, now)?;
        session.ensure_active()?;

        let renamed = self
            .registry
            .get(session_id)
            .ok_or(ProtocolViolation::NotRegistered(session_id))?
            .username
            != player.username;
        if renamed
            && !self
                .moderator
                .screen_username(&player.username)
                .is_admissible()
        {
            return Err(PolicyRejection::RenameRefused(player.username).into());
        }

        self.registry
            .update(session_id, player.clone())
            .map_err(|e| match e {
                RegistryError::UsernameTaken(name) => {
                    Rejection::from(PolicyRejection::RenameRefused(name))
                }
                other => registry_rejection(session_id, other),
            })?;
        if renamed {
            self.presence.rename(session_id, &player.username);
        }

        Ok(vec![Delivery::to_all_except(
            session_id,
            ServerEvent::UpdatePosition(PositionUpdate {
                id: session_id,
                player,
            }),
        )])
    }

    fn chat(&mut self, session_id: SessionId, text: String, now: Instant) -> Outcome {
        let session = self
            .sessions
            .get(&session_id)
            .ok_or(ProtocolViolation::UnknownSession(session_id))?;

        self.limits.admit_chat(session.addr, now)?;
        session.ensure_active()?;

        let username = self
            .registry
            .get(session_id)
            .map(|player| player.username.clone())
            .ok_or(ProtocolViolation::NotRegistered(session_id))?;

        if !self.moderator.screen_text(&text).is_admissible() {
            return Err(PolicyRejection::ProfaneMessage.into());
        }

        let message = ChatMessage::new(username, text);
        self.chat_log.append(message.clone());
        Ok(vec![Delivery::to_all(ServerEvent::ChatMessage(message))])
    }

    /// Full presence map and roster, re-sent on every join and leave.
    fn membership_deliveries(&self) -> [Delivery; 2] {
        [
            Delivery::to_all(ServerEvent::UserPresence(self.presence.snapshot())),
            Delivery::to_all(ServerEvent::PlayerList(self.registry.roster())),
        ]
    }
}

fn registry_rejection(session_id: SessionId, error: RegistryError) -> Rejection {
    match error {
        RegistryError::AlreadyBound(_) => ProtocolViolation::AlreadyRegistered(session_id).into(),
        RegistryError::NotBound(_) => ProtocolViolation::NotRegistered(session_id).into(),
        RegistryError::UsernameTaken(name) => PolicyRejection::UsernameTaken(name).into(),
    }
}
