//! Session - Stato di una singola connessione live
//!
//! Connecting -> Identified -> Active -> Disconnected.
//! `Disconnected` è terminale e può essere raggiunto da qualsiasi stato.

use crate::core::{AppError, CurrentUser};
use crate::dtos::ServerEvent;
use crate::ws::rooms::{Envelope, Room};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast::Receiver;

pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_session_id() -> SessionId {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Segnali dal listener (o dagli handler) verso il task di scrittura della stessa sessione
pub enum InternalSignal {
    Shutdown,
    /// Stanze da ascoltare dopo l'identificazione; `user_id` serve per filtrare l'audience
    Subscribe {
        user_id: String,
        rooms: Vec<(Room, Receiver<Arc<Envelope>>)>,
    },
    /// Evento destinato solo a questa sessione
    Event(ServerEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Connecting,
    Identified(CurrentUser),
    Active(CurrentUser),
    Disconnected,
}

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    state: SessionState,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            state: SessionState::Connecting,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn identity(&self) -> Option<&CurrentUser> {
        match &self.state {
            SessionState::Identified(user) | SessionState::Active(user) => Some(user),
            _ => None,
        }
    }

    pub fn identify(&mut self, user: CurrentUser) -> Result<(), AppError> {
        match self.state {
            SessionState::Connecting => {
                self.state = SessionState::Identified(user);
                Ok(())
            }
            SessionState::Disconnected => Err(AppError::validation("Session is closed")),
            _ => Err(AppError::validation("Session already identified")),
        }
    }

    pub fn activate(&mut self) -> Result<&CurrentUser, AppError> {
        if let SessionState::Identified(user) = &self.state {
            self.state = SessionState::Active(user.clone());
        }
        self.require_active()
    }

    pub fn require_identified(&self) -> Result<&CurrentUser, AppError> {
        self.identity()
            .ok_or_else(|| AppError::unauthorized("Identify first"))
    }

    pub fn require_active(&self) -> Result<&CurrentUser, AppError> {
        match &self.state {
            SessionState::Active(user) => Ok(user),
            _ => Err(AppError::unauthorized("Session is not active")),
        }
    }

    /// Porta la sessione in `Disconnected`. Restituisce l'identità solo la prima volta.
    pub fn disconnect(&mut self) -> Option<CurrentUser> {
        match std::mem::replace(&mut self.state, SessionState::Disconnected) {
            SessionState::Identified(user) | SessionState::Active(user) => Some(user),
            _ => None,
        }
    }
}
