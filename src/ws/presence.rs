//! Presence Tracker - Unica fonte di verità su chi è online
//!
//! Un utente è online finché ha almeno una sessione attiva. Le mutazioni passano dalla `entry`
//! della DashMap: sono serializzate per chiave (shard) e mai con un lock globale.

use crate::dtos::PresenceDTO;
use crate::ws::session::SessionId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::{debug, info, instrument};

#[derive(Default)]
struct PresenceEntry {
    sessions: HashSet<SessionId>,
    last_seen: Option<DateTime<Utc>>,
}

impl PresenceEntry {
    fn to_dto(&self, user_id: &str) -> PresenceDTO {
        let is_online = !self.sessions.is_empty();
        PresenceDTO {
            user_id: user_id.to_string(),
            is_online,
            last_seen: if is_online { None } else { self.last_seen },
        }
    }
}

pub struct PresenceTracker {
    users: DashMap<String, PresenceEntry>,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceTracker {
    pub fn new() -> Self {
        PresenceTracker {
            users: DashMap::new(),
        }
    }

    /// Registra una sessione. Se è la prima dell'utente restituisce il cambio di stato (online).
    #[cfg(test)]
    pub fn connect(&self, user_id: &str, session_id: SessionId) -> Option<PresenceDTO> {
        let mut change = None;
        self.connect_with(user_id, session_id, |dto| change = Some(dto));
        change
    }

    /// Come `connect`, ma `notify` viene chiamata mentre la chiave dell'utente è ancora bloccata:
    /// le notifiche di uno stesso utente escono nello stesso ordine delle transizioni.
    #[instrument(skip(self, notify))]
    pub fn connect_with<F: FnOnce(PresenceDTO)>(
        &self,
        user_id: &str,
        session_id: SessionId,
        notify: F,
    ) {
        let mut entry = self.users.entry(user_id.to_string()).or_default();
        let was_online = !entry.sessions.is_empty();
        entry.sessions.insert(session_id);
        debug!(sessions = entry.sessions.len(), "Session registered");

        if !was_online {
            info!("User is now online");
            notify(entry.to_dto(user_id));
        }
    }

    /// Rimuove una sessione. Se non ne restano, l'utente passa offline con `last_seen = now`.
    /// Una sessione sconosciuta (o già rimossa) non produce effetti.
    #[cfg(test)]
    pub fn disconnect(&self, user_id: &str, session_id: SessionId) -> Option<PresenceDTO> {
        let mut change = None;
        self.disconnect_with(user_id, session_id, |dto| change = Some(dto));
        change
    }

    #[instrument(skip(self, notify))]
    pub fn disconnect_with<F: FnOnce(PresenceDTO)>(
        &self,
        user_id: &str,
        session_id: SessionId,
        notify: F,
    ) {
        let Some(mut entry) = self.users.get_mut(user_id) else {
            debug!("Disconnect for unknown user ignored");
            return;
        };
        if !entry.sessions.remove(&session_id) {
            debug!("Disconnect for unknown session ignored");
            return;
        }

        if entry.sessions.is_empty() {
            entry.last_seen = Some(Utc::now());
            info!("User is now offline");
            notify(entry.to_dto(user_id));
        } else {
            debug!(sessions = entry.sessions.len(), "User still online on other sessions");
        }
    }

    /// Stato completo, usato per inizializzare un client appena connesso
    pub fn snapshot(&self) -> Vec<PresenceDTO> {
        let mut all: Vec<PresenceDTO> = self
            .users
            .iter()
            .map(|entry| entry.value().to_dto(entry.key()))
            .collect();
        all.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        all
    }

    #[cfg(test)]
    pub fn get(&self, user_id: &str) -> Option<PresenceDTO> {
        self.users.get(user_id).map(|entry| entry.to_dto(user_id))
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.users
            .get(user_id)
            .is_some_and(|entry| !entry.sessions.is_empty())
    }

    pub fn session_count(&self, user_id: &str) -> usize {
        self.users
            .get(user_id)
            .map(|entry| entry.sessions.len())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn online_count(&self) -> usize {
        self.users
            .iter()
            .filter(|entry| !entry.sessions.is_empty())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn online_while_at_least_one_session() {
        let tracker = PresenceTracker::new();

        let change = tracker.connect("u", 1).expect("first session goes online");
        assert!(change.is_online);
        assert!(tracker.connect("u", 2).is_none(), "second session is not a transition");
        assert!(tracker.is_online("u"));

        assert!(tracker.disconnect("u", 1).is_none());
        assert!(tracker.is_online("u"));

        let before = Utc::now();
        let change = tracker.disconnect("u", 2).expect("last session goes offline");
        assert!(!change.is_online);
        assert!(!tracker.is_online("u"));
        let last_seen = tracker.get("u").unwrap().last_seen.expect("last seen stamped");
        assert!(last_seen >= before);
        assert_eq!(change.last_seen, Some(last_seen));
    }

    #[test]
    fn repeated_disconnect_is_a_no_op() {
        let tracker = PresenceTracker::new();
        tracker.connect("u", 1);
        assert!(tracker.disconnect("u", 1).is_some());
        assert!(tracker.disconnect("u", 1).is_none());
        assert!(tracker.disconnect("nobody", 9).is_none());
        assert!(!tracker.is_online("u"));
    }

    #[test]
    fn reconnect_clears_last_seen_in_view() {
        let tracker = PresenceTracker::new();
        tracker.connect("u", 1);
        tracker.disconnect("u", 1);
        let change = tracker.connect("u", 2).unwrap();
        assert!(change.is_online);
        assert_eq!(change.last_seen, None);
    }

    #[test]
    fn snapshot_lists_every_known_user() {
        let tracker = PresenceTracker::new();
        tracker.connect("b", 1);
        tracker.connect("a", 2);
        tracker.disconnect("a", 2);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].user_id, "a");
        assert!(!snapshot[0].is_online);
        assert!(snapshot[0].last_seen.is_some());
        assert!(snapshot[1].is_online);
        assert_eq!(tracker.online_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sessions_of_same_user_stay_consistent() {
        let tracker = Arc::new(PresenceTracker::new());
        let mut handles = Vec::new();
        for session in 0..64u64 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                tracker.connect("u", session);
                tokio::task::yield_now().await;
                if session % 2 == 0 {
                    tracker.disconnect("u", session);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(tracker.session_count("u"), 32);
        assert!(tracker.is_online("u"));
    }
}
