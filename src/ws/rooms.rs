//! Room Router - Stanze di broadcast per il canale live
//!
//! Ogni stanza è un canale `broadcast`: i writer delle sessioni sono i receiver, il delivery
//! coordinator è il sender. Tutti i receiver di una stanza vedono gli eventi nello stesso ordine.

use crate::dtos::ServerEvent;
use crate::ws::BROADCAST_CHANNEL_CAPACITY;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::{debug, info, instrument};

/// Indirizzo logico di una stanza
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    /// Tutte le sessioni identificate (notifiche di presenza)
    Everyone,
    /// Tutte le sessioni di un utente
    User(String),
    /// Tutte le sessioni dei residenti di una society
    Society(String),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Everyone => write!(f, "everyone"),
            Room::User(user_id) => write!(f, "user:{}", user_id),
            Room::Society(society_id) => write!(f, "society:{}", society_id),
        }
    }
}

/// Evento in transito su una stanza.
/// Con `audience` valorizzata solo quegli utenti lo ricevono (messaggi di gruppo).
#[derive(Debug, Clone)]
pub struct Envelope {
    pub event: ServerEvent,
    pub audience: Option<Arc<BTreeSet<String>>>,
}

impl Envelope {
    pub fn new(event: ServerEvent) -> Self {
        Self {
            event,
            audience: None,
        }
    }

    pub fn restricted_to(event: ServerEvent, audience: Arc<BTreeSet<String>>) -> Self {
        Self {
            event,
            audience: Some(audience),
        }
    }

    pub fn admits(&self, user_id: &str) -> bool {
        self.audience
            .as_ref()
            .is_none_or(|members| members.contains(user_id))
    }
}

pub struct RoomRouter {
    channels: DashMap<Room, Sender<Arc<Envelope>>>,
}

impl Default for RoomRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRouter {
    pub fn new() -> Self {
        RoomRouter {
            channels: DashMap::new(),
        }
    }

    /// Iscrive un nuovo receiver alla stanza, creandola se non esiste
    #[instrument(skip(self), fields(room = %room))]
    pub fn join(&self, room: Room) -> Receiver<Arc<Envelope>> {
        self.channels
            .entry(room)
            .or_insert_with(|| {
                info!("Creating broadcast channel for room");
                broadcast::channel::<Arc<Envelope>>(BROADCAST_CHANNEL_CAPACITY).0
            })
            .subscribe()
    }

    pub fn join_user_room(&self, user_id: &str) -> (Room, Receiver<Arc<Envelope>>) {
        let room = Room::User(user_id.to_string());
        (room.clone(), self.join(room))
    }

    pub fn join_society_room(&self, society_id: &str) -> (Room, Receiver<Arc<Envelope>>) {
        let room = Room::Society(society_id.to_string());
        (room.clone(), self.join(room))
    }

    /// Consegna l'evento a tutti i receiver della stanza; restituisce quanti lo hanno ricevuto.
    /// Una stanza senza receiver viene rimossa.
    #[instrument(skip(self, envelope), fields(room = %room))]
    fn emit(&self, room: &Room, envelope: Arc<Envelope>) -> usize {
        // clone del sender: il lock dello shard va rilasciato prima di un eventuale remove
        let Some(tx) = self.channels.get(room).map(|entry| entry.value().clone()) else {
            debug!("Room has no channel, event dropped");
            return 0;
        };

        match tx.send(envelope) {
            Ok(receivers) => {
                debug!(receivers, "Event emitted to room");
                receivers
            }
            Err(_) => {
                debug!("No active receivers, removing room");
                drop(tx);
                self.channels
                    .remove_if(room, |_, sender| sender.receiver_count() == 0);
                0
            }
        }
    }

    /// Rimuove la stanza se nessuna sessione la ascolta più.
    /// Va chiamata dopo aver rilasciato il receiver.
    #[instrument(skip(self), fields(room = %room))]
    pub fn leave(&self, room: &Room) -> bool {
        let removed = self
            .channels
            .remove_if(room, |_, sender| sender.receiver_count() == 0)
            .is_some();
        if removed {
            debug!("Last receiver gone, room removed");
        }
        removed
    }

    pub fn emit_to_user(&self, user_id: &str, event: ServerEvent) -> usize {
        self.emit(&Room::User(user_id.to_string()), Arc::new(Envelope::new(event)))
    }

    pub fn emit_to_society(
        &self,
        society_id: &str,
        event: ServerEvent,
        audience: Option<Arc<BTreeSet<String>>>,
    ) -> usize {
        let envelope = match audience {
            Some(members) => Envelope::restricted_to(event, members),
            None => Envelope::new(event),
        };
        self.emit(&Room::Society(society_id.to_string()), Arc::new(envelope))
    }

    pub fn emit_to_everyone(&self, event: ServerEvent) -> usize {
        self.emit(&Room::Everyone, Arc::new(Envelope::new(event)))
    }

    pub fn room_count(&self) -> usize {
        self.channels.len()
    }
}
