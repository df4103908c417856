//! DTOs module - Data Transfer Objects
//!
//! Questo modulo contiene tutti i DTOs usati per la comunicazione client-server,
//! sia sulle rotte HTTP sia sul canale WebSocket.
//! I DTOs separano la rappresentazione esterna (API) dalla rappresentazione interna (entities).

pub mod group;
pub mod message;
pub mod presence;
pub mod query;
pub mod ws_event;

// Re-exports per facilitare l'import
pub use group::{CreateGroupDTO, GroupDTO};
pub use message::{MessageDTO, SendMessageDTO, is_valid_identifier};
pub use presence::PresenceDTO;
pub use query::{DeleteQuery, HistoryQuery};
pub use ws_event::{ClientEvent, ServerEvent};
