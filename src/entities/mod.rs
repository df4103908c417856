//! Entities module - Entità del dominio applicativo
//!
//! Questo modulo contiene le entità che rappresentano i dati persistiti nel database.

pub mod enums;
pub mod group;
pub mod message;

// Re-exports per facilitare l'import
pub use enums::{AttachmentKind, DeleteMode, ScopeKind};
pub use group::Group;
pub use message::{Attachment, Message, RecipientScope, TOMBSTONE};
