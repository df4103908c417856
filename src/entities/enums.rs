//! Enumerazioni - Tipi enumerati utilizzati nelle entità

use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ********************* ENUMERAZIONI UTILI **********************//

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Video,
    Audio,
    File,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Image => "image",
            AttachmentKind::Video => "video",
            AttachmentKind::Audio => "audio",
            AttachmentKind::File => "file",
        }
    }

    /// Deduce il tipo di allegato dal mime type dichiarato dall'upload
    pub fn from_mime(mime_type: &str) -> Self {
        let top_level = mime_type
            .split('/')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match top_level.as_str() {
            "image" => AttachmentKind::Image,
            "video" => AttachmentKind::Video,
            "audio" => AttachmentKind::Audio,
            _ => AttachmentKind::File,
        }
    }
}

impl FromStr for AttachmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(AttachmentKind::Image),
            "video" => Ok(AttachmentKind::Video),
            "audio" => Ok(AttachmentKind::Audio),
            "file" => Ok(AttachmentKind::File),
            other => Err(format!("unknown attachment kind '{}'", other)),
        }
    }
}

/// Forma dello scope di un messaggio, come salvata nella colonna `scope_kind`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Direct,
    Society,
    Group,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Direct => "direct",
            ScopeKind::Society => "society",
            ScopeKind::Group => "group",
        }
    }
}

impl FromStr for ScopeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(ScopeKind::Direct),
            "society" => Ok(ScopeKind::Society),
            "group" => Ok(ScopeKind::Group),
            other => Err(format!("unknown scope kind '{}'", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// Nasconde il messaggio solo a chi lo richiede
    ForMe,
    /// Sostituisce il contenuto con il tombstone per tutti
    ForEveryone,
}
