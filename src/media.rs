//! Media Storage - Collaboratore esterno per gli allegati
//!
//! I byte vengono caricati prima di creare il messaggio: il messaggio conserva solo l'URL.

use crate::core::AppError;
use async_trait::async_trait;
use axum::body::Bytes;
use std::path::PathBuf;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Uploads attachment bytes and returns the public URL they are reachable at.
#[async_trait]
pub trait MediaStorage: Send + Sync {
    async fn upload(
        &self,
        bytes: Bytes,
        mime_type: &str,
        file_name: Option<&str>,
    ) -> Result<String, AppError>;
}

/// Salva gli allegati su disco; la directory viene servita sotto `public_url`
pub struct LocalMediaStorage {
    base_path: PathBuf,
    public_url: String,
}

impl LocalMediaStorage {
    pub async fn new(base_path: PathBuf, public_url: String) -> Result<Self, AppError> {
        tokio::fs::create_dir_all(&base_path).await.map_err(|e| {
            error!("Failed to create media directory: {:?}", e);
            AppError::service_unavailable("Media storage unavailable").with_details(e.to_string())
        })?;
        Ok(Self {
            base_path,
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Estensione del file originale, solo se breve e alfanumerica
fn extension_of(file_name: Option<&str>) -> Option<String> {
    let (_, ext) = file_name?.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[async_trait]
impl MediaStorage for LocalMediaStorage {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(
        &self,
        bytes: Bytes,
        mime_type: &str,
        file_name: Option<&str>,
    ) -> Result<String, AppError> {
        let stored_name = match extension_of(file_name) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };

        tokio::fs::write(self.base_path.join(&stored_name), &bytes)
            .await
            .map_err(|e| {
                error!("Failed to store attachment: {:?}", e);
                AppError::upstream("Media upload failed").with_details(e.to_string())
            })?;

        info!(file = %stored_name, "Attachment stored");
        Ok(format!("{}/{}", self.public_url, stored_name))
    }
}
