#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Bytes;
use axum_test::TestServer;
use buzz_server::core::{AppError, AppState, CurrentUser, encode_jwt};
use buzz_server::media::MediaStorage;
use buzz_server::repositories::init_pool;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_JWT_SECRET: &str = "ilmiobellissimosegretochevaassolutamentecambiato";

/// Media storage in memoria: registra gli upload e restituisce URL finti
#[derive(Default)]
pub struct MemoryMediaStorage {
    pub uploads: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl MediaStorage for MemoryMediaStorage {
    async fn upload(
        &self,
        bytes: Bytes,
        mime_type: &str,
        file_name: Option<&str>,
    ) -> Result<String, AppError> {
        let mut uploads = self.uploads.lock().expect("uploads lock");
        uploads.push((mime_type.to_string(), bytes.len()));
        Ok(format!(
            "http://media.test/{}-{}",
            uploads.len(),
            file_name.unwrap_or("blob")
        ))
    }
}

/// Media storage sempre irraggiungibile
pub struct FailingMediaStorage;

#[async_trait]
impl MediaStorage for FailingMediaStorage {
    async fn upload(&self, _: Bytes, _: &str, _: Option<&str>) -> Result<String, AppError> {
        Err(AppError::upstream("Media upload failed"))
    }
}

/// Crea un AppState per i test su un database SQLite in memoria
///
/// # Arguments
/// * `media` - Media storage da usare per gli allegati
///
/// # Returns
/// Arc<AppState> configurato con il JWT secret di test
pub async fn create_test_state_with_media(media: Arc<dyn MediaStorage>) -> Arc<AppState> {
    let pool = init_pool("sqlite::memory:", 1, Duration::from_secs(60))
        .await
        .expect("Failed to create test database");
    Arc::new(
        AppState::new(pool, TEST_JWT_SECRET.to_string(), media)
            .with_ws_idle_timeout(Duration::from_secs(10)),
    )
}

pub async fn create_test_state() -> Arc<AppState> {
    create_test_state_with_media(Arc::new(MemoryMediaStorage::default())).await
}

/// Crea un TestServer per i test
///
/// # Arguments
/// * `state` - AppState da utilizzare per il server
///
/// # Returns
/// TestServer configurato e pronto per eseguire richieste
pub fn create_test_server(state: Arc<AppState>) -> TestServer {
    let app = buzz_server::create_router(state);
    TestServer::new(app).expect("Failed to create test server")
}

/// Avvia il server su una porta libera, per i test che usano un vero client WebSocket
pub async fn spawn_test_server(state: Arc<AppState>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("local addr");
    let app = buzz_server::create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server crashed");
    });
    addr
}

pub fn test_user(user_id: &str, society_id: &str) -> CurrentUser {
    CurrentUser {
        user_id: user_id.to_string(),
        society_id: society_id.to_string(),
        display_name: user_id.to_uppercase(),
        is_admin: false,
    }
}

/// Genera un JWT token per testing, valido 24 ore
pub fn create_test_jwt(user_id: &str, society_id: &str) -> String {
    encode_jwt(&test_user(user_id, society_id), TEST_JWT_SECRET).expect("Failed to create JWT")
}

pub fn create_admin_jwt(user_id: &str, society_id: &str) -> String {
    let mut admin = test_user(user_id, society_id);
    admin.is_admin = true;
    encode_jwt(&admin, TEST_JWT_SECRET).expect("Failed to create JWT")
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
