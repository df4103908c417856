use dotenv::dotenv;
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

const DEFAULT_JWT_SECRET: &str = "un segreto meno bello";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub max_connections: u32,
    pub connection_lifetime_secs: u64,
    /// Cartella in cui il media storage locale salva gli allegati
    pub media_dir: PathBuf,
    /// Prefisso pubblico degli URL restituiti dopo un upload
    pub media_public_url: String,
    pub max_upload_bytes: usize,
    pub ws_idle_timeout_secs: u64,
    pub app_env: String,
}

impl Config {
    /// Carica la configurazione dalle variabili d'ambiente
    /// Chiama dotenv() automaticamente
    pub fn from_env() -> Result<Self, String> {
        dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://buzz.db".to_string());

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            warn!("JWT_SECRET not set, using default (not secure for production!)");
            DEFAULT_JWT_SECRET.to_string()
        });

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| "Invalid SERVER_PORT: must be a number between 0-65535".to_string())?;

        let max_connections = env::var("MAX_DB_CONNECTIONS")
            .unwrap_or_else(|_| "16".to_string())
            .parse::<u32>()
            .map_err(|_| "Invalid MAX_DB_CONNECTIONS: must be a positive number".to_string())?;

        let connection_lifetime_secs = env::var("DB_CONNECTION_LIFETIME_SECS")
            .unwrap_or_else(|_| "1800".to_string())
            .parse::<u64>()
            .map_err(|_| {
                "Invalid DB_CONNECTION_LIFETIME_SECS: must be a positive number".to_string()
            })?;

        let media_dir = PathBuf::from(env::var("MEDIA_DIR").unwrap_or_else(|_| "media".to_string()));

        let media_public_url = env::var("MEDIA_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}/media", server_host, server_port));

        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| (25 * 1024 * 1024).to_string())
            .parse::<usize>()
            .map_err(|_| "Invalid MAX_UPLOAD_BYTES: must be a positive number".to_string())?;

        let ws_idle_timeout_secs = Self::parse_idle_timeout(
            &env::var("WS_IDLE_TIMEOUT_SECS").unwrap_or_else(|_| "300".to_string()),
        )?;

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        Ok(Config {
            database_url,
            jwt_secret,
            server_host,
            server_port,
            max_connections,
            connection_lifetime_secs,
            media_dir,
            media_public_url,
            max_upload_bytes,
            ws_idle_timeout_secs,
            app_env,
        })
    }

    /// Logga la configurazione (nascondendo i segreti)
    pub fn print_info(&self) {
        info!(
            environment = %self.app_env,
            address = %format!("{}:{}", self.server_host, self.server_port),
            database = %Self::mask_url(&self.database_url),
            max_db_connections = self.max_connections,
            connection_lifetime_secs = self.connection_lifetime_secs,
            media_dir = %self.media_dir.display(),
            media_public_url = %self.media_public_url,
            max_upload_bytes = self.max_upload_bytes,
            ws_idle_timeout_secs = self.ws_idle_timeout_secs,
            "Server configuration loaded"
        );
        if self.jwt_secret == DEFAULT_JWT_SECRET {
            warn!("JWT secret: USING DEFAULT (INSECURE!)");
        }
    }

    // con 0 ogni sessione verrebbe chiusa subito
    fn parse_idle_timeout(raw: &str) -> Result<u64, String> {
        match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(secs),
            _ => Err("Invalid WS_IDLE_TIMEOUT_SECS: must be a positive number".to_string()),
        }
    }

    /// Maschera le credenziali dell'URL del database per il logging
    fn mask_url(url: &str) -> String {
        if let Some(at_pos) = url.find('@') {
            if let Some(scheme_end) = url.find("://") {
                let scheme = &url[..scheme_end + 3];
                let after_at = &url[at_pos..];
                return format!("{}***{}", scheme, after_at);
            }
        }
        // sqlite: nessuna credenziale da nascondere
        if url.starts_with("sqlite:") {
            return url.to_string();
        }
        "***".to_string()
    }
}
