//! Repositories module - Coordinatore per tutti i repository del progetto
//!
//! Questo modulo organizza i repository in sotto-moduli separati per una migliore manutenibilità.
//! Ogni repository gestisce le operazioni di database per una specifica entità.

// ************************* NOTA SU SQLX ************************* //

/*
   Le query sono scritte con `sqlx::query` / `sqlx::query_as` (controllo a run-time) e le righe
   vengono lette in struct `*Row` con `#[derive(FromRow)]`, poi convertite nelle entities.
   Le date sono salvate come millisecondi UTC (INTEGER): l'ordinamento per `created_at` resta esatto.
   Ogni mutazione dello stato di cancellazione è una singola istruzione SQL (niente
   read-modify-write), così due scritture concorrenti sullo stesso messaggio non si perdono.
*/

// ************************* MODULI REPOSITORY ************************* //

pub mod group;
pub mod message;
pub mod traits;

// Re-esportazione dei trait per facilitare l'import
pub use traits::{Create, Read};

// Re-esportazione delle struct dei repository per facilitare l'import
pub use group::{GroupRepository, NewGroup};
pub use message::MessageRepository;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

/// Apre il pool SQLite e applica le migrations.
///
/// Un database `:memory:` vive quanto la sua connessione: in quel caso il pool usa una sola
/// connessione che non scade mai.
#[instrument(skip(database_url))]
pub async fn init_pool(
    database_url: &str,
    max_connections: u32,
    connection_lifetime: Duration,
) -> Result<SqlitePool, sqlx::Error> {
    let in_memory = database_url.contains(":memory:");

    let mut connect_options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));
    if !in_memory {
        connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .max_lifetime(connection_lifetime)
    };

    let pool = pool_options.connect_with(connect_options).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!(in_memory, "Database pool ready, migrations applied");
    Ok(pool)
}

/// Istante corrente troncato al millisecondo, la stessa precisione salvata a db
pub(crate) fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

pub(crate) fn from_millis(millis: i64) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| sqlx::Error::Protocol(format!("timestamp out of range: {}", millis)))
}
