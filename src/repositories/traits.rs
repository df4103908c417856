//! Trait comuni dei repository
//!
//! Solo creazione e lettura per chiave: le altre mutazioni (cancellazioni, seen) sono
//! operazioni di dominio con semantica propria e vivono come metodi del repository.

/// Inserisce una nuova entità; id e timestamp li assegna il database
pub trait Create<Entity, NewData> {
    async fn create(&self, data: &NewData) -> Result<Entity, sqlx::Error>;
}

/// Lettura per chiave primaria.
/// `Ok(None)` quando la riga non esiste: sta al chiamante trasformarlo in `NotFound`.
pub trait Read<Entity, Id> {
    async fn read(&self, id: &Id) -> Result<Option<Entity>, sqlx::Error>;
}
