//! GroupRepository - Repository per i gruppi buzz

use super::{Create, Read, from_millis, now_millis};
use crate::entities::Group;
use sqlx::{Error, FromRow, SqlitePool};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};

/// Dati per creare un gruppo; `members` include già il creatore
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    pub society_id: String,
    pub created_by: String,
    pub members: BTreeSet<String>,
}

#[derive(FromRow)]
struct GroupRow {
    group_id: i64,
    name: String,
    society_id: String,
    created_by: String,
    created_at: i64,
}

// GROUP REPO
pub struct GroupRepository {
    connection_pool: SqlitePool,
}

impl GroupRepository {
    pub fn new(connection_pool: SqlitePool) -> Self {
        Self { connection_pool }
    }

    async fn members_of(&self, group_id: i64) -> Result<BTreeSet<String>, Error> {
        let members: Vec<String> = sqlx::query_scalar(
            "SELECT user_id FROM buzz_group_members WHERE group_id = ?",
        )
        .bind(group_id)
        .fetch_all(&self.connection_pool)
        .await?;
        Ok(members.into_iter().collect())
    }

    fn into_group(row: GroupRow, members: BTreeSet<String>) -> Result<Group, Error> {
        Ok(Group {
            group_id: row.group_id,
            name: row.name,
            society_id: row.society_id,
            created_by: row.created_by,
            created_at: from_millis(row.created_at)?,
            members,
        })
    }

    /// Tutti i gruppi di una society, con i rispettivi membri
    #[instrument(skip(self))]
    pub async fn find_many_by_society(&self, society_id: &str) -> Result<Vec<Group>, Error> {
        let rows: Vec<GroupRow> = sqlx::query_as(
            r#"
            SELECT group_id, name, society_id, created_by, created_at
            FROM buzz_groups
            WHERE society_id = ?
            ORDER BY created_at ASC, group_id ASC
            "#,
        )
        .bind(society_id)
        .fetch_all(&self.connection_pool)
        .await?;

        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let members = self.members_of(row.group_id).await?;
            groups.push(Self::into_group(row, members)?);
        }

        debug!(count = groups.len(), "Groups loaded for society");
        Ok(groups)
    }

    /// Verifica se l'utente è membro del gruppo
    pub async fn is_member(&self, group_id: i64, user_id: &str) -> Result<bool, Error> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM buzz_group_members WHERE group_id = ? AND user_id = ?",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&self.connection_pool)
        .await?;
        Ok(found.is_some())
    }
}

impl Create<Group, NewGroup> for GroupRepository {
    async fn create(&self, data: &NewGroup) -> Result<Group, Error> {
        // gruppo e membri nella stessa transazione
        let mut tx = self.connection_pool.begin().await?;
        let created_at = now_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO buzz_groups (name, society_id, created_by, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&data.name)
        .bind(&data.society_id)
        .bind(&data.created_by)
        .bind(created_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;
        let group_id = result.last_insert_rowid();

        for member in &data.members {
            sqlx::query("INSERT OR IGNORE INTO buzz_group_members (group_id, user_id) VALUES (?, ?)")
                .bind(group_id)
                .bind(member)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(group_id, members = data.members.len(), "Group created");

        Ok(Group {
            group_id,
            name: data.name.clone(),
            society_id: data.society_id.clone(),
            created_by: data.created_by.clone(),
            created_at,
            members: data.members.clone(),
        })
    }
}

impl Read<Group, i64> for GroupRepository {
    async fn read(&self, id: &i64) -> Result<Option<Group>, Error> {
        let row: Option<GroupRow> = sqlx::query_as(
            r#"
            SELECT group_id, name, society_id, created_by, created_at
            FROM buzz_groups
            WHERE group_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.connection_pool)
        .await?;

        match row {
            Some(row) => {
                let members = self.members_of(row.group_id).await?;
                Ok(Some(Self::into_group(row, members)?))
            }
            None => Ok(None),
        }
    }
}
