//! SQLite repository
//!
//! Rows hold the JSON payload of each record plus the key columns the
//! queries filter on. Timestamps are RFC 3339 text; assignment creation
//! times use fixed microsecond precision so they sort as strings.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use sigmap_common::models::{Equipment, Signature, SignatureAnalytics};
use sigmap_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use super::{sync_match, AssignmentFilter, SignatureRepository};
use crate::assignment::types::AutoAssignmentResult;

/// Open (creating if needed) the database and make sure the tables exist
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create tables and indexes if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS equipment (
            id TEXT PRIMARY KEY,
            equipment_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS signatures (
            id TEXT PRIMARY KEY,
            equipment_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS signature_analytics (
            signature_id TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assignments (
            id TEXT PRIMARY KEY,
            equipment_id TEXT NOT NULL,
            signature_id TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            payload TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_assignments_equipment ON assignments(equipment_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_assignments_signature ON assignments(signature_id)")
        .execute(pool)
        .await?;

    info!("Database tables initialized (equipment, signatures, signature_analytics, assignments)");
    Ok(())
}

fn decode<T: DeserializeOwned>(row: &SqliteRow) -> Result<T> {
    let payload: String = row.try_get("payload")?;
    Ok(serde_json::from_str(&payload)?)
}

fn decode_all<T: DeserializeOwned>(rows: &[SqliteRow]) -> Result<Vec<T>> {
    rows.iter().map(decode).collect()
}

async fn load_signature(tx: &mut Transaction<'_, Sqlite>, id: &str) -> Result<Option<Signature>> {
    let row = sqlx::query("SELECT payload FROM signatures WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
    row.as_ref().map(decode).transpose()
}

async fn store_signature(tx: &mut Transaction<'_, Sqlite>, signature: &Signature) -> Result<()> {
    let payload = serde_json::to_string(signature)?;
    sqlx::query("UPDATE signatures SET equipment_type = ?, payload = ?, updated_at = ? WHERE id = ?")
        .bind(&signature.equipment_type)
        .bind(&payload)
        .bind(Utc::now().to_rfc3339())
        .bind(&signature.id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Repository over a shared `SqlitePool`
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Wrap an existing pool; tables must already exist
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(db_path: &Path) -> Result<Self> {
        Ok(Self::new(init_database_pool(db_path).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SignatureRepository for SqliteRepository {
    async fn save_equipment(&self, equipment: &Equipment) -> Result<()> {
        let payload = serde_json::to_string(equipment)?;
        sqlx::query(
            r#"
            INSERT INTO equipment (id, equipment_type, payload, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                equipment_type = excluded.equipment_type,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&equipment.id)
        .bind(&equipment.equipment_type)
        .bind(&payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_equipment(&self, id: &str) -> Result<Option<Equipment>> {
        let row = sqlx::query("SELECT payload FROM equipment WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode).transpose()
    }

    async fn list_equipment(&self) -> Result<Vec<Equipment>> {
        let rows = sqlx::query("SELECT payload FROM equipment ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        decode_all(&rows)
    }

    async fn delete_equipment(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM equipment WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let linked: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT signature_id FROM assignments WHERE equipment_id = ? AND status = 'assigned'",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        for signature_id in &linked {
            if let Some(mut signature) = load_signature(&mut tx, signature_id).await? {
                signature.remove_match(id);
                store_signature(&mut tx, &signature).await?;
            }
        }
        let assignments = sqlx::query("DELETE FROM assignments WHERE equipment_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        debug!(equipment_id = %id, assignments, "Deleted equipment with cascade");
        Ok(true)
    }

    async fn create_signature(&self, signature: &Signature) -> Result<()> {
        let stored = Signature {
            matching_equipment_ids: Vec::new(),
            ..signature.clone()
        };
        let payload = serde_json::to_string(&stored)?;
        let result = sqlx::query(
            r#"
            INSERT INTO signatures (id, equipment_type, payload, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&signature.id)
        .bind(&signature.equipment_type)
        .bind(&payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Conflict(format!(
                "signature {} already exists",
                signature.id
            )));
        }
        Ok(())
    }

    async fn update_signature(&self, signature: &Signature) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let existing = load_signature(&mut tx, &signature.id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("signature {}", signature.id)))?;

        let updated = Signature {
            matching_equipment_ids: existing.matching_equipment_ids,
            ..signature.clone()
        };
        store_signature(&mut tx, &updated).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_signature(&self, id: &str) -> Result<Option<Signature>> {
        let row = sqlx::query("SELECT payload FROM signatures WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode).transpose()
    }

    async fn list_signatures(&self) -> Result<Vec<Signature>> {
        let rows = sqlx::query("SELECT payload FROM signatures ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        decode_all(&rows)
    }

    async fn delete_signature(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM signatures WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM signature_analytics WHERE signature_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let assignments = sqlx::query("DELETE FROM assignments WHERE signature_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        debug!(signature_id = %id, assignments, "Deleted signature with cascade");
        Ok(true)
    }

    async fn get_analytics(&self, signature_id: &str) -> Result<Option<SignatureAnalytics>> {
        let row = sqlx::query("SELECT payload FROM signature_analytics WHERE signature_id = ?")
            .bind(signature_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode).transpose()
    }

    async fn list_analytics(&self) -> Result<Vec<SignatureAnalytics>> {
        let rows = sqlx::query("SELECT payload FROM signature_analytics ORDER BY signature_id")
            .fetch_all(&self.pool)
            .await?;
        decode_all(&rows)
    }

    async fn save_analytics(&self, analytics: &SignatureAnalytics) -> Result<()> {
        let payload = serde_json::to_string(analytics)?;
        sqlx::query(
            r#"
            INSERT INTO signature_analytics (signature_id, payload, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(signature_id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&analytics.signature_id)
        .bind(&payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_assignment(&self, assignment: &AutoAssignmentResult) -> Result<()> {
        let payload = serde_json::to_string(assignment)?;
        let id = assignment.id.to_string();
        let mut tx = self.pool.begin().await?;

        let mut signature = load_signature(&mut tx, &assignment.signature_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("signature {}", assignment.signature_id)))?;

        let other_active: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM assignments
            WHERE equipment_id = ? AND signature_id = ? AND status = 'assigned' AND id != ?
            "#,
        )
        .bind(&assignment.equipment_id)
        .bind(&assignment.signature_id)
        .bind(&id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO assignments (id, equipment_id, signature_id, status, created_at, payload)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                payload = excluded.payload
            "#,
        )
        .bind(&id)
        .bind(&assignment.equipment_id)
        .bind(&assignment.signature_id)
        .bind(assignment.status.as_str())
        .bind(assignment.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true))
        .bind(&payload)
        .execute(&mut *tx)
        .await?;

        sync_match(&mut signature, assignment, other_active > 0);
        store_signature(&mut tx, &signature).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_assignment(&self, id: Uuid) -> Result<Option<AutoAssignmentResult>> {
        let row = sqlx::query("SELECT payload FROM assignments WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode).transpose()
    }

    async fn list_assignments(&self, filter: &AssignmentFilter) -> Result<Vec<AutoAssignmentResult>> {
        let rows = sqlx::query(
            r#"
            SELECT payload FROM assignments
            WHERE (?1 IS NULL OR equipment_id = ?1)
              AND (?2 IS NULL OR signature_id = ?2)
              AND (?3 IS NULL OR status = ?3)
            ORDER BY created_at, id
            "#,
        )
        .bind(filter.equipment_id.as_deref())
        .bind(filter.signature_id.as_deref())
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        decode_all(&rows)
    }

    async fn reset(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in ["assignments", "signature_analytics", "signatures", "equipment"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        info!("Repository reset");
        Ok(())
    }
}
