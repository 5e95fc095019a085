use sqlx::PgPool;
use uuid::Uuid;

use super::{ClientStore, StorageBackend, StorageError, TrainingStore};
use crate::types::{ClientRecord, Difficulty, NewClient, TrainingMode, TrainingPlan, TrainingRecord};

/// Postgres tier over the `clients` and `trainings` tables.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Row type for sqlx deserialization from the `clients` table.
#[derive(sqlx::FromRow)]
struct ClientRow {
    id: Uuid,
    name: String,
    age: Option<i32>,
    weight: Option<f64>,
    height: Option<f64>,
    goals: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ClientRow> for ClientRecord {
    fn from(row: ClientRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            age: row.age.and_then(|a| u32::try_from(a).ok()),
            weight: row.weight,
            height: row.height,
            goals: row.goals,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TrainingRow {
    id: Uuid,
    difficulty: String,
    mode: String,
    participant_count: i32,
    plan: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<TrainingRow> for TrainingRecord {
    type Error = serde_json::Error;

    fn try_from(row: TrainingRow) -> Result<Self, Self::Error> {
        let plan: TrainingPlan = serde_json::from_value(row.plan)?;
        Ok(Self {
            id: row.id,
            difficulty: Difficulty::from_db(&row.difficulty).unwrap_or(Difficulty::Medium),
            mode: TrainingMode::from_db(&row.mode).unwrap_or(plan.mode),
            participant_count: u32::try_from(row.participant_count).unwrap_or(1),
            plan,
            created_at: row.created_at,
        })
    }
}

const CLIENT_COLUMNS: &str = "id, name, age, weight, height, goals, created_at";

#[async_trait::async_trait]
impl ClientStore for PgStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<ClientRecord>, StorageError> {
        // strpos avoids escaping LIKE wildcards in user text.
        let row: Option<ClientRow> = sqlx::query_as(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients \
             WHERE strpos(lower(name), lower($1)) > 0 \
             ORDER BY created_at ASC, id ASC LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn create(&self, client: NewClient) -> Result<ClientRecord, StorageError> {
        let age = client.age.and_then(|a| i32::try_from(a).ok());
        let row: ClientRow = sqlx::query_as(&format!(
            "INSERT INTO clients (id, name, age, weight, height, goals, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, now()) RETURNING {CLIENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&client.name)
        .bind(age)
        .bind(client.weight)
        .bind(client.height)
        .bind(&client.goals)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn delete(&self, id: Uuid) -> Result<Option<ClientRecord>, StorageError> {
        let row: Option<ClientRow> = sqlx::query_as(&format!(
            "DELETE FROM clients WHERE id = $1 RETURNING {CLIENT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_all(&self) -> Result<Vec<ClientRecord>, StorageError> {
        let rows: Vec<ClientRow> = sqlx::query_as(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait::async_trait]
impl TrainingStore for PgStore {
    async fn record(&self, record: &TrainingRecord) -> Result<(), StorageError> {
        let plan = serde_json::to_value(&record.plan)?;
        sqlx::query(
            "INSERT INTO trainings (id, difficulty, mode, participant_count, plan, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.id)
        .bind(record.difficulty.as_str())
        .bind(record.mode.as_str())
        .bind(i32::try_from(record.participant_count).unwrap_or(i32::MAX))
        .bind(&plan)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<TrainingRecord>, StorageError> {
        let rows: Vec<TrainingRow> = sqlx::query_as(
            "SELECT id, difficulty, mode, participant_count, plan, created_at \
             FROM trainings ORDER BY created_at DESC LIMIT $1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match TrainingRecord::try_from(row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(%id, error = %e, "skipping unreadable training row"),
            }
        }
        Ok(records)
    }
}

impl StorageBackend for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }
}
