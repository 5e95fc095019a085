pub mod json_file;
pub mod pg;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use uuid::Uuid;

use crate::types::{ClientRecord, NewClient, TrainingRecord};

pub use json_file::JsonFileStore;
pub use pg::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt record file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no storage backend configured")]
    NotConfigured,
}

/// Entity storage for trainees.
#[async_trait::async_trait]
pub trait ClientStore: Send + Sync {
    /// First trainee (in storage order) whose name contains `name`,
    /// compared case-insensitively.
    async fn find_by_name(&self, name: &str) -> Result<Option<ClientRecord>, StorageError>;
    async fn create(&self, client: NewClient) -> Result<ClientRecord, StorageError>;
    async fn delete(&self, id: Uuid) -> Result<Option<ClientRecord>, StorageError>;
    /// All trainees in storage order: oldest first.
    async fn list_all(&self) -> Result<Vec<ClientRecord>, StorageError>;
}

/// History of generated training plans.
#[async_trait::async_trait]
pub trait TrainingStore: Send + Sync {
    async fn record(&self, record: &TrainingRecord) -> Result<(), StorageError>;
    /// Newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<TrainingRecord>, StorageError>;
}

/// One storage tier: both stores behind a single backend.
pub trait StorageBackend: ClientStore + TrainingStore {
    fn name(&self) -> &'static str;
}

/// Case-insensitive containment used by every backend's name lookup.
pub fn matches_name(candidate: &str, query: &str) -> bool {
    candidate.to_lowercase().contains(&query.to_lowercase())
}

type TierFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Ordered storage tiers. Each operation runs against the first tier and
/// falls through to the next one only when a tier errors.
#[derive(Clone, Default)]
pub struct Storage {
    tiers: Vec<Arc<dyn StorageBackend>>,
}

impl Storage {
    pub fn new(tiers: Vec<Arc<dyn StorageBackend>>) -> Self {
        Self { tiers }
    }

    pub fn with_tier(mut self, tier: Arc<dyn StorageBackend>) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub async fn find_client(&self, name: &str) -> Result<Option<ClientRecord>, StorageError> {
        self.first_ok("find_client", |tier| tier.find_by_name(name)).await
    }

    pub async fn create_client(&self, client: &NewClient) -> Result<ClientRecord, StorageError> {
        self.first_ok("create_client", |tier| tier.create(client.clone())).await
    }

    /// Resolve `name` and delete the match. Lookup and delete run on the same
    /// tier so an id from one backend is never sent to another.
    pub async fn delete_client_by_name(&self, name: &str) -> Result<Option<ClientRecord>, StorageError> {
        self.first_ok("delete_client", |tier| {
            Box::pin(async move {
                match tier.find_by_name(name).await? {
                    Some(found) => tier.delete(found.id).await,
                    None => Ok(None),
                }
            })
        })
        .await
    }

    pub async fn list_clients(&self) -> Result<Vec<ClientRecord>, StorageError> {
        self.first_ok("list_clients", |tier| tier.list_all()).await
    }

    pub async fn record_training(&self, record: &TrainingRecord) -> Result<(), StorageError> {
        self.first_ok("record_training", |tier| tier.record(record)).await
    }

    pub async fn recent_trainings(&self, limit: usize) -> Result<Vec<TrainingRecord>, StorageError> {
        self.first_ok("recent_trainings", |tier| tier.recent(limit)).await
    }

    async fn first_ok<'a, T>(
        &'a self,
        op: &'static str,
        call: impl Fn(&'a dyn StorageBackend) -> TierFuture<'a, T>,
    ) -> Result<T, StorageError> {
        let mut last_err = None;
        for tier in &self.tiers {
            match call(tier.as_ref()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(backend = tier.name(), op, error = %e, "storage tier failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(StorageError::NotConfigured))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Difficulty, TrainingMode, TrainingPlan};
    use chrono::Utc;

    /// Backend whose every call fails, standing in for an unreachable database.
    struct Down;

    #[async_trait::async_trait]
    impl ClientStore for Down {
        async fn find_by_name(&self, _: &str) -> Result<Option<ClientRecord>, StorageError> {
            Err(StorageError::Io(std::io::Error::other("down")))
        }
        async fn create(&self, _: NewClient) -> Result<ClientRecord, StorageError> {
            Err(StorageError::Io(std::io::Error::other("down")))
        }
        async fn delete(&self, _: Uuid) -> Result<Option<ClientRecord>, StorageError> {
            Err(StorageError::Io(std::io::Error::other("down")))
        }
        async fn list_all(&self) -> Result<Vec<ClientRecord>, StorageError> {
            Err(StorageError::Io(std::io::Error::other("down")))
        }
    }

    #[async_trait::async_trait]
    impl TrainingStore for Down {
        async fn record(&self, _: &TrainingRecord) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("down")))
        }
        async fn recent(&self, _: usize) -> Result<Vec<TrainingRecord>, StorageError> {
            Err(StorageError::Io(std::io::Error::other("down")))
        }
    }

    impl StorageBackend for Down {
        fn name(&self) -> &'static str {
            "down"
        }
    }

    fn new_client(name: &str) -> NewClient {
        NewClient { name: name.into(), age: Some(30), weight: None, height: None, goals: None }
    }

    #[test]
    fn name_matching_is_case_insensitive_containment() {
        assert!(matches_name("Jan Kowalski", "jan"));
        assert!(matches_name("Jan Kowalski", "KOWAL"));
        assert!(matches_name("Żaneta", "żan"));
        assert!(!matches_name("Jan", "Janek"));
    }

    #[tokio::test]
    async fn no_tiers_reports_not_configured() {
        let storage = Storage::default();
        assert!(matches!(storage.list_clients().await, Err(StorageError::NotConfigured)));
    }

    #[tokio::test]
    async fn all_tiers_down_returns_last_error() {
        let storage = Storage::new(vec![Arc::new(Down), Arc::new(Down)]);
        assert!(matches!(storage.find_client("jan").await, Err(StorageError::Io(_))));
    }

    #[tokio::test]
    async fn failing_primary_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(vec![Arc::new(Down), Arc::new(JsonFileStore::new(dir.path()))]);
        assert_eq!(storage.names(), vec!["down", "json"]);

        let created = storage.create_client(&new_client("Jan Kowalski")).await.unwrap();
        let found = storage.find_client("kowal").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);

        let deleted = storage.delete_client_by_name("jan").await.unwrap().unwrap();
        assert_eq!(deleted.id, created.id);
        assert!(storage.list_clients().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn training_history_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(vec![Arc::new(Down), Arc::new(JsonFileStore::new(dir.path()))]);
        let record = TrainingRecord {
            id: Uuid::new_v4(),
            difficulty: Difficulty::Easy,
            mode: TrainingMode::Common,
            participant_count: 3,
            plan: TrainingPlan {
                warmup: vec![],
                main_part: vec![],
                cooldown: vec![],
                mode: TrainingMode::Common,
                total_duration_minutes: None,
            },
            created_at: Utc::now(),
        };
        storage.record_training(&record).await.unwrap();
        assert_eq!(storage.recent_trainings(10).await.unwrap(), vec![record]);
    }
}
