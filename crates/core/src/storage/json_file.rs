use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ClientStore, StorageBackend, StorageError, TrainingStore, matches_name};
use crate::types::{ClientRecord, NewClient, TrainingRecord};

const CLIENTS_FILE: &str = "clients.json";
const TRAININGS_FILE: &str = "trainings.json";

/// Flat keyed record store: one JSON object per file, keyed by record id.
///
/// Every operation holds `lock` for its whole read-modify-write so two
/// requests in the same process never interleave writes. Files are replaced
/// through a temp file and rename.
pub struct JsonFileStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), lock: Mutex::new(()) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn load<T: DeserializeOwned>(&self, file: &str) -> Result<BTreeMap<Uuid, T>, StorageError> {
        match tokio::fs::read(self.dir.join(file)).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save<T: Serialize>(&self, file: &str, records: &BTreeMap<Uuid, T>) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(records)?;
        let tmp = self.dir.join(format!("{file}.tmp"));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, self.dir.join(file)).await?;
        Ok(())
    }

    async fn clients_in_order(&self) -> Result<Vec<ClientRecord>, StorageError> {
        let mut clients: Vec<ClientRecord> = self.load(CLIENTS_FILE).await?.into_values().collect();
        clients.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(clients)
    }
}

#[async_trait::async_trait]
impl ClientStore for JsonFileStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<ClientRecord>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .clients_in_order()
            .await?
            .into_iter()
            .find(|c| matches_name(&c.name, name)))
    }

    async fn create(&self, client: NewClient) -> Result<ClientRecord, StorageError> {
        let _guard = self.lock.lock().await;
        let mut clients: BTreeMap<Uuid, ClientRecord> = self.load(CLIENTS_FILE).await?;
        let record = ClientRecord {
            id: Uuid::new_v4(),
            name: client.name,
            age: client.age,
            weight: client.weight,
            height: client.height,
            goals: client.goals,
            created_at: Utc::now(),
        };
        clients.insert(record.id, record.clone());
        self.save(CLIENTS_FILE, &clients).await?;
        Ok(record)
    }

    async fn delete(&self, id: Uuid) -> Result<Option<ClientRecord>, StorageError> {
        let _guard = self.lock.lock().await;
        let mut clients: BTreeMap<Uuid, ClientRecord> = self.load(CLIENTS_FILE).await?;
        let removed = clients.remove(&id);
        if removed.is_some() {
            self.save(CLIENTS_FILE, &clients).await?;
        }
        Ok(removed)
    }

    async fn list_all(&self) -> Result<Vec<ClientRecord>, StorageError> {
        let _guard = self.lock.lock().await;
        self.clients_in_order().await
    }
}

#[async_trait::async_trait]
impl TrainingStore for JsonFileStore {
    async fn record(&self, record: &TrainingRecord) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut trainings: BTreeMap<Uuid, TrainingRecord> = self.load(TRAININGS_FILE).await?;
        trainings.insert(record.id, record.clone());
        self.save(TRAININGS_FILE, &trainings).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<TrainingRecord>, StorageError> {
        let _guard = self.lock.lock().await;
        let mut trainings: Vec<TrainingRecord> =
            self.load(TRAININGS_FILE).await?.into_values().collect();
        trainings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        trainings.truncate(limit);
        Ok(trainings)
    }
}

impl StorageBackend for JsonFileStore {
    fn name(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Difficulty, TrainingMode, TrainingPlan};
    use chrono::TimeDelta;

    fn new_client(name: &str) -> NewClient {
        NewClient {
            name: name.into(),
            age: Some(25),
            weight: Some(72.5),
            height: None,
            goals: Some("siła".into()),
        }
    }

    fn training(created_at: chrono::DateTime<Utc>) -> TrainingRecord {
        TrainingRecord {
            id: Uuid::new_v4(),
            difficulty: Difficulty::Hard,
            mode: TrainingMode::Circuit,
            participant_count: 4,
            plan: TrainingPlan {
                warmup: vec![],
                main_part: vec![],
                cooldown: vec![],
                mode: TrainingMode::Circuit,
                total_duration_minutes: Some(45),
            },
            created_at,
        }
    }

    #[tokio::test]
    async fn missing_directory_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("not-yet"));
        assert!(store.list_all().await.unwrap().is_empty());
        assert!(store.find_by_name("jan").await.unwrap().is_none());
        assert!(store.recent(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let created = JsonFileStore::new(dir.path()).create(new_client("Ola")).await.unwrap();

        let reopened = JsonFileStore::new(dir.path());
        let listed = reopened.list_all().await.unwrap();
        assert_eq!(listed, vec![created]);
        assert!(!dir.path().join("clients.json.tmp").exists());
    }

    #[tokio::test]
    async fn lookup_returns_first_in_creation_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let first = store.create(new_client("Jan Kowalski")).await.unwrap();
        store.create(new_client("Janina Nowak")).await.unwrap();

        assert_eq!(store.find_by_name("JAN").await.unwrap().unwrap().id, first.id);
        assert_eq!(store.find_by_name("nowak").await.unwrap().unwrap().name, "Janina Nowak");
        assert!(store.find_by_name("Piotr").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_only_target() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let jan = store.create(new_client("Jan")).await.unwrap();
        let ola = store.create(new_client("Ola")).await.unwrap();

        assert_eq!(store.delete(jan.id).await.unwrap(), Some(jan.clone()));
        assert_eq!(store.delete(jan.id).await.unwrap(), None);
        assert_eq!(store.list_all().await.unwrap(), vec![ola]);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CLIENTS_FILE), b"{not json").unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(matches!(store.list_all().await, Err(StorageError::Json(_))));
    }

    #[tokio::test]
    async fn recent_trainings_newest_first_and_limited() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let now = Utc::now();
        let old = training(now - TimeDelta::hours(2));
        let mid = training(now - TimeDelta::hours(1));
        let new = training(now);
        for record in [&mid, &old, &new] {
            store.record(record).await.unwrap();
        }
        let recent = store.recent(2).await.unwrap();
        assert_eq!(recent, vec![new, mid]);
    }
}
