//! Draft cache and snapshot slot backed by the settings table.
//!
//! Records are stored as JSON under `intake_draft:<step>` and
//! `intake_snapshot:<step>`, with the workspace id as the settings user id.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::intake::adapters::{DraftCache, SnapshotSlot};
use crate::intake::model::{DraftRecord, Snapshot, settings_keys};
use crate::store::traits::Database;

#[derive(Clone)]
pub struct SettingsStore {
    db: Arc<dyn Database>,
}

impl SettingsStore {
    pub fn new(db: Arc<dyn Database>) -> Arc<Self> {
        Arc::new(Self { db })
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    key: &str,
    value: serde_json::Value,
) -> Result<Option<T>, DatabaseError> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| DatabaseError::Serialization(format!("{key}: {e}")))
}

#[async_trait]
impl DraftCache for SettingsStore {
    async fn get(
        &self,
        workspace_id: &str,
        step_key: &str,
    ) -> Result<Option<DraftRecord>, DatabaseError> {
        let key = settings_keys::draft(step_key);
        match self.db.get_setting(workspace_id, &key).await? {
            Some(value) => decode(&key, value),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        workspace_id: &str,
        step_key: &str,
        record: &DraftRecord,
    ) -> Result<(), DatabaseError> {
        let value = serde_json::to_value(record)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.db
            .set_setting(workspace_id, &settings_keys::draft(step_key), &value)
            .await
    }

    async fn clear(&self, workspace_id: &str, step_key: &str) -> Result<bool, DatabaseError> {
        self.db
            .delete_setting(workspace_id, &settings_keys::draft(step_key))
            .await
    }
}

#[async_trait]
impl SnapshotSlot for SettingsStore {
    async fn load(
        &self,
        workspace_id: &str,
        step_key: &str,
    ) -> Result<Option<Snapshot>, DatabaseError> {
        let key = settings_keys::snapshot(step_key);
        match self.db.get_setting(workspace_id, &key).await? {
            Some(value) => decode(&key, value),
            None => Ok(None),
        }
    }

    async fn store(
        &self,
        workspace_id: &str,
        step_key: &str,
        snapshot: Option<&Snapshot>,
    ) -> Result<(), DatabaseError> {
        let key = settings_keys::snapshot(step_key);
        match snapshot {
            Some(snapshot) => {
                let value = serde_json::to_value(snapshot)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
                self.db.set_setting(workspace_id, &key, &value).await
            }
            None => {
                self.db.delete_setting(workspace_id, &key).await?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::model::{AnswerMap, FieldAddress, FormData};
    use crate::store::LibSqlBackend;

    async fn store() -> Arc<SettingsStore> {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        SettingsStore::new(db)
    }

    #[tokio::test]
    async fn drafts_are_scoped_by_workspace_and_step() {
        let store = store().await;
        let data = FormData::Answers(AnswerMap::from([("name".to_string(), "Acme".to_string())]));
        let record = DraftRecord::new("ws", "basics", data, 3);

        store.set("ws", "basics", &record).await.unwrap();
        assert_eq!(store.get("ws", "basics").await.unwrap(), Some(record));
        assert!(store.get("ws", "features").await.unwrap().is_none());
        assert!(store.get("other", "basics").await.unwrap().is_none());

        assert!(store.clear("ws", "basics").await.unwrap());
        assert!(store.get("ws", "basics").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn snapshot_none_deletes_slot() {
        let store = store().await;
        let snapshot = Snapshot {
            current_question: Some(FieldAddress::entry_field(1, "feature")),
            current_input: "half".into(),
            answered_questions: [FieldAddress::entry_field(0, "feature")].into_iter().collect(),
        };

        store.store("ws", "features", Some(&snapshot)).await.unwrap();
        assert_eq!(store.load("ws", "features").await.unwrap(), Some(snapshot));

        store.store("ws", "features", None).await.unwrap();
        assert!(store.load("ws", "features").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_draft_is_a_serialization_error() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        db.set_setting("ws", &settings_keys::draft("basics"), &serde_json::json!({"bogus": true}))
            .await
            .unwrap();
        let store = SettingsStore::new(db);
        assert!(matches!(
            store.get("ws", "basics").await,
            Err(DatabaseError::Serialization(_))
        ));
    }
}
