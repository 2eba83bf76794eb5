//! Process-local persistence, the single-node fallback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{ConversationTurn, Persistence, PersistenceError, UploadRecord, UploadStatus};

/// In-memory persistence used for single-node deployments and tests.
#[derive(Default)]
pub struct InMemoryPersistence {
    turns: RwLock<Vec<ConversationTurn>>,
    uploads: RwLock<HashMap<Uuid, UploadRecord>>,
    fail_writes: AtomicBool,
}

impl InMemoryPersistence {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent writes fail, for exercising the best-effort paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of one upload record.
    pub fn upload(&self, id: Uuid) -> Option<UploadRecord> {
        self.uploads.read().get(&id).cloned()
    }

    /// Total stored turns, all tenants.
    pub fn turn_count(&self) -> usize {
        self.turns.read().len()
    }

    fn check_writable(&self) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable {
                message: "writes disabled".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn insert_turn(&self, turn: ConversationTurn) -> Result<(), PersistenceError> {
        self.check_writable()?;
        self.turns.write().push(turn);
        Ok(())
    }

    async fn list_turns(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, PersistenceError> {
        let turns = self.turns.read();
        let mut matching: Vec<ConversationTurn> = turns
            .iter()
            .filter(|t| t.tenant_id == tenant_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn insert_upload(&self, record: UploadRecord) -> Result<(), PersistenceError> {
        self.check_writable()?;
        self.uploads.write().insert(record.id, record);
        Ok(())
    }

    async fn update_upload_status(
        &self,
        id: Uuid,
        status: UploadStatus,
        chunk_count: Option<u32>,
        reason: Option<String>,
    ) -> Result<(), PersistenceError> {
        self.check_writable()?;

        let mut uploads = self.uploads.write();
        let record = uploads
            .get_mut(&id)
            .ok_or_else(|| PersistenceError::Unavailable {
                message: format!("unknown upload {id}"),
            })?;

        record.status = status;
        if let Some(count) = chunk_count {
            record.chunk_count = count;
        }
        if reason.is_some() {
            record.failure_reason = reason;
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), PersistenceError> {
        self.check_writable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectordb::ContentType;
    use chrono::Utc;

    fn turn(tenant: &str, message: &str) -> ConversationTurn {
        ConversationTurn {
            id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            conversation_id: "c1".to_string(),
            user_message: message.to_string(),
            assistant_response: "answer".to_string(),
            sources: vec![],
            confidence: 0.9,
            should_escalate: false,
            reviewed: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn list_turns_is_tenant_scoped_and_limited() {
        let store = InMemoryPersistence::new();

        for i in 0..5 {
            store.insert_turn(turn("a", &format!("q{i}"))).await.unwrap();
        }
        store.insert_turn(turn("b", "other")).await.unwrap();

        let listed = store.list_turns("a", 3).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed.iter().all(|t| t.tenant_id == "a"));
    }

    #[tokio::test]
    async fn upload_lifecycle_round_trip() {
        let store = InMemoryPersistence::new();
        let record = UploadRecord::pending("t", "file.pdf", ContentType::Pdf, 10);
        let id = record.id;

        store.insert_upload(record).await.unwrap();
        store
            .update_upload_status(id, UploadStatus::Ready, Some(7), None)
            .await
            .unwrap();

        let stored = store.upload(id).unwrap();
        assert_eq!(stored.status, UploadStatus::Ready);
        assert_eq!(stored.chunk_count, 7);
    }

    #[tokio::test]
    async fn failing_writes_surface_unavailable() {
        let store = InMemoryPersistence::new();
        store.set_fail_writes(true);

        let err = store.insert_turn(turn("a", "q")).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Unavailable { .. }));
    }
}
