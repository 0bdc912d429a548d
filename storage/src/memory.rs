use std::collections::HashMap;

use parking_lot::Mutex;

use crate::{DatasetRecord, LocalStore, RepositoryId, Result, Row, StoreErr};

/// A process-local store, nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<RepositoryId, DatasetRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    async fn get_dataset(&self, repo_id: &RepositoryId) -> Result<DatasetRecord> {
        self.records
            .lock()
            .get(repo_id)
            .cloned()
            .ok_or_else(|| StoreErr::NotFound(repo_id.clone()))
    }

    async fn put_dataset(&self, repo_id: &RepositoryId, record: DatasetRecord) -> Result<()> {
        self.records.lock().insert(repo_id.clone(), record);
        Ok(())
    }

    async fn append_data(&self, repo_id: &RepositoryId, rows: Vec<Row>) -> Result<()> {
        self.update(repo_id, move |record| record.append(rows)).await
    }

    async fn update<F, T>(&self, repo_id: &RepositoryId, f: F) -> Result<T>
    where
        F: FnOnce(&mut DatasetRecord) -> Result<T> + Send,
        T: Send,
    {
        let mut records = self.records.lock();
        let stored = records
            .get_mut(repo_id)
            .ok_or_else(|| StoreErr::NotFound(repo_id.clone()))?;

        let mut next = stored.clone();
        let out = f(&mut next)?;
        *stored = next;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepositoryId {
        RepositoryId::new("R1").unwrap()
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let record = DatasetRecord::new(vec![vec![1.0, 2.0]; 3]).unwrap();
        store.put_dataset(&repo(), record).await.unwrap();
        store
    }

    #[tokio::test]
    async fn get_unknown_repository_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_dataset(&repo()).await,
            Err(StoreErr::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn append_preserves_shape() {
        let store = seeded().await;
        store
            .append_data(&repo(), vec![vec![3.0, 4.0], vec![5.0, 6.0]])
            .await
            .unwrap();

        let record = store.get_dataset(&repo()).await.unwrap();
        assert_eq!((record.rows(), record.cols()), (5, 2));

        let err = store.append_data(&repo(), vec![vec![1.0]]).await.unwrap_err();
        assert!(matches!(err, StoreErr::ShapeMismatch { .. }));
        assert_eq!(store.get_dataset(&repo()).await.unwrap().rows(), 5);
    }

    #[tokio::test]
    async fn failed_update_leaves_record_untouched() {
        let store = seeded().await;
        store
            .update(&repo(), |record| record.advance_session("S1", 1))
            .await
            .unwrap();

        let err = store
            .update(&repo(), |record| {
                record.ensure_session("S2");
                record.advance_session("S1", 5)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreErr::NonSequentialRound { .. }));

        let record = store.get_dataset(&repo()).await.unwrap();
        assert_eq!(record.session_round("S1"), Some(1));
        assert_eq!(record.session_round("S2"), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_are_not_lost() {
        let store = std::sync::Arc::new(seeded().await);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .append_data(&repo(), vec![vec![i as f32, 0.0]])
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.get_dataset(&repo()).await.unwrap().rows(), 11);
    }
}
