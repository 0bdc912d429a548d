use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::debug;
use parking_lot::Mutex;
use tokio::{fs, sync::Mutex as AsyncMutex};

use crate::{DatasetRecord, LocalStore, RepositoryId, Result, Row, StoreErr};

/// Stores each repository as a json document `<dir>/<repository id>.json`.
///
/// Documents are replaced through a temporary file and a rename, so readers never see a
/// half written record. Writers to the same repository queue on a per-repository lock.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    locks: Mutex<HashMap<RepositoryId, Arc<AsyncMutex<()>>>>,
}

impl FileStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Arguments
    /// * `dir` - Where the documents live.
    ///
    /// # Returns
    /// The store or `StoreErr::Unavailable` if the directory can't be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        Ok(Self {
            dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, repo_id: &RepositoryId) -> PathBuf {
        self.dir.join(format!("{repo_id}.json"))
    }

    fn lock_for(&self, repo_id: &RepositoryId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(repo_id.clone()).or_default())
    }

    async fn read(&self, repo_id: &RepositoryId) -> Result<DatasetRecord> {
        let path = self.path_for(repo_id);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreErr::NotFound(repo_id.clone()));
            }
            Err(e) => return Err(StoreErr::Unavailable(e)),
        };

        serde_json::from_slice(&bytes)
            .map_err(|e| StoreErr::Corrupt(format!("{}: {e}", path.display())))
    }

    async fn write(&self, repo_id: &RepositoryId, record: &DatasetRecord) -> Result<()> {
        let path = self.path_for(repo_id);
        let tmp = path.with_extension("json.tmp");

        let bytes = serde_json::to_vec(record).map_err(io::Error::from)?;
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;

        debug!(rows = record.rows(); "wrote {}", path.display());
        Ok(())
    }
}

impl LocalStore for FileStore {
    async fn get_dataset(&self, repo_id: &RepositoryId) -> Result<DatasetRecord> {
        self.read(repo_id).await
    }

    async fn put_dataset(&self, repo_id: &RepositoryId, record: DatasetRecord) -> Result<()> {
        let lock = self.lock_for(repo_id);
        let _guard = lock.lock().await;
        self.write(repo_id, &record).await
    }

    async fn append_data(&self, repo_id: &RepositoryId, rows: Vec<Row>) -> Result<()> {
        self.update(repo_id, move |record| record.append(rows)).await
    }

    async fn update<F, T>(&self, repo_id: &RepositoryId, f: F) -> Result<T>
    where
        F: FnOnce(&mut DatasetRecord) -> Result<T> + Send,
        T: Send,
    {
        let lock = self.lock_for(repo_id);
        let _guard = lock.lock().await;

        let mut record = self.read(repo_id).await?;
        let out = f(&mut record)?;
        self.write(repo_id, &record).await?;
        Ok(out)
    }
}
