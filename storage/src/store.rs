use crate::{DatasetRecord, RepositoryId, Result, Row};

/// Persists one dataset record per repository.
///
/// Writes to the same repository are serialized by every implementation, so a
/// read-modify-write through `update` never loses a concurrent update.
#[allow(unused)]
#[trait_variant::make(LocalStore: Send)]
pub trait LocalStoreTemplate {
    /// Fetches the record stored for `repo_id`.
    ///
    /// # Returns
    /// The record, `StoreErr::NotFound` if there is none or `StoreErr::Unavailable`.
    async fn get_dataset(&self, repo_id: &RepositoryId) -> Result<DatasetRecord>;

    /// Stores `record` under `repo_id`, replacing whatever was there.
    async fn put_dataset(&self, repo_id: &RepositoryId, record: DatasetRecord) -> Result<()>;

    /// Appends rows to an existing record.
    ///
    /// # Returns
    /// `StoreErr::ShapeMismatch` if the rows' width doesn't match the stored `cols`,
    /// `StoreErr::NotFound` if there is no record.
    async fn append_data(&self, repo_id: &RepositoryId, rows: Vec<Row>) -> Result<()>;

    /// Atomically reads, modifies and writes back the record of `repo_id`.
    ///
    /// `f` runs against a copy of the stored record; the copy is persisted only if `f`
    /// succeeds.
    ///
    /// # Arguments
    /// * `repo_id` - The repository to update.
    /// * `f` - The modification, its output is returned on success.
    async fn update<F, T>(&self, repo_id: &RepositoryId, f: F) -> Result<T>
    where
        F: FnOnce(&mut DatasetRecord) -> Result<T> + Send,
        T: Send;
}
