use crate::core::error::{LoadError, PersistError};
use crate::persistence::json_file;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, warn};

/// A record kept in a [`Collection`]
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name used in logs
    const KIND: &'static str;

    fn id(&self) -> u32;

    /// Checks beyond what deserialization enforces
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// How far a mutation made it
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Commit {
    /// Applied in memory and mirrored to the backing file
    Durable,
    /// Applied in memory, but the write-back failed or did not finish in time.
    /// The backing file may lag behind memory until a later write lands.
    MemoryOnly { reason: String },
}

impl Commit {
    pub fn is_durable(&self) -> bool {
        matches!(self, Commit::Durable)
    }
}

/// A mutated record together with the outcome of its write-back
#[derive(Clone, Debug, PartialEq)]
pub struct Committed<T> {
    pub record: T,
    pub commit: Commit,
}

/// An ordered, file-backed set of records keyed by id.
///
/// Mutations hold `write_gate` from the in-memory change until the file I/O
/// of their write-back has finished, even when the caller stopped waiting for
/// it. Writes to the file therefore happen in the same order as the changes
/// they mirror. Readers only take the `records` lock and never wait on disk.
pub struct Collection<T> {
    path: PathBuf,
    records: RwLock<Vec<T>>,
    write_gate: Arc<Mutex<()>>,
    next_id: AtomicU32,
    write_timeout: Duration,
    persist_failures: AtomicU64,
}

impl<T: Record> Collection<T> {
    pub fn new(path: PathBuf, write_timeout: Duration) -> Self {
        Self {
            path,
            records: RwLock::new(Vec::new()),
            write_gate: Arc::new(Mutex::new(())),
            next_id: AtomicU32::new(1),
            write_timeout,
            persist_failures: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory records with the contents of the backing file.
    ///
    /// On failure the collection is left empty.
    pub async fn load(&self) -> Result<usize, LoadError> {
        let _gate = self.write_gate.lock().await;

        let loaded = match json_file::read_records::<T>(&self.path).await {
            Ok(loaded) => loaded,
            Err(e) => {
                self.records.write().await.clear();
                return Err(e);
            }
        };

        if let Err(reason) = validate_all(&loaded) {
            self.records.write().await.clear();
            return Err(LoadError::Schema {
                path: self.path.clone(),
                reason,
            });
        }

        let max_id = loaded.iter().map(Record::id).max().unwrap_or(0);
        let next = max_id.saturating_add(1).max(self.next_id.load(Ordering::SeqCst));
        self.next_id.store(next, Ordering::SeqCst);

        let count = loaded.len();
        *self.records.write().await = loaded;

        debug!(kind = T::KIND, count, next_id = next, "Collection loaded");
        Ok(count)
    }

    /// Drop every record from memory without touching the backing file
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }

    pub async fn get(&self, id: u32) -> Option<T> {
        self.records
            .read()
            .await
            .iter()
            .find(|record| record.id() == id)
            .cloned()
    }

    pub async fn find<P>(&self, predicate: P) -> Option<T>
    where
        P: Fn(&T) -> bool,
    {
        self.records
            .read()
            .await
            .iter()
            .find(|record| predicate(record))
            .cloned()
    }

    /// Point-in-time copy of every record, in file order
    pub async fn snapshot(&self) -> Vec<T> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Number of write-backs that failed since startup
    pub fn persist_failures(&self) -> u64 {
        self.persist_failures.load(Ordering::Relaxed)
    }

    /// Apply `change` to the record with `id` and mirror the collection to disk.
    ///
    /// `change` works on a copy; if it returns an error the stored record is
    /// untouched and nothing is written. Returns `Ok(None)` when no record has
    /// that id.
    pub async fn modify<F, E>(&self, id: u32, change: F) -> Result<Option<Committed<T>>, E>
    where
        F: FnOnce(&mut T) -> Result<(), E>,
    {
        let gate = Arc::clone(&self.write_gate).lock_owned().await;

        let (record, encoded) = {
            let mut records = self.records.write().await;
            let Some(slot) = records.iter_mut().find(|record| record.id() == id) else {
                return Ok(None);
            };

            let mut draft = slot.clone();
            change(&mut draft)?;
            debug_assert_eq!(draft.id(), id, "record ids are immutable");
            *slot = draft.clone();

            (draft, json_file::encode_records(&records))
        };

        let commit = self.write_back(gate, encoded).await;
        Ok(Some(Committed { record, commit }))
    }

    /// Append a record built from the next unused id and mirror the collection to disk
    pub async fn insert_with<F>(&self, build: F) -> Committed<T>
    where
        F: FnOnce(u32) -> T,
    {
        let gate = Arc::clone(&self.write_gate).lock_owned().await;

        let (record, encoded) = {
            let mut records = self.records.write().await;
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let record = build(id);
            debug_assert_eq!(record.id(), id, "records must use the assigned id");
            records.push(record.clone());

            (record, json_file::encode_records(&records))
        };

        let commit = self.write_back(gate, encoded).await;
        Committed { record, commit }
    }

    /// Mirror `encoded` to the backing file.
    ///
    /// The write runs in its own task that owns `gate`, so the next mutation
    /// cannot start until this write's I/O is over. The timeout only bounds how
    /// long the caller waits for the outcome.
    async fn write_back(
        &self,
        gate: OwnedMutexGuard<()>,
        encoded: Result<Vec<u8>, PersistError>,
    ) -> Commit {
        let result = match encoded {
            Ok(bytes) => {
                let path = self.path.clone();
                let write = tokio::spawn(async move {
                    let result = json_file::write_atomic(&path, &bytes).await;
                    drop(gate);
                    result
                });

                match tokio::time::timeout(self.write_timeout, write).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join)) => Err(PersistError::Task(join)),
                    Err(_) => Err(PersistError::Timeout(self.write_timeout)),
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => Commit::Durable,
            Err(e) => {
                self.persist_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    kind = T::KIND,
                    path = %self.path.display(),
                    error = %e,
                    "Write-back failed, in-memory state is ahead of the backing file"
                );
                Commit::MemoryOnly {
                    reason: e.to_string(),
                }
            }
        }
    }
}

fn validate_all<T: Record>(records: &[T]) -> Result<(), String> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.id()) {
            return Err(format!("duplicate {} id {}", T::KIND, record.id()));
        }
        record.validate()?;
    }
    Ok(())
}
