//! Store — JSON-document persistence for instances and schedule tasks.
//!
//! Each collection lives in its own file (`instances.json`, `tasks.json`)
//! as `{ next_id, records }`. Writes serialize the whole collection to a
//! temp file and rename it into place, so readers never observe a torn
//! document. Ids are allocated monotonically and never reused, even after
//! deletes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use drydock_core::{InstanceId, InstanceRecord, ScheduleTask, TaskId};

use crate::error::{StoreError, StoreResult};

const INSTANCES_FILE: &str = "instances.json";
const TASKS_FILE: &str = "tasks.json";

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// On-disk shape of one collection.
#[derive(Debug, Serialize, Deserialize)]
struct Collection<T> {
    next_id: u64,
    records: BTreeMap<u64, T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            records: BTreeMap::new(),
        }
    }
}

/// Thread-safe record store backed by JSON documents.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    /// `None` for the in-memory store: mutations skip the flush.
    dir: Option<PathBuf>,
    instances: RwLock<Collection<InstanceRecord>>,
    tasks: RwLock<Collection<ScheduleTask>>,
}

impl Store {
    /// Open (or create) a persistent store rooted at the given directory.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(dir).map_err(map_err!(Open))?;
        let instances = load_collection(&dir.join(INSTANCES_FILE))?;
        let tasks = load_collection(&dir.join(TASKS_FILE))?;
        debug!(?dir, "store opened");
        Ok(Self {
            inner: Arc::new(StoreInner {
                dir: Some(dir.to_path_buf()),
                instances: RwLock::new(instances),
                tasks: RwLock::new(tasks),
            }),
        })
    }

    /// Create an ephemeral in-memory store (for testing and dry runs).
    pub fn open_in_memory() -> Self {
        debug!("in-memory store opened");
        Self {
            inner: Arc::new(StoreInner {
                dir: None,
                instances: RwLock::new(Collection::default()),
                tasks: RwLock::new(Collection::default()),
            }),
        }
    }

    // ── Instances ──────────────────────────────────────────────

    /// Insert a new instance record, allocating its id. The id on the
    /// passed record is ignored.
    pub fn create_instance(&self, mut record: InstanceRecord) -> StoreResult<InstanceRecord> {
        let mut col = write_guard(&self.inner.instances);
        col.next_id += 1;
        record.id = col.next_id;
        col.records.insert(record.id, record.clone());
        self.flush(INSTANCES_FILE, &col)?;
        debug!(id = record.id, name = %record.name, "instance created");
        Ok(record)
    }

    pub fn get_instance(&self, id: InstanceId) -> StoreResult<Option<InstanceRecord>> {
        let col = read_guard(&self.inner.instances);
        Ok(col.records.get(&id).cloned())
    }

    /// All instance records, ordered by id.
    pub fn list_instances(&self) -> StoreResult<Vec<InstanceRecord>> {
        let col = read_guard(&self.inner.instances);
        Ok(col.records.values().cloned().collect())
    }

    /// Replace an existing record. Fails if the id was never allocated.
    pub fn update_instance(&self, record: &InstanceRecord) -> StoreResult<()> {
        let mut col = write_guard(&self.inner.instances);
        if !col.records.contains_key(&record.id) {
            return Err(StoreError::NotFound(format!("instance {}", record.id)));
        }
        col.records.insert(record.id, record.clone());
        self.flush(INSTANCES_FILE, &col)?;
        Ok(())
    }

    /// Remove a record. Exposed for external management layers; the
    /// lifecycle core itself never deletes instances.
    pub fn delete_instance(&self, id: InstanceId) -> StoreResult<bool> {
        let mut col = write_guard(&self.inner.instances);
        let removed = col.records.remove(&id).is_some();
        if removed {
            self.flush(INSTANCES_FILE, &col)?;
        }
        Ok(removed)
    }

    // ── Schedule tasks ─────────────────────────────────────────

    pub fn create_task(&self, mut task: ScheduleTask) -> StoreResult<ScheduleTask> {
        let mut col = write_guard(&self.inner.tasks);
        col.next_id += 1;
        task.id = col.next_id;
        col.records.insert(task.id, task.clone());
        self.flush(TASKS_FILE, &col)?;
        debug!(id = task.id, instance = task.instance_id, "task created");
        Ok(task)
    }

    pub fn get_task(&self, id: TaskId) -> StoreResult<Option<ScheduleTask>> {
        let col = read_guard(&self.inner.tasks);
        Ok(col.records.get(&id).cloned())
    }

    pub fn list_tasks(&self) -> StoreResult<Vec<ScheduleTask>> {
        let col = read_guard(&self.inner.tasks);
        Ok(col.records.values().cloned().collect())
    }

    pub fn list_tasks_for_instance(&self, instance_id: InstanceId) -> StoreResult<Vec<ScheduleTask>> {
        let col = read_guard(&self.inner.tasks);
        Ok(col
            .records
            .values()
            .filter(|t| t.instance_id == instance_id)
            .cloned()
            .collect())
    }

    pub fn update_task(&self, task: &ScheduleTask) -> StoreResult<()> {
        let mut col = write_guard(&self.inner.tasks);
        if !col.records.contains_key(&task.id) {
            return Err(StoreError::NotFound(format!("task {}", task.id)));
        }
        col.records.insert(task.id, task.clone());
        self.flush(TASKS_FILE, &col)?;
        Ok(())
    }

    pub fn delete_task(&self, id: TaskId) -> StoreResult<bool> {
        let mut col = write_guard(&self.inner.tasks);
        let removed = col.records.remove(&id).is_some();
        if removed {
            self.flush(TASKS_FILE, &col)?;
        }
        Ok(removed)
    }

    // ── Persistence ────────────────────────────────────────────

    /// Synchronously write a collection to disk, atomically by rename.
    /// Called with the collection's write lock held, so flush order
    /// matches mutation order.
    fn flush<T: Serialize>(&self, name: &str, col: &Collection<T>) -> StoreResult<()> {
        let Some(dir) = &self.inner.dir else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(col).map_err(map_err!(Serialize))?;
        let tmp = dir.join(format!(".{name}.tmp"));
        std::fs::write(&tmp, json).map_err(map_err!(Write))?;
        std::fs::rename(&tmp, dir.join(name)).map_err(map_err!(Write))?;
        Ok(())
    }
}

fn load_collection<T: DeserializeOwned>(path: &Path) -> StoreResult<Collection<T>> {
    if !path.exists() {
        return Ok(Collection::default());
    }
    let content = std::fs::read_to_string(path).map_err(map_err!(Read))?;
    serde_json::from_str(&content).map_err(map_err!(Deserialize))
}

// Lock poisoning only happens if a writer panicked mid-mutation; the data
// itself is still the last consistent snapshot, so recover the guard.
fn read_guard<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_guard<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
