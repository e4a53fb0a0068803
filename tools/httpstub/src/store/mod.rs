//! Per-client, namespace-scoped ordered-sequence storage.
//!
//! Records are pre-serialized payloads the store never interprets. Each
//! (client, namespace) pair is an independent resource with its own critical
//! section; different clients and different namespaces never contend.

mod memory;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use crate::client::ClientKey;
use crate::errors::StubError;
use crate::logging::append_run_log;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as ResourceMutex, OwnedMutexGuard};

pub type StoreResult<T> = Result<T, StubError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Requests,
    Expectations,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requests => "requests",
            Self::Expectations => "expectations",
        }
    }
}

/// Backend contract: whole-sequence load/persist/clear per resource. A
/// `persist` is atomic: a reader sees the previous sequence or the new one,
/// never a partial write.
pub trait StorageBackend: Send + Sync {
    fn load(&self, client: &ClientKey, ns: Namespace) -> StoreResult<Vec<String>>;
    fn persist(&self, client: &ClientKey, ns: Namespace, records: &[String]) -> StoreResult<()>;
    fn clear(&self, client: &ClientKey, ns: Namespace) -> StoreResult<()>;
}

// ── ResourceLocks ─────────────────────────────────────────────────────────────

/// Lazily-populated registry of per-resource mutexes. Owned guards let a
/// caller hold the critical section across its full read-modify-write.
struct ResourceLocks {
    inner: Mutex<HashMap<(String, Namespace), Arc<ResourceMutex<()>>>>,
}

impl ResourceLocks {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn acquire(&self, client: &ClientKey, ns: Namespace) -> StoreResult<OwnedMutexGuard<()>> {
        let lock = {
            let mut map = self
                .inner
                .lock()
                .map_err(|_| StubError::Storage("resource lock registry poisoned".to_string()))?;
            Arc::clone(
                map.entry((client.as_str().to_string(), ns))
                    .or_insert_with(|| Arc::new(ResourceMutex::new(()))),
            )
        };
        Ok(lock.blocking_lock_owned())
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// The persistent store: sequence operations plus `exclusive`, the compound
/// read-modify-write primitive every lost-update-sensitive sequence runs
/// through.
pub struct Store {
    backend: Box<dyn StorageBackend>,
    locks: ResourceLocks,
}

impl Store {
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend,
            locks: ResourceLocks::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::new()))
    }

    pub fn append(&self, client: &ClientKey, ns: Namespace, record: String) -> StoreResult<()> {
        self.exclusive(client, ns, |records| {
            records.push(record);
            Ok(())
        })?;
        append_run_log(
            "debug",
            "store.appended",
            json!({ "client": client.as_str(), "namespace": ns.as_str() }),
        );
        Ok(())
    }

    pub fn prepend(&self, client: &ClientKey, ns: Namespace, record: String) -> StoreResult<()> {
        self.exclusive(client, ns, |records| {
            records.insert(0, record);
            Ok(())
        })?;
        append_run_log(
            "debug",
            "store.prepended",
            json!({ "client": client.as_str(), "namespace": ns.as_str() }),
        );
        Ok(())
    }

    /// Current sequence in whatever order the writers established:
    /// oldest-first for `requests`, newest-first for `expectations`. Reads
    /// run concurrently with reads and observe only fully-persisted
    /// snapshots.
    pub fn read(&self, client: &ClientKey, ns: Namespace) -> StoreResult<Vec<String>> {
        self.backend.load(client, ns)
    }

    /// Full overwrite of the resource's sequence.
    pub fn replace(
        &self,
        client: &ClientKey,
        ns: Namespace,
        records: Vec<String>,
    ) -> StoreResult<()> {
        let _guard = self.locks.acquire(client, ns)?;
        self.backend.persist(client, ns, &records)
    }

    pub fn clear(&self, client: &ClientKey, ns: Namespace) -> StoreResult<()> {
        let _guard = self.locks.acquire(client, ns)?;
        self.backend.clear(client, ns)?;
        append_run_log(
            "info",
            "store.cleared",
            json!({ "client": client.as_str(), "namespace": ns.as_str() }),
        );
        Ok(())
    }

    /// Run `apply` over the decoded sequence inside the resource's critical
    /// section and persist the result. If `apply` fails, nothing is
    /// persisted and the resource keeps its last fully-persisted state.
    pub fn exclusive<T>(
        &self,
        client: &ClientKey,
        ns: Namespace,
        apply: impl FnOnce(&mut Vec<String>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let _guard = self.locks.acquire(client, ns)?;
        let mut records = self.backend.load(client, ns)?;
        let outcome = apply(&mut records)?;
        self.backend.persist(client, ns, &records)?;
        Ok(outcome)
    }
}
