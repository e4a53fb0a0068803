use super::{Namespace, StorageBackend, StoreResult};
use crate::client::ClientKey;
use crate::errors::StubError;
use std::collections::HashMap;
use std::sync::Mutex;

/// Mutex-guarded in-memory backend; test and ephemeral use.
pub struct MemoryBackend {
    resources: Mutex<HashMap<(String, Namespace), Vec<String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(HashMap::new()),
        }
    }

    fn with_map<T>(
        &self,
        f: impl FnOnce(&mut HashMap<(String, Namespace), Vec<String>>) -> T,
    ) -> StoreResult<T> {
        let mut map = self
            .resources
            .lock()
            .map_err(|_| StubError::Storage("memory backend poisoned".to_string()))?;
        Ok(f(&mut map))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self, client: &ClientKey, ns: Namespace) -> StoreResult<Vec<String>> {
        self.with_map(|map| {
            map.get(&(client.as_str().to_string(), ns))
                .cloned()
                .unwrap_or_default()
        })
    }

    fn persist(&self, client: &ClientKey, ns: Namespace, records: &[String]) -> StoreResult<()> {
        self.with_map(|map| {
            map.insert((client.as_str().to_string(), ns), records.to_vec());
        })
    }

    fn clear(&self, client: &ClientKey, ns: Namespace) -> StoreResult<()> {
        self.with_map(|map| {
            map.remove(&(client.as_str().to_string(), ns));
        })
    }
}
