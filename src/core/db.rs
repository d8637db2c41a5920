use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Raw key-value operations a storage backend must provide.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
    fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// In-process backend used by the native server and the tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    fn entries(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

impl KvBackend for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.entries()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// Spin's default key-value store. The store is opened per operation; the
/// host hands out cheap handles.
#[cfg(target_arch = "wasm32")]
pub struct SpinStore;

#[cfg(target_arch = "wasm32")]
impl SpinStore {
    fn open() -> anyhow::Result<spin_sdk::key_value::Store> {
        spin_sdk::key_value::Store::open_default()
            .map_err(|e| anyhow!("failed to open key-value store: {}", e))
    }
}

#[cfg(target_arch = "wasm32")]
impl KvBackend for SpinStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(Self::open()?.get(key)?)
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        Ok(Self::open()?.set(key, value)?)
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        Ok(Self::open()?.delete(key)?)
    }
}

/// JSON document store over a [`KvBackend`].
///
/// Individual key operations are atomic in every backend, but a mutation
/// usually reads one key and writes several. Such mutations run inside
/// [`Db::exclusive`] so concurrent requests cannot interleave them.
#[derive(Clone)]
pub struct Db {
    backend: Arc<dyn KvBackend>,
    writes: Arc<Mutex<()>>,
}

impl Db {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            writes: Arc::new(Mutex::new(())),
        }
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::default()))
    }

    #[cfg(target_arch = "wasm32")]
    pub fn spin() -> Self {
        Self::new(Arc::new(SpinStore))
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.backend.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.backend.set(key, &bytes)
    }

    pub fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.backend.delete(key)
    }

    /// Runs a read-modify-write sequence with every other writer on this
    /// `Db` (and its clones) held off. Not reentrant: `f` must not call
    /// another `exclusive` operation.
    pub fn exclusive<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<anyhow::Error>,
    {
        let _guard = self
            .writes
            .lock()
            .map_err(|_| anyhow!("store write lock poisoned"))?;
        f()
    }

    /// Reads a JSON list, treating an absent key as empty.
    pub fn get_list(&self, key: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.get_json::<Vec<String>>(key)?.unwrap_or_default())
    }
}
