use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::{ClientCache, ClientConfiguration, ClientFactory, IgniteClient};
use crate::models::Record;

#[derive(Default)]
struct State {
    caches: Mutex<HashMap<String, HashMap<String, Record>>>,
    connects: AtomicUsize,
    addresses: Mutex<Vec<String>>,
    unreachable: AtomicBool,
    failing: AtomicBool,
}

/// In-process stand-in for a cluster. Clones share the same data.
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<State>,
}

impl FakeCluster {
    pub fn with_cache(name: &str) -> Self {
        let cluster = Self::default();
        cluster
            .state
            .caches
            .lock()
            .unwrap()
            .insert(name.to_string(), HashMap::new());
        cluster
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn last_address(&self) -> Option<String> {
        self.state.addresses.lock().unwrap().last().cloned()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Every cache operation errors while set.
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    pub fn stored(&self, cache: &str, key: &str) -> Option<Record> {
        self.state
            .caches
            .lock()
            .unwrap()
            .get(cache)
            .and_then(|c| c.get(key).cloned())
    }
}

#[async_trait]
impl ClientFactory for FakeCluster {
    async fn start_client(&self, config: &ClientConfiguration) -> Result<Arc<dyn IgniteClient>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state
            .addresses
            .lock()
            .unwrap()
            .extend(config.addresses.iter().cloned());
        if self.state.unreachable.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        Ok(Arc::new(FakeClient {
            state: self.state.clone(),
        }))
    }
}

struct FakeClient {
    state: Arc<State>,
}

#[async_trait]
impl IgniteClient for FakeClient {
    async fn cache_names(&self) -> Result<Vec<String>> {
        Ok(self.state.caches.lock().unwrap().keys().cloned().collect())
    }

    async fn cache(&self, name: &str) -> Result<Option<Arc<dyn ClientCache>>> {
        if !self.state.caches.lock().unwrap().contains_key(name) {
            return Ok(None);
        }
        Ok(Some(Arc::new(FakeCache {
            state: self.state.clone(),
            name: name.to_string(),
        })))
    }
}

struct FakeCache {
    state: Arc<State>,
    name: String,
}

impl FakeCache {
    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Record>) -> T) -> Result<T> {
        if self.state.failing.load(Ordering::SeqCst) {
            bail!("node left the cluster");
        }
        let mut caches = self.state.caches.lock().unwrap();
        match caches.get_mut(&self.name) {
            Some(entries) => Ok(f(entries)),
            None => bail!("cache {} was destroyed", self.name),
        }
    }
}

#[async_trait]
impl ClientCache for FakeCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Record>> {
        self.with_entries(|e| e.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &Record) -> Result<()> {
        self.with_entries(|e| {
            e.insert(key.to_string(), value.clone());
        })
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.with_entries(|e| e.remove(key).is_some())
    }
}
