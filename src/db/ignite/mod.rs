//! Client side of an Ignite cluster as the adapter sees it.
//!
//! The adapter only talks to these traits; [`ThinClientFactory`] is the
//! network implementation and tests swap in an in-memory one.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Record;

pub mod protocol;
mod thin;

#[cfg(test)]
pub mod fake;

pub use thin::ThinClientFactory;

/// Where a client should connect. Addresses are tried in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfiguration {
    pub addresses: Vec<String>,
}

impl ClientConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addresses = addresses.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn start_client(&self, config: &ClientConfiguration) -> Result<Arc<dyn IgniteClient>>;
}

/// A live session to the cluster.
#[async_trait]
pub trait IgniteClient: Send + Sync {
    async fn cache_names(&self) -> Result<Vec<String>>;

    /// `None` when the cluster has no cache with that name.
    async fn cache(&self, name: &str) -> Result<Option<Arc<dyn ClientCache>>>;
}

#[async_trait]
pub trait ClientCache: Send + Sync {
    fn name(&self) -> &str;
    async fn get(&self, key: &str) -> Result<Option<Record>>;
    async fn put(&self, key: &str, value: &Record) -> Result<()>;
    /// Returns whether the key was present.
    async fn remove(&self, key: &str) -> Result<bool>;
}
