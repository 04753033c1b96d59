use std::collections::HashSet;

use async_trait::async_trait;

use crate::config::{Driver, Properties};
use crate::db::adapters::basic::BasicAdapter;
use crate::db::adapters::ignite::IgniteAdapter;
use crate::db::error::DbError;
use crate::models::{Record, Status};

/// The capability contract a benchmark harness drives.
///
/// One instance per worker: `init` once, any number of operations, then
/// `cleanup`. Operations never fail the worker; they report a [`Status`].
#[async_trait]
pub trait DbAdapter: Send + Sync {
    fn driver_name(&self) -> &'static str;

    async fn init(&mut self) -> Result<(), DbError>;

    async fn cleanup(&mut self) -> Result<(), DbError>;

    /// Fills `result` with the requested fields of `key` (`None` = all).
    async fn read(
        &self,
        table: &str,
        key: &str,
        fields: Option<&HashSet<String>>,
        result: &mut Record,
    ) -> Status;

    async fn scan(
        &self,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&HashSet<String>>,
        result: &mut Vec<Record>,
    ) -> Status;

    /// Overwrites the given fields of an existing record.
    async fn update(&self, table: &str, key: &str, values: &Record) -> Status;

    async fn insert(&self, table: &str, key: &str, values: &Record) -> Status;

    async fn delete(&self, table: &str, key: &str) -> Status;
}

pub fn new_adapter(driver: Driver, properties: Properties) -> Box<dyn DbAdapter> {
    match driver {
        Driver::Ignite => Box::new(IgniteAdapter::new(properties)),
        Driver::Basic => Box::new(BasicAdapter::new(properties)),
    }
}
