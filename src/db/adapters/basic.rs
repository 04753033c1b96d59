use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::Properties;
use crate::db::adapter::DbAdapter;
use crate::db::error::{DbError, InitError};
use crate::models::{Record, Status};

pub const VERBOSE_PROPERTY: &str = "basicdb.verbose";
pub const SIMULATE_DELAY_PROPERTY: &str = "basicdb.simulatedelay";

const DRIVER: &str = "Basic";

/// Stores nothing and answers every operation with `OK`.
///
/// Useful for measuring the harness itself and for dry runs of a workload.
pub struct BasicAdapter {
    properties: Properties,
    ready: bool,
    verbose: bool,
    delay: Duration,
}

impl BasicAdapter {
    pub fn new(properties: Properties) -> Self {
        Self {
            properties,
            ready: false,
            verbose: true,
            delay: Duration::ZERO,
        }
    }

    async fn visit(&self, op: &str, table: &str, key: &str) -> Status {
        if !self.ready {
            warn!("{} issued on a Basic adapter that is not initialized", op);
            return Status::UnexpectedState;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.verbose {
            info!("{} {} {}", op, table, key);
        }
        Status::Ok
    }
}

#[async_trait]
impl DbAdapter for BasicAdapter {
    fn driver_name(&self) -> &'static str {
        DRIVER
    }

    async fn init(&mut self) -> Result<(), DbError> {
        if self.ready {
            return Err(DbError::AlreadyInitialized { driver: DRIVER });
        }
        self.verbose = self.properties.get_bool(VERBOSE_PROPERTY, true);
        let millis = self
            .properties
            .get_u64(SIMULATE_DELAY_PROPERTY, 0)
            .map_err(|e| {
                DbError::init(
                    DRIVER,
                    InitError::InvalidProperty {
                        name: SIMULATE_DELAY_PROPERTY,
                        reason: e.to_string(),
                    },
                )
            })?;
        self.delay = Duration::from_millis(millis);
        self.ready = true;
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), DbError> {
        self.ready = false;
        Ok(())
    }

    async fn read(
        &self,
        table: &str,
        key: &str,
        _fields: Option<&HashSet<String>>,
        _result: &mut Record,
    ) -> Status {
        self.visit("READ", table, key).await
    }

    async fn scan(
        &self,
        table: &str,
        start_key: &str,
        _record_count: usize,
        _fields: Option<&HashSet<String>>,
        _result: &mut Vec<Record>,
    ) -> Status {
        self.visit("SCAN", table, start_key).await
    }

    async fn update(&self, table: &str, key: &str, _values: &Record) -> Status {
        self.visit("UPDATE", table, key).await
    }

    async fn insert(&self, table: &str, key: &str, _values: &Record) -> Status {
        self.visit("INSERT", table, key).await
    }

    async fn delete(&self, table: &str, key: &str) -> Status {
        self.visit("DELETE", table, key).await
    }
}
