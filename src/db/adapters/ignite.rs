use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::config::Properties;
use crate::db::adapter::DbAdapter;
use crate::db::error::{DbError, InitError};
use crate::db::ignite::{
    ClientCache, ClientConfiguration, ClientFactory, IgniteClient, ThinClientFactory,
};
use crate::models::record::{copy_fields, merge_fields};
use crate::models::{Record, Status};

pub const DEFAULT_CACHE_NAME: &str = "usertable";
pub const HOSTS_PROPERTY: &str = "hosts";
pub const PORTS_PROPERTY: &str = "ports";
pub const PORTS_DEFAULTS: &str = "47500..47509";
pub const DEBUG_PROPERTY: &str = "debug";
pub const THIN_CLIENT_PORT: u16 = 10800;

const DRIVER: &str = "Ignite";

/// Options read from the adapter properties at `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgniteSettings {
    pub host: String,
    pub ports: String,
    pub debug: bool,
}

impl IgniteSettings {
    pub fn from_properties(props: &Properties) -> Result<Self, InitError> {
        let debug = props.get_bool(DEBUG_PROPERTY, false);
        let host = props
            .get(HOSTS_PROPERTY)
            .map(str::trim)
            .ok_or(InitError::MissingProperty(HOSTS_PROPERTY))?;
        if host.is_empty() {
            return Err(InitError::InvalidProperty {
                name: HOSTS_PROPERTY,
                reason: "value is blank; set it to the host of an Ignite node".to_string(),
            });
        }
        let ports = props.get_or(PORTS_PROPERTY, PORTS_DEFAULTS);
        Ok(Self {
            host: host.to_string(),
            ports: ports.to_string(),
            debug,
        })
    }

    /// `host:ports`, the discovery-range address. Only logged; the thin
    /// client connects through [`client_address`](Self::client_address).
    pub fn discovery_address(&self) -> String {
        format!("{}:{}", self.host, self.ports)
    }

    pub fn client_address(&self) -> String {
        format!("{}:{}", self.host, THIN_CLIENT_PORT)
    }
}

enum Session {
    Uninitialized,
    Ready {
        // keeps the session alive for as long as the cache handle is in use
        _client: Arc<dyn IgniteClient>,
        cache: Arc<dyn ClientCache>,
    },
    Closed,
}

/// Drives the `usertable` cache of an Ignite cluster through a thin client.
pub struct IgniteAdapter {
    properties: Properties,
    factory: Arc<dyn ClientFactory>,
    session: Session,
    debug: bool,
}

impl IgniteAdapter {
    pub fn new(properties: Properties) -> Self {
        Self::with_factory(properties, Arc::new(ThinClientFactory))
    }

    pub fn with_factory(properties: Properties, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            properties,
            factory,
            session: Session::Uninitialized,
            debug: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.session, Session::Ready { .. })
    }

    fn cache(&self, op: &str) -> Option<&Arc<dyn ClientCache>> {
        match &self.session {
            Session::Ready { cache, .. } => Some(cache),
            Session::Uninitialized | Session::Closed => {
                warn!("{} issued on an Ignite adapter that is not initialized", op);
                None
            }
        }
    }

    async fn connect(&self, settings: &IgniteSettings) -> Result<Session, InitError> {
        // 旧的发现地址，仅记录日志
        debug!(
            "Ignite discovery address {} (not used by the thin client)",
            settings.discovery_address()
        );

        info!("Start Ignite client.");
        let address = settings.client_address();
        let config = ClientConfiguration::new().set_addresses([address.clone()]);
        let client = self
            .factory
            .start_client(&config)
            .await
            .map_err(|e| InitError::Connect {
                address: address.clone(),
                source: e.into(),
            })?;
        let cache = client
            .cache(DEFAULT_CACHE_NAME)
            .await
            .map_err(|e| InitError::Connect {
                address,
                source: e.into(),
            })?
            .ok_or_else(|| InitError::CacheNotFound(DEFAULT_CACHE_NAME.to_string()))?;
        if settings.debug {
            info!("Resolved Ignite cache {}", cache.name());
        }

        Ok(Session::Ready {
            _client: client,
            cache,
        })
    }
}

#[async_trait]
impl DbAdapter for IgniteAdapter {
    fn driver_name(&self) -> &'static str {
        DRIVER
    }

    async fn init(&mut self) -> Result<(), DbError> {
        if self.is_ready() {
            return Err(DbError::AlreadyInitialized { driver: DRIVER });
        }

        let settings = IgniteSettings::from_properties(&self.properties)
            .map_err(|e| DbError::init(DRIVER, e))?;
        self.debug = settings.debug;
        self.session = self
            .connect(&settings)
            .await
            .map_err(|e| DbError::init(DRIVER, e))?;
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), DbError> {
        if self.is_ready() && self.debug {
            info!("Releasing Ignite client");
        }
        self.session = Session::Closed;
        Ok(())
    }

    async fn read(
        &self,
        table: &str,
        key: &str,
        fields: Option<&HashSet<String>>,
        result: &mut Record,
    ) -> Status {
        let Some(cache) = self.cache("read") else {
            return Status::UnexpectedState;
        };
        if self.debug {
            info!("read table={} key={} fields={:?}", table, key, fields);
        }
        match cache.get(key).await {
            Ok(Some(record)) => {
                copy_fields(&record, fields, result);
                Status::Ok
            }
            Ok(None) => Status::NotFound,
            Err(e) => {
                error!("Error reading key {}: {:#}", key, e);
                Status::Error
            }
        }
    }

    async fn scan(
        &self,
        _table: &str,
        _start_key: &str,
        _record_count: usize,
        _fields: Option<&HashSet<String>>,
        _result: &mut Vec<Record>,
    ) -> Status {
        Status::NotImplemented
    }

    async fn update(&self, table: &str, key: &str, values: &Record) -> Status {
        let Some(cache) = self.cache("update") else {
            return Status::UnexpectedState;
        };
        if self.debug {
            info!("update table={} key={} fields={}", table, key, values.len());
        }
        let mut record = match cache.get(key).await {
            Ok(Some(record)) => record,
            Ok(None) => return Status::NotFound,
            Err(e) => {
                error!("Error updating key {}: {:#}", key, e);
                return Status::Error;
            }
        };
        merge_fields(&mut record, values);
        match cache.put(key, &record).await {
            Ok(()) => Status::Ok,
            Err(e) => {
                error!("Error updating key {}: {:#}", key, e);
                Status::Error
            }
        }
    }

    async fn insert(&self, table: &str, key: &str, values: &Record) -> Status {
        let Some(cache) = self.cache("insert") else {
            return Status::UnexpectedState;
        };
        if self.debug {
            info!("insert table={} key={} fields={}", table, key, values.len());
        }
        match cache.put(key, values).await {
            Ok(()) => Status::Ok,
            Err(e) => {
                error!("Error inserting key {}: {:#}", key, e);
                Status::Error
            }
        }
    }

    async fn delete(&self, table: &str, key: &str) -> Status {
        let Some(cache) = self.cache("delete") else {
            return Status::UnexpectedState;
        };
        if self.debug {
            info!("delete table={} key={}", table, key);
        }
        match cache.remove(key).await {
            Ok(_) => Status::Ok,
            Err(e) => {
                error!("Error deleting key {}: {:#}", key, e);
                Status::Error
            }
        }
    }
}
