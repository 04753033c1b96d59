use thiserror::Error;

/// Failures an adapter reports from `init`/`cleanup`.
///
/// Both kinds abort the worker that owns the adapter. Per-operation problems
/// never show up here; they come back as a [`Status`](crate::models::Status).
#[derive(Debug, Error)]
pub enum DbError {
    /// `init` called on an adapter that already holds a connection.
    #[error("{driver} adapter is already initialized; init runs once per instance")]
    AlreadyInitialized { driver: &'static str },

    #[error("{driver} initialization failed: {source}")]
    Init {
        driver: &'static str,
        #[source]
        source: InitError,
    },
}

#[derive(Debug, Error)]
pub enum InitError {
    #[error("required property \"{0}\" missing for Ignite cluster")]
    MissingProperty(&'static str),

    #[error("invalid value for property \"{name}\": {reason}")]
    InvalidProperty { name: &'static str, reason: String },

    #[error("failed to start client for {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to find cache {0}")]
    CacheNotFound(String),
}

impl DbError {
    pub fn init(driver: &'static str, source: InitError) -> Self {
        DbError::Init { driver, source }
    }

    /// The initialization cause, if this is an initialization failure.
    #[cfg(test)]
    pub fn init_cause(&self) -> Option<&InitError> {
        match self {
            DbError::Init { source, .. } => Some(source),
            DbError::AlreadyInitialized { .. } => None,
        }
    }
}
