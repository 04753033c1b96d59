use std::collections::BTreeMap;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Backend adapter to drive
    #[arg(long = "db", value_enum, default_value_t = Driver::Ignite)]
    pub driver: Driver,

    /// Adapter property as key=value (repeatable), e.g. -p hosts=127.0.0.1
    #[arg(short = 'p', long = "property", value_parser = parse_property)]
    pub properties: Vec<(String, String)>,

    /// Table name handed to every operation
    #[arg(short = 't', long, default_value = "usertable")]
    pub table: String,

    /// Key used by the probe cycle
    #[arg(short = 'k', long, default_value = "kvbench-probe")]
    pub key: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Ignite,
    Basic,
}

impl Config {
    pub fn driver(&self) -> Driver {
        self.driver
    }

    pub fn properties(&self) -> Properties {
        Properties::from_pairs(self.properties.iter().cloned())
    }
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got \"{}\"", raw)),
    }
}

/// Flat string-to-string option mapping handed to an adapter.
///
/// Read once during `init`; nothing mutates it afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    /// Later pairs win over earlier ones with the same key.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Only a case-insensitive "true" counts as true; anything else is false.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) => v.trim().eq_ignore_ascii_case("true"),
            None => default,
        }
    }

    pub fn get_u64(&self, key: &str, default: u64) -> anyhow::Result<u64> {
        match self.get(key) {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid value \"{}\" for property \"{}\": {}", v, key, e)),
            None => Ok(default),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
