use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::settlement::DEFAULT_TRANSACTION_FEE;

const DEV_SESSION_SECRET: &str = "splitledger-dev-secret";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Mongo,
    Memory,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub store: StoreKind,
    pub mongodb_uri: Option<String>,
    pub database: String,
    pub bind_addr: SocketAddr,
    pub session_secret: String,
    pub settlement_delay: Duration,
    pub transaction_fee: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("You need to add the MONGODB_URI to the env")]
    MissingMongoUri,

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let store = match lookup("LEDGER_STORE").as_deref() {
            None | Some("mongo") => StoreKind::Mongo,
            Some("memory") => StoreKind::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LEDGER_STORE",
                    value: other.to_string(),
                })
            }
        };

        let mongodb_uri = lookup("MONGODB_URI");
        if store == StoreKind::Mongo && mongodb_uri.is_none() {
            return Err(ConfigError::MissingMongoUri);
        }

        let session_secret = lookup("SESSION_SECRET").unwrap_or_else(|| {
            warn!("SESSION_SECRET not set; using insecure dev default");
            DEV_SESSION_SECRET.to_string()
        });

        let delay_ms: u64 = parse(&lookup, "SETTLEMENT_DELAY_MS", 2000)?;
        let transaction_fee: f64 = parse(&lookup, "TRANSACTION_FEE", DEFAULT_TRANSACTION_FEE)?;
        if !transaction_fee.is_finite() || transaction_fee < 0.0 {
            return Err(ConfigError::Invalid {
                key: "TRANSACTION_FEE",
                value: transaction_fee.to_string(),
            });
        }

        Ok(Config {
            store,
            mongodb_uri,
            database: lookup("LEDGER_DATABASE").unwrap_or_else(|| "SplitLedger".to_string()),
            bind_addr: parse(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            session_secret,
            settlement_delay: Duration::from_millis(delay_ms),
            transaction_fee,
        })
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
