//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Address used when none is configured.
pub const DEFAULT_ADDR: &str = "127.0.0.1:7379";

/// Idle connections kept by the pool when none is configured.
pub const DEFAULT_POOL_SIZE: usize = 100;

/// Configuration for the client and its pool.
///
/// Timeouts are (de)serialized as whole milliseconds. Missing fields take
/// their defaults, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address, e.g. "127.0.0.1:7379".
    pub addr: String,
    /// Database selected right after dial; 0 skips SELECT.
    pub db: u32,
    /// Password sent with AUTH right after dial.
    pub password: Option<String>,
    /// Maximum number of idle connections kept for reuse.
    pub pool_size: usize,
    /// Optional TCP connect timeout.
    #[serde(with = "millis")]
    pub connect_timeout: Option<Duration>,
    /// Optional TCP read timeout. Pub/sub connections ignore it.
    #[serde(with = "millis")]
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    #[serde(with = "millis")]
    pub write_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: DEFAULT_ADDR.to_string(),
            db: 0,
            password: None,
            pool_size: DEFAULT_POOL_SIZE,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `addr`.
    pub fn new(addr: impl Into<String>) -> Self {
        ClientConfig {
            addr: addr.into(),
            ..ClientConfig::default()
        }
    }

    /// Parses a JSON document such as `{"addr": "10.0.0.5:7379", "db": 2}`.
    pub fn from_json(raw: &str) -> ClientResult<Self> {
        serde_json::from_str(raw).map_err(|err| ClientError::Config(err.to_string()))
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
