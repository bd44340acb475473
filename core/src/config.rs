//! Connection settings for the Convertio API.
//!
//! Every field has a typed, validating setter. Setters check the new value
//! first and only then assign, so a rejected value never leaves the config
//! half-updated. `configure` applies a JSON options map through the same
//! setters and validates all recognized keys before applying any of them.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{ConvertioError, Result};
use crate::http::Timeouts;

pub const DEFAULT_HOST: &str = "api.convertio.co";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_TOTAL_TIMEOUT_SECS: u64 = 0;

pub const ENV_API_KEY: &str = "CONVERTIO_API_KEY";
pub const ENV_PROTOCOL: &str = "CONVERTIO_PROTOCOL";
pub const ENV_HOST: &str = "CONVERTIO_HOST";
pub const ENV_CONNECT_TIMEOUT: &str = "CONVERTIO_CONNECT_TIMEOUT";
pub const ENV_TOTAL_TIMEOUT: &str = "CONVERTIO_TOTAL_TIMEOUT";

/// URL scheme used to reach the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    Http,
    #[default]
    Https,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConvertioError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(ConvertioError::configuration(format!(
                "API protocol can be either http or https, got '{other}'"
            ))),
        }
    }
}

/// Settings shared by every request an `Api` issues.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiConfig {
    api_key: String,
    host: String,
    protocol: Protocol,
    connect_timeout: u64,
    total_timeout: u64,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_key", &"***")
            .field("host", &self.host)
            .field("protocol", &self.protocol)
            .field("connect_timeout", &self.connect_timeout)
            .field("total_timeout", &self.total_timeout)
            .finish()
    }
}

impl ApiConfig {
    /// Default settings for the given key. The key must be non-empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ConvertioError::configuration("API key parameter is empty"));
        }
        Ok(Self {
            api_key,
            host: DEFAULT_HOST.to_string(),
            protocol: Protocol::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            total_timeout: DEFAULT_TOTAL_TIMEOUT_SECS,
        })
    }

    /// Build a config from `CONVERTIO_*` environment variables.
    ///
    /// `CONVERTIO_API_KEY` is required; the others override defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup(ENV_API_KEY).ok_or_else(|| {
            ConvertioError::configuration(format!("{ENV_API_KEY} is not set"))
        })?;
        let mut config = Self::new(api_key)?;

        if let Some(protocol) = lookup(ENV_PROTOCOL) {
            config.set_protocol(protocol.parse()?);
        }
        if let Some(host) = lookup(ENV_HOST) {
            config.set_host(host)?;
        }
        if let Some(secs) = lookup(ENV_CONNECT_TIMEOUT) {
            config.set_connect_timeout(parse_env_secs(ENV_CONNECT_TIMEOUT, &secs)?)?;
        }
        if let Some(secs) = lookup(ENV_TOTAL_TIMEOUT) {
            config.set_total_timeout(parse_env_secs(ENV_TOTAL_TIMEOUT, &secs)?)?;
        }
        Ok(config)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Connect timeout in seconds.
    pub fn connect_timeout(&self) -> u64 {
        self.connect_timeout
    }

    /// Total request timeout in seconds, 0 = unbounded.
    pub fn total_timeout(&self) -> u64 {
        self.total_timeout
    }

    pub fn set_protocol(&mut self, protocol: Protocol) -> &mut Self {
        self.protocol = protocol;
        self
    }

    pub fn set_host(&mut self, host: impl Into<String>) -> Result<&mut Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(ConvertioError::configuration("API host can't be empty"));
        }
        self.host = host;
        Ok(self)
    }

    pub fn set_connect_timeout(&mut self, secs: i64) -> Result<&mut Self> {
        self.connect_timeout = non_negative("connect timeout", secs)?;
        Ok(self)
    }

    pub fn set_total_timeout(&mut self, secs: i64) -> Result<&mut Self> {
        self.total_timeout = non_negative("total timeout", secs)?;
        Ok(self)
    }

    /// Apply the recognized keys of `options`: `protocol`, `connectTimeout`
    /// and `totalTimeout`. Other keys are ignored. Nothing is applied unless
    /// every recognized value is valid.
    pub fn configure(&mut self, options: &Map<String, Value>) -> Result<&mut Self> {
        let protocol = options
            .get("protocol")
            .map(|value| match value.as_str() {
                Some(s) => s.parse::<Protocol>(),
                None => Err(ConvertioError::configuration(format!(
                    "API protocol must be a string, got {value}"
                ))),
            })
            .transpose()?;
        let connect_timeout = options
            .get("connectTimeout")
            .map(|value| timeout_value("connectTimeout", value))
            .transpose()?;
        let total_timeout = options
            .get("totalTimeout")
            .map(|value| timeout_value("totalTimeout", value))
            .transpose()?;

        if let Some(protocol) = protocol {
            self.set_protocol(protocol);
        }
        if let Some(secs) = connect_timeout {
            self.connect_timeout = secs;
        }
        if let Some(secs) = total_timeout {
            self.total_timeout = secs;
        }
        Ok(self)
    }

    /// Timeouts handed to the HTTP client. Zero means no limit.
    pub fn timeouts(&self) -> Timeouts {
        let secs = |s: u64| (s > 0).then(|| Duration::from_secs(s));
        Timeouts {
            connect: secs(self.connect_timeout),
            total: secs(self.total_timeout),
        }
    }
}

fn non_negative(name: &str, secs: i64) -> Result<u64> {
    u64::try_from(secs)
        .map_err(|_| ConvertioError::configuration(format!("{name} can't be negative")))
}

fn timeout_value(key: &str, value: &Value) -> Result<u64> {
    match value.as_i64() {
        Some(secs) => non_negative(key, secs),
        None => match value.as_u64() {
            Some(secs) => Ok(secs),
            None => Err(ConvertioError::configuration(format!(
                "{key} must be an integer number of seconds, got {value}"
            ))),
        },
    }
}

fn parse_env_secs(name: &str, raw: &str) -> Result<i64> {
    raw.trim().parse().map_err(|_| {
        ConvertioError::configuration(format!("{name} must be an integer, got '{raw}'"))
    })
}
