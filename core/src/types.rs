//! Wire DTOs for the Convertio API.
//!
//! Every response shares the envelope `{status, data?, error?, code?}`. The
//! `data` object differs per endpoint and is decoded into the endpoint's own
//! type once the envelope reports `ok`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Coarse lifecycle phase of a conversion.
///
/// Only four steps drive client behaviour. Everything else the service
/// reports (`upload`, `wait`, ...) is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Step {
    #[default]
    NotStarted,
    Convert,
    Finish,
    Error,
    Other(String),
}

impl Step {
    /// `finish` and `error` end `wait()`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::Finish | Step::Error)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Step::NotStarted => "not-started",
            Step::Convert => "convert",
            Step::Finish => "finish",
            Step::Error => "error",
            Step::Other(s) => s,
        }
    }
}

impl From<&str> for Step {
    fn from(s: &str) -> Self {
        match s {
            "convert" => Step::Convert,
            "finish" => Step::Finish,
            "error" => Step::Error,
            other => Step::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Step::from(raw.as_str()))
    }
}

/// How the source file reaches the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// Bytes follow in a separate PUT.
    Upload,
    /// The service fetches `file` itself.
    Url,
    /// `file` holds base64-encoded bytes.
    Base64,
}

/// Body of `POST /convert`. The API key is injected by `Api::post`.
#[derive(Debug, Clone, Serialize)]
pub struct StartRequest {
    pub input: InputKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub outputformat: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

/// Status fields of the response envelope shared by every endpoint.
///
/// `error` and `code` are read leniently: an error reply is still an error
/// reply when the service sends the code as a string.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub status: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub code: Option<i64>,
}

impl Envelope {
    pub fn is_error(&self) -> bool {
        self.status == "error"
    }
}

/// `data` of a successful `POST /convert`.
#[derive(Debug, Clone, Deserialize)]
pub struct StartData {
    pub id: String,
}

/// `data` of `GET /convert/{id}/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub step: Step,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub step_percent: Option<u64>,
    #[serde(default)]
    pub output: Option<OutputInfo>,
}

/// Result file details, present once the step is `finish`.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputInfo {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub size: Option<u64>,
}

/// `data` of `GET /convert/{id}/dl/base64`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentData {
    pub content: String,
}

// The service sends sizes and percentages as numbers or numeric strings.
fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

// Non-string error payloads are kept as their JSON text.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
