//! Transport wrapper around the Convertio REST API.
//!
//! # Design
//! `Api` holds only its configuration and an `HttpClient`; it carries no state
//! between calls. Each verb is split into `build_request` (URL resolution,
//! headers, body) and `parse_response` (content-type dispatch, service-error
//! detection), with a single network round trip in between. Nothing is
//! retried or cached.

use std::fmt;
use std::fs::File;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::{ApiConfig, Protocol};
use crate::error::{ConvertioError, Result};
use crate::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RequestBody, UreqClient};
use crate::types::Envelope;

/// Decoded result of one API call.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// The response declared a JSON content type and decoded cleanly.
    Json(Value),
    /// Any other response body, returned untouched.
    Raw(Vec<u8>),
}

impl ApiResponse {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ApiResponse::Json(value) => Some(value),
            ApiResponse::Raw(_) => None,
        }
    }

    /// Decode the `data` member of a JSON response into `T`.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self
            .as_json()
            .ok_or_else(|| ConvertioError::protocol("expected a JSON response"))?;
        let data = value
            .get("data")
            .cloned()
            .ok_or_else(|| ConvertioError::protocol("response has no 'data' member"))?;
        serde_json::from_value(data)
            .map_err(|e| ConvertioError::protocol(format!("unexpected 'data' shape: {e}")))
    }
}

/// Stateless client for the Convertio API.
pub struct Api {
    config: ApiConfig,
    client: Box<dyn HttpClient>,
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api").field("config", &self.config).finish()
    }
}

impl Api {
    /// Default configuration over the blocking `ureq` client.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_client(api_key, UreqClient)
    }

    pub fn with_client(
        api_key: impl Into<String>,
        client: impl HttpClient + 'static,
    ) -> Result<Self> {
        Ok(Self::from_config(ApiConfig::new(api_key)?, client))
    }

    pub fn from_config(config: ApiConfig, client: impl HttpClient + 'static) -> Self {
        Self {
            config,
            client: Box::new(client),
        }
    }

    /// Configuration from `CONVERTIO_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_config(ApiConfig::from_env()?, UreqClient))
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Mutable access for the validating setters on `ApiConfig`.
    pub fn config_mut(&mut self) -> &mut ApiConfig {
        &mut self.config
    }

    pub fn api_key(&self) -> &str {
        self.config.api_key()
    }

    /// Apply `protocol`, `connectTimeout` and `totalTimeout` from `options`.
    pub fn configure(&mut self, options: &Map<String, Value>) -> Result<&mut Self> {
        self.config.configure(options)?;
        Ok(self)
    }

    pub fn set_protocol(&mut self, protocol: Protocol) -> &mut Self {
        self.config.set_protocol(protocol);
        self
    }

    /// Turn an API path into an absolute URL.
    ///
    /// `//host/x` takes the configured protocol, anything starting with
    /// `http` is already absolute, and the rest is appended to the host.
    pub fn resolve_url(&self, path: &str) -> String {
        let protocol = self.config.protocol();
        if path.starts_with("//") {
            format!("{protocol}:{path}")
        } else if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{protocol}://{}{path}", self.config.host())
        }
    }

    pub fn build_request(&self, method: HttpMethod, path: &str, body: RequestBody) -> HttpRequest {
        let content_type = match &body {
            RequestBody::Empty => None,
            RequestBody::Json(_) => Some("application/json"),
            RequestBody::File { .. } => Some("application/octet-stream"),
        };
        HttpRequest {
            method,
            url: self.resolve_url(path),
            headers: content_type
                .map(|ct| vec![("content-type".to_string(), ct.to_string())])
                .unwrap_or_default(),
            body,
        }
    }

    /// Interpret a response: JSON is decoded and checked for `status: error`,
    /// anything else comes back raw.
    pub fn parse_response(&self, response: HttpResponse) -> Result<ApiResponse> {
        let is_json = response
            .content_type()
            .is_some_and(|ct| ct.contains("application/json"));

        if !is_json {
            if response.status >= 400 {
                warn!(status = response.status, "non-JSON error response");
            }
            return Ok(ApiResponse::Raw(response.body));
        }

        let value: Value = serde_json::from_slice(&response.body)
            .map_err(|e| ConvertioError::protocol(format!("error parsing JSON response: {e}")))?;

        // Bodies without a string `status` are not envelopes and pass through.
        if let Some(envelope) = Envelope::deserialize(&value)
            .ok()
            .filter(Envelope::is_error)
        {
            return Err(ConvertioError::Service {
                message: envelope
                    .error
                    .unwrap_or_else(|| "unknown service error".to_string()),
                code: envelope.code,
            });
        }

        Ok(ApiResponse::Json(value))
    }

    fn call(&self, method: HttpMethod, path: &str, body: RequestBody) -> Result<ApiResponse> {
        let request = self.build_request(method, path, body);
        debug!(method = method.as_str(), path, "calling Convertio API");
        let response = self
            .client
            .execute(request, self.config.timeouts())
            .map_err(|failure| {
                warn!(code = failure.code, error = %failure.message, "transport failure");
                ConvertioError::Transport {
                    code: failure.code,
                    message: failure.message,
                }
            })?;
        self.parse_response(response)
    }

    pub fn get(&self, path: &str) -> Result<ApiResponse> {
        self.call(HttpMethod::Get, path, RequestBody::Empty)
    }

    /// POST `payload` as JSON with the API key added as `apikey`.
    pub fn post<T: Serialize>(&self, path: &str, payload: &T) -> Result<ApiResponse> {
        let mut body = match serde_json::to_value(payload) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(ConvertioError::protocol(format!(
                    "POST payload must be a JSON object, got {other}"
                )))
            }
            Err(e) => {
                return Err(ConvertioError::protocol(format!(
                    "failed to serialize payload: {e}"
                )))
            }
        };
        body.insert(
            "apikey".to_string(),
            Value::String(self.config.api_key().to_string()),
        );
        let json = serde_json::to_string(&body)
            .map_err(|e| ConvertioError::protocol(format!("failed to serialize payload: {e}")))?;
        self.call(HttpMethod::Post, path, RequestBody::Json(json))
    }

    /// PUT the contents of `file` (`len` bytes) as the raw request body.
    pub fn put(&self, path: &str, file: File, len: u64) -> Result<ApiResponse> {
        self.call(HttpMethod::Put, path, RequestBody::File { file, len })
    }

    pub fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.call(HttpMethod::Delete, path, RequestBody::Empty)
    }
}
