//! HTTP transport types and the default blocking client.
//!
//! # Design
//! Requests and responses are plain data. `Api` builds an `HttpRequest`,
//! hands it to an `HttpClient`, and interprets the returned `HttpResponse`.
//! The client is the only piece that touches the network, so tests swap in a
//! scripted implementation and the rest of the crate stays deterministic.
//!
//! `UreqClient` is the production client. It never turns HTTP status codes
//! into errors: the Convertio API reports failures in the JSON body, and only
//! network-level failures surface as `TransportFailure`.

use std::fs::File;
use std::time::Duration;

use tracing::debug;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Request payload.
///
/// `File` carries an open handle so the upload streams from disk. The handle
/// is owned by the request and closed when the request is dropped.
#[derive(Debug)]
pub enum RequestBody {
    Empty,
    Json(String),
    File { file: File, len: u64 },
}

/// An HTTP request described as plain data.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Value of the `Content-Type` header, matched case-insensitively.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }
}

/// Connect and total timeouts for one call. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Option<Duration>,
    pub total: Option<Duration>,
}

/// A network-level failure: no HTTP response was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub code: i32,
    pub message: String,
}

/// Executes one HTTP round trip.
///
/// Implementations must return `Ok` for every response that arrived,
/// whatever its status code.
pub trait HttpClient: Send + Sync {
    fn execute(
        &self,
        request: HttpRequest,
        timeouts: Timeouts,
    ) -> Result<HttpResponse, TransportFailure>;
}

// Numeric codes reported in `TransportFailure`, matching the libcurl values
// users of other Convertio clients already know.
const CODE_UNSUPPORTED: i32 = 1;
const CODE_BAD_URL: i32 = 3;
const CODE_HOST_NOT_FOUND: i32 = 6;
const CODE_CONNECT_FAILED: i32 = 7;
const CODE_TIMEOUT: i32 = 28;
const CODE_TLS: i32 = 35;
const CODE_RECV: i32 = 56;

/// Blocking `HttpClient` backed by `ureq`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UreqClient;

impl UreqClient {
    fn agent(timeouts: Timeouts) -> ureq::Agent {
        ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(timeouts.connect)
            .timeout_global(timeouts.total)
            .build()
            .new_agent()
    }
}

fn with_headers<B>(
    builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    headers
        .iter()
        .fold(builder, |b, (name, value)| b.header(name.as_str(), value.as_str()))
}

impl HttpClient for UreqClient {
    fn execute(
        &self,
        request: HttpRequest,
        timeouts: Timeouts,
    ) -> Result<HttpResponse, TransportFailure> {
        let agent = Self::agent(timeouts);
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        debug!(method = method.as_str(), %url, "sending request");

        let result = match (method, body) {
            (HttpMethod::Get, _) => with_headers(agent.get(&url), &headers).call(),
            (HttpMethod::Delete, _) => with_headers(agent.delete(&url), &headers).call(),
            (HttpMethod::Post, RequestBody::Json(json)) => {
                with_headers(agent.post(&url), &headers).send(json.as_bytes())
            }
            (HttpMethod::Put, RequestBody::Json(json)) => {
                with_headers(agent.put(&url), &headers).send(json.as_bytes())
            }
            (HttpMethod::Post, RequestBody::File { mut file, len })
            | (HttpMethod::Put, RequestBody::File { mut file, len }) => {
                let builder = match method {
                    HttpMethod::Post => agent.post(&url),
                    _ => agent.put(&url),
                };
                with_headers(builder, &headers)
                    .header("content-length", len.to_string())
                    .send(ureq::SendBody::from_reader(&mut file))
            }
            (HttpMethod::Post, RequestBody::Empty) => {
                with_headers(agent.post(&url), &headers).send_empty()
            }
            (HttpMethod::Put, RequestBody::Empty) => {
                with_headers(agent.put(&url), &headers).send_empty()
            }
        };

        let mut response = result.map_err(failure_from)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()
            .map_err(failure_from)?;

        debug!(status, bytes = body.len(), "received response");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn failure_from(err: ureq::Error) -> TransportFailure {
    let code = match &err {
        ureq::Error::Timeout(_) => CODE_TIMEOUT,
        ureq::Error::HostNotFound => CODE_HOST_NOT_FOUND,
        ureq::Error::ConnectionFailed => CODE_CONNECT_FAILED,
        ureq::Error::BadUri(_) => CODE_BAD_URL,
        ureq::Error::Tls(_) => CODE_TLS,
        ureq::Error::Io(_) => CODE_RECV,
        _ => CODE_UNSUPPORTED,
    };
    TransportFailure {
        code,
        message: err.to_string(),
    }
}
