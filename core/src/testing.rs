//! Scripted `HttpClient` for unit tests.

use std::collections::VecDeque;
use std::io::Read;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::http::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, RequestBody, Timeouts, TransportFailure,
};

/// A request as the scripted client saw it, with file bodies read into memory.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub declared_len: Option<u64>,
}

#[derive(Default)]
struct Script {
    replies: VecDeque<Result<HttpResponse, TransportFailure>>,
    requests: Vec<RecordedRequest>,
}

/// Replays queued replies in order and records every request. Clones share
/// the same script.
#[derive(Clone, Default)]
pub struct ScriptedClient {
    script: Arc<Mutex<Script>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: HttpResponse) {
        self.script.lock().unwrap().replies.push_back(Ok(response));
    }

    pub fn push_failure(&self, code: i32, message: &str) {
        self.script
            .lock()
            .unwrap()
            .replies
            .push_back(Err(TransportFailure {
                code,
                message: message.to_string(),
            }));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.script.lock().unwrap().requests.clone()
    }
}

impl HttpClient for ScriptedClient {
    fn execute(
        &self,
        request: HttpRequest,
        _timeouts: Timeouts,
    ) -> Result<HttpResponse, TransportFailure> {
        let (body, declared_len) = match request.body {
            RequestBody::Empty => (Vec::new(), None),
            RequestBody::Json(json) => (json.into_bytes(), None),
            RequestBody::File { mut file, len } => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf).unwrap();
                (buf, Some(len))
            }
        };

        let mut script = self.script.lock().unwrap();
        script.requests.push(RecordedRequest {
            method: request.method,
            url: request.url,
            headers: request.headers,
            body,
            declared_len,
        });
        script.replies.pop_front().unwrap_or_else(|| {
            Err(TransportFailure {
                code: 1,
                message: "no scripted reply left".to_string(),
            })
        })
    }
}

pub fn json_response(body: Value) -> HttpResponse {
    HttpResponse {
        status: 200,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: serde_json::to_vec(&body).unwrap(),
    }
}
