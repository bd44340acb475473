//! One conversion lifecycle on top of `Api`.
//!
//! # Design
//! `Conversion` owns the session state (id, step, progress, result) and
//! updates it from each response. The id is assigned once by the first
//! successful start; every later call needs it. The step only changes through
//! a start call or a status response from the service.
//!
//! `raw_start` records a service-reported error in the session state instead
//! of returning it, so a failed start can still be inspected through
//! `step()` and `error_message()`. Every other operation returns errors
//! directly. Nothing is retried.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::api::{Api, ApiResponse};
use crate::error::{ConvertioError, Result};
use crate::types::{ContentData, InputKind, StartData, StartRequest, StatusData, Step};

/// Delay between two status polls in `wait()`.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Longest stretch `CancelToken::sleep` goes without checking the flag.
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(50);

const EMPTY_RESULT: &str = "Empty result file";
const SAVE_FAILED: &str = "Error saving local file";

/// Stop flag for `Conversion::wait_with`. Clones share the flag, so one can
/// be handed to another thread and cancelled from there.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `total`, waking early with `Cancelled` if the flag is set.
    fn sleep(&self, total: Duration) -> Result<()> {
        let deadline = Instant::now() + total;
        loop {
            if self.is_cancelled() {
                return Err(ConvertioError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep((deadline - now).min(CANCEL_CHECK_INTERVAL));
        }
    }
}

/// A single conversion: start, poll, fetch, delete.
#[derive(Debug)]
pub struct Conversion {
    api: Api,
    conversion_id: Option<String>,
    step: Step,
    step_percent: u8,
    error_message: Option<String>,
    result_public_url: Option<String>,
    result_size: Option<u64>,
    result_content: Option<Vec<u8>>,
    last_response: Option<ApiResponse>,
    poll_interval: Duration,
}

impl Conversion {
    /// New session over the default `ureq` transport.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self::with_api(Api::new(api_key)?))
    }

    /// New session configured from `CONVERTIO_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self::with_api(Api::from_env()?))
    }

    pub fn with_api(api: Api) -> Self {
        Self {
            api,
            conversion_id: None,
            step: Step::NotStarted,
            step_percent: 0,
            error_message: None,
            result_public_url: None,
            result_size: None,
            result_content: None,
            last_response: None,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Override the delay `wait()` sleeps between polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut Api {
        &mut self.api
    }

    pub fn convert_id(&self) -> Option<&str> {
        self.conversion_id.as_deref()
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    pub fn step_percent(&self) -> u8 {
        self.step_percent
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn result_public_url(&self) -> Option<&str> {
        self.result_public_url.as_deref()
    }

    pub fn result_size(&self) -> Option<u64> {
        self.result_size
    }

    pub fn result_content(&self) -> Option<&[u8]> {
        self.result_content.as_deref()
    }

    pub fn last_response(&self) -> Option<&ApiResponse> {
        self.last_response.as_ref()
    }

    fn require_id(&self) -> Result<String> {
        match self.conversion_id.as_deref() {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(ConvertioError::NotStarted),
        }
    }

    fn ensure_not_started(&self) -> Result<()> {
        if self.step == Step::NotStarted && self.conversion_id.is_none() {
            Ok(())
        } else {
            Err(ConvertioError::AlreadyStarted)
        }
    }

    /// Upload a local file and start converting it to `output_format`.
    ///
    /// The path is checked before any request is made. If the service rejects
    /// the start, the session moves to `Step::Error` and nothing is uploaded.
    pub fn start(
        &mut self,
        input_path: impl AsRef<Path>,
        output_format: &str,
        options: &Map<String, Value>,
    ) -> Result<&mut Self> {
        let path = input_path.as_ref();
        self.ensure_not_started()?;
        if !path.is_file() {
            return Err(ConvertioError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        self.raw_start(&StartRequest {
            input: InputKind::Upload,
            file: None,
            filename: None,
            outputformat: output_format.to_string(),
            options: options.clone(),
        })?;
        if self.step == Step::Error {
            return Ok(self);
        }

        let id = self.require_id()?;
        let io_err = |source| ConvertioError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        let len = file.metadata().map_err(io_err)?.len();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        info!(id = %id, file = %path.display(), bytes = len, "uploading source file");
        let response = self.api.put(
            &format!("/convert/{id}/{}", urlencoding::encode(&filename)),
            file,
            len,
        )?;
        self.last_response = Some(response);
        Ok(self)
    }

    /// Start converting the document or web page at `url`.
    pub fn start_from_url(
        &mut self,
        url: &str,
        output_format: &str,
        options: &Map<String, Value>,
    ) -> Result<&mut Self> {
        self.raw_start(&StartRequest {
            input: InputKind::Url,
            file: Some(url.to_string()),
            filename: None,
            outputformat: output_format.to_string(),
            options: options.clone(),
        })
    }

    /// Start converting in-memory `content`, sent base64-encoded as
    /// `raw.<input_format>`.
    pub fn start_from_content(
        &mut self,
        content: &[u8],
        input_format: &str,
        output_format: &str,
        options: &Map<String, Value>,
    ) -> Result<&mut Self> {
        self.raw_start(&StartRequest {
            input: InputKind::Base64,
            file: Some(STANDARD.encode(content)),
            filename: Some(format!("raw.{input_format}")),
            outputformat: output_format.to_string(),
            options: options.clone(),
        })
    }

    /// POST `/convert` with `request`.
    ///
    /// A service error is stored in the session (`Step::Error` plus the
    /// message) and `Ok` is returned. Transport and protocol errors are
    /// returned as usual.
    pub fn raw_start(&mut self, request: &StartRequest) -> Result<&mut Self> {
        self.ensure_not_started()?;
        match self.api.post("/convert", request) {
            Ok(response) => {
                let data: StartData = response.data()?;
                if data.id.is_empty() {
                    return Err(ConvertioError::protocol("start response has an empty id"));
                }
                info!(id = %data.id, output = %request.outputformat, "conversion started");
                self.conversion_id = Some(data.id);
                self.step = Step::Convert;
                self.step_percent = 0;
                self.error_message = None;
                self.last_response = Some(response);
            }
            Err(ConvertioError::Service { message, code }) => {
                warn!(error = %message, "service rejected conversion start");
                self.last_response = Some(ApiResponse::Json(json!({
                    "status": "error",
                    "error": message,
                    "code": code,
                })));
                self.step = Step::Error;
                self.error_message = Some(message);
            }
            Err(e) => return Err(e),
        }
        Ok(self)
    }

    /// Refresh step and progress from `GET /convert/{id}/status`.
    pub fn status(&mut self) -> Result<&mut Self> {
        let id = self.require_id()?;
        let response = match self.api.get(&format!("/convert/{id}/status")) {
            Ok(response) => response,
            Err(ConvertioError::Service { message, code }) => {
                warn!(id = %id, error = %message, "conversion failed");
                self.step = Step::Error;
                self.error_message = Some(message.clone());
                return Err(ConvertioError::Service { message, code });
            }
            Err(e) => return Err(e),
        };

        let data: StatusData = response.data()?;
        debug!(id = %id, step = %data.step, percent = ?data.step_percent, "status");

        self.error_message = None;
        self.step_percent = data.step_percent.unwrap_or(0).min(100) as u8;
        if data.step == Step::Finish {
            if let Some(output) = data.output {
                self.result_public_url = output.url;
                self.result_size = output.size;
            }
            info!(id = %id, size = ?self.result_size, "conversion finished");
        }
        self.step = data.step;
        self.last_response = Some(response);
        Ok(self)
    }

    /// Poll `status()` every 500 ms until the step is `finish` or `error`.
    ///
    /// Returns immediately when already terminal. There is no upper bound on
    /// the number of polls; use `wait_with` to be able to stop early.
    pub fn wait(&mut self) -> Result<&mut Self> {
        self.wait_with(&CancelToken::new())
    }

    /// `wait()` that returns `Cancelled` once `cancel` is set. The token is
    /// checked during every sleep and before every poll.
    pub fn wait_with(&mut self, cancel: &CancelToken) -> Result<&mut Self> {
        if !self.step.is_terminal() {
            self.require_id()?;
        }
        while !self.step.is_terminal() {
            cancel.sleep(self.poll_interval)?;
            self.status()?;
        }
        Ok(self)
    }

    /// Fetch the converted file into `result_content()`.
    pub fn fetch_result_content(&mut self) -> Result<&mut Self> {
        let id = self.require_id()?;
        let response = self.api.get(&format!("/convert/{id}/dl/base64"))?;
        let data: ContentData = response.data()?;
        self.last_response = Some(response);

        let content = STANDARD
            .decode(data.content.trim())
            .map_err(|e| ConvertioError::protocol(format!("result is not valid base64: {e}")))?;
        if content.is_empty() {
            self.result_content = None;
            return Err(ConvertioError::service(EMPTY_RESULT));
        }

        debug!(id = %id, bytes = content.len(), "fetched result content");
        self.result_content = Some(content);
        Ok(self)
    }

    /// Fetch the converted file and write it to `local_path`.
    ///
    /// The file is only created once non-empty content is in hand, and is
    /// checked to exist with a non-zero size after writing. Failures are
    /// returned only; `step` and `error_message()` keep describing the
    /// conversion itself.
    pub fn download(&mut self, local_path: impl AsRef<Path>) -> Result<&mut Self> {
        let path = local_path.as_ref();
        self.fetch_result_content()?;
        let content = self
            .result_content
            .as_deref()
            .ok_or_else(|| ConvertioError::service(EMPTY_RESULT))?;

        if let Err(e) = write_file(path, content) {
            warn!(file = %path.display(), error = %e, "failed to save result");
            return Err(ConvertioError::service(SAVE_FAILED));
        }
        let saved = fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);
        if saved == 0 {
            return Err(ConvertioError::service(SAVE_FAILED));
        }

        info!(file = %path.display(), bytes = saved, "result saved");
        Ok(self)
    }

    /// Delete the conversion and its files on the service. The response body
    /// is ignored.
    pub fn delete(&mut self) -> Result<&mut Self> {
        let id = self.require_id()?;
        self.api.delete(&format!("/convert/{id}"))?;
        info!(id = %id, "conversion deleted");
        Ok(self)
    }
}

fn write_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content)?;
    file.sync_all()
}
