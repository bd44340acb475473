use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Output format the mock accepts at start but fails during conversion.
pub const FAILING_FORMAT: &str = "broken";
/// Output format the mock rejects at start.
pub const UNSUPPORTED_FORMAT: &str = "unsupported";

#[derive(Clone, Debug)]
pub struct MockConfig {
    pub api_key: String,
    /// Status polls answered with `convert` before a job reports `finish`.
    pub polls_to_finish: u32,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            api_key: "test-key".to_string(),
            polls_to_finish: 2,
        }
    }
}

/// One conversion held by the mock. The "converted" result is the input
/// bytes unchanged.
#[derive(Clone, Debug, Serialize)]
pub struct Job {
    pub id: String,
    pub input: String,
    pub outputformat: String,
    pub filename: Option<String>,
    #[serde(skip)]
    pub content: Option<Vec<u8>>,
    pub polls: u32,
}

#[derive(Deserialize)]
pub struct StartBody {
    pub apikey: Option<String>,
    pub input: Option<String>,
    pub file: Option<String>,
    pub filename: Option<String>,
    pub outputformat: Option<String>,
    #[serde(default)]
    pub options: Option<Value>,
}

pub struct AppState {
    pub config: MockConfig,
    pub jobs: RwLock<HashMap<String, Job>>,
}

pub type Db = Arc<AppState>;

type Reply = (StatusCode, Json<Value>);

pub fn app() -> Router {
    app_with(MockConfig::default())
}

pub fn app_with(config: MockConfig) -> Router {
    let db: Db = Arc::new(AppState {
        config,
        jobs: RwLock::new(HashMap::new()),
    });
    Router::new()
        .route("/convert", post(start_conversion))
        .route("/convert/{id}", axum::routing::delete(delete_conversion))
        .route("/convert/{id}/status", get(conversion_status))
        .route("/convert/{id}/dl/base64", get(download_base64))
        .route("/convert/{id}/{filename}", put(upload_file))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with(listener, MockConfig::default()).await
}

pub async fn run_with(listener: TcpListener, config: MockConfig) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(config)).await
}

fn ok(data: Value) -> Reply {
    (
        StatusCode::OK,
        Json(json!({ "code": 200, "status": "ok", "data": data })),
    )
}

fn error(status: StatusCode, message: &str) -> Reply {
    (
        status,
        Json(json!({ "code": status.as_u16(), "status": "error", "error": message })),
    )
}

fn public_url(job: &Job) -> String {
    format!(
        "https://mock.convertio.local/dl/{}/result.{}",
        job.id, job.outputformat
    )
}

async fn start_conversion(State(db): State<Db>, body: Bytes) -> Reply {
    let input: StartBody = match serde_json::from_slice(&body) {
        Ok(input) => input,
        Err(_) => return error(StatusCode::BAD_REQUEST, "Invalid JSON request"),
    };
    if input.apikey.as_deref() != Some(db.config.api_key.as_str()) {
        return error(StatusCode::UNAUTHORIZED, "Invalid API Key");
    }
    let Some(outputformat) = input.outputformat else {
        return error(StatusCode::BAD_REQUEST, "Output format is not set");
    };
    if outputformat == UNSUPPORTED_FORMAT {
        return error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "This type of conversion is not supported",
        );
    }

    let kind = input.input.unwrap_or_default();
    let content = match kind.as_str() {
        "upload" => None,
        "url" => match input.file {
            Some(url) => Some(url.into_bytes()),
            None => return error(StatusCode::BAD_REQUEST, "File URL is not set"),
        },
        "base64" => {
            if input.filename.is_none() {
                return error(StatusCode::BAD_REQUEST, "Filename is not set");
            }
            match input.file.as_deref().map(|f| STANDARD.decode(f)) {
                Some(Ok(bytes)) => Some(bytes),
                _ => return error(StatusCode::BAD_REQUEST, "Invalid base64 file content"),
            }
        }
        _ => return error(StatusCode::BAD_REQUEST, "Unknown input type"),
    };

    let job = Job {
        id: Uuid::new_v4().simple().to_string(),
        input: kind,
        outputformat,
        filename: input.filename,
        content,
        polls: 0,
    };
    info!(id = %job.id, input = %job.input, options = ?input.options, "conversion started");
    let id = job.id.clone();
    db.jobs.write().await.insert(id.clone(), job);
    ok(json!({ "id": id, "minutes": 1 }))
}

async fn upload_file(
    State(db): State<Db>,
    Path((id, filename)): Path<(String, String)>,
    body: Bytes,
) -> Reply {
    let mut jobs = db.jobs.write().await;
    let Some(job) = jobs.get_mut(&id) else {
        return error(StatusCode::NOT_FOUND, "Conversion not found");
    };
    if job.input != "upload" {
        return error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Conversion does not expect an upload",
        );
    }
    debug!(id = %id, file = %filename, bytes = body.len(), "file uploaded");
    job.filename = Some(filename.clone());
    job.content = Some(body.to_vec());
    ok(json!({ "id": id, "file": filename, "size": body.len() }))
}

async fn conversion_status(State(db): State<Db>, Path(id): Path<String>) -> Reply {
    let polls_to_finish = db.config.polls_to_finish;
    let mut jobs = db.jobs.write().await;
    let Some(job) = jobs.get_mut(&id) else {
        return error(StatusCode::NOT_FOUND, "Conversion not found");
    };
    if job.content.is_none() {
        return ok(json!({ "id": id, "step": "upload", "step_percent": 0 }));
    }

    job.polls += 1;
    if job.polls <= polls_to_finish {
        let percent = job.polls * 100 / (polls_to_finish + 1);
        return ok(json!({ "id": id, "step": "convert", "step_percent": percent }));
    }
    if job.outputformat == FAILING_FORMAT {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "Conversion failed");
    }

    let size = job.content.as_ref().map_or(0, Vec::len);
    ok(json!({
        "id": id,
        "step": "finish",
        "step_percent": 100,
        "minutes": 1,
        "output": { "url": public_url(job), "size": size.to_string() }
    }))
}

async fn download_base64(State(db): State<Db>, Path(id): Path<String>) -> Reply {
    let jobs = db.jobs.read().await;
    let Some(job) = jobs.get(&id) else {
        return error(StatusCode::NOT_FOUND, "Conversion not found");
    };
    if job.polls <= db.config.polls_to_finish || job.outputformat == FAILING_FORMAT {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "Conversion is not finished");
    }
    let content = job.content.as_deref().map(|c| STANDARD.encode(c)).unwrap_or_default();
    ok(json!({ "id": id, "encode": "base64", "content": content }))
}

async fn delete_conversion(State(db): State<Db>, Path(id): Path<String>) -> Reply {
    match db.jobs.write().await.remove(&id) {
        Some(_) => {
            info!(id = %id, "conversion deleted");
            ok(json!({ "id": id }))
        }
        None => error(StatusCode::NOT_FOUND, "Conversion not found"),
    }
}
