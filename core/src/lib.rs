//! Blocking client for the Convertio file-conversion API.
//!
//! # Overview
//! `Api` signs and issues single requests; `Conversion` drives one conversion
//! from start to downloaded result on top of it.
//!
//! ```no_run
//! use convertio_core::{Conversion, Step};
//! use serde_json::Map;
//!
//! # fn main() -> convertio_core::Result<()> {
//! let mut conversion = Conversion::new("your-api-key")?;
//! conversion.start("report.docx", "pdf", &Map::new())?.wait()?;
//! if conversion.step() == &Step::Finish {
//!     conversion.download("report.pdf")?.delete()?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//! - The network sits behind the `HttpClient` trait. `UreqClient` is the
//!   default; tests plug in their own.
//! - Requests and responses are plain data (`HttpRequest`, `HttpResponse`).
//! - Session operations take `&mut self` and return `Result<&mut Self>` so
//!   calls chain.

pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use api::{Api, ApiResponse};
pub use config::{ApiConfig, Protocol};
pub use error::{ConvertioError, Result};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RequestBody, UreqClient};
pub use session::{CancelToken, Conversion, POLL_INTERVAL};
pub use types::{InputKind, StartRequest, Step};
