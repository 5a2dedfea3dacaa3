//! # pdf-unlock-backend
//!
//! Backend job manager for in-browser PDF tools: the one operation a
//! browser sandbox cannot perform — removing a password from an encrypted
//! PDF — is offloaded to this service, which wraps an external `qpdf`
//! process with start/poll/cancel semantics.
//!
//! ## Design Philosophy
//!
//! - **Asynchronous** - start returns immediately; clients poll for results
//! - **Self-cleaning** - every job's temporary files are deleted exactly
//!   once, on delivery or by the periodic reaper
//! - **Rate-limited** - per-client request quota plus a separate cap on
//!   consecutive incorrect-password attempts
//! - **Library-first** - the HTTP server is a thin binary over this crate
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdf_unlock_backend::{api, Config, QpdfRunner};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::default());
//!     let runner = Arc::new(QpdfRunner::from_path().ok_or("qpdf not found in PATH")?);
//!
//!     // Serve the API (blocks until shutdown)
//!     api::start_api_server(config, runner).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Unlock job store and lifecycle
pub mod jobs;
/// Per-client rate limiting
pub mod rate_limit;
/// External qpdf process runner
pub mod runner;
/// Core shared types
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use jobs::JobStore;
pub use runner::{QpdfRunner, UnlockRunner};
pub use types::{JobId, JobStatus, UnlockErrorKind};
