//! Server binary: load configuration, locate qpdf, serve the unlock API.

use pdf_unlock_backend::{api, Config, Error, QpdfRunner, Result, UnlockRunner};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Optional single argument: path to a TOML config file
    let config = match std::env::args().nth(1) {
        Some(path) => load_config(&PathBuf::from(path))?,
        None => Config::default(),
    };
    config.validate()?;

    let runner: Arc<dyn UnlockRunner> = match &config.tools.qpdf_path {
        Some(path) => Arc::new(QpdfRunner::new(path.clone())),
        None => match QpdfRunner::from_path() {
            Some(runner) => Arc::new(runner),
            None => {
                // Keep serving: a missing tool fails individual jobs, it
                // does not crash the service.
                tracing::warn!("qpdf not found in PATH; unlock jobs will fail until installed");
                Arc::new(QpdfRunner::new(PathBuf::from("qpdf")))
            }
        },
    };

    api::start_api_server(Arc::new(config), runner).await
}

fn load_config(path: &PathBuf) -> Result<Config> {
    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
    toml::from_str(&raw).map_err(|e| Error::Config {
        message: e.to_string(),
        key: None,
    })
}
