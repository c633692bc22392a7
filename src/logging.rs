use anyhow::Result;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Send tracing output to a file; the terminal belongs to the UI.
pub fn init(filter: &str, log_path: &Path) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(log_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
