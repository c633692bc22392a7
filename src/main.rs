use anyhow::Result;
use clap::Parser;
use duochat::backend::{ChatBackend, MemoryBackend, SupabaseBackend};
use duochat::config::{BackendConfig, Cli, Config};
use duochat::{logging, runtime, ui};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_cli(Cli::parse())?;
    logging::init(&config.log_filter, &config.log_path())?;

    let backend: Arc<dyn ChatBackend> = match &config.backend {
        BackendConfig::Supabase { url, anon_key } => {
            info!("using backend at {url}");
            Arc::new(SupabaseBackend::new(url, anon_key, config.session_path())?)
        }
        BackendConfig::Memory => {
            info!("using seeded in-memory backend");
            Arc::new(MemoryBackend::seed_demo())
        }
    };

    let mut terminal = ui::init_terminal()?;
    let result = runtime::run(&mut terminal, backend).await;
    ui::restore_terminal()?;

    if let Err(err) = result {
        eprintln!("Error: {err}");
    }
    Ok(())
}
