use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "duochat", about = "Two-person direct messaging in the terminal")]
pub struct Cli {
    /// Backend project URL, e.g. https://myproject.supabase.co
    #[arg(long, env = "DUOCHAT_URL")]
    pub url: Option<String>,

    /// Backend anon API key
    #[arg(long, env = "DUOCHAT_ANON_KEY")]
    pub anon_key: Option<String>,

    /// Run against a seeded in-memory backend instead of a real one
    #[arg(long)]
    pub offline: bool,

    /// Log filter directive, e.g. "info" or "duochat=debug"
    #[arg(long, env = "DUOCHAT_LOG", default_value = "info")]
    pub log: String,
}

#[derive(Debug, Clone)]
pub enum BackendConfig {
    Supabase { url: String, anon_key: String },
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    pub log_filter: String,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let backend = if cli.offline {
            BackendConfig::Memory
        } else {
            match (cli.url, cli.anon_key) {
                (Some(url), Some(anon_key)) => BackendConfig::Supabase { url, anon_key },
                _ => bail!(
                    "a backend is required: pass --url and --anon-key (or set \
                     DUOCHAT_URL / DUOCHAT_ANON_KEY), or use --offline"
                ),
            }
        };

        let data_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("duochat");

        Ok(Self { backend, log_filter: cli.log, data_dir })
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("duochat.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_needs_no_backend_settings() {
        let cli = Cli::parse_from(["duochat", "--offline"]);
        let config = Config::from_cli(cli).unwrap();
        assert!(matches!(config.backend, BackendConfig::Memory));
    }

    #[test]
    fn test_url_without_key_is_rejected() {
        let cli = Cli::parse_from(["duochat", "--url", "https://x.supabase.co"]);
        assert!(Config::from_cli(cli).is_err());
    }

    #[test]
    fn test_full_backend_settings() {
        let cli = Cli::parse_from([
            "duochat",
            "--url",
            "https://x.supabase.co",
            "--anon-key",
            "key",
        ]);
        let config = Config::from_cli(cli).unwrap();
        match config.backend {
            BackendConfig::Supabase { url, anon_key } => {
                assert_eq!(url, "https://x.supabase.co");
                assert_eq!(anon_key, "key");
            }
            BackendConfig::Memory => panic!("expected supabase backend"),
        }
    }
}
