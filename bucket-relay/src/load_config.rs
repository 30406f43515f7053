/// `load_config` module: loads the static YAML relay config and the secrets injected through the environment.
///
/// This module is the only place where untrusted YAML is parsed into the strongly-typed
/// [`RelayConfig`] of the core crate.
///
/// # Responsibilities
/// - Parse the user-supplied YAML file and validate it with [`RelayConfig::validate`]
/// - Read credentials (`TELEGRAM_BOT_TOKEN`, `GCS_ACCESS_TOKEN`) and optional endpoint overrides from the environment
/// - Fail with clear diagnostics: a relay must never start cycling with a broken config
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use bucket_relay_core::config::RelayConfig;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Credentials and endpoints for the two remote services.
#[derive(Clone)]
pub struct Secrets {
    pub telegram_bot_token: String,
    pub telegram_api_url: String,
    pub gcs_access_token: String,
    pub gcs_endpoint: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("telegram_bot_token", &"<redacted>")
            .field("telegram_api_url", &self.telegram_api_url)
            .field("gcs_access_token", &"<redacted>")
            .field("gcs_endpoint", &self.gcs_endpoint)
            .finish()
    }
}

impl Secrets {
    /// Read secrets from the environment (a `.env` file is honoured by `main`).
    pub fn from_env() -> Result<Self> {
        let telegram_bot_token = required_env("TELEGRAM_BOT_TOKEN")?;
        let gcs_access_token = required_env("GCS_ACCESS_TOKEN")?;
        let telegram_api_url = env::var("TELEGRAM_API_URL")
            .unwrap_or_else(|_| DEFAULT_TELEGRAM_API_URL.to_string());
        let gcs_endpoint =
            env::var("GCS_ENDPOINT").unwrap_or_else(|_| DEFAULT_GCS_ENDPOINT.to_string());
        info!(
            telegram_api_url = %telegram_api_url,
            gcs_endpoint = %gcs_endpoint,
            "Loaded secrets from environment"
        );
        Ok(Self {
            telegram_bot_token,
            telegram_api_url,
            gcs_access_token,
            gcs_endpoint,
        })
    }
}

fn required_env(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) => {
            error!(var = name, "Required environment variable is empty");
            Err(anyhow::anyhow!("{name} is set but empty"))
        }
        Err(e) => {
            error!(var = name, error = ?e, "Required environment variable missing");
            Err(anyhow::anyhow!("{name} missing in environment: {e}"))
        }
    }
}

/// Loads and validates a static YAML config file (no secrets).
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RelayConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config: RelayConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path_ref.display()))?;
    config.trace_loaded();
    Ok(config)
}
