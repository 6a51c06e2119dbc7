//! Layered configuration for the catalog client.
//!
//! Values are resolved from built-in defaults, an optional TOML file under the
//! user's config directory, `BGCAT_*` environment variables and finally the
//! `CATALOG_HOST` variable, which always wins for the base URL.

use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Environment variable holding the catalog service base URL.
pub const CATALOG_HOST_ENV: &str = "CATALOG_HOST";

const ENV_PREFIX: &str = "BGCAT";
const CONFIG_DIR: &str = "bgcat";
const CONFIG_FILE: &str = "config.toml";

const DEFAULT_CONFIG: &str = r#"# bgcat configuration
#
# Base URL of the catalog service boardgame endpoint. The CATALOG_HOST
# environment variable overrides this value.
# base_url = "http://localhost:8080/api/boardgame"

# "strict" treats any non-2xx response as an error. "lenient" parses the body
# of reads, updates and deletes regardless of status.
status_policy = "strict"

# Optional per-request timeout in seconds. Unset uses the transport default.
# request_timeout_secs = 30
"#;

/// How non-success HTTP statuses are treated on reads, updates and deletes.
///
/// Creation always rejects non-success statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusPolicy {
    /// Any non-2xx response becomes an error.
    #[default]
    Strict,
    /// The body is parsed whatever the status.
    Lenient,
}

/// Settings needed to construct a [`crate::CatalogClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Catalog service boardgame endpoint, e.g. `http://host/api/boardgame`.
    pub base_url: String,
    /// Status handling for reads, updates and deletes.
    #[serde(default)]
    pub status_policy: StatusPolicy,
    /// Optional request timeout.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl CatalogConfig {
    /// Configuration pointing at `base_url` with default policy and no timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            status_policy: StatusPolicy::default(),
            request_timeout_secs: None,
        }
    }

    /// Replace the status policy.
    pub fn with_status_policy(mut self, policy: StatusPolicy) -> Self {
        self.status_policy = policy;
        self
    }

    /// Load configuration from the default file location and the process environment.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load configuration from `path` (optional) and the process environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let vars: HashMap<String, String> = env::vars().collect();
        Self::resolve(path.as_ref(), vars)
    }

    fn resolve(path: &Path, vars: HashMap<String, String>) -> Result<Self> {
        let catalog_host = vars
            .get(CATALOG_HOST_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let settings = Config::builder()
            .set_default("status_policy", "strict")?
            .add_source(
                File::from(path.to_path_buf())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(Some(vars.into_iter().collect())),
            )
            .set_override_option("base_url", catalog_host)?
            .build()
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;

        if settings.get_string("base_url").is_err() {
            anyhow::bail!(
                "catalog base URL is not configured; set {CATALOG_HOST_ENV} or base_url in {}",
                path.display()
            );
        }

        settings
            .try_deserialize()
            .context("failed to parse catalog configuration")
    }
}

/// Default configuration file path.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join(CONFIG_FILE)
}

/// Write the commented template to the default location if no file exists yet.
pub fn ensure_default_config() -> Result<PathBuf> {
    let path = config_path();
    write_default_config(&path)?;
    Ok(path)
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write default config {}", path.display()))?;
    info!("wrote default configuration to {}", path.display());
    Ok(())
}
