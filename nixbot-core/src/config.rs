// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields and provides sensible defaults for optional ones
use crate::dispatcher::ReadReceiptPolicy;
use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub matrix: MatrixConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub nix: NixConfig,
    /// Route pattern -> executable run for matching messages
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    pub home_server: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Passphrase for the local sqlite crypto store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_passphrase: Option<String>,
}

// Custom Debug impl to redact sensitive fields
impl std::fmt::Debug for MatrixConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixConfig")
            .field("home_server", &self.home_server)
            .field("user_id", &self.user_id)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("device_name", &self.device_name)
            .field(
                "store_passphrase",
                &self.store_passphrase.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: u64,
    #[serde(default = "default_true")]
    pub surface_handler_errors: bool,
    #[serde(default)]
    pub read_receipts: ReadReceiptPolicy,
    /// Users whose invites are accepted (empty = accept all)
    #[serde(default)]
    pub allowed_inviters: Vec<String>,
    /// Script consulted for invites instead of the allow-list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_script: Option<String>,
    /// How long shutdown waits for in-flight handlers (0 = don't wait)
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            staleness_secs: default_staleness_secs(),
            surface_handler_errors: true,
            read_receipts: ReadReceiptPolicy::default(),
            allowed_inviters: Vec::new(),
            join_script: None,
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl BotConfig {
    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }

    pub fn shutdown_grace(&self) -> Option<Duration> {
        (self.shutdown_grace_secs > 0).then(|| Duration::from_secs(self.shutdown_grace_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_dir")]
    pub dir: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
        }
    }
}

impl StateConfig {
    pub fn dir(&self) -> PathBuf {
        PathBuf::from(&self.dir)
    }

    /// Directory for the Matrix SDK's sqlite state and crypto store
    pub fn matrix_store_dir(&self) -> PathBuf {
        self.dir().join("matrix-store")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NixConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_nix_channel")]
    pub channel: String,
    #[serde(default = "default_eval_timeout_secs")]
    pub eval_timeout_secs: u64,
    /// Bound REPL expressions, relative to the state dir unless absolute
    #[serde(default = "default_repl_file")]
    pub repl_file: String,
}

impl Default for NixConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: default_nix_channel(),
            eval_timeout_secs: default_eval_timeout_secs(),
            repl_file: default_repl_file(),
        }
    }
}

impl NixConfig {
    pub fn eval_timeout(&self) -> Duration {
        Duration::from_secs(self.eval_timeout_secs)
    }

    pub fn repl_path(&self, state: &StateConfig) -> PathBuf {
        let path = Path::new(&self.repl_file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            state.dir().join(path)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<SocketAddr>,
}

fn default_device_name() -> String {
    "nixbot".to_string()
}

fn default_staleness_secs() -> u64 {
    60
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_state_dir() -> String {
    paths::default_state_dir().to_string_lossy().into_owned()
}

fn default_nix_channel() -> String {
    "nixos-unstable".to_string()
}

fn default_eval_timeout_secs() -> u64 {
    60
}

fn default_repl_file() -> String {
    "repl.json".to_string()
}

fn is_valid_user_id(user: &str) -> bool {
    user.starts_with('@') && user.contains(':')
}

impl Config {
    /// Load configuration, searching the default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from `path` (or the default locations when `None`)
    /// with environment variable overrides, then validate
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => paths::find_config_file(),
        };

        let mut config = if let Some(config_path) = config_path {
            tracing::info!(
                path = %config_path.display(),
                "Loading configuration from file"
            );
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config {
                matrix: MatrixConfig {
                    home_server: String::new(),
                    user_id: String::new(),
                    password: None,
                    access_token: None,
                    device_name: default_device_name(),
                    store_passphrase: None,
                },
                bot: BotConfig::default(),
                state: StateConfig::default(),
                nix: NixConfig::default(),
                scripts: BTreeMap::new(),
                metrics: MetricsConfig::default(),
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("MATRIX_HOME_SERVER") {
            self.matrix.home_server = val;
        }
        if let Ok(val) = std::env::var("MATRIX_USER_ID") {
            self.matrix.user_id = val;
        }
        if let Ok(val) = std::env::var("MATRIX_PASSWORD") {
            self.matrix.password = Some(val);
        }
        if let Ok(val) = std::env::var("MATRIX_ACCESS_TOKEN") {
            self.matrix.access_token = Some(val);
        }
        if let Ok(val) = std::env::var("MATRIX_DEVICE_NAME") {
            self.matrix.device_name = val;
        }
        if let Ok(val) = std::env::var("MATRIX_STORE_PASSPHRASE") {
            self.matrix.store_passphrase = Some(val);
        }
        if let Ok(val) = std::env::var("NIXBOT_STALENESS_SECS") {
            self.bot.staleness_secs = val.parse().with_context(|| {
                format!("NIXBOT_STALENESS_SECS must be a number of seconds, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("NIXBOT_SURFACE_ERRORS") {
            self.bot.surface_handler_errors = val.parse().with_context(|| {
                format!("NIXBOT_SURFACE_ERRORS must be true or false, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("NIXBOT_ALLOWED_INVITERS") {
            self.bot.allowed_inviters = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(val) = std::env::var(paths::STATE_DIR_ENV) {
            self.state.dir = val;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.matrix.home_server.trim().is_empty() {
            anyhow::bail!(
                "matrix.home_server is required (set in config.toml or MATRIX_HOME_SERVER env var)"
            );
        }
        if self.matrix.user_id.trim().is_empty() {
            anyhow::bail!(
                "matrix.user_id is required (set in config.toml or MATRIX_USER_ID env var)"
            );
        }
        if !is_valid_user_id(&self.matrix.user_id) {
            anyhow::bail!("Invalid Matrix user ID in matrix.user_id: {}", self.matrix.user_id);
        }
        if self.matrix.password.is_none() && self.matrix.access_token.is_none() {
            anyhow::bail!("Either matrix.password or matrix.access_token is required");
        }
        if self.bot.staleness_secs == 0 {
            anyhow::bail!("bot.staleness_secs must be greater than zero");
        }

        self.bot.allowed_inviters.retain(|s| !s.trim().is_empty());
        for user in &self.bot.allowed_inviters {
            if !is_valid_user_id(user) {
                anyhow::bail!("Invalid Matrix user ID in bot.allowed_inviters: {}", user);
            }
        }
        Ok(())
    }
}
