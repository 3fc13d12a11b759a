// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates the Gitter token and cache bounds, provides defaults for everything else
use anyhow::{Context, Result};
use puppet_core::{paths, CacheConfig};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gitter: GitterConfig,
    #[serde(default)]
    pub cache: CacheSettings,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GitterConfig {
    /// Personal access token from https://developer.gitter.im
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

// Custom Debug impl to redact sensitive fields
impl std::fmt::Debug for GitterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitterConfig")
            .field("token", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .field("stream_url", &self.stream_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for GitterConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: default_api_url(),
            stream_url: default_stream_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Cache root; defaults to the per-user config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(default = "default_message_capacity")]
    pub message_capacity: usize,
    #[serde(default = "default_message_ttl_secs")]
    pub message_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: None,
            message_capacity: default_message_capacity(),
            message_ttl_secs: default_message_ttl_secs(),
        }
    }
}

impl CacheSettings {
    pub fn to_cache_config(&self) -> Result<CacheConfig> {
        let message_capacity = NonZeroUsize::new(self.message_capacity)
            .context("cache.message_capacity must be greater than 0")?;
        if self.message_ttl_secs == 0 {
            anyhow::bail!("cache.message_ttl_secs must be greater than 0");
        }
        let root = self
            .dir
            .as_deref()
            .map(|dir| PathBuf::from(expand_tilde(dir)))
            .unwrap_or_else(paths::cache_root);
        Ok(CacheConfig {
            root,
            message_capacity,
            message_ttl: Duration::from_secs(self.message_ttl_secs),
        })
    }
}

fn default_api_url() -> String {
    "https://api.gitter.im".to_string()
}

fn default_stream_url() -> String {
    "https://stream.gitter.im".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_message_capacity() -> usize {
    puppet_core::cache::DEFAULT_MESSAGE_CAPACITY
}

fn default_message_ttl_secs() -> u64 {
    puppet_core::cache::DEFAULT_MESSAGE_TTL.as_secs()
}

/// Expand tilde (~) to home directory in paths
/// Logs a warning if expansion fails and falls back to the original path
fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs
                .home_dir()
                .join(stripped)
                .to_string_lossy()
                .to_string();
        }
        tracing::warn!(
            path = %path,
            "Failed to expand tilde in path: could not determine home directory"
        );
    } else if path == "~" {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs.home_dir().to_string_lossy().to_string();
        }
        tracing::warn!("Failed to expand tilde: could not determine home directory");
    }
    path.to_string()
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. PUPPET_GITTER_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory - for development)
    /// 3. ~/.config/puppet-gitter/config.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("PUPPET_GITTER_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration from config.toml with environment variable overrides
    pub fn load() -> Result<Self> {
        let config = match Self::find_config_file() {
            Some(config_path) => {
                tracing::info!(
                    path = %config_path.display(),
                    "Loading configuration from file"
                );
                let content = std::fs::read_to_string(&config_path)
                    .with_context(|| format!("Failed to read {}", config_path.display()))?;
                Self::parse(&content)
                    .with_context(|| format!("Failed to parse {}", config_path.display()))?
            }
            None => {
                tracing::info!("No config file found, using environment variables and defaults");
                Config::default()
            }
        };
        config.finish()
    }

    /// Parse TOML without applying overrides or validation
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str::<Config>(content)?)
    }

    /// Apply environment overrides, then validate
    pub fn finish(mut self) -> Result<Self> {
        self.apply_env_overrides()?;
        self.validate()?;
        Ok(self)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        // Legacy name first so the current one wins when both are set
        if let Ok(val) = std::env::var("WECHATY_PUPPET_GITTER_TOKEN") {
            self.gitter.token = val;
        }
        if let Ok(val) = std::env::var("PUPPET_GITTER_TOKEN") {
            self.gitter.token = val;
        }
        if let Ok(val) = std::env::var("GITTER_API_URL") {
            self.gitter.api_url = val;
        }
        if let Ok(val) = std::env::var("GITTER_STREAM_URL") {
            self.gitter.stream_url = val;
        }
        if let Ok(val) = std::env::var("PUPPET_GITTER_CACHE_DIR") {
            self.cache.dir = Some(val);
        }
        if let Ok(val) = std::env::var("PUPPET_GITTER_MESSAGE_CAPACITY") {
            self.cache.message_capacity = val.parse().with_context(|| {
                format!("PUPPET_GITTER_MESSAGE_CAPACITY must be a number, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("PUPPET_GITTER_MESSAGE_TTL_SECS") {
            self.cache.message_ttl_secs = val.parse().with_context(|| {
                format!("PUPPET_GITTER_MESSAGE_TTL_SECS must be a number, got: {}", val)
            })?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.gitter.token = self.gitter.token.trim().to_string();
        if self.gitter.token.is_empty() {
            anyhow::bail!(
                "gitter.token is required (set in config.toml or PUPPET_GITTER_TOKEN env var)"
            );
        }
        for (name, url) in [
            ("gitter.api_url", &mut self.gitter.api_url),
            ("gitter.stream_url", &mut self.gitter.stream_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must be an http(s) URL, got: {}", name, url);
            }
            while url.ends_with('/') {
                url.pop();
            }
        }
        if self.gitter.request_timeout_secs == 0 {
            anyhow::bail!("gitter.request_timeout_secs must be greater than 0");
        }
        // Surfaces capacity/TTL errors at load time instead of at login
        self.cache.to_cache_config()?;
        Ok(())
    }
}
