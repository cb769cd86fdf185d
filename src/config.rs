//! Configuration file for ~/.config/gator/config.toml.
//!
//! The file is optional; a missing file yields `Config::default()`. Unlike a
//! read-only settings file it is also written back: `register` and `login`
//! record the current user here.
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("HOME environment variable not set")]
    NoHome,
}

// ============================================================================
// Configuration
// ============================================================================

/// Per-user aggregator settings.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Defaults to `gator.db` next to the config file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,

    /// User that logged-in commands act as.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user_name: Option<String>,

    /// `User-Agent` header sent with every feed request.
    pub user_agent: String,

    /// Per-request timeout for feed fetches. 0 falls back to the default.
    pub request_timeout_secs: u64,
}

/// `gator/<version>`
pub fn default_user_agent() -> String {
    format!("gator/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            current_user_name: None,
            user_agent: default_user_agent(),
            request_timeout_secs: 30,
        }
    }
}

/// Keys the loader recognises; anything else is reported as a likely typo.
const KNOWN_KEYS: [&str; 4] = [
    "database_path",
    "current_user_name",
    "user_agent",
    "request_timeout_secs",
];

/// `~/.config/gator`
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    let home = std::env::var_os("HOME").ok_or(ConfigError::NoHome)?;
    Ok(PathBuf::from(home).join(".config").join("gator"))
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            user = ?config.current_user_name,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Write the configuration to `path`, replacing it atomically.
    ///
    /// Content goes to a fresh temp file in the same directory, is synced,
    /// then renamed over the destination, so a crash never leaves a
    /// half-written config behind.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        // Unpredictable temp name; create_new refuses to follow a planted symlink.
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = path.with_extension(format!("tmp.{:016x}", nanos));

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let result = options.open(&temp_path).and_then(|mut file| {
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            std::fs::rename(&temp_path, path)
        });

        if let Err(e) = result {
            let _ = std::fs::remove_file(&temp_path);
            return Err(ConfigError::Io(e));
        }

        tracing::debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Set the current user and persist the change.
    pub fn set_user(&mut self, name: &str, path: &Path) -> Result<(), ConfigError> {
        self.current_user_name = Some(name.to_string());
        self.save(path)
    }

    /// Database file, resolved against `config_dir` when unset.
    pub fn database_path(&self, config_dir: &Path) -> PathBuf {
        match &self.database_path {
            Some(p) if !p.trim().is_empty() => PathBuf::from(p),
            _ => config_dir.join("gator.db"),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        if self.request_timeout_secs == 0 {
            crate::feed::DEFAULT_TIMEOUT
        } else {
            Duration::from_secs(self.request_timeout_secs)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
