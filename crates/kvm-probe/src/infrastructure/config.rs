//! TOML configuration for the probe.
//!
//! Looked up at the platform-appropriate path unless `--config` is given:
//! - Windows:  `%APPDATA%\KVMOverIP\probe.toml`
//! - Linux:    `~/.config/kvmoverip/probe.toml`
//! - macOS:    `~/Library/Application Support/KVMOverIP/probe.toml`
//!
//! Example:
//!
//! ```toml
//! [stream]
//! max_frame_len = 1048576
//!
//! [network]
//! bind_address = "0.0.0.0"
//! port = 24810
//! reply_timeout_secs = 5
//!
//! [security]
//! secret = "correct horse battery staple"
//! ```
//!
//! Every field has a serde default, so a missing file or section simply means
//! "use the defaults".  Command-line flags override whatever is loaded here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kvm_stream::StreamConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for probe configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The `[stream]` section holds unusable limits.
    #[error(transparent)]
    Stream(#[from] kvm_stream::ConfigError),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level probe configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProbeConfig {
    /// Chain size limits.
    #[serde(default)]
    pub stream: StreamConfig,
    /// Listen/connect settings.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Key material.
    #[serde(default)]
    pub security: SecurityConfig,
}

/// Socket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Address `listen` binds to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Port `listen` binds to and `connect` uses when none is given.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds to wait for the TCP connection to be established.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Seconds to wait for each echo.
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,
}

/// Shared-secret settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SecurityConfig {
    /// Passphrase both peers derive the record key from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    24810
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_reply_timeout_secs() -> u64 {
    5
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
            reply_timeout_secs: default_reply_timeout_secs(),
        }
    }
}

impl NetworkConfig {
    /// `bind_address:port`.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Per-echo timeout as a [`Duration`].
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default path of the probe config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(platform_config_dir()
        .ok_or(ConfigError::NoPlatformConfigDir)?
        .join("probe.toml"))
}

/// Loads a [`ProbeConfig`] from `path`, returning the defaults if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] if the TOML is malformed and
/// [`ConfigError::Stream`] if the `[stream]` limits are unusable.
pub fn load_config(path: &Path) -> Result<ProbeConfig, ConfigError> {
    let cfg = match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str::<ProbeConfig>(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ProbeConfig::default(),
        Err(e) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    cfg.stream.validate()?;
    Ok(cfg)
}

/// Persists `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &ProbeConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("KVMOverIP"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("kvmoverip"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("KVMOverIP")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("kvm-probe-test-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_probe_config_default_values() {
        // Arrange / Act
        let cfg = ProbeConfig::default();

        // Assert
        assert_eq!(cfg.network.port, 24810);
        assert_eq!(cfg.network.bind_address, "0.0.0.0");
        assert_eq!(cfg.network.reply_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.stream, StreamConfig::default());
        assert!(cfg.security.secret.is_none());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: ProbeConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ProbeConfig::default());
    }

    #[test]
    fn test_partial_sections_override_only_given_fields() {
        // Arrange
        let toml_str = r#"
[stream]
max_frame_len = 1024

[network]
port = 9999
"#;

        // Act
        let cfg: ProbeConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.stream.max_frame_len, 1024);
        assert_eq!(cfg.stream.read_chunk_size, 4096);
        assert_eq!(cfg.network.port, 9999);
        assert_eq!(cfg.network.listen_address(), "0.0.0.0:9999");
    }

    #[test]
    fn test_missing_secret_is_omitted_from_toml() {
        let text = toml::to_string_pretty(&ProbeConfig::default()).expect("serialize");
        assert!(!text.contains("secret"));
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let cfg = load_config(&temp_path("does-not-exist.toml")).expect("defaults");
        assert_eq!(cfg, ProbeConfig::default());
    }

    #[test]
    fn test_save_then_load_preserves_values() {
        // Arrange
        let path = temp_path("round-trip.toml");
        let mut cfg = ProbeConfig::default();
        cfg.network.port = 4000;
        cfg.security.secret = Some("hunter2".to_string());

        // Act
        save_config(&path, &cfg).expect("save");
        let restored = load_config(&path).expect("load");

        // Assert
        assert_eq!(restored, cfg);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_saving_a_loaded_partial_file_fills_in_defaults() {
        // Arrange
        let path = temp_path("partial.toml");
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "[network]\nport = 7000\n").expect("write");

        // Act
        let cfg = load_config(&path).expect("load");
        save_config(&path, &cfg).expect("save");
        let text = std::fs::read_to_string(&path).expect("read back");

        // Assert
        assert!(text.contains("port = 7000"));
        assert!(text.contains("max_frame_len"));
        assert!(text.contains("reply_timeout_secs"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_invalid_stream_limits_are_rejected() {
        // Arrange
        let path = temp_path("invalid.toml");
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "[stream]\nhigh_water_mark = 0\n").expect("write");

        // Act
        let result = load_config(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Stream(_))));
        let _ = std::fs::remove_file(&path);
    }
}
