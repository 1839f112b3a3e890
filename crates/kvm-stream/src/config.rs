//! Tunable limits for a stream chain.
//!
//! [`StreamConfig`] is a plain serde struct so it can be embedded in any
//! application's TOML file:
//!
//! ```toml
//! [stream]
//! read_chunk_size = 4096
//! high_water_mark = 65536
//! max_frame_len = 4194304
//! ```
//!
//! Every field has a `#[serde(default = "...")]` helper, so a section that
//! omits a field (or omits the whole table) still produces a usable config.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
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

    /// A field holds a value the stream core cannot work with.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Size limits shared by every layer of a chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamConfig {
    /// Upper bound of a single native read performed on a readability
    /// notification.
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
    /// Buffered output size at which [`crate::BufferedStream::write`] stops
    /// queueing and drains synchronously.
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,
    /// Largest frame payload the framing filter accepts or produces.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

/// Default bound of one native read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;
/// Default backpressure threshold (64 KiB).
pub const DEFAULT_HIGH_WATER_MARK: usize = 64 * 1024;
/// Default frame ceiling (4 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

fn default_read_chunk_size() -> usize {
    DEFAULT_READ_CHUNK_SIZE
}
fn default_high_water_mark() -> usize {
    DEFAULT_HIGH_WATER_MARK
}
fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: default_read_chunk_size(),
            high_water_mark: default_high_water_mark(),
            max_frame_len: default_max_frame_len(),
        }
    }
}

impl StreamConfig {
    /// Parses a config from TOML text and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for values that fail [`StreamConfig::validate`].
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: StreamConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads a config from `path`, returning the defaults if the file does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] for file-system errors other than "not
    /// found", plus any error from [`StreamConfig::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Renders the config as pretty TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks that every limit is usable.
    ///
    /// The frame ceiling must also fit the 4-byte length prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "read_chunk_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.high_water_mark == 0 {
            return Err(ConfigError::Invalid {
                field: "high_water_mark",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_frame_len == 0 || self.max_frame_len > u32::MAX as usize {
            return Err(ConfigError::Invalid {
                field: "max_frame_len",
                reason: format!("must be between 1 and {}", u32::MAX),
            });
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
