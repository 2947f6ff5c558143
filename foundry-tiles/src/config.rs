//! Session configuration.
//!
//! [`SessionConfig`] carries every tunable of a map session. Defaults match
//! the desktop viewer; hosts override them with the `with_*` builders or
//! from an INI file:
//!
//! ```ini
//! [cache]
//! capacity = 100
//!
//! [viewport]
//! width = 1024
//! height = 768
//!
//! [fetch]
//! max_concurrent = 8
//!
//! [export]
//! width = 1920
//! height = 1080
//!
//! [logging]
//! filter = info
//! file = /var/log/foundry.log
//! ```
//!
//! Missing sections and keys keep their defaults.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_MAX_CONCURRENT_FETCHES};
use crate::logging::LoggingConfig;
use crate::viewport::{DEFAULT_VIEWPORT_HEIGHT, DEFAULT_VIEWPORT_WIDTH};

/// Default PNG export width.
pub const DEFAULT_EXPORT_WIDTH: u32 = 1920;

/// Default PNG export height.
pub const DEFAULT_EXPORT_HEIGHT: u32 = 1080;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] ini::ParseError),

    #[error("invalid value for [{section}] {key}: '{value}'")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
    },
}

/// Tunables of a map session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum number of cached tiles.
    pub cache_capacity: usize,
    /// Viewport size used until the host reports its own.
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Tile renders allowed to run at once.
    pub max_concurrent_fetches: usize,
    /// Size used by `export_png` when none is given.
    pub export_width: u32,
    pub export_height: u32,
    pub logging: LoggingConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            export_width: DEFAULT_EXPORT_WIDTH,
            export_height: DEFAULT_EXPORT_HEIGHT,
            logging: LoggingConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_viewport_size(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max;
        self
    }

    pub fn with_export_size(mut self, width: u32, height: u32) -> Self {
        self.export_width = width;
        self.export_height = height;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Load configuration from an INI file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini_str(&contents)
    }

    /// Parse configuration from INI text.
    pub fn from_ini_str(contents: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(contents)?;
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("cache")) {
            read_positive(section, "cache", "capacity", &mut config.cache_capacity)?;
        }
        if let Some(section) = ini.section(Some("viewport")) {
            read_positive(section, "viewport", "width", &mut config.viewport_width)?;
            read_positive(section, "viewport", "height", &mut config.viewport_height)?;
        }
        if let Some(section) = ini.section(Some("fetch")) {
            read_positive(
                section,
                "fetch",
                "max_concurrent",
                &mut config.max_concurrent_fetches,
            )?;
        }
        if let Some(section) = ini.section(Some("export")) {
            read_positive(section, "export", "width", &mut config.export_width)?;
            read_positive(section, "export", "height", &mut config.export_height)?;
        }
        if let Some(section) = ini.section(Some("logging")) {
            if let Some(filter) = section.get("filter") {
                config.logging.filter = filter.trim().to_string();
            }
            if let Some(file) = section.get("file").map(str::trim).filter(|f| !f.is_empty()) {
                config.logging.file = Some(PathBuf::from(file));
            }
        }

        Ok(config)
    }
}

/// Overwrite `target` with a strictly positive integer value, if present.
fn read_positive<T>(
    section: &Properties,
    section_name: &'static str,
    key: &'static str,
    target: &mut T,
) -> Result<(), ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let Some(raw) = section.get(key) else {
        return Ok(());
    };
    let invalid = || ConfigError::InvalidValue {
        section: section_name,
        key,
        value: raw.to_string(),
    };
    let value: T = raw.trim().parse().map_err(|_| invalid())?;
    if value <= T::default() {
        return Err(invalid());
    }
    *target = value;
    Ok(())
}
