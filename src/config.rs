use reqwest::Proxy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use crate::downloader::{SessionOptions, SessionOptionsBuilder};
use crate::error::SessionInitError;

/// Persistent tuning for downloads. Fields are optional so that
/// unspecified values can fall back to code defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub user_agent: Option<String>,
    /// size of the reusable receive buffer in bytes
    pub chunk_size: Option<usize>,
    /// how long a read may wait for data before it is reported as pending, in seconds
    pub pending_timeout_secs: Option<f64>,
    /// pause between pending polls in seconds (can be fractional)
    pub pending_backoff_secs: Option<f64>,
    pub max_pending_polls: Option<u32>,
    /// connect timeout in seconds (can be fractional)
    pub connect_timeout_secs: Option<f64>,
    pub proxy: Option<String>,
}

impl Settings {
    /// Default location, `<config dir>/getandrun`.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("getandrun");
            path
        })
    }

    /// Path to the config file inside the provided dir.
    pub fn config_path_for_dir<P: AsRef<Path>>(dir: P) -> PathBuf {
        dir.as_ref().join("config.toml")
    }

    /// Load settings from the given directory's `config.toml`.
    /// If file does not exist, returns Ok(Default::default()).
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Settings, io::Error> {
        let path = Settings::config_path_for_dir(dir);
        if !path.exists() {
            return Ok(Settings::default());
        }
        let s = fs::read_to_string(&path)?;
        toml::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Copies every value that is set onto `builder`.
    pub fn apply(&self, builder: &mut SessionOptionsBuilder) -> Result<(), SessionInitError> {
        if let Some(user_agent) = &self.user_agent {
            builder.user_agent(user_agent.clone());
        }
        if let Some(chunk_size) = self.chunk_size {
            builder.chunk_size(chunk_size);
        }
        if let Some(secs) = self.pending_timeout_secs {
            builder.pending_timeout(seconds(secs, "pending_timeout_secs")?);
        }
        if let Some(secs) = self.pending_backoff_secs {
            builder.pending_backoff(seconds(secs, "pending_backoff_secs")?);
        }
        if let Some(max_pending_polls) = self.max_pending_polls {
            builder.max_pending_polls(max_pending_polls);
        }
        if let Some(secs) = self.connect_timeout_secs {
            builder.connect_timeout(Some(seconds(secs, "connect_timeout_secs")?));
        }
        if let Some(proxy) = &self.proxy {
            builder.proxy(Some(parse_proxy(proxy)?));
        }
        Ok(())
    }

    /// Builds session options from these settings on top of the defaults.
    pub fn session_options(&self) -> Result<SessionOptions, SessionInitError> {
        let mut builder = SessionOptionsBuilder::default();
        self.apply(&mut builder)?;
        Ok(builder.build()?)
    }
}

pub fn parse_proxy(proxy: &str) -> Result<Proxy, SessionInitError> {
    Proxy::all(proxy).map_err(|e| SessionInitError::InvalidOptions {
        message: format!("Failed to parse proxy '{}': {}", proxy, e),
    })
}

fn seconds(value: f64, field: &str) -> Result<Duration, SessionInitError> {
    Duration::try_from_secs_f64(value).map_err(|e| SessionInitError::InvalidOptions {
        message: format!("{field}: {e}"),
    })
}
