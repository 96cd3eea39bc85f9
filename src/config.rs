//! Server configuration.
//!
//! Loaded from YAML; a few settings can be overridden from the environment:
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `INKDASH_CONFIG` | config file (default `inkdash.yaml`) |
//! | `INKDASH_LISTEN` | listen address |
//! | `INKDASH_IMAGE_DIR` | image cache directory |
//!
//! # Example
//!
//! ```yaml
//! listen: "0.0.0.0:8080"
//! timezone: "America/Los_Angeles"
//! image_dir: images
//! filter_file: string-filters.json
//! state_file: device-state.json
//! weather:
//!   type: nws_point
//!   lat: 45.5231
//!   lon: -122.6765
//! devices:
//!   - name: kitchen
//!     family: kindle-portrait
//!     calendar: data/kitchen-calendar.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::registry::{DeviceConfig, DeviceRegistry};
use crate::weather::{SnapshotWeather, WeatherSource};
use crate::Error;

/// Default config file
pub const DEFAULT_CONFIG_PATH: &str = "inkdash.yaml";

/// Where the forecast comes from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WeatherConfig {
    /// No weather column
    #[default]
    None,
    /// JSON snapshot file
    Snapshot { path: PathBuf },
    /// National Weather Service hourly forecast URL (feature `nws`)
    Nws { url: String },
    /// National Weather Service forecast for a point; the hourly URL is
    /// looked up from `/points/{lat},{lon}` (feature `nws`)
    NwsPoint { lat: f64, lon: f64 },
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub listen: String,
    /// Timezone for display and scheduling (e.g., "America/Los_Angeles")
    pub timezone: String,
    /// Image cache directory
    pub image_dir: PathBuf,
    /// String filter file
    pub filter_file: PathBuf,
    /// Device telemetry file; telemetry is kept in memory only when unset
    pub state_file: Option<PathBuf>,
    /// Forecast source
    pub weather: WeatherConfig,
    /// Registered devices
    pub devices: Vec<DeviceConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            timezone: "America/Los_Angeles".to_string(),
            image_dir: PathBuf::from("images"),
            filter_file: PathBuf::from("string-filters.json"),
            state_file: None,
            weather: WeatherConfig::None,
            devices: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("Invalid config YAML: {}", e)))
    }

    /// Load the file named by `INKDASH_CONFIG` (or [`DEFAULT_CONFIG_PATH`]),
    /// falling back to defaults when it does not exist, then apply
    /// environment overrides.
    pub fn from_env() -> Result<Self, Error> {
        let path = std::env::var("INKDASH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let config = if Path::new(&path).exists() {
            tracing::info!("Loading config from {}", path);
            Self::load(&path)?
        } else {
            tracing::warn!("Config file {} not found, using defaults", path);
            Self::default()
        };
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Apply overrides from `lookup` (an environment accessor).
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(listen) = lookup("INKDASH_LISTEN") {
            self.listen = listen;
        }
        if let Some(dir) = lookup("INKDASH_IMAGE_DIR") {
            self.image_dir = PathBuf::from(dir);
        }
        self
    }

    /// Set the listen address.
    pub fn with_listen(mut self, listen: impl Into<String>) -> Self {
        self.listen = listen.into();
        self
    }

    /// Set the image cache directory.
    pub fn with_image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_dir = dir.into();
        self
    }

    /// Parsed display timezone.
    pub fn tz(&self) -> Result<Tz, Error> {
        self.timezone
            .parse()
            .map_err(|_| Error::Config(format!("Unknown timezone '{}'", self.timezone)))
    }

    /// Device registry built from `devices`.
    pub fn registry(&self) -> Result<DeviceRegistry, Error> {
        DeviceRegistry::new(self.devices.clone())
    }

    /// Configured forecast source, if any.
    pub fn weather_source(&self) -> Result<Option<Arc<dyn WeatherSource>>, Error> {
        let tz = self.tz()?;
        match &self.weather {
            WeatherConfig::None => Ok(None),
            WeatherConfig::Snapshot { path } => Ok(Some(Arc::new(SnapshotWeather::new(path, tz)))),
            #[cfg(feature = "nws")]
            WeatherConfig::Nws { url } => Ok(Some(Arc::new(crate::weather::NwsWeather::new(url, tz)?))),
            #[cfg(feature = "nws")]
            WeatherConfig::NwsPoint { lat, lon } => Ok(Some(Arc::new(
                crate::weather::NwsWeather::for_point(*lat, *lon, tz)?,
            ))),
            #[cfg(not(feature = "nws"))]
            WeatherConfig::Nws { .. } | WeatherConfig::NwsPoint { .. } => Err(Error::Config(
                "NWS weather requires the `nws` feature".to_string(),
            )),
        }
    }
}
