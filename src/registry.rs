//! Static device registry.
//!
//! Devices are declared up front, each with its hardware family, body
//! layout, sleep policy and calendar:
//!
//! ```yaml
//! - name: kitchen
//!   family: kindle-portrait
//!   variant:
//!     type: time_grid
//!     hours: 7
//!   sleep:
//!     type: policy
//!     policy: workweek
//!   calendar: data/kitchen-calendar.json
//!
//! - name: office
//!   family: kindle-landscape
//!   variant:
//!     type: multi_day
//!     days: 7
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::compose::{DeviceFamily, RendererVariant};
use crate::schedule::SleepDelay;
use crate::Error;

fn default_true() -> bool {
    true
}

/// Configuration of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name, as sent in telemetry and image URLs
    pub name: String,
    /// Hardware family
    pub family: DeviceFamily,
    /// Body layout
    #[serde(default)]
    pub variant: RendererVariant,
    /// Sleep policy
    #[serde(default)]
    pub sleep: SleepDelay,
    /// When false the device is told not to sleep
    #[serde(default = "default_true")]
    pub sleep_enabled: bool,
    /// Calendar snapshot file
    #[serde(default)]
    pub calendar: Option<PathBuf>,
}

impl DeviceConfig {
    /// Device with the default grid layout, sleeping one hour at a time.
    pub fn new(name: impl Into<String>, family: DeviceFamily) -> Self {
        Self {
            name: name.into(),
            family,
            variant: RendererVariant::default(),
            sleep: SleepDelay::default(),
            sleep_enabled: true,
            calendar: None,
        }
    }

    /// Set the body layout.
    pub fn with_variant(mut self, variant: RendererVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Set the sleep policy.
    pub fn with_sleep(mut self, sleep: SleepDelay) -> Self {
        self.sleep = sleep;
        self
    }

    /// Read events from a calendar snapshot.
    pub fn with_calendar(mut self, path: impl Into<PathBuf>) -> Self {
        self.calendar = Some(path.into());
        self
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<(), Error> {
        if !is_safe_name(&self.name) {
            return Err(Error::invalid(
                "device",
                format!(
                    "'{}': names may only contain letters, digits, '-' and '_'",
                    self.name
                ),
            ));
        }
        match self.variant {
            RendererVariant::TimeGrid { hours, .. } if !(1..=24).contains(&hours) => {
                return Err(Error::invalid(
                    "device",
                    format!("'{}': grid hours must be 1-24, got {}", self.name, hours),
                ));
            }
            RendererVariant::MultiDay { days } if !(1..=7).contains(&days) => {
                return Err(Error::invalid(
                    "device",
                    format!("'{}': day columns must be 1-7, got {}", self.name, days),
                ));
            }
            _ => {}
        }
        if let SleepDelay::Schedule {
            default_interval,
            rules,
        } = &self.sleep
        {
            if *default_interval == 0 || rules.iter().any(|r| r.interval == 0) {
                return Err(Error::invalid(
                    "device",
                    format!("'{}': schedule intervals must be positive", self.name),
                ));
            }
        }
        Ok(())
    }

    /// Seconds the device should sleep, at local time `now`. Zero when
    /// sleeping is disabled.
    pub fn sleep_delay<T: TimeZone>(&self, now: &DateTime<T>) -> u32 {
        if !self.sleep_enabled {
            return 0;
        }
        self.sleep.next_wake_delay(now)
    }
}

/// Whether `name` is usable as a file stem and URL segment.
pub(crate) fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Devices known to the server, by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, DeviceConfig>,
}

impl DeviceRegistry {
    /// Build a registry, validating every device.
    ///
    /// # Errors
    ///
    /// [`Error::Invalid`] for an invalid device or a duplicate name.
    pub fn new(devices: Vec<DeviceConfig>) -> Result<Self, Error> {
        let mut registry = Self::default();
        for device in devices {
            device.validate()?;
            if registry.devices.contains_key(&device.name) {
                return Err(Error::invalid(
                    "device",
                    format!("'{}' is declared more than once", device.name),
                ));
            }
            registry.devices.insert(device.name.clone(), device);
        }
        Ok(registry)
    }

    /// Parse a YAML device list.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let devices: Vec<DeviceConfig> = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Invalid device YAML: {}", e)))?;
        Self::new(devices)
    }

    /// Load a YAML device list from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read device file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Configuration of `name`.
    pub fn get(&self, name: &str) -> Result<&DeviceConfig, Error> {
        self.devices
            .get(name)
            .ok_or_else(|| Error::UnknownDevice(name.to_string()))
    }

    /// Device names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.devices.keys().map(String::as_str).collect()
    }

    /// All devices, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceConfig> {
        self.devices.values()
    }

    /// Number of devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no devices are registered.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Enable or disable sleeping for `name`.
    pub fn set_sleep_enabled(&mut self, name: &str, enabled: bool) -> Result<(), Error> {
        let device = self
            .devices
            .get_mut(name)
            .ok_or_else(|| Error::UnknownDevice(name.to_string()))?;
        device.sleep_enabled = enabled;
        tracing::info!("Sleep delay for {} {}", name, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Seconds `name` should sleep; zero for unknown devices.
    pub fn sleep_delay<T: TimeZone>(&self, name: &str, now: &DateTime<T>) -> u32 {
        match self.devices.get(name) {
            Some(device) => device.sleep_delay(now),
            None => {
                tracing::debug!("Sleep delay requested for unknown device {}", name);
                0
            }
        }
    }
}
