//! Device telemetry.
//!
//! Devices post their state on every wake:
//!
//! ```json
//! {"device": "kitchen", "temp": "72F", "battery": "84%"}
//! ```
//!
//! The store keeps the latest row per device and optionally mirrors it to a
//! JSON file so the footer survives restarts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{persist_atomically, Error};

/// Telemetry as posted by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePayload {
    /// Device name
    pub device: String,
    /// Inside temperature, e.g. `"72F"`
    #[serde(default)]
    pub temp: Option<String>,
    /// Battery charge, e.g. `"84%"`
    #[serde(default)]
    pub battery: Option<String>,
}

impl StatePayload {
    /// Inside temperature in °F.
    pub fn temperature(&self) -> Option<i32> {
        self.temp.as_deref().and_then(leading_number)
    }

    /// Battery charge percentage, clamped to 0-100.
    pub fn battery_soc(&self) -> Option<u8> {
        self.battery
            .as_deref()
            .and_then(leading_number)
            .map(|v| v.clamp(0, 100) as u8)
    }

    /// Build the stored row for this payload.
    pub fn into_state(self, time: DateTime<Utc>, ipaddr: Option<String>) -> Result<DeviceState, Error> {
        let device = self.device.trim().to_string();
        if device.is_empty() {
            return Err(Error::invalid("device", "name cannot be empty"));
        }
        Ok(DeviceState {
            temperature: self.temperature(),
            battery_soc: self.battery_soc(),
            device,
            time,
            ipaddr,
        })
    }
}

/// Parse the leading (optionally signed) integer of `s`: `"72F"` -> 72.
fn leading_number(s: &str) -> Option<i32> {
    let s = s.trim();
    let digits_start = usize::from(s.starts_with('-'));
    let end = s[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(s.len(), |i| i + digits_start);
    s[..end].parse().ok()
}

/// Latest known state of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Device name
    pub device: String,
    /// When the state was posted
    pub time: DateTime<Utc>,
    /// Inside temperature in °F
    pub temperature: Option<i32>,
    /// Battery charge percentage
    pub battery_soc: Option<u8>,
    /// Address the device posted from
    pub ipaddr: Option<String>,
}

impl DeviceState {
    /// Stand-in for a device that has never posted.
    pub fn placeholder(device: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            device: device.into(),
            time,
            temperature: None,
            battery_soc: None,
            ipaddr: None,
        }
    }
}

/// Latest state per device.
#[derive(Debug, Default)]
pub struct DeviceStore {
    states: RwLock<BTreeMap<String, DeviceState>>,
    path: Option<PathBuf>,
}

impl DeviceStore {
    /// Store that is not persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Store mirrored to a JSON file, loading existing rows if the file exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let states = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                Error::Io(format!(
                    "Failed to read device state '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            let rows: Vec<DeviceState> = serde_json::from_str(&content)?;
            rows.into_iter().map(|s| (s.device.clone(), s)).collect()
        } else {
            BTreeMap::new()
        };
        tracing::debug!("Loaded state for {} devices from {}", states.len(), path.display());

        Ok(Self {
            states: RwLock::new(states),
            path: Some(path.to_path_buf()),
        })
    }

    /// Record a new state, replacing the device's previous one.
    ///
    /// The file is only a mirror: when it cannot be written the failure is
    /// logged and the new state still takes effect in memory.
    pub fn record(&self, state: DeviceState) {
        tracing::info!(
            "Device {} state: temperature={:?} battery={:?} ip={:?}",
            state.device,
            state.temperature,
            state.battery_soc,
            state.ipaddr
        );

        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        states.insert(state.device.clone(), state);

        if let Some(path) = &self.path {
            let rows: Vec<&DeviceState> = states.values().collect();
            let written = serde_json::to_vec_pretty(&rows)
                .map_err(Error::from)
                .and_then(|data| persist_atomically(path, &data));
            if let Err(e) = written {
                tracing::warn!("Failed to save device state to {}: {}", path.display(), e);
            }
        }
    }

    /// Latest state of `device`.
    pub fn latest(&self, device: &str) -> Option<DeviceState> {
        let states = self.states.read().unwrap_or_else(|e| e.into_inner());
        states.get(device).cloned()
    }

    /// Latest state of `device`, or a placeholder if it never posted.
    pub fn latest_or_placeholder(&self, device: &str) -> DeviceState {
        self.latest(device)
            .unwrap_or_else(|| DeviceState::placeholder(device, DateTime::<Utc>::UNIX_EPOCH))
    }

    /// Names of devices that have posted, sorted.
    pub fn devices(&self) -> Vec<String> {
        let states = self.states.read().unwrap_or_else(|e| e.into_inner());
        states.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn payload(device: &str, temp: &str, battery: &str) -> StatePayload {
        StatePayload {
            device: device.to_string(),
            temp: Some(temp.to_string()),
            battery: Some(battery.to_string()),
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_leading_number() {
        assert_eq!(leading_number("72F"), Some(72));
        assert_eq!(leading_number(" 84% "), Some(84));
        assert_eq!(leading_number("-4F"), Some(-4));
        assert_eq!(leading_number("F72"), None);
        assert_eq!(leading_number(""), None);
    }

    #[test]
    fn test_payload_parsing() {
        let p = payload("kitchen", "72F", "104%");
        assert_eq!(p.temperature(), Some(72));
        assert_eq!(p.battery_soc(), Some(100));

        let json = r#"{"device": "hall"}"#;
        let p: StatePayload = serde_json::from_str(json).unwrap();
        assert_eq!(p.temperature(), None);
        assert_eq!(p.battery_soc(), None);
    }

    #[test]
    fn test_into_state_rejects_blank_name() {
        assert!(payload("  ", "72F", "84%").into_state(noon(), None).is_err());
    }

    #[test]
    fn test_store_keeps_latest() {
        let store = DeviceStore::in_memory();
        let first = payload("kitchen", "70F", "90%").into_state(noon(), None).unwrap();
        let second = payload("kitchen", "72F", "84%")
            .into_state(noon(), Some("192.168.1.20".to_string()))
            .unwrap();
        store.record(first);
        store.record(second.clone());

        assert_eq!(store.latest("kitchen"), Some(second));
        assert_eq!(store.devices(), vec!["kitchen".to_string()]);
    }

    #[test]
    fn test_placeholder_for_unknown_device() {
        let store = DeviceStore::in_memory();
        let state = store.latest_or_placeholder("hall");
        assert_eq!(state.device, "hall");
        assert_eq!(state.battery_soc, None);
        assert_eq!(state.ipaddr, None);
    }

    #[test]
    fn test_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");

        let store = DeviceStore::open(&path).unwrap();
        let state = payload("kitchen", "72F", "84%").into_state(noon(), None).unwrap();
        store.record(state.clone());

        let reopened = DeviceStore::open(&path).unwrap();
        assert_eq!(reopened.latest("kitchen"), Some(state));
    }

    #[test]
    fn test_store_survives_unwritable_file() {
        let dir = tempfile::tempdir().unwrap();
        // Parent is missing, so every save fails
        let path = dir.path().join("missing").join("devices.json");

        let store = DeviceStore::open(&path).unwrap();
        let state = payload("kitchen", "72F", "84%").into_state(noon(), None).unwrap();
        store.record(state.clone());

        assert_eq!(store.latest("kitchen"), Some(state));
        assert!(!path.exists());
    }
}
