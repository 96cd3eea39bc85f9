//! # inkdash
//!
//! A home dashboard server for battery-powered e-ink displays (jailbroken
//! Kindles, [TRMNL](https://usetrmnl.com) panels).
//!
//! Devices wake on a schedule, post their telemetry, download a pre-rendered
//! PNG and go back to sleep. This crate composes those images:
//! - A header with the date and a battery gauge
//! - An hour-by-hour agenda grid with the weather forecast alongside, or a
//!   week of day columns
//! - A footer with the update time, device IP and name
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use inkdash::{compose::Dashboard, DeviceRegistry, DeviceStore, FilterPipeline};
//!
//! let registry = DeviceRegistry::from_yaml(include_str!("devices.yaml"))?;
//! let dashboard = Dashboard::new(chrono_tz::America::Los_Angeles);
//! let filters = FilterPipeline::load_or_default("string-filters.json");
//!
//! let device = registry.get("kitchen")?;
//! let state = DeviceStore::in_memory().latest_or_placeholder("kitchen");
//! let png = dashboard.render_png(device, &state, &filters, &now)?;
//! ```
//!
//! ## Layout
//!
//! Layout code never touches pixels. [`grid::layout_time_grid`] and the
//! composer emit [`DrawPrimitive`]s, and [`canvas`] rasterizes them with
//! `embedded-graphics` onto an 8-bit grayscale bitmap.
//!
//! | Family | Canvas | Output |
//! |--------|--------|--------|
//! | `kindle-portrait` | 758x1024 | 8-bit grayscale |
//! | `kindle-landscape` | 1024x758 | 8-bit grayscale, rotated to 758x1024 |
//! | `trmnl` | 800x480 | black and white |
//!
//! ## Feature Flags
//!
//! - `axum` - HTTP routes and the `inkdash-server` binary
//! - `nws` - National Weather Service hourly forecast
//! - `full` - All features

pub mod cache;
pub mod calendar;
pub mod canvas;
pub mod compose;
pub mod config;
pub mod device;
pub mod draw;
mod error;
pub mod filters;
pub mod grid;
pub mod icon;
pub mod registry;
pub mod schedule;
mod text;
pub mod weather;

pub use cache::ImageCache;
pub use calendar::{Calendar, CalendarEvent, CalendarSource, SnapshotCalendar};
pub use compose::{compose, BatteryTier, Dashboard, DeviceFamily, RendererVariant};
pub use config::ServerConfig;
pub use device::{DeviceState, DeviceStore, StatePayload};
pub use draw::{DrawPrimitive, LayoutBox, Shade};
pub use error::Error;
pub use filters::{FilterPipeline, StringFilter};
pub use registry::{DeviceConfig, DeviceRegistry};
pub use schedule::{SchedulePolicy, SleepDelay};
pub use text::fill_box;
pub use weather::{Forecast, HourlyForecast, SnapshotWeather, WeatherSource};

#[cfg(feature = "nws")]
pub use weather::NwsWeather;

#[cfg(feature = "axum")]
pub mod server;

use std::io::Write;
use std::path::Path;

/// Maximum age of a cached image before it is recomposed
pub const FRESHNESS_WINDOW_SECS: u64 = 5 * 60;

/// Extra delay added to scheduled wakes so the pre-rendered image is ready
pub const RENDER_MARGIN_SECS: u32 = 2 * 60;

/// How long before a device wakes its image is pre-rendered
pub const PRE_RENDER_LEAD_SECS: u32 = 60;

/// Write `bytes` to `path` through a temporary file in the same directory,
/// so readers never observe a partially written file.
pub(crate) fn persist_atomically(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| Error::from(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_atomically_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        persist_atomically(&path, b"first").unwrap();
        persist_atomically(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");

        // No temporary files left behind
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_persist_atomically_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("state.json");
        assert!(persist_atomically(&path, b"data").is_err());
    }

    #[test]
    fn test_constants() {
        assert_eq!(FRESHNESS_WINDOW_SECS, 300);
        assert!(PRE_RENDER_LEAD_SECS < RENDER_MARGIN_SECS);
    }
}
