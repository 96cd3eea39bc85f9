//! Full-screen image composition.
//!
//! [`compose`] lays out one device image:
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ Monday, June 3                   ▭ 84%│  header
//! │──────────────────────────────────────│
//! │ Inside 72°F                          │
//! │ Field day, Dentist                   │  all-day strip
//! │ 9 AM ... time grid / day columns ... │  body
//! │ Updated: 9:47 AM  192.168.1.20  Name │  footer
//! └──────────────────────────────────────┘
//! ```
//!
//! [`Dashboard`] wraps composition with the calendar and weather
//! collaborators for the per-device render path.

use std::sync::Arc;

use chrono::DateTime;
use chrono_tz::Tz;
use image::imageops;
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::calendar::{Calendar, CalendarEvent, CalendarSource, SnapshotCalendar};
use crate::canvas::{encode_png, Canvas, MonoFonts};
use crate::device::DeviceState;
use crate::draw::{DrawPrimitive, FontSize, LayoutBox, Point, Shade, TextMeasure};
use crate::grid::{layout_time_grid, GridOptions};
use crate::registry::DeviceConfig;
use crate::weather::{Forecast, WeatherSource};
use crate::{fill_box, Error, FilterPipeline};

const X_MARGIN: i32 = 10;
const X_PAD: i32 = 5;
const Y_PAD: i32 = 4;
const TEXT_SPACING: u32 = 2;
/// Battery gauge size
const BATTERY_WIDTH: i32 = 32;
const BATTERY_HEIGHT: i32 = 16;
/// Shown in the footer for devices that never posted
const UNKNOWN_IP: &str = "000.000.0.000";
/// Luma below which monochrome output is black
const MONO_THRESHOLD: u8 = 160;
/// Maximum height of a day-column summary
const DAY_TEXT_HEIGHT: u32 = 100;
/// Summary indent under an event's time range
const DAY_TEXT_INSET: i32 = 20;

/// Hardware families with fixed resolution, color depth and orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceFamily {
    /// Kindle Paperwhite held upright, 758x1024
    KindlePortrait,
    /// Kindle Paperwhite held sideways, composed at 1024x758
    KindleLandscape,
    /// TRMNL 7.5" panel, 800x480, black and white
    Trmnl,
}

/// Pixel format of the output image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMode {
    /// 8-bit grayscale
    Grayscale8,
    /// Black and white only
    Monochrome,
}

/// Rotation applied once after composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    /// 90° counter-clockwise
    Quarter,
}

impl DeviceFamily {
    /// Size of the composed canvas (before rotation).
    pub fn canvas_size(&self) -> (u32, u32) {
        match self {
            DeviceFamily::KindlePortrait => (758, 1024),
            DeviceFamily::KindleLandscape => (1024, 758),
            DeviceFamily::Trmnl => (800, 480),
        }
    }

    /// Pixel format of the output image.
    pub fn image_mode(&self) -> ImageMode {
        match self {
            DeviceFamily::Trmnl => ImageMode::Monochrome,
            _ => ImageMode::Grayscale8,
        }
    }

    /// Rotation applied before output. Kindles paint in portrait.
    pub fn rotation(&self) -> Rotation {
        match self {
            DeviceFamily::KindleLandscape => Rotation::Quarter,
            _ => Rotation::None,
        }
    }

    /// Font table for this family.
    pub fn fonts(&self) -> MonoFonts {
        match self {
            DeviceFamily::Trmnl => MonoFonts::compact(),
            _ => MonoFonts::large_display(),
        }
    }
}

/// Body layout of a device image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RendererVariant {
    /// Today's next hours with the weather alongside
    TimeGrid {
        #[serde(default = "default_hours")]
        hours: u32,
        #[serde(default)]
        busy_hatch: bool,
    },
    /// One column per day
    MultiDay {
        #[serde(default = "default_days")]
        days: u32,
    },
}

fn default_hours() -> u32 {
    7
}

fn default_days() -> u32 {
    7
}

impl Default for RendererVariant {
    fn default() -> Self {
        RendererVariant::TimeGrid {
            hours: default_hours(),
            busy_hatch: false,
        }
    }
}

impl RendererVariant {
    /// Number of calendar days the body shows.
    pub fn calendar_days(&self) -> u32 {
        match self {
            // The grid may run past midnight
            RendererVariant::TimeGrid { .. } => 2,
            RendererVariant::MultiDay { days } => *days,
        }
    }
}

/// Battery gauge level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatteryTier {
    Unknown,
    Alert,
    Low,
    Quarter,
    Half,
    MidHigh,
    High,
    NearFull,
    Full,
}

impl BatteryTier {
    /// Tier for a charge percentage; `None` is [`BatteryTier::Unknown`].
    ///
    /// # Example
    ///
    /// ```
    /// use inkdash::BatteryTier;
    ///
    /// assert_eq!(BatteryTier::from_percent(Some(95)), BatteryTier::NearFull);
    /// assert_eq!(BatteryTier::from_percent(Some(10)), BatteryTier::Alert);
    /// assert_eq!(BatteryTier::from_percent(None).name(), "unknown");
    /// ```
    pub fn from_percent(percent: Option<u8>) -> Self {
        match percent {
            None => BatteryTier::Unknown,
            Some(p) if p <= 10 => BatteryTier::Alert,
            Some(p) if p <= 25 => BatteryTier::Low,
            Some(p) if p <= 37 => BatteryTier::Quarter,
            Some(p) if p <= 55 => BatteryTier::Half,
            Some(p) if p <= 65 => BatteryTier::MidHigh,
            Some(p) if p <= 82 => BatteryTier::High,
            Some(p) if p <= 95 => BatteryTier::NearFull,
            Some(_) => BatteryTier::Full,
        }
    }

    /// Icon name.
    pub fn name(&self) -> &'static str {
        match self {
            BatteryTier::Unknown => "unknown",
            BatteryTier::Alert => "alert",
            BatteryTier::Low => "low",
            BatteryTier::Quarter => "quarter",
            BatteryTier::Half => "half",
            BatteryTier::MidHigh => "mid-high",
            BatteryTier::High => "high",
            BatteryTier::NearFull => "near-full",
            BatteryTier::Full => "full",
        }
    }

    /// Filled eighths of the gauge.
    fn level(&self) -> u32 {
        match self {
            BatteryTier::Unknown => 0,
            BatteryTier::Alert => 1,
            BatteryTier::Low => 2,
            BatteryTier::Quarter => 3,
            BatteryTier::Half => 4,
            BatteryTier::MidHigh => 5,
            BatteryTier::High => 6,
            BatteryTier::NearFull => 7,
            BatteryTier::Full => 8,
        }
    }
}

/// Battery gauge with its top-left corner at `origin`.
fn battery_icon(tier: BatteryTier, origin: Point) -> Vec<DrawPrimitive> {
    let body = LayoutBox::new(origin.x, origin.y, BATTERY_WIDTH as u32, BATTERY_HEIGHT as u32);
    let mut out = vec![
        DrawPrimitive::Rectangle {
            bounds: body,
            radius: 2,
            fill: None,
            outline: Some(Shade::Black),
        },
        DrawPrimitive::Rectangle {
            bounds: LayoutBox::new(body.right(), origin.y + 5, 3, 6),
            radius: 0,
            fill: Some(Shade::Black),
            outline: None,
        },
    ];

    let inner_width = (BATTERY_WIDTH - 4) as u32;
    let filled = inner_width * tier.level() / 8;
    if filled > 0 {
        out.push(DrawPrimitive::Rectangle {
            bounds: LayoutBox::new(origin.x + 2, origin.y + 2, filled, (BATTERY_HEIGHT - 4) as u32),
            radius: 0,
            fill: Some(Shade::Dark),
            outline: None,
        });
    }
    match tier {
        BatteryTier::Unknown => out.push(DrawPrimitive::text(
            Point::new(origin.x + 12, origin.y + 2),
            "?",
            FontSize::Tiny,
            Shade::Black,
        )),
        BatteryTier::Alert => out.push(DrawPrimitive::text(
            Point::new(origin.x + 12, origin.y + 2),
            "!",
            FontSize::Tiny,
            Shade::Black,
        )),
        _ => {}
    }
    out
}

/// Compose the image for one device.
///
/// The result is a pure function of the arguments: the same inputs give a
/// byte-identical bitmap. `calendar` should already be redacted and sorted.
///
/// # Errors
///
/// Layout errors from the grid or text fitting.
pub fn compose(
    state: &DeviceState,
    calendar: &Calendar,
    forecast: &Forecast,
    device: &DeviceConfig,
    now: &DateTime<Tz>,
) -> Result<GrayImage, Error> {
    let family = device.family;
    let fonts = family.fonts();
    let (width, height) = family.canvas_size();
    let (w, h) = (width as i32, height as i32);

    let mut out = Vec::new();
    let mut y = header(&mut out, w, state.battery_soc, now, &fonts);

    if let Some(temperature) = state.temperature {
        let line = format!("Inside {}°F", temperature);
        let (_, th) = fonts.measure(&line, FontSize::MediumSmall, 0);
        out.push(DrawPrimitive::text(
            Point::new(X_MARGIN, y + Y_PAD),
            line,
            FontSize::MediumSmall,
            Shade::Black,
        ));
        y += th as i32 + Y_PAD;
    }

    let (_, footer_height) = fonts.measure("X", FontSize::Tiny, 0);
    let footer_y = h - footer_height as i32 - 4 * Y_PAD;

    match device.variant {
        RendererVariant::TimeGrid { hours, busy_hatch } => {
            let today: Vec<CalendarEvent> = calendar
                .all_day()
                .into_iter()
                .filter(|e| e.occurs_on(now.date_naive()))
                .collect();
            y = all_day_strip(&mut out, &today, y, w, &fonts)?;

            y += 4 * Y_PAD;
            let grid_height = (footer_y - Y_PAD - y).max(0) as u32;
            let bounds = LayoutBox::new(0, y, width, grid_height);
            let options = GridOptions::new(hours).with_busy_hatch(busy_hatch);
            out.extend(layout_time_grid(
                &calendar.timed(),
                forecast,
                &options,
                now,
                bounds,
                &fonts,
            )?);
        }
        RendererVariant::MultiDay { days } => {
            day_columns(&mut out, calendar, days, now, y, w, h, &fonts)?;
        }
    }

    footer(&mut out, &device.name, state.ipaddr.as_deref(), footer_y, w, now, &fonts);

    let mut canvas = Canvas::new(width, height);
    canvas.draw_all(&out, &fonts);
    let mut image = canvas.into_image();

    if family.image_mode() == ImageMode::Monochrome {
        for p in image.pixels_mut() {
            p.0[0] = if p.0[0] < MONO_THRESHOLD { 0 } else { 255 };
        }
    }
    if family.rotation() == Rotation::Quarter {
        image = imageops::rotate270(&image);
    }
    Ok(image)
}

/// Date, battery gauge and separator. Returns the y below the header.
fn header(
    out: &mut Vec<DrawPrimitive>,
    width: i32,
    battery_soc: Option<u8>,
    now: &DateTime<Tz>,
    fonts: &MonoFonts,
) -> i32 {
    let day = now.format("%A, %B %-d").to_string();
    let (_, th) = fonts.measure(&day, FontSize::Large, 0);
    out.push(DrawPrimitive::text(
        Point::new(X_MARGIN, 0),
        day,
        FontSize::Large,
        Shade::Black,
    ));
    let mut y = th as i32 + Y_PAD;

    let tier = BatteryTier::from_percent(battery_soc);
    tracing::trace!("Battery {:?} -> {}", battery_soc, tier.name());
    let icon = Point::new(width - 48, 4);
    out.extend(battery_icon(tier, icon));
    let percent = match battery_soc {
        Some(p) => format!("{}%", p),
        None => "--%".to_string(),
    };
    out.push(DrawPrimitive::text(
        Point::new(icon.x + X_PAD, icon.y + BATTERY_HEIGHT + 2),
        percent,
        FontSize::Tiny,
        Shade::Dark,
    ));

    y = y.max(icon.y + BATTERY_HEIGHT + 2);
    out.push(DrawPrimitive::line(
        Point::new(X_MARGIN, y),
        Point::new(width - 2 * X_MARGIN, y),
        Shade::Mid,
    ));
    y + Y_PAD
}

/// Today's all-day events as one wrapped line. Returns the y below it.
fn all_day_strip(
    out: &mut Vec<DrawPrimitive>,
    events: &[CalendarEvent],
    y: i32,
    width: i32,
    fonts: &MonoFonts,
) -> Result<i32, Error> {
    if events.is_empty() {
        return Ok(y);
    }
    let joined = events
        .iter()
        .map(|e| e.summary())
        .collect::<Vec<_>>()
        .join(", ");
    let (_, line_height) = fonts.measure("X", FontSize::Small, 0);
    let text = fill_box(
        &joined,
        |t: &str, s| fonts.measure(t, FontSize::Small, s),
        (width - 2 * X_MARGIN) as u32,
        2 * line_height + TEXT_SPACING,
        TEXT_SPACING,
    )?;
    let (_, th) = fonts.measure(&text, FontSize::Small, TEXT_SPACING);
    out.push(DrawPrimitive::MultilineText {
        origin: Point::new(X_MARGIN, y + Y_PAD),
        text,
        font: FontSize::Small,
        color: Shade::Black,
        spacing: TEXT_SPACING,
    });
    Ok(y + Y_PAD + th as i32)
}

/// One column per day: four on the top row, the rest below.
#[allow(clippy::too_many_arguments)]
fn day_columns(
    out: &mut Vec<DrawPrimitive>,
    calendar: &Calendar,
    days: u32,
    now: &DateTime<Tz>,
    top: i32,
    width: i32,
    height: i32,
    fonts: &MonoFonts,
) -> Result<(), Error> {
    const PER_ROW: u32 = 4;
    let col_width = (width - 2 * X_MARGIN) / PER_ROW as i32;
    let today = now.date_naive();

    let mut x = X_MARGIN;
    let mut y_day = top;

    for (i, day) in today.iter_days().take(days as usize).enumerate() {
        if i as u32 == PER_ROW {
            x = X_MARGIN + col_width;
            y_day = height / 2;
        }

        let label = if i == 0 {
            "Today".to_string()
        } else {
            day.format("%A").to_string()
        };
        let (_, lh) = fonts.measure(&label, FontSize::MediumSmall, 0);
        out.push(DrawPrimitive::text(
            Point::new(x, y_day),
            label,
            FontSize::MediumSmall,
            Shade::Black,
        ));
        let mut y = y_day + lh as i32 + Y_PAD;

        let events = calendar.on_day(day);
        if events.is_empty() {
            out.push(DrawPrimitive::text(
                Point::new(x, y),
                "No Events",
                FontSize::Tiny,
                Shade::Black,
            ));
        }

        let measure = |t: &str, s: u32| fonts.measure(t, FontSize::Tiny, s);
        let mut first_timed = true;
        for event in &events {
            if event.is_all_day() {
                let text = fill_box(
                    event.summary(),
                    measure,
                    (col_width - X_PAD) as u32,
                    DAY_TEXT_HEIGHT,
                    TEXT_SPACING,
                )?;
                let (tw, th) = measure(&text, TEXT_SPACING);
                out.push(DrawPrimitive::Rectangle {
                    bounds: LayoutBox::new(
                        x - X_PAD,
                        y - Y_PAD / 2,
                        tw + 2 * X_PAD as u32,
                        th + (Y_PAD + Y_PAD / 2) as u32,
                    ),
                    radius: 5,
                    fill: Some(Shade::MidDark),
                    outline: Some(Shade::White),
                });
                out.push(DrawPrimitive::MultilineText {
                    origin: Point::new(x, y),
                    text,
                    font: FontSize::Tiny,
                    color: Shade::White,
                    spacing: TEXT_SPACING,
                });
                y += th as i32 + Y_PAD;
            } else {
                if first_timed {
                    first_timed = false;
                    y += Y_PAD;
                }
                let times = format!(
                    "{} - {}",
                    event.start().format("%-I:%M %p"),
                    event.end().format("%-I:%M %p")
                );
                let (_, th) = measure(&times, 0);
                out.push(DrawPrimitive::text(
                    Point::new(x, y),
                    times,
                    FontSize::Tiny,
                    Shade::Black,
                ));
                y += th as i32 + Y_PAD;

                // Keep clear of the right edge
                let mut text_width = col_width - DAY_TEXT_INSET - 2 * X_PAD;
                if x + text_width >= width - DAY_TEXT_INSET {
                    text_width = width - x - DAY_TEXT_INSET - X_PAD;
                }
                let text = fill_box(
                    event.summary(),
                    measure,
                    text_width.max(1) as u32,
                    DAY_TEXT_HEIGHT,
                    TEXT_SPACING,
                )?;
                let (_, th) = measure(&text, TEXT_SPACING);
                out.push(DrawPrimitive::MultilineText {
                    origin: Point::new(x + DAY_TEXT_INSET, y),
                    text,
                    font: FontSize::Tiny,
                    color: Shade::Black,
                    spacing: TEXT_SPACING,
                });
                y += th as i32 + Y_PAD;
            }
            y += Y_PAD;
        }

        x += col_width;
    }
    Ok(())
}

/// Update time, device IP and device name along the bottom edge.
///
/// The update time keeps its minutes, so this strip is the one part of the
/// image that changes between renders within the same hour.
fn footer(
    out: &mut Vec<DrawPrimitive>,
    device: &str,
    ipaddr: Option<&str>,
    y: i32,
    width: i32,
    now: &DateTime<Tz>,
    fonts: &MonoFonts,
) {
    out.push(DrawPrimitive::text(
        Point::new(15, y),
        format!("Updated: {}", now.format("%-I:%M %p")),
        FontSize::Tiny,
        Shade::Dark,
    ));

    let ip = ipaddr.unwrap_or(UNKNOWN_IP);
    let (iw, _) = fonts.measure(ip, FontSize::Tiny, 0);
    out.push(DrawPrimitive::text(
        Point::new((width - iw as i32) / 2, y),
        ip,
        FontSize::Tiny,
        Shade::Light,
    ));

    let name = format!("Device Name: {}", device);
    let (nw, _) = fonts.measure(&name, FontSize::Tiny, 0);
    out.push(DrawPrimitive::text(
        Point::new(width - nw as i32 - 4 * X_PAD, y),
        name,
        FontSize::Tiny,
        Shade::Dark,
    ));
}

/// Per-device render path with its collaborators.
///
/// Calendar and weather failures are logged and rendered as empty data;
/// only composition errors reach the caller.
#[derive(Clone)]
pub struct Dashboard {
    tz: Tz,
    weather: Option<Arc<dyn WeatherSource>>,
}

impl std::fmt::Debug for Dashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dashboard")
            .field("tz", &self.tz)
            .field("weather", &self.weather.is_some())
            .finish()
    }
}

impl Dashboard {
    /// Dashboard presenting times in `tz`, without weather.
    pub fn new(tz: Tz) -> Self {
        Self { tz, weather: None }
    }

    /// Use `weather` for the forecast column.
    pub fn with_weather(mut self, weather: Arc<dyn WeatherSource>) -> Self {
        self.weather = Some(weather);
        self
    }

    /// Display timezone.
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Redacted, sorted events for `device`; empty on failure.
    pub fn calendar(&self, device: &DeviceConfig, filters: &FilterPipeline, now: &DateTime<Tz>) -> Calendar {
        let Some(path) = &device.calendar else {
            return Calendar::new();
        };
        let source = SnapshotCalendar::new(path, self.tz);
        let days = device.variant.calendar_days();
        match source.events(now.date_naive(), days, filters) {
            Ok(mut calendar) => {
                if matches!(device.variant, RendererVariant::TimeGrid { .. }) {
                    calendar.retain_upcoming(now);
                }
                calendar
            }
            Err(e) => {
                tracing::warn!("Calendar for {} unavailable: {}", device.name, e);
                Calendar::new()
            }
        }
    }

    /// Current forecast; empty on failure.
    pub fn forecast(&self) -> Forecast {
        match &self.weather {
            Some(weather) => weather.forecast().unwrap_or_else(|e| {
                tracing::warn!("Weather unavailable: {}", e);
                Forecast::new()
            }),
            None => Forecast::new(),
        }
    }

    /// Compose the image for `device`.
    pub fn render(
        &self,
        device: &DeviceConfig,
        state: &DeviceState,
        filters: &FilterPipeline,
        now: &DateTime<Tz>,
    ) -> Result<GrayImage, Error> {
        let calendar = self.calendar(device, filters, now);
        let forecast = if matches!(device.variant, RendererVariant::TimeGrid { .. }) {
            self.forecast()
        } else {
            Forecast::new()
        };
        tracing::debug!(
            "Rendering {}: {} events, {} forecast hours",
            device.name,
            calendar.events().len(),
            forecast.len()
        );
        compose(state, &calendar, &forecast, device, now)
    }

    /// Compose the image for `device` and encode it as PNG.
    pub fn render_png(
        &self,
        device: &DeviceConfig,
        state: &DeviceState,
        filters: &FilterPipeline,
        now: &DateTime<Tz>,
    ) -> Result<Vec<u8>, Error> {
        let image = self.render(device, state, filters, now)?;
        encode_png(&image)
    }
}
