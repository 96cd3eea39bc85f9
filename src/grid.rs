//! Hour-by-hour agenda grid with a weather column.
//!
//! ```text
//!  ─────────────────────────────────────────── 9 AM row
//!   9 AM        ╭──────────────────╮   ☼
//!         ──────│ Standup          │─  64°F
//!               ╰──────────────────╯
//!  ─────────────────────────────────────────── 10 AM row
//! ```
//!
//! [`layout_time_grid`] is a pure function of its inputs: it returns draw
//! primitives and never touches pixels.

use chrono::{DateTime, Duration};
use chrono_tz::Tz;

use crate::calendar::{reference_hour, CalendarEvent};
use crate::draw::{DrawPrimitive, FontSize, LayoutBox, Point, Shade, TextMeasure};
use crate::icon::{WeatherIcon, MIN_ICON_SIZE};
use crate::weather::{Forecast, HourlyForecast};
use crate::{fill_box, Error};

/// Horizontal padding
const X_PAD: i32 = 5;
/// Vertical padding
const Y_PAD: i32 = 3;
/// Trim applied to the bottom of an event bar
const HALF_PAD: i32 = Y_PAD / 2;
/// Width of the weather column on the right edge
const WEATHER_WIDTH: i32 = 100;
/// Padding inside a weather cell
const WEATHER_PAD: i32 = 5;
/// Gap between the hour labels and the event column
const EVENT_INDENT: i32 = 30;
/// Corner radius of event bars
const EVENT_RADIUS: u32 = 5;
/// Pixels between busy-hatch lines
const HATCH_SPACING: i32 = 8;
/// Line spacing of wrapped text
const TEXT_SPACING: u32 = 2;
/// Largest weather icon
const ICON_MAX: u32 = 48;

/// Color of the hour dividers.
pub const DIVIDER_SHADE: Shade = Shade::Mid;

/// Events this short or shorter get a label but no bar.
pub fn min_bar_duration() -> Duration {
    Duration::minutes(12)
}

/// Time grid settings for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridOptions {
    /// Number of hour rows, starting at the current hour
    pub hours: u32,
    /// Draw event bars outlined and hatched instead of filled
    pub busy_hatch: bool,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            hours: 7,
            busy_hatch: false,
        }
    }
}

impl GridOptions {
    /// Grid spanning `hours` rows.
    pub fn new(hours: u32) -> Self {
        Self {
            hours,
            ..Self::default()
        }
    }

    /// Enable or disable the hatched busy treatment.
    pub fn with_busy_hatch(mut self, busy_hatch: bool) -> Self {
        self.busy_hatch = busy_hatch;
        self
    }
}

/// Lay out timed events and the hourly forecast inside `bounds`.
///
/// Rows start at the hour containing `now`. `events` must already be sorted
/// by start; they are drawn in that order and overlapping events are drawn
/// over each other. Events that ended at or before `now` are skipped, as
/// are events whose bar would start below the grid. Bars running past the
/// grid are cut off `Y_PAD` pixels above its bottom edge.
///
/// # Errors
///
/// [`Error::Invalid`] if `bounds` cannot hold the requested rows or the
/// event column; [`Error::Layout`] if text fitting fails.
pub fn layout_time_grid<M>(
    events: &[CalendarEvent],
    forecast: &Forecast,
    options: &GridOptions,
    now: &DateTime<Tz>,
    bounds: LayoutBox,
    fonts: &M,
) -> Result<Vec<DrawPrimitive>, Error>
where
    M: TextMeasure + ?Sized,
{
    let hours = options.hours;
    if hours == 0 {
        return Err(Error::invalid("grid", "timeframe must be at least one hour"));
    }
    if bounds.height < 2 * hours {
        return Err(Error::invalid(
            "grid",
            format!("{}px is too short for {} rows", bounds.height, hours),
        ));
    }

    let reference = reference_hour(now);
    let x_base = bounds.x;
    let y_base = bounds.y;
    let width = bounds.width as i32;
    let height = bounds.height as i32;
    let x_weather = x_base + width - WEATHER_WIDTH;
    let row_height = f64::from(bounds.height) / f64::from(hours);

    let mut out = Vec::new();
    let mut label_end = x_base;

    for i in 0..hours {
        let y = y_base + (f64::from(i) * row_height).round() as i32;
        out.push(DrawPrimitive::line(
            Point::new(x_base + X_PAD, y),
            Point::new(x_base + width - X_PAD, y),
            DIVIDER_SHADE,
        ));

        let hour = reference + Duration::hours(i64::from(i));
        let label = hour.format("%-I %p").to_string();
        let label_x = x_base + 3 * X_PAD;
        let (label_width, _) = fonts.measure(&label, FontSize::Small, 0);
        out.push(DrawPrimitive::text(
            Point::new(label_x, y + Y_PAD),
            label,
            FontSize::Small,
            Shade::Black,
        ));

        let mid_start = label_x + label_width as i32 + 2 * X_PAD;
        label_end = label_end.max(mid_start);
        let y_mid = y + (row_height / 2.0).round() as i32;
        out.push(DrawPrimitive::line(
            Point::new(mid_start, y_mid),
            Point::new(x_weather, y_mid),
            Shade::Light,
        ));

        if let Some(weather) = forecast.get(&hour) {
            let cell = LayoutBox::new(x_weather, y, WEATHER_WIDTH as u32, row_height as u32);
            weather_cell(&mut out, weather, cell, fonts)?;
        }
    }

    out.push(DrawPrimitive::line(
        Point::new(x_base + X_PAD, y_base + height - 1),
        Point::new(x_base + width - X_PAD, y_base + height - 1),
        DIVIDER_SHADE,
    ));

    if events.is_empty() {
        tracing::trace!("No events for the grid");
        return Ok(out);
    }

    let x_event = label_end + EVENT_INDENT;
    let x_right = x_weather - 2 * X_PAD;
    let text_width = x_weather - x_event - 4 * X_PAD;
    if text_width <= 0 {
        return Err(Error::invalid(
            "grid",
            format!("{}px leaves no room for the event column", bounds.width),
        ));
    }

    let timeframe = f64::from(hours * 3600);
    let y_pixels = f64::from(height - 2 * Y_PAD);
    let y_max = y_base + height - Y_PAD;

    for event in events {
        if event.end() <= now {
            tracing::trace!("Event '{}' already ended", event.summary());
            continue;
        }

        // In-progress events start at the top of the grid
        let start = (*event.start() - reference).num_seconds().max(0);
        let end = (*event.end() - reference).num_seconds().max(0);

        // One extra pixel per divider crossed
        let hours_elapsed = (start / 3600) as f64;
        let y_start = (f64::from(y_base) + y_pixels * start as f64 / timeframe + hours_elapsed)
            .round() as i32
            + Y_PAD;
        let y_end = (f64::from(y_base) + y_pixels * end as f64 / timeframe).round() as i32 - HALF_PAD;

        if y_start >= y_max {
            tracing::trace!("Event '{}' starts below the grid", event.summary());
            continue;
        }
        let y_end = y_end.min(y_max).max(y_start);

        let bar = LayoutBox::new(
            x_event,
            y_start,
            (x_right - x_event) as u32,
            (y_end - y_start) as u32,
        );
        let has_bar = event.duration() > min_bar_duration();
        if has_bar {
            if options.busy_hatch {
                out.push(DrawPrimitive::Rectangle {
                    bounds: bar,
                    radius: EVENT_RADIUS,
                    fill: None,
                    outline: Some(Shade::Mid),
                });
                hatch(&mut out, &bar);
            } else {
                out.push(DrawPrimitive::Rectangle {
                    bounds: bar,
                    radius: EVENT_RADIUS,
                    fill: Some(Shade::Faint),
                    outline: Some(Shade::Mid),
                });
            }
        }

        let text_height = (y_end - y_start - HALF_PAD).max(0) as u32;
        let summary = fill_box(
            event.summary(),
            |t: &str, s| fonts.measure(t, FontSize::Small, s),
            text_width as u32,
            text_height,
            TEXT_SPACING,
        )?;
        if summary.is_empty() {
            continue;
        }

        let origin = Point::new(x_event + X_PAD, y_start + 1);
        if has_bar && options.busy_hatch {
            let (w, h) = fonts.measure(&summary, FontSize::Small, TEXT_SPACING);
            let patch_height = (h as i32 + 2).min(bar.bottom() - origin.y).max(0);
            out.push(DrawPrimitive::Rectangle {
                bounds: LayoutBox::new(origin.x - 1, origin.y, w + 2, patch_height as u32),
                radius: 0,
                fill: Some(Shade::White),
                outline: None,
            });
        }
        out.push(DrawPrimitive::MultilineText {
            origin,
            text: summary,
            font: FontSize::Small,
            color: Shade::Black,
            spacing: TEXT_SPACING,
        });
    }

    Ok(out)
}

/// Weather icon and temperature for one row.
///
/// Cells too short for an icon show the wrapped short forecast instead.
fn weather_cell<M>(
    out: &mut Vec<DrawPrimitive>,
    weather: &HourlyForecast,
    cell: LayoutBox,
    fonts: &M,
) -> Result<(), Error>
where
    M: TextMeasure + ?Sized,
{
    let temperature = format!("{}°F", weather.temperature);
    let (tw, th) = fonts.measure(&temperature, FontSize::Small, 0);
    let x = cell.x + (cell.width as i32 - tw as i32) / 2;
    let y = (cell.bottom() - th as i32 - 3 * WEATHER_PAD).max(cell.y);

    let above = (y - cell.y - WEATHER_PAD).max(0) as u32;
    let size = above.min(cell.width - 2 * WEATHER_PAD as u32).min(ICON_MAX);
    if size >= MIN_ICON_SIZE {
        let area = LayoutBox::new(
            cell.x + (cell.width - size) as i32 / 2,
            cell.y + WEATHER_PAD + (above - size) as i32 / 2,
            size,
            size,
        );
        let night = !weather.is_daytime || weather.icon.starts_with("night/");
        out.extend(WeatherIcon::from_id(&weather.icon).primitives(night, area));
    } else {
        let description = fill_box(
            &weather.short_forecast,
            |t: &str, s| fonts.measure(t, FontSize::Tiny, s),
            cell.width - 2 * WEATHER_PAD as u32,
            above,
            TEXT_SPACING,
        )?;
        if !description.is_empty() {
            out.push(DrawPrimitive::MultilineText {
                origin: Point::new(cell.x + WEATHER_PAD, cell.y + WEATHER_PAD),
                text: description,
                font: FontSize::Tiny,
                color: Shade::Dark,
                spacing: TEXT_SPACING,
            });
        }
    }

    out.push(DrawPrimitive::text(
        Point::new(x, y),
        temperature,
        FontSize::Small,
        Shade::Black,
    ));
    Ok(())
}

/// 45° lines (`x + y = k`) across `bar`, clipped to its bounds.
fn hatch(out: &mut Vec<DrawPrimitive>, bar: &LayoutBox) {
    if bar.width < 2 || bar.height < 2 {
        return;
    }
    let (x0, y0) = (bar.x, bar.y);
    let (x1, y1) = (bar.right() - 1, bar.bottom() - 1);

    let mut k = x0 + y0 + HATCH_SPACING;
    while k < x1 + y1 {
        let lower_x = x0.max(k - y1);
        let upper_x = x1.min(k - y0);
        if lower_x <= upper_x {
            out.push(DrawPrimitive::line(
                Point::new(lower_x, k - lower_x),
                Point::new(upper_x, k - upper_x),
                Shade::Light,
            ));
        }
        k += HATCH_SPACING;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::MonoFonts;
    use chrono::TimeZone;
    use chrono_tz::America::Los_Angeles as LA;

    const BOUNDS: LayoutBox = LayoutBox::new(0, 100, 758, 700);

    fn at(h: u32, m: u32) -> DateTime<Tz> {
        LA.with_ymd_and_hms(2024, 6, 3, h, m, 0).unwrap()
    }

    fn event(summary: &str, start: DateTime<Tz>, end: DateTime<Tz>) -> CalendarEvent {
        CalendarEvent::new(summary, start, end, false).unwrap()
    }

    fn layout(events: &[CalendarEvent], options: GridOptions) -> Vec<DrawPrimitive> {
        let fonts = MonoFonts::large_display();
        layout_time_grid(events, &Forecast::new(), &options, &at(9, 5), BOUNDS, &fonts).unwrap()
    }

    fn bars(primitives: &[DrawPrimitive]) -> Vec<LayoutBox> {
        primitives
            .iter()
            .filter_map(|p| match p {
                DrawPrimitive::Rectangle {
                    bounds,
                    outline: Some(_),
                    ..
                } => Some(*bounds),
                _ => None,
            })
            .collect()
    }

    fn text_block<'a>(primitives: &'a [DrawPrimitive], wanted: &str) -> Option<(Point, &'a str)> {
        primitives.iter().find_map(|p| match p {
            DrawPrimitive::MultilineText { origin, text, .. } if text.contains(wanted) => {
                Some((*origin, text.as_str()))
            }
            _ => None,
        })
    }

    #[test]
    fn test_standup_in_first_row() {
        let fonts = MonoFonts::large_display();
        let out = layout(&[event("Standup", at(9, 15), at(9, 45))], GridOptions::new(7));

        let bars = bars(&out);
        assert_eq!(bars.len(), 1);
        let bar = bars[0];
        // First row spans 100..200
        assert!(bar.y >= 100 && bar.bottom() <= 200);

        let (origin, text) = text_block(&out, "Standup").unwrap();
        assert_eq!(text, "Standup");
        let (w, h) = fonts.measure(text, FontSize::Small, TEXT_SPACING);
        assert!(bar.contains(&LayoutBox::new(origin.x, origin.y, w, h)));
    }

    #[test]
    fn test_finished_event_not_drawn() {
        let out = layout(
            &[
                event("Breakfast", at(7, 0), at(8, 0)),
                event("Early sync", at(9, 0), at(9, 5)),
            ],
            GridOptions::new(7),
        );
        assert!(bars(&out).is_empty());
        assert!(text_block(&out, "Breakfast").is_none());
        assert!(text_block(&out, "Early sync").is_none());
    }

    #[test]
    fn test_event_past_bottom_is_clamped() {
        let out = layout(&[event("Offsite", at(14, 0), at(18, 0))], GridOptions::new(7));
        let bars = bars(&out);
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].bottom(), BOUNDS.y + BOUNDS.height as i32 - Y_PAD);
    }

    #[test]
    fn test_event_below_grid_dropped() {
        let out = layout(&[event("Dinner", at(17, 0), at(18, 0))], GridOptions::new(7));
        assert!(bars(&out).is_empty());
        assert!(text_block(&out, "Dinner").is_none());
    }

    #[test]
    fn test_in_progress_event_starts_at_top() {
        let out = layout(&[event("Workshop", at(8, 0), at(10, 0))], GridOptions::new(7));
        let bars = bars(&out);
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].y, BOUNDS.y + Y_PAD);
    }

    #[test]
    fn test_dividers_monotonic() {
        for hours in [1, 4, 7, 12] {
            let out = layout(&[], GridOptions::new(hours));
            let ys: Vec<i32> = out
                .iter()
                .filter_map(|p| match p {
                    DrawPrimitive::Line { from, to, color } if from.y == to.y && *color == DIVIDER_SHADE => {
                        Some(from.y)
                    }
                    _ => None,
                })
                .collect();
            assert_eq!(ys.len(), hours as usize + 1);
            assert!(ys.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_hour_labels() {
        let out = layout(&[], GridOptions::new(3));
        let labels: Vec<&str> = out
            .iter()
            .filter_map(|p| match p {
                DrawPrimitive::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(labels, vec!["9 AM", "10 AM", "11 AM"]);
    }

    #[test]
    fn test_twelve_minute_rule() {
        let short = layout(&[event("Ping", at(10, 0), at(10, 12))], GridOptions::new(7));
        assert!(bars(&short).is_empty());
        assert!(text_block(&short, "Ping").is_some());

        let long = layout(&[event("Ping", at(10, 0), at(10, 13))], GridOptions::new(7));
        assert_eq!(bars(&long).len(), 1);
    }

    #[test]
    fn test_empty_grid() {
        let out = layout(&[], GridOptions::new(7));
        assert!(!out
            .iter()
            .any(|p| matches!(p, DrawPrimitive::Rectangle { .. } | DrawPrimitive::MultilineText { .. })));
    }

    #[test]
    fn test_overlapping_events_drawn_in_order() {
        let out = layout(
            &[
                event("First", at(10, 0), at(11, 0)),
                event("Second", at(10, 0), at(11, 0)),
            ],
            GridOptions::new(7),
        );
        let bars = bars(&out);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0], bars[1]);
    }

    #[test]
    fn test_busy_hatch() {
        let out = layout(
            &[event("Focus time", at(10, 0), at(11, 0))],
            GridOptions::new(7).with_busy_hatch(true),
        );
        let bar = out
            .iter()
            .find_map(|p| match p {
                DrawPrimitive::Rectangle {
                    bounds,
                    fill: None,
                    outline: Some(_),
                    ..
                } => Some(*bounds),
                _ => None,
            })
            .unwrap();

        let hatch: Vec<(Point, Point)> = out
            .iter()
            .filter_map(|p| match p {
                DrawPrimitive::Line { from, to, .. } if from.y != to.y => Some((*from, *to)),
                _ => None,
            })
            .collect();
        assert!(!hatch.is_empty());
        for (from, to) in &hatch {
            assert!(bar.contains_point(*from) && bar.contains_point(*to));
            assert_eq!(from.x + from.y, to.x + to.y);
        }

        // Opaque patch precedes the text
        let patch = out
            .iter()
            .position(|p| matches!(p, DrawPrimitive::Rectangle { fill: Some(Shade::White), .. }))
            .unwrap();
        let text = out
            .iter()
            .position(|p| matches!(p, DrawPrimitive::MultilineText { .. }))
            .unwrap();
        assert!(patch < text);
    }

    #[test]
    fn test_weather_column() {
        let fonts = MonoFonts::large_display();
        let mut forecast = Forecast::new();
        forecast.insert(
            &at(9, 0),
            HourlyForecast {
                temperature: 64,
                short_forecast: "Partly Sunny".to_string(),
                icon: "day/sct".to_string(),
                is_daytime: true,
                wind_speed: None,
                wind_direction: None,
            },
        );
        let out =
            layout_time_grid(&[], &forecast, &GridOptions::new(7), &at(9, 5), BOUNDS, &fonts).unwrap();

        let x_weather = BOUNDS.right() - WEATHER_WIDTH;
        let temperature = out.iter().find_map(|p| match p {
            DrawPrimitive::Text { origin, text, .. } if text == "64°F" => Some(*origin),
            _ => None,
        });
        let origin = temperature.unwrap();
        assert!(origin.x >= x_weather && origin.y >= BOUNDS.y && origin.y < BOUNDS.y + 100);

        // Partly cloudy: sun disc plus cloud, all in the cell above the temperature
        let cell = LayoutBox::new(x_weather, BOUNDS.y, WEATHER_WIDTH as u32, (origin.y - BOUNDS.y) as u32);
        let icon: Vec<&DrawPrimitive> = out
            .iter()
            .filter(|p| matches!(p, DrawPrimitive::Rectangle { bounds, .. } if cell.contains(bounds)))
            .collect();
        assert_eq!(icon.len(), 3);
        assert!(out.iter().any(|p| matches!(
            p,
            DrawPrimitive::Line { from, to, .. } if from.x >= x_weather && to.y < origin.y && from.y > BOUNDS.y
        )));
        assert!(text_block(&out, "Sunny").is_none());
    }

    #[test]
    fn test_weather_column_short_rows() {
        let fonts = MonoFonts::large_display();
        let mut forecast = Forecast::new();
        forecast.insert(
            &at(9, 0),
            HourlyForecast {
                temperature: 51,
                short_forecast: "Rain".to_string(),
                icon: "night/rain".to_string(),
                is_daytime: false,
                wind_speed: Some("10 mph".to_string()),
                wind_direction: Some("S".to_string()),
            },
        );
        // 24 rows of 29px leave no room for an icon
        let out =
            layout_time_grid(&[], &forecast, &GridOptions::new(24), &at(9, 5), BOUNDS, &fonts).unwrap();
        let x_weather = BOUNDS.right() - WEATHER_WIDTH;
        assert!(!out.iter().any(|p| matches!(
            p,
            DrawPrimitive::Rectangle { bounds, .. } if bounds.x >= x_weather
        )));
        assert!(out.iter().any(|p| matches!(p, DrawPrimitive::Text { text, .. } if text == "51°F")));
        assert!(text_block(&out, "Rain").is_some());
    }

    #[test]
    fn test_rows_across_fall_back() {
        use chrono::Utc;

        let fonts = MonoFonts::large_display();
        // 01:30 PDT, half an hour before clocks go back
        let now = Utc.with_ymd_and_hms(2024, 11, 3, 8, 30, 0).unwrap().with_timezone(&LA);
        let standup = event(
            "Standup",
            Utc.with_ymd_and_hms(2024, 11, 3, 8, 10, 0).unwrap().with_timezone(&LA),
            Utc.with_ymd_and_hms(2024, 11, 3, 8, 50, 0).unwrap().with_timezone(&LA),
        );
        let out = layout_time_grid(&[standup], &Forecast::new(), &GridOptions::new(7), &now, BOUNDS, &fonts)
            .unwrap();

        let labels: Vec<&str> = out
            .iter()
            .filter_map(|p| match p {
                DrawPrimitive::Text { text, .. } if text.ends_with('M') => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(&labels[..3], &["1 AM", "1 AM", "2 AM"]);

        // The bar starts inside the first row
        let bar = bars(&out)[0];
        assert!(bar.y > BOUNDS.y && bar.y < BOUNDS.y + 100);
    }

    #[test]
    fn test_invalid_grids() {
        let fonts = MonoFonts::large_display();
        let forecast = Forecast::new();
        let zero = layout_time_grid(&[], &forecast, &GridOptions::new(0), &at(9, 0), BOUNDS, &fonts);
        assert!(zero.is_err());

        let short = LayoutBox::new(0, 0, 758, 10);
        assert!(layout_time_grid(&[], &forecast, &GridOptions::new(7), &at(9, 0), short, &fonts).is_err());
    }

    #[test]
    fn test_deterministic() {
        let events = [event("Standup", at(9, 15), at(9, 45))];
        assert_eq!(layout(&events, GridOptions::new(7)), layout(&events, GridOptions::new(7)));
    }
}
