//! Weather icons built from draw primitives.
//!
//! Forecast icon ids look like `day/rain` or `night/sct`; the condition part
//! uses the National Weather Service icon names. Each condition maps to a
//! small vector drawing that scales to a square box.

use crate::draw::{DrawPrimitive, FontSize, LayoutBox, Point, Shade};

/// Smallest box an icon is drawn in.
pub const MIN_ICON_SIZE: u32 = 12;

/// Condition shown by a weather icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherIcon {
    /// Clear or mostly clear sky
    Clear,
    /// Scattered clouds
    PartlyCloudy,
    /// Broken or overcast clouds
    Cloudy,
    /// Rain and showers
    Rain,
    /// Snow, sleet and freezing rain
    Snow,
    /// Thunderstorms and tropical systems
    Storm,
    /// Fog, haze, smoke or dust
    Fog,
    /// Windy
    Wind,
    /// Anything not recognized
    Unknown,
}

impl WeatherIcon {
    /// Icon for an id such as `day/rain_showers` or a bare `ovc`.
    ///
    /// # Example
    ///
    /// ```
    /// use inkdash::icon::WeatherIcon;
    ///
    /// assert_eq!(WeatherIcon::from_id("day/tsra_hi"), WeatherIcon::Storm);
    /// assert_eq!(WeatherIcon::from_id("night/sct"), WeatherIcon::PartlyCloudy);
    /// ```
    pub fn from_id(id: &str) -> Self {
        let condition = id.rsplit('/').next().unwrap_or(id);
        match condition {
            "skc" | "few" | "hot" | "cold" => WeatherIcon::Clear,
            "sct" => WeatherIcon::PartlyCloudy,
            "bkn" | "ovc" => WeatherIcon::Cloudy,
            "fog" | "haze" | "smoke" | "dust" => WeatherIcon::Fog,
            "tornado" | "hurricane" | "tropical_storm" => WeatherIcon::Storm,
            "blizzard" | "sleet" | "fzra" => WeatherIcon::Snow,
            c if c.starts_with("wind_") => WeatherIcon::Wind,
            c if c.starts_with("tsra") => WeatherIcon::Storm,
            c if c.contains("snow") || c.contains("sleet") || c.contains("fzra") => WeatherIcon::Snow,
            c if c.starts_with("rain") => WeatherIcon::Rain,
            _ => WeatherIcon::Unknown,
        }
    }

    /// Primitives drawing the icon inside `area`, which should be square.
    ///
    /// Sky icons show a moon instead of a sun when `night` is set. Nothing is
    /// drawn when `area` is smaller than [`MIN_ICON_SIZE`].
    pub fn primitives(self, night: bool, area: LayoutBox) -> Vec<DrawPrimitive> {
        let s = area.width.min(area.height);
        if s < MIN_ICON_SIZE {
            return Vec::new();
        }
        let (x, y, s) = (area.x, area.y, s as i32);
        let sky = |x, y, s| if night { moon(x, y, s) } else { sun(x, y, s) };

        let mut out = Vec::new();
        match self {
            WeatherIcon::Clear => out.extend(sky(x, y, s)),
            WeatherIcon::PartlyCloudy => {
                out.extend(sky(x, y, s * 3 / 5));
                out.extend(cloud(x + s / 3, y + s / 2, s - s / 3, s - s / 2));
            }
            WeatherIcon::Cloudy => out.extend(cloud(x, y + s / 6, s, s * 2 / 3)),
            WeatherIcon::Rain => {
                out.extend(cloud(x, y, s, s * 3 / 5));
                for i in 1..=3 {
                    let top = Point::new(x + i * s / 4, y + s * 3 / 5 + 2);
                    let bottom = Point::new(top.x - s / 8, y + s - 1);
                    out.push(DrawPrimitive::line(top, bottom, Shade::Dark));
                }
            }
            WeatherIcon::Snow => {
                out.extend(cloud(x, y, s, s * 3 / 5));
                for i in 1..=3 {
                    let flake = LayoutBox::new(x + i * s / 4 - 1, y + s * 4 / 5 - 1, 3, 3);
                    out.push(DrawPrimitive::Rectangle {
                        bounds: flake,
                        radius: 0,
                        fill: Some(Shade::Dark),
                        outline: None,
                    });
                }
            }
            WeatherIcon::Storm => {
                out.extend(cloud(x, y, s, s * 3 / 5));
                let bolt = [
                    Point::new(x + s / 2, y + s * 3 / 5),
                    Point::new(x + s * 3 / 8, y + s * 4 / 5),
                    Point::new(x + s * 5 / 8, y + s * 4 / 5),
                    Point::new(x + s / 2, y + s - 1),
                ];
                for pair in bolt.windows(2) {
                    out.push(DrawPrimitive::line(pair[0], pair[1], Shade::Black));
                }
            }
            WeatherIcon::Fog => {
                for (i, inset) in [0, s / 6, 0].into_iter().enumerate() {
                    let row = y + (i as i32 + 1) * s / 4;
                    out.push(DrawPrimitive::line(
                        Point::new(x + 1 + inset, row),
                        Point::new(x + s - 2, row),
                        Shade::Mid,
                    ));
                }
            }
            WeatherIcon::Wind => {
                for (i, length) in [s * 3 / 4, s - 2, s / 2].into_iter().enumerate() {
                    let row = y + (i as i32 + 1) * s / 4;
                    out.push(DrawPrimitive::line(
                        Point::new(x + 1, row),
                        Point::new(x + length, row),
                        Shade::Dark,
                    ));
                }
            }
            WeatherIcon::Unknown => out.push(DrawPrimitive::text(
                Point::new(x + s / 2 - 3, y + s / 2 - 5),
                "?",
                FontSize::Tiny,
                Shade::Dark,
            )),
        }
        out
    }
}

/// Circle of radius `r` centred on (`cx`, `cy`).
fn circle(cx: i32, cy: i32, r: i32, fill: Option<Shade>, outline: Option<Shade>) -> DrawPrimitive {
    DrawPrimitive::Rectangle {
        bounds: LayoutBox::new(cx - r, cy - r, (2 * r) as u32, (2 * r) as u32),
        radius: r as u32,
        fill,
        outline,
    }
}

/// Disc with rays, filling the `s` square at (`x`, `y`).
fn sun(x: i32, y: i32, s: i32) -> Vec<DrawPrimitive> {
    let (cx, cy) = (x + s / 2, y + s / 2);
    let r = (s / 4).max(1);
    let mut out = vec![circle(cx, cy, r, Some(Shade::Light), Some(Shade::Black))];

    let (inner, outer) = (r + 2, s / 2 - 1);
    if inner < outer {
        for (dx, dy) in [(1, 0), (0, 1), (-1, 0), (0, -1)] {
            out.push(DrawPrimitive::line(
                Point::new(cx + dx * inner, cy + dy * inner),
                Point::new(cx + dx * outer, cy + dy * outer),
                Shade::Dark,
            ));
        }
        let (inner, outer) = (inner * 7 / 10, outer * 7 / 10);
        if inner < outer {
            for (dx, dy) in [(1, 1), (-1, 1), (-1, -1), (1, -1)] {
                out.push(DrawPrimitive::line(
                    Point::new(cx + dx * inner, cy + dy * inner),
                    Point::new(cx + dx * outer, cy + dy * outer),
                    Shade::Dark,
                ));
            }
        }
    }
    out
}

/// Crescent: a dark disc with a white one over its upper right.
fn moon(x: i32, y: i32, s: i32) -> Vec<DrawPrimitive> {
    let (cx, cy) = (x + s / 2, y + s / 2);
    let r = (s / 4).max(1);
    vec![
        circle(cx, cy, r, Some(Shade::Dark), None),
        circle(cx + r / 2, cy - r / 2, r, Some(Shade::White), None),
    ]
}

/// Cloud filling the `w` by `h` box at (`x`, `y`).
fn cloud(x: i32, y: i32, w: i32, h: i32) -> Vec<DrawPrimitive> {
    let puff_h = h * 2 / 3;
    let body_h = h - h / 3;
    vec![
        DrawPrimitive::Rectangle {
            bounds: LayoutBox::new(x + w / 4, y, (w / 2) as u32, puff_h as u32),
            radius: ((w / 4).min(puff_h / 2)) as u32,
            fill: Some(Shade::Light),
            outline: Some(Shade::Dark),
        },
        DrawPrimitive::Rectangle {
            bounds: LayoutBox::new(x, y + h / 3, w as u32, body_h as u32),
            radius: (body_h / 2) as u32,
            fill: Some(Shade::Light),
            outline: Some(Shade::Dark),
        },
    ]
}
