//! Compose one dashboard image and write it to a PNG file
//!
//! Run with: cargo run --example render_png -- [family] [output.png]
//!
//! `family` is one of `kindle-portrait`, `kindle-landscape` or `trmnl`
//! (default `kindle-portrait`); the image goes to `dashboard.png` unless
//! another path is given.

use chrono::{Duration, Utc};
use chrono_tz::America::Los_Angeles;
use inkdash::calendar::reference_hour;
use inkdash::canvas::encode_png;
use inkdash::{
    compose, Calendar, CalendarEvent, DeviceConfig, DeviceFamily, DeviceState, Forecast,
    HourlyForecast,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let family: DeviceFamily = match args.next() {
        Some(name) => serde_json::from_value(serde_json::Value::String(name))?,
        None => DeviceFamily::KindlePortrait,
    };
    let output = args.next().unwrap_or_else(|| "dashboard.png".to_string());

    let now = Utc::now().with_timezone(&Los_Angeles);
    let hour = reference_hour(&now);

    // A morning's worth of sample events
    let calendar: Calendar = [
        CalendarEvent::new("Recycling pickup", hour, hour + Duration::days(1), true)?,
        CalendarEvent::new(
            "Standup",
            hour + Duration::minutes(15),
            hour + Duration::minutes(45),
            false,
        )?,
        CalendarEvent::new(
            "Design review",
            hour + Duration::hours(2),
            hour + Duration::minutes(210),
            false,
        )?,
    ]
    .into_iter()
    .collect();

    let mut forecast = Forecast::new();
    for (i, (temperature, short_forecast, icon)) in [
        (61, "Sunny", "day/skc"),
        (63, "Partly Sunny", "day/sct"),
        (64, "Mostly Cloudy", "day/bkn"),
        (62, "Chance Light Rain", "day/rain"),
    ]
    .into_iter()
    .enumerate()
    {
        forecast.insert(
            &(hour + Duration::hours(i as i64)),
            HourlyForecast {
                temperature,
                short_forecast: short_forecast.to_string(),
                icon: icon.to_string(),
                is_daytime: true,
                wind_speed: Some("5 mph".to_string()),
                wind_direction: Some("NW".to_string()),
            },
        );
    }

    let device = DeviceConfig::new("demo", family);
    let state = DeviceState {
        device: device.name.clone(),
        time: Utc::now(),
        temperature: Some(71),
        battery_soc: Some(64),
        ipaddr: Some("192.168.1.20".to_string()),
    };

    let image = compose(&state, &calendar, &forecast, &device, &now)?;
    std::fs::write(&output, encode_png(&image)?)?;
    println!("Wrote {} ({}x{})", output, image.width(), image.height());
    Ok(())
}
