//! Hourly weather forecast, keyed by local hour.
//!
//! Weather providers are collaborators implementing [`WeatherSource`].
//! [`SnapshotWeather`] reads a JSON file; `NwsWeather` (feature `nws`) polls
//! the National Weather Service hourly forecast.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::calendar::reference_hour;
use crate::Error;

/// Forecast for one hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyForecast {
    /// Temperature in °F
    pub temperature: i32,
    /// Short description ("Partly Cloudy")
    pub short_forecast: String,
    /// Icon identifier, `day/<name>` or `night/<name>`
    pub icon: String,
    /// Whether the hour is in daylight
    #[serde(default = "default_daytime")]
    pub is_daytime: bool,
    /// Wind speed as reported ("10 mph", "5 to 10 mph")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<String>,
    /// Compass direction the wind blows from ("NW")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_direction: Option<String>,
}

fn default_daytime() -> bool {
    true
}

/// Hour-by-hour forecast, keyed by the instant each local hour starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Forecast {
    hours: BTreeMap<DateTime<Utc>, HourlyForecast>,
}

impl Forecast {
    /// Create an empty forecast.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the forecast for the hour containing `at`.
    pub fn insert(&mut self, at: &DateTime<Tz>, hour: HourlyForecast) -> &mut Self {
        self.hours.insert(reference_hour(at).with_timezone(&Utc), hour);
        self
    }

    /// Forecast for the hour containing `at`.
    pub fn get(&self, at: &DateTime<Tz>) -> Option<&HourlyForecast> {
        self.hours.get(&reference_hour(at).with_timezone(&Utc))
    }

    /// Number of hours covered.
    pub fn len(&self) -> usize {
        self.hours.len()
    }

    /// Whether no hours are covered.
    pub fn is_empty(&self) -> bool {
        self.hours.is_empty()
    }
}

/// Snapshot / wire record for one hour.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ForecastRecord {
    start_time: DateTime<FixedOffset>,
    #[serde(flatten)]
    hour: HourlyForecast,
}

fn forecast_from_records(records: Vec<ForecastRecord>, tz: Tz) -> Forecast {
    let mut forecast = Forecast::new();
    for r in records {
        forecast.insert(&r.start_time.with_timezone(&tz), r.hour);
    }
    forecast
}

/// A provider of hourly forecasts.
pub trait WeatherSource: Send + Sync {
    /// Current forecast.
    fn forecast(&self) -> Result<Forecast, Error>;
}

/// Weather source that reads a JSON snapshot:
///
/// ```json
/// [{"start_time": "2024-06-03T09:00:00-07:00", "temperature": 64,
///   "short_forecast": "Sunny", "icon": "day/skc", "is_daytime": true}]
/// ```
#[derive(Debug, Clone)]
pub struct SnapshotWeather {
    path: PathBuf,
    tz: Tz,
}

impl SnapshotWeather {
    /// Create a snapshot source reading `path`, keying hours in `tz`.
    pub fn new(path: impl Into<PathBuf>, tz: Tz) -> Self {
        Self {
            path: path.into(),
            tz,
        }
    }
}

impl WeatherSource for SnapshotWeather {
    fn forecast(&self) -> Result<Forecast, Error> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::Io(format!(
                "Failed to read weather snapshot '{}': {}",
                self.path.display(),
                e
            ))
        })?;
        let records: Vec<ForecastRecord> = serde_json::from_str(&content)?;
        Ok(forecast_from_records(records, self.tz))
    }
}

#[cfg(feature = "nws")]
pub use nws::NwsWeather;

#[cfg(feature = "nws")]
mod nws {
    use std::sync::{Mutex, MutexGuard};
    use std::time::{Duration, Instant};

    use serde::Deserialize;

    use super::*;

    /// Minimum time between forecast downloads.
    const READ_INTERVAL: Duration = Duration::from_secs(5 * 60);

    /// Number of hourly periods kept.
    const PERIODS: usize = 12;

    /// Default API root.
    pub const API_BASE: &str = "https://api.weather.gov";

    #[derive(Debug, Deserialize)]
    struct NwsResponse {
        properties: NwsProperties,
    }

    #[derive(Debug, Deserialize)]
    struct NwsProperties {
        periods: Vec<NwsPeriod>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct NwsPeriod {
        start_time: DateTime<FixedOffset>,
        is_daytime: bool,
        temperature: i32,
        short_forecast: String,
        icon: String,
        #[serde(default)]
        wind_speed: Option<String>,
        #[serde(default)]
        wind_direction: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    struct PointResponse {
        properties: PointProperties,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct PointProperties {
        forecast_hourly: Option<String>,
    }

    /// National Weather Service hourly forecast.
    ///
    /// Network reads are throttled to one per five minutes; between reads the
    /// cached forecast is served. If a read fails and a cached forecast
    /// exists, the stale copy is served and the failure logged. The cache lock
    /// is never held across a download.
    #[derive(Debug)]
    pub struct NwsWeather {
        http: reqwest::blocking::Client,
        api_base: String,
        point: Option<(f64, f64)>,
        pub(super) hourly_url: Mutex<Option<String>>,
        tz: Tz,
        pub(super) cached: Mutex<Option<(Instant, Forecast)>>,
    }

    impl NwsWeather {
        /// Create a client for a `forecastHourly` URL, e.g.
        /// `https://api.weather.gov/gridpoints/PQR/115,105/forecast/hourly`.
        pub fn new(url: impl Into<String>, tz: Tz) -> Result<Self, Error> {
            let mut weather = Self::client(tz)?;
            weather.hourly_url = Mutex::new(Some(url.into()));
            Ok(weather)
        }

        /// Create a client for a latitude and longitude.
        ///
        /// The hourly forecast URL is looked up from `/points/{lat},{lon}` on
        /// the first read and remembered afterwards.
        pub fn for_point(lat: f64, lon: f64, tz: Tz) -> Result<Self, Error> {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                return Err(Error::invalid(
                    "coordinates",
                    format!("{},{} is not a valid point", lat, lon),
                ));
            }
            let mut weather = Self::client(tz)?;
            weather.point = Some((lat, lon));
            Ok(weather)
        }

        /// Use another API root (default [`API_BASE`]).
        pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
            self.api_base = base.into();
            self
        }

        fn client(tz: Tz) -> Result<Self, Error> {
            let http = reqwest::blocking::Client::builder()
                .user_agent(concat!("inkdash/", env!("CARGO_PKG_VERSION")))
                .timeout(Duration::from_secs(15))
                .build()?;
            Ok(Self {
                http,
                api_base: API_BASE.to_string(),
                point: None,
                hourly_url: Mutex::new(None),
                tz,
                cached: Mutex::new(None),
            })
        }

        fn get(&self, url: &str) -> Result<String, Error> {
            let response = self.http.get(url).send()?.error_for_status()?;
            Ok(response.text()?)
        }

        /// `forecastHourly` URL, resolving it from the point on first use.
        fn resolve_hourly_url(&self) -> Result<String, Error> {
            if let Some(url) = lock(&self.hourly_url)?.clone() {
                return Ok(url);
            }
            let (lat, lon) = self
                .point
                .ok_or_else(|| Error::Config("NWS weather needs a URL or a point".to_string()))?;

            let url = parse_point(&self.get(&points_url(&self.api_base, lat, lon))?)?;
            tracing::info!("Hourly forecast for {:.4},{:.4}: {}", lat, lon, url);
            *lock(&self.hourly_url)? = Some(url.clone());
            Ok(url)
        }

        fn fetch(&self) -> Result<Forecast, Error> {
            let url = self.resolve_hourly_url()?;
            parse_hourly(&self.get(&url)?, self.tz)
        }
    }

    impl WeatherSource for NwsWeather {
        fn forecast(&self) -> Result<Forecast, Error> {
            let stale = match lock(&self.cached)?.as_ref() {
                Some((read_at, forecast)) if read_at.elapsed() < READ_INTERVAL => {
                    return Ok(forecast.clone())
                }
                cached => cached.map(|(_, forecast)| forecast.clone()),
            };

            match self.fetch() {
                Ok(forecast) => {
                    tracing::debug!("Fetched {} forecast hours", forecast.len());
                    *lock(&self.cached)? = Some((Instant::now(), forecast.clone()));
                    Ok(forecast)
                }
                Err(e) => match stale {
                    Some(stale) => {
                        tracing::warn!("Weather fetch failed, serving stale forecast: {}", e);
                        Ok(stale)
                    }
                    None => Err(e),
                },
            }
        }
    }

    fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, Error> {
        mutex
            .lock()
            .map_err(|_| Error::Request("weather cache lock poisoned".to_string()))
    }

    /// NWS accepts at most four decimal places.
    pub(super) fn points_url(base: &str, lat: f64, lon: f64) -> String {
        format!("{}/points/{:.4},{:.4}", base.trim_end_matches('/'), lat, lon)
    }

    /// Pull `properties.forecastHourly` out of a `/points` document.
    pub(super) fn parse_point(body: &str) -> Result<String, Error> {
        let response: PointResponse = serde_json::from_str(body)?;
        response
            .properties
            .forecast_hourly
            .ok_or_else(|| Error::Request("points response has no forecastHourly".to_string()))
    }

    /// Parse an NWS hourly forecast document.
    pub(super) fn parse_hourly(body: &str, tz: Tz) -> Result<Forecast, Error> {
        let response: NwsResponse = serde_json::from_str(body)?;
        let mut forecast = Forecast::new();
        for period in response.properties.periods.into_iter().take(PERIODS) {
            forecast.insert(
                &period.start_time.with_timezone(&tz),
                HourlyForecast {
                    temperature: period.temperature,
                    icon: icon_id(&period.icon),
                    short_forecast: period.short_forecast,
                    is_daytime: period.is_daytime,
                    wind_speed: period.wind_speed,
                    wind_direction: period.wind_direction,
                },
            );
        }
        Ok(forecast)
    }

    /// `https://api.weather.gov/icons/land/day/rain,40?size=small` -> `day/rain`
    pub(super) fn icon_id(url: &str) -> String {
        let path = url.split('?').next().unwrap_or(url);
        let mut segments = path.rsplit('/');
        let condition = segments.next().unwrap_or("");
        let daypart = segments.next().unwrap_or("day");
        let condition = condition.split(',').next().unwrap_or(condition);
        format!("{}/{}", daypart, condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::Los_Angeles as LA;

    fn sunny(temperature: i32) -> HourlyForecast {
        HourlyForecast {
            temperature,
            short_forecast: "Sunny".to_string(),
            icon: "day/skc".to_string(),
            is_daytime: true,
            wind_speed: None,
            wind_direction: None,
        }
    }

    #[test]
    fn test_lookup_truncates_to_hour() {
        let mut forecast = Forecast::new();
        forecast.insert(&LA.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap(), sunny(64));

        let at = LA.with_ymd_and_hms(2024, 6, 3, 9, 47, 12).unwrap();
        assert_eq!(forecast.get(&at).map(|h| h.temperature), Some(64));

        let later = LA.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();
        assert!(forecast.get(&later).is_none());
    }

    #[test]
    fn test_lookup_across_fall_back() {
        use chrono::Utc;

        let first = Utc.with_ymd_and_hms(2024, 11, 3, 8, 0, 0).unwrap().with_timezone(&LA);
        let second = Utc.with_ymd_and_hms(2024, 11, 3, 9, 0, 0).unwrap().with_timezone(&LA);
        let mut forecast = Forecast::new();
        forecast.insert(&first, sunny(48)).insert(&second, sunny(47));
        assert_eq!(forecast.len(), 2);

        // Both are 01:30 on the wall clock
        let at = Utc.with_ymd_and_hms(2024, 11, 3, 8, 30, 0).unwrap().with_timezone(&LA);
        assert_eq!(forecast.get(&at).map(|h| h.temperature), Some(48));
        let at = Utc.with_ymd_and_hms(2024, 11, 3, 9, 30, 0).unwrap().with_timezone(&LA);
        assert_eq!(forecast.get(&at).map(|h| h.temperature), Some(47));
    }

    #[test]
    fn test_snapshot_converts_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.json");
        // 16:00 UTC is 09:00 in Los Angeles (PDT)
        std::fs::write(
            &path,
            r#"[{"start_time": "2024-06-03T16:00:00+00:00", "temperature": 64,
                 "short_forecast": "Sunny", "icon": "day/skc"}]"#,
        )
        .unwrap();

        let forecast = SnapshotWeather::new(&path, LA).forecast().unwrap();
        let at = LA.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap();
        assert_eq!(forecast.get(&at), Some(&sunny(64)));
    }

    #[test]
    fn test_snapshot_missing_file() {
        assert!(SnapshotWeather::new("/nonexistent/weather.json", LA)
            .forecast()
            .is_err());
    }

    #[cfg(feature = "nws")]
    #[test]
    fn test_nws_icon_id() {
        assert_eq!(
            nws::icon_id("https://api.weather.gov/icons/land/day/rain,40?size=small"),
            "day/rain"
        );
        assert_eq!(
            nws::icon_id("https://api.weather.gov/icons/land/night/few"),
            "night/few"
        );
    }

    #[cfg(feature = "nws")]
    #[test]
    fn test_nws_parse_hourly() {
        let body = r#"{"properties": {"periods": [
            {"number": 1, "startTime": "2024-06-03T09:00:00-07:00", "isDaytime": true,
             "temperature": 61, "shortForecast": "Mostly Cloudy",
             "icon": "https://api.weather.gov/icons/land/day/bkn?size=small"},
            {"number": 2, "startTime": "2024-06-03T10:00:00-07:00", "isDaytime": true,
             "temperature": 63, "shortForecast": "Chance Light Rain",
             "windSpeed": "5 to 10 mph", "windDirection": "SW",
             "icon": "https://api.weather.gov/icons/land/day/rain,30?size=small"}
        ]}}"#;
        let forecast = nws::parse_hourly(body, LA).unwrap();
        assert_eq!(forecast.len(), 2);

        let ten = LA.with_ymd_and_hms(2024, 6, 3, 10, 15, 0).unwrap();
        let hour = forecast.get(&ten).unwrap();
        assert_eq!(hour.temperature, 63);
        assert_eq!(hour.icon, "day/rain");
        assert_eq!(hour.wind_speed.as_deref(), Some("5 to 10 mph"));
        assert_eq!(hour.wind_direction.as_deref(), Some("SW"));

        let nine = LA.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();
        assert_eq!(forecast.get(&nine).unwrap().wind_speed, None);
    }

    #[cfg(feature = "nws")]
    #[test]
    fn test_nws_parse_point() {
        assert_eq!(
            nws::points_url(nws::API_BASE, 45.523064, -122.676483),
            "https://api.weather.gov/points/45.5231,-122.6765"
        );

        let body = r#"{"properties": {
            "gridId": "PQR", "gridX": 112, "gridY": 103,
            "forecast": "https://api.weather.gov/gridpoints/PQR/112,103/forecast",
            "forecastHourly": "https://api.weather.gov/gridpoints/PQR/112,103/forecast/hourly"
        }}"#;
        assert_eq!(
            nws::parse_point(body).unwrap(),
            "https://api.weather.gov/gridpoints/PQR/112,103/forecast/hourly"
        );
        assert!(nws::parse_point(r#"{"properties": {}}"#).is_err());
        assert!(NwsWeather::for_point(95.0, 0.0, LA).is_err());
    }

    /// Serve one canned JSON body per connection, returning the request lines seen.
    #[cfg(feature = "nws")]
    fn serve_json(
        listener: std::net::TcpListener,
        bodies: Vec<String>,
    ) -> std::thread::JoinHandle<Vec<String>> {
        use std::io::{Read, Write};

        std::thread::spawn(move || {
            let mut requests = Vec::new();
            for body in bodies {
                let (mut stream, _) = listener.accept().unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut chunk).unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let request = String::from_utf8_lossy(&buf);
                requests.push(request.lines().next().unwrap_or("").to_string());
                write!(
                    stream,
                    "HTTP/1.1 200 OK\r\nContent-Type: application/geo+json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                )
                .unwrap();
            }
            requests
        })
    }

    #[cfg(feature = "nws")]
    #[test]
    fn test_nws_resolves_point_once() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let point = format!(
            r#"{{"properties": {{"forecastHourly": "{}/gridpoints/PQR/112,103/forecast/hourly"}}}}"#,
            base
        );
        let hourly = r#"{"properties": {"periods": [
            {"startTime": "2024-06-03T09:00:00-07:00", "isDaytime": true, "temperature": 61,
             "shortForecast": "Sunny", "icon": "https://api.weather.gov/icons/land/day/skc?size=small",
             "windSpeed": "10 mph", "windDirection": "NW"}
        ]}}"#;
        let server = serve_json(listener, vec![point, hourly.to_string()]);

        let weather = NwsWeather::for_point(45.5231, -122.6765, LA)
            .unwrap()
            .with_api_base(&base);
        let forecast = weather.forecast().unwrap();
        assert_eq!(forecast.len(), 1);
        // Second read comes from the cache
        assert_eq!(weather.forecast().unwrap(), forecast);

        let requests = server.join().unwrap();
        assert_eq!(
            requests,
            vec![
                "GET /points/45.5231,-122.6765 HTTP/1.1".to_string(),
                "GET /gridpoints/PQR/112,103/forecast/hourly HTTP/1.1".to_string(),
            ]
        );
        assert_eq!(
            weather.hourly_url.lock().unwrap().as_deref(),
            Some(format!("{}/gridpoints/PQR/112,103/forecast/hourly", base).as_str())
        );
    }

    #[cfg(feature = "nws")]
    #[test]
    fn test_nws_cache_unlocked_during_fetch() {
        use std::io::Read;
        use std::sync::Arc;
        use std::time::{Duration, Instant};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/gridpoints/PQR/112,103/forecast/hourly", listener.local_addr().unwrap());
        let weather = Arc::new(NwsWeather::new(url, LA).unwrap());

        let mut stale = Forecast::new();
        stale.insert(&LA.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap(), sunny(58));
        let Some(read_at) = Instant::now().checked_sub(Duration::from_secs(10 * 60)) else {
            return;
        };
        *weather.cached.lock().unwrap() = Some((read_at, stale.clone()));

        let reader = {
            let weather = weather.clone();
            std::thread::spawn(move || weather.forecast())
        };

        // The request is in flight; the cache must still be available
        let (mut stream, _) = listener.accept().unwrap();
        let mut chunk = [0u8; 256];
        let _ = stream.read(&mut chunk).unwrap();
        assert!(weather.cached.try_lock().is_ok());
        drop(stream);

        assert_eq!(reader.join().unwrap().unwrap(), stale);
    }
}
