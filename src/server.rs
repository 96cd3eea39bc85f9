//! HTTP routes for devices and the admin API.
//!
//! Device endpoints:
//!
//! | Route | Description |
//! |-------|-------------|
//! | `POST /state` | Telemetry ingest |
//! | `GET /image/{device}` | Current PNG for a device |
//! | `GET /delay/{device}` | Seconds until the next wake, as text |
//!
//! Admin endpoints live under `/api`: device list and sleep toggle, string
//! filter management and cache clearing.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//! use inkdash::{server, ServerConfig};
//!
//! let config = ServerConfig::from_env()?;
//! let state = Arc::new(server::AppState::from_config(&config)?);
//! let app = server::router(state);
//!
//! let listener = tokio::net::TcpListener::bind(&config.listen).await?;
//! axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::compose::{Dashboard, DeviceFamily, RendererVariant};
use crate::schedule::{pre_render_delay, SleepDelay};
use crate::{
    DeviceRegistry, DeviceState, DeviceStore, Error, FilterPipeline, ImageCache, ServerConfig,
    StatePayload, StringFilter,
};

/// Shared server state.
#[derive(Debug)]
pub struct AppState {
    registry: RwLock<DeviceRegistry>,
    store: DeviceStore,
    filters: RwLock<FilterPipeline>,
    filter_path: Option<PathBuf>,
    cache: ImageCache,
    dashboard: Dashboard,
}

impl AppState {
    /// State with in-memory telemetry and the default string filter.
    pub fn new(registry: DeviceRegistry, cache: ImageCache, dashboard: Dashboard) -> Self {
        Self {
            registry: RwLock::new(registry),
            store: DeviceStore::in_memory(),
            filters: RwLock::new(FilterPipeline::with_default()),
            filter_path: None,
            cache,
            dashboard,
        }
    }

    /// Use `store` for telemetry.
    pub fn with_store(mut self, store: DeviceStore) -> Self {
        self.store = store;
        self
    }

    /// Use `filters`, saving changes to `path` when given.
    pub fn with_filters(mut self, filters: FilterPipeline, path: Option<PathBuf>) -> Self {
        self.filters = RwLock::new(filters);
        self.filter_path = path;
        self
    }

    /// Build everything `config` describes.
    pub fn from_config(config: &ServerConfig) -> Result<Self, Error> {
        let tz = config.tz()?;
        let mut dashboard = Dashboard::new(tz);
        if let Some(weather) = config.weather_source()? {
            dashboard = dashboard.with_weather(weather);
        }

        let store = match &config.state_file {
            Some(path) => DeviceStore::open(path)?,
            None => DeviceStore::in_memory(),
        };
        let filters = FilterPipeline::load_or_default(&config.filter_file);

        Ok(Self::new(config.registry()?, ImageCache::new(&config.image_dir)?, dashboard)
            .with_store(store)
            .with_filters(filters, Some(config.filter_file.clone())))
    }

    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.dashboard.timezone())
    }

    /// Path to the image of `name`, rendering it on a blocking thread when
    /// the cached one is stale, or always when `force` is set.
    async fn image_for(&self, name: &str, force: bool) -> Result<PathBuf, Error> {
        let device = self.registry.read().await.get(name)?.clone();
        let filters = self.filters.read().await.clone();
        let telemetry = self.store.latest_or_placeholder(name);
        let dashboard = self.dashboard.clone();
        let cache = self.cache.clone();
        let now = self.now();

        tokio::task::spawn_blocking(move || {
            let render = || dashboard.render_png(&device, &telemetry, &filters, &now);
            if force {
                cache.refresh(&device.name, render)
            } else {
                cache.get_or_render(&device.name, render)
            }
        })
        .await
        .map_err(|e| Error::Io(format!("Render task failed: {}", e)))?
    }

    fn save_filters(&self, filters: &FilterPipeline) -> Result<(), Error> {
        match &self.filter_path {
            Some(path) => filters.save(path),
            None => Ok(()),
        }
    }
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/state", post(post_state))
        .route("/image/{device}", get(get_image))
        .route("/delay/{device}", get(get_delay))
        .route("/api/devices", get(list_devices))
        .route("/api/devices/{device}/sleep", post(set_sleep))
        .route("/api/filters", get(list_filters).post(add_filter))
        .route("/api/filters/{index}", put(replace_filter).delete(remove_filter))
        .route("/api/images", delete(clear_images))
        .with_state(state)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::UnknownDevice(_) => StatusCode::NOT_FOUND,
            Error::Invalid { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Address a request came from.
///
/// Prefers the first `X-Forwarded-For` entry, then the peer address when the
/// server was started with connect info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub Option<String>);

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(ClientAddr(forwarded.or(peer)))
    }
}

/// POST /state - Record device telemetry
async fn post_state(
    State(state): State<Arc<AppState>>,
    ClientAddr(ipaddr): ClientAddr,
    Json(payload): Json<StatePayload>,
) -> Result<StatusCode, Error> {
    let row = payload.into_state(Utc::now(), ipaddr)?;
    state.store.record(row);
    Ok(StatusCode::OK)
}

/// GET /image/{device} - Serve the device image
async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(device): Path<String>,
) -> Result<Response, Error> {
    tracing::debug!("Retrieving image for: {}", device);
    let path = state.image_for(&device, false).await.map_err(|e| {
        tracing::error!("Error generating image for {}: {}", device, e);
        e
    })?;
    let data = tokio::fs::read(&path).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        data,
    )
        .into_response())
}

/// GET /delay/{device} - Seconds until the device should wake
async fn get_delay(State(state): State<Arc<AppState>>, Path(device): Path<String>) -> String {
    let now = state.now();
    let delay = state.registry.read().await.sleep_delay(&device, &now);
    tracing::debug!("Next update delay for {}: {}s", device, delay);

    if let Some(lead) = pre_render_delay(delay) {
        schedule_pre_render(state.clone(), device, Duration::from_secs(u64::from(lead)));
    }
    delay.to_string()
}

/// Recompose `device` after `delay`, shortly before it wakes.
fn schedule_pre_render(state: Arc<AppState>, device: String, delay: Duration) {
    tracing::debug!("Background rendering scheduled for {} in {:?}", device, delay);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match state.image_for(&device, true).await {
            Ok(_) => tracing::debug!("Background image created for: {}", device),
            Err(e) => tracing::error!("Background render failed for {}: {}", device, e),
        }
    });
}

/// One row of the device list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSummary {
    /// Device name
    pub name: String,
    /// Hardware family
    pub family: DeviceFamily,
    /// Body layout
    pub variant: RendererVariant,
    /// Sleep policy
    pub sleep: SleepDelay,
    /// Whether sleeping is enabled
    pub sleep_enabled: bool,
    /// Seconds the device would sleep if it asked now
    pub sleep_delay: u32,
    /// Latest telemetry
    pub state: Option<DeviceState>,
}

/// GET /api/devices - Registered devices with their latest telemetry
async fn list_devices(State(state): State<Arc<AppState>>) -> Json<Vec<DeviceSummary>> {
    let now = state.now();
    let registry = state.registry.read().await;
    let devices = registry
        .iter()
        .map(|device| DeviceSummary {
            name: device.name.clone(),
            family: device.family,
            variant: device.variant,
            sleep: device.sleep.clone(),
            sleep_enabled: device.sleep_enabled,
            sleep_delay: device.sleep_delay(&now),
            state: state.store.latest(&device.name),
        })
        .collect();
    Json(devices)
}

/// Body of a sleep toggle; toggles when `enabled` is omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SleepRequest {
    /// New setting
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Body of a sleep toggle response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepResponse {
    /// Device name
    pub device: String,
    /// Setting after the change
    pub sleep_enabled: bool,
}

/// POST /api/devices/{device}/sleep - Enable, disable or toggle sleeping
async fn set_sleep(
    State(state): State<Arc<AppState>>,
    Path(device): Path<String>,
    Json(request): Json<SleepRequest>,
) -> Result<Json<SleepResponse>, Error> {
    let mut registry = state.registry.write().await;
    let current = registry.get(&device)?.sleep_enabled;
    let enabled = request.enabled.unwrap_or(!current);
    registry.set_sleep_enabled(&device, enabled)?;
    Ok(Json(SleepResponse {
        device,
        sleep_enabled: enabled,
    }))
}

/// GET /api/filters - Current string filters
async fn list_filters(State(state): State<Arc<AppState>>) -> Json<Vec<StringFilter>> {
    Json(state.filters.read().await.filters().to_vec())
}

/// POST /api/filters - Append a string filter
async fn add_filter(
    State(state): State<Arc<AppState>>,
    Json(filter): Json<StringFilter>,
) -> Result<StatusCode, Error> {
    let mut filters = state.filters.write().await;
    if !filters.add(filter) {
        return Ok(StatusCode::OK);
    }
    state.save_filters(&filters)?;
    Ok(StatusCode::CREATED)
}

/// PUT /api/filters/{index} - Replace a string filter, returning the old one
async fn replace_filter(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
    Json(filter): Json<StringFilter>,
) -> Result<Json<StringFilter>, Error> {
    let mut filters = state.filters.write().await;
    let replaced = filters.replace_at(index, filter)?;
    state.save_filters(&filters)?;
    Ok(Json(replaced))
}

/// DELETE /api/filters/{index} - Remove a string filter
async fn remove_filter(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<Json<StringFilter>, Error> {
    let mut filters = state.filters.write().await;
    let removed = filters.remove_at(index)?;
    state.save_filters(&filters)?;
    Ok(Json(removed))
}

/// Body of a cache clear response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearResponse {
    /// Images deleted
    pub removed: usize,
}

/// DELETE /api/images - Drop every cached image
async fn clear_images(State(state): State<Arc<AppState>>) -> Result<Json<ClearResponse>, Error> {
    let removed = state.cache.clear()?;
    Ok(Json(ClearResponse { removed }))
}
