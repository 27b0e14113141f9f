use std::fmt::Write as _;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::{
    DEFAULT_LOOKUP_SIZE, LOOKUP_CACHE_TTL_SECS, NAVER_GEOCODE_URL, VWORLD_DATA_URL,
    VWORLD_PARCEL_LAYER,
};
use crate::state::{AppState, CachedLookup, ObservabilitySnapshot};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    json_bytes_response((*state.config_json).clone(), "public, max-age=60")
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let observability = state.observability.snapshot();
    Json(serde_json::json!({
        "status": "ok",
        "vworld_keys": state.vworld_keys.len(),
        "naver_geocode": state.naver.is_some(),
        "lookup_cache_size": state.lookup_cache.len(),
        "observability": {
            "lookup_requests_total": observability.lookup_requests_total,
            "lookup_cache_hits_total": observability.lookup_cache_hits_total,
            "key_fallback_total": observability.key_fallback_total,
            "upstream_errors_total": observability.upstream_errors_total,
            "geocode_requests_total": observability.geocode_requests_total,
        }
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = render_prometheus_metrics(
        state.lookup_cache.len(),
        state.vworld_keys.len(),
        state.observability.snapshot(),
    );
    (
        [
            (header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
}

fn render_prometheus_metrics(
    cache_size: usize,
    key_count: usize,
    observability: ObservabilitySnapshot,
) -> String {
    let mut body = String::new();
    let _ = writeln!(
        body,
        "# HELP pilji_lookup_cache_size Current number of cached lookup responses."
    );
    let _ = writeln!(body, "# TYPE pilji_lookup_cache_size gauge");
    let _ = writeln!(body, "pilji_lookup_cache_size {cache_size}");

    let _ = writeln!(
        body,
        "# HELP pilji_vworld_keys Number of configured upstream API keys."
    );
    let _ = writeln!(body, "# TYPE pilji_vworld_keys gauge");
    let _ = writeln!(body, "pilji_vworld_keys {key_count}");

    let counters = [
        (
            "pilji_lookup_requests_total",
            "Parcel lookup proxy requests.",
            observability.lookup_requests_total,
        ),
        (
            "pilji_lookup_cache_hits_total",
            "Lookup responses served from cache.",
            observability.lookup_cache_hits_total,
        ),
        (
            "pilji_key_fallback_total",
            "Upstream keys skipped before one succeeded.",
            observability.key_fallback_total,
        ),
        (
            "pilji_upstream_errors_total",
            "Lookups that exhausted every upstream key.",
            observability.upstream_errors_total,
        ),
        (
            "pilji_geocode_requests_total",
            "Geocode proxy requests.",
            observability.geocode_requests_total,
        ),
    ];
    for (name, help, value) in counters {
        let _ = writeln!(body, "# HELP {name} {help}");
        let _ = writeln!(body, "# TYPE {name} counter");
        let _ = writeln!(body, "{name} {value}");
    }
    body
}

#[derive(Debug, Deserialize)]
pub struct VworldQuery {
    pub lon: Option<f64>,
    pub lat: Option<f64>,
    /// `minx,miny,maxx,maxy`
    pub bbox: Option<String>,
    #[serde(default = "default_layer")]
    pub data: String,
    #[serde(default = "default_size")]
    pub size: u32,
    #[serde(default = "default_crs")]
    pub crs: String,
}

fn default_layer() -> String {
    VWORLD_PARCEL_LAYER.to_string()
}

fn default_size() -> u32 {
    DEFAULT_LOOKUP_SIZE
}

fn default_crs() -> String {
    "EPSG:4326".to_string()
}

impl VworldQuery {
    /// Upstream `geomFilter` value: a point takes precedence, else a bbox.
    fn geometry_filter(&self) -> Option<String> {
        if let (Some(lon), Some(lat)) = (self.lon, self.lat) {
            if lon.is_finite() && lat.is_finite() {
                return Some(format!("POINT({lon} {lat})"));
            }
            return None;
        }
        let bbox = self.bbox.as_deref()?.trim();
        let parts: Vec<f64> = bbox
            .split(',')
            .map(str::trim)
            .filter_map(|p| p.parse::<f64>().ok())
            .collect();
        if parts.len() != 4 || parts.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(format!(
            "BOX({},{},{},{})",
            parts[0], parts[1], parts[2], parts[3]
        ))
    }
}

/// Cadastral lookup proxy. Tries the configured upstream keys in order;
/// first success wins. Successful bodies are cached briefly so repeated
/// clicks on the same parcel do not burn key quota.
pub async fn vworld_lookup(
    State(state): State<AppState>,
    Query(query): Query<VworldQuery>,
) -> Response {
    state.observability.record_lookup_request();

    let Some(geom_filter) = query.geometry_filter() else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid geometry filter",
            "either lon/lat or a minx,miny,maxx,maxy bbox is required",
        );
    };
    if state.vworld_keys.is_empty() {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "no upstream keys configured",
            "set VWORLD_KEYS to enable parcel lookup",
        );
    }

    let cache_key = format!("{}|{}|{}|{}", query.data, geom_filter, query.size, query.crs);
    if let Some(entry) = state.lookup_cache.get(&cache_key)
        && (Utc::now() - entry.fetched_at).num_seconds() < LOOKUP_CACHE_TTL_SECS
    {
        state.observability.record_lookup_cache_hit();
        let body = Arc::clone(&entry.body);
        drop(entry);
        return json_bytes_response((*body).clone(), "public, max-age=60");
    }

    let client = state.http_client.clone();
    let data = query.data.clone();
    let size = query.size;
    let crs = query.crs.clone();
    let filter = geom_filter.clone();
    let outcome = try_keys_in_order(&state.vworld_keys, move |key| {
        let client = client.clone();
        let data = data.clone();
        let crs = crs.clone();
        let filter = filter.clone();
        async move {
            let size = size.to_string();
            let response = client
                .get(VWORLD_DATA_URL)
                .query(&[
                    ("service", "data"),
                    ("request", "GetFeature"),
                    ("data", data.as_str()),
                    ("key", key.as_str()),
                    ("geometry", "true"),
                    ("geomFilter", filter.as_str()),
                    ("size", size.as_str()),
                    ("format", "json"),
                    ("crs", crs.as_str()),
                ])
                .send()
                .await
                .map_err(|e| format!("request failed: {e}"))?;
            let status = response.status();
            let body: serde_json::Value = response
                .json()
                .await
                .map_err(|e| format!("failed to decode response body: {e}"))?;
            if !status.is_success() {
                return Err(format!("upstream status {status}"));
            }
            Ok(body)
        }
    })
    .await;

    match outcome {
        Ok((body, key_index)) => {
            if key_index > 0 {
                state.observability.record_key_fallback(key_index as u64);
                info!(key_index, "vworld lookup succeeded on a fallback key");
            }
            let bytes = match serde_json::to_vec(&body) {
                Ok(bytes) => Bytes::from(bytes),
                Err(e) => {
                    warn!(error = %e, "failed to re-serialize upstream body");
                    return error_response(
                        StatusCode::BAD_GATEWAY,
                        "vworld lookup failed",
                        "upstream body could not be relayed",
                    );
                }
            };
            state.lookup_cache.insert(
                cache_key,
                CachedLookup {
                    body: Arc::new(bytes.clone()),
                    fetched_at: Utc::now(),
                },
            );
            json_bytes_response(bytes, "public, max-age=60")
        }
        Err(errors) => {
            state.observability.record_upstream_error();
            warn!(keys_tried = errors.len(), "vworld lookup exhausted every key");
            let message = errors.last().cloned().unwrap_or_default();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "vworld lookup failed",
                    "message": message,
                    "keysTried": errors.len(),
                })),
            )
                .into_response()
        }
    }
}

/// Run `fetch` against each key in order until one yields a clean body.
/// An upstream error envelope counts as a failure and advances to the next
/// key. Returns the body and the index of the key that served it, or every
/// per-key error when the list is exhausted.
async fn try_keys_in_order<F, Fut>(
    keys: &[String],
    fetch: F,
) -> Result<(serde_json::Value, usize), Vec<String>>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<serde_json::Value, String>>,
{
    let mut errors = Vec::with_capacity(keys.len());
    for (index, key) in keys.iter().enumerate() {
        match fetch(key.clone()).await {
            Ok(body) => match upstream_error_text(&body) {
                Some(text) => errors.push(format!("key #{}: upstream error: {text}", index + 1)),
                None => return Ok((body, index)),
            },
            Err(e) => errors.push(format!("key #{}: {e}", index + 1)),
        }
    }
    Err(errors)
}

/// Detect the provider's error envelope, which arrives with HTTP 200. Both
/// the bare `{status, error}` form and the `{response: {...}}` wrapper are
/// seen in the wild.
fn upstream_error_text(body: &serde_json::Value) -> Option<String> {
    let envelope = body.get("response").unwrap_or(body);
    if envelope.get("status").and_then(|s| s.as_str()) != Some("ERROR") {
        return None;
    }
    let text = envelope
        .get("error")
        .and_then(|e| e.get("text"))
        .and_then(|t| t.as_str())
        .unwrap_or("unspecified upstream error");
    Some(text.to_string())
}

#[derive(Debug, Deserialize)]
pub struct GeocodeQuery {
    pub query: String,
}

/// Address → coordinate proxy with header-based key auth.
pub async fn naver_geocode(
    State(state): State<AppState>,
    Query(params): Query<GeocodeQuery>,
) -> Response {
    let Some(creds) = state.naver.as_ref() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "geocoder not configured",
            "set NAVER_CLIENT_ID and NAVER_CLIENT_SECRET to enable address search",
        );
    };
    state.observability.record_geocode_request();

    let result = state
        .http_client
        .get(NAVER_GEOCODE_URL)
        .query(&[("query", params.query.as_str())])
        .header("X-NCP-APIGW-API-KEY-ID", creds.client_id.as_str())
        .header("X-NCP-APIGW-API-KEY", creds.client_secret.as_str())
        .send()
        .await;

    match result {
        Ok(response) => {
            let status = StatusCode::from_u16(response.status().as_u16())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            match response.bytes().await {
                Ok(body) => (
                    status,
                    [(header::CONTENT_TYPE, "application/json")],
                    body,
                )
                    .into_response(),
                Err(e) => error_response(
                    StatusCode::BAD_GATEWAY,
                    "geocode failed",
                    &format!("failed to read upstream body: {e}"),
                ),
            }
        }
        Err(e) => error_response(
            StatusCode::BAD_GATEWAY,
            "geocode failed",
            &format!("request failed: {e}"),
        ),
    }
}

fn json_bytes_response(body: Bytes, cache_control: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, cache_control),
        ],
        body,
    )
        .into_response()
}

fn error_response(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": error, "message": message })),
    )
        .into_response()
}
