use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pilji_shared::{PALETTE, SEARCH_HIGHLIGHT};
use tracing::warn;

use crate::config::{
    naver_creds, sync_target, upstream_connect_timeout, upstream_http_timeout, vworld_keys,
};

#[derive(Debug, Clone)]
pub struct NaverCreds {
    pub client_id: String,
    pub client_secret: String,
}

/// One cached upstream lookup response.
#[derive(Debug, Clone)]
pub struct CachedLookup {
    pub body: Arc<Bytes>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AppState {
    pub http_client: reqwest::Client,
    /// Upstream API keys in fallback order.
    pub vworld_keys: Arc<Vec<String>>,
    pub naver: Option<Arc<NaverCreds>>,
    /// `/api/config` payload, serialized once at startup.
    pub config_json: Arc<Bytes>,
    pub lookup_cache: Arc<DashMap<String, CachedLookup>>,
    pub observability: Arc<ObservabilityCounters>,
}

#[derive(Debug, Default)]
pub struct ObservabilityCounters {
    lookup_requests_total: AtomicU64,
    lookup_cache_hits_total: AtomicU64,
    key_fallback_total: AtomicU64,
    upstream_errors_total: AtomicU64,
    geocode_requests_total: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct ObservabilitySnapshot {
    pub lookup_requests_total: u64,
    pub lookup_cache_hits_total: u64,
    pub key_fallback_total: u64,
    pub upstream_errors_total: u64,
    pub geocode_requests_total: u64,
}

impl ObservabilityCounters {
    pub fn snapshot(&self) -> ObservabilitySnapshot {
        ObservabilitySnapshot {
            lookup_requests_total: self.lookup_requests_total.load(Ordering::Relaxed),
            lookup_cache_hits_total: self.lookup_cache_hits_total.load(Ordering::Relaxed),
            key_fallback_total: self.key_fallback_total.load(Ordering::Relaxed),
            upstream_errors_total: self.upstream_errors_total.load(Ordering::Relaxed),
            geocode_requests_total: self.geocode_requests_total.load(Ordering::Relaxed),
        }
    }

    pub fn record_lookup_request(&self) {
        self.lookup_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lookup_cache_hit(&self) {
        self.lookup_cache_hits_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_key_fallback(&self, skipped_keys: u64) {
        self.key_fallback_total
            .fetch_add(skipped_keys, Ordering::Relaxed);
    }

    pub fn record_upstream_error(&self) {
        self.upstream_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_geocode_request(&self) {
        self.geocode_requests_total.fetch_add(1, Ordering::Relaxed);
    }
}

impl AppState {
    pub fn new() -> Self {
        let request_timeout = upstream_http_timeout();
        let connect_timeout = upstream_connect_timeout();
        let http_client = reqwest::Client::builder()
            .user_agent("pilji-map/0.1")
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .or_else(|e| {
                warn!(
                    error = %e,
                    "failed to build configured HTTP client, retrying without custom user-agent"
                );
                reqwest::Client::builder()
                    .timeout(request_timeout)
                    .connect_timeout(connect_timeout)
                    .build()
            })
            .unwrap_or_else(|e| {
                panic!("failed to build timeout-configured HTTP client: {e}");
            });

        let keys = vworld_keys();
        let naver = naver_creds().map(|(client_id, client_secret)| {
            Arc::new(NaverCreds {
                client_id,
                client_secret,
            })
        });
        let sync = sync_target();
        let config_json = Arc::new(build_config_json(
            keys.len(),
            naver.is_some(),
            sync.as_ref(),
        ));

        Self {
            http_client,
            vworld_keys: Arc::new(keys),
            naver,
            config_json,
            lookup_cache: Arc::new(DashMap::new()),
            observability: Arc::new(ObservabilityCounters::default()),
        }
    }
}

/// Public config echo. Secret upstream keys stay server-side; the sync key
/// is the remote table's public anon key, which the browser needs.
fn build_config_json(
    vworld_key_count: usize,
    naver_configured: bool,
    sync: Option<&(String, String)>,
) -> Bytes {
    let payload = serde_json::json!({
        "providers": {
            "vworld": { "configured": vworld_key_count > 0, "keys": vworld_key_count },
            "naver_geocode": { "configured": naver_configured },
        },
        "sync": sync.map(|(url, api_key)| serde_json::json!({
            "url": url,
            "api_key": api_key,
        })),
        "palette": PALETTE,
        "search_highlight": SEARCH_HIGHLIGHT,
    });
    serde_json::to_vec(&payload)
        .map(Bytes::from)
        .unwrap_or_else(|_| Bytes::from_static(br#"{"providers":{},"sync":null}"#))
}
