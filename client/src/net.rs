use futures::future::{Either, select};
use gloo_timers::future::TimeoutFuture;
use pilji_engine::{LookupError, ParcelLookup, RemoteWrite};
use pilji_shared::ParcelFeature;
use serde::Deserialize;

/// Per-call budget; an unresponsive provider is reported to the user as "no
/// parcel found" rather than hanging the click.
const LOOKUP_TIMEOUT_MS: u32 = 15_000;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub sync: Option<SyncTarget>,
    #[serde(default)]
    pub palette: Vec<String>,
    #[serde(default)]
    pub search_highlight: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncTarget {
    pub url: String,
    pub api_key: String,
}

pub async fn fetch_config() -> AppConfig {
    let Ok(response) = gloo_net::http::Request::get("/api/config").send().await else {
        return AppConfig::default();
    };
    response.json().await.unwrap_or_default()
}

async fn with_timeout<T>(
    fut: impl Future<Output = Result<T, gloo_net::Error>>,
) -> Result<T, LookupError> {
    match select(Box::pin(fut), Box::pin(TimeoutFuture::new(LOOKUP_TIMEOUT_MS))).await {
        Either::Left((result, _)) => {
            result.map_err(|e| LookupError::Provider(format!("request failed: {e}")))
        }
        Either::Right(_) => Err(LookupError::Timeout),
    }
}

/// Lookup client talking to the server-side proxy endpoints.
#[derive(Debug, Default)]
pub struct HttpLookup;

impl HttpLookup {
    async fn fetch_feature(&self, url: String) -> Result<Option<ParcelFeature>, LookupError> {
        let response = with_timeout(async move {
            gloo_net::http::Request::get(&url).send().await
        })
        .await?;

        if !response.ok() {
            let detail = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect::<String>();
            return Err(LookupError::Provider(format!(
                "proxy status {}: {detail}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LookupError::Provider(format!("failed to decode response: {e}")))?;

        // The provider nests the collection under response.result; accept a
        // bare feature collection as well.
        let collection = body
            .pointer("/response/result/featureCollection")
            .unwrap_or(&body);
        Ok(ParcelFeature::first_of_collection(collection))
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    addresses: Vec<GeocodeAddress>,
}

#[derive(Debug, Deserialize)]
struct GeocodeAddress {
    x: String,
    y: String,
}

impl ParcelLookup for HttpLookup {
    async fn lookup_point(
        &self,
        lon: f64,
        lat: f64,
    ) -> Result<Option<ParcelFeature>, LookupError> {
        self.fetch_feature(format!("/api/vworld?lon={lon}&lat={lat}&size=1"))
            .await
    }

    async fn lookup_address(&self, query: &str) -> Result<Option<ParcelFeature>, LookupError> {
        let url = format!(
            "/api/naver/geocode?query={}",
            js_sys::encode_uri_component(query)
        );
        let response = with_timeout(async move {
            gloo_net::http::Request::get(&url).send().await
        })
        .await?;

        if !response.ok() {
            return Err(LookupError::Provider(format!(
                "geocoder status {}",
                response.status()
            )));
        }

        let geocoded: GeocodeResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Provider(format!("failed to decode geocode: {e}")))?;

        let Some(address) = geocoded.addresses.first() else {
            return Ok(None);
        };
        let (Ok(lon), Ok(lat)) = (address.x.parse::<f64>(), address.y.parse::<f64>()) else {
            return Err(LookupError::Provider(
                "geocoder returned non-numeric coordinates".to_string(),
            ));
        };

        self.lookup_point(lon, lat).await
    }
}

/// Fire-and-forget replication to the remote annotation table.
#[derive(Debug, Clone)]
pub struct RemoteSync {
    target: SyncTarget,
}

impl RemoteSync {
    pub fn new(target: SyncTarget) -> Self {
        Self { target }
    }

    pub async fn push(&self, write: RemoteWrite) -> Result<(), String> {
        let url = format!("{}/{}", self.target.url.trim_end_matches('/'), write.key);
        let response = gloo_net::http::Request::post(&url)
            .header("x-api-key", &self.target.api_key)
            .header("content-type", "application/json")
            .body(write.payload)
            .map_err(|e| format!("failed to build sync request: {e}"))?
            .send()
            .await
            .map_err(|e| format!("sync request failed: {e}"))?;

        if !response.ok() {
            return Err(format!("sync rejected with status {}", response.status()));
        }
        Ok(())
    }
}
