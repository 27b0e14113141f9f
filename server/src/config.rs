use std::time::Duration;

pub const VWORLD_DATA_URL: &str = "https://api.vworld.kr/req/data";
pub const NAVER_GEOCODE_URL: &str =
    "https://naveropenapi.apigw.ntruss.com/map-geocode/v2/geocode";

/// Cadastral layer queried for parcel outlines.
pub const VWORLD_PARCEL_LAYER: &str = "LP_PA_CBND_BUBUN";

pub const SERVER_PORT: u16 = 3000;
/// Ports probed above SERVER_PORT when it is already taken.
pub const PORT_FALLBACK_ATTEMPTS: u16 = 10;

pub const LOOKUP_CACHE_TTL_SECS: i64 = 300;
pub const MAX_LOOKUP_CACHE_ENTRIES: usize = 256;
pub const CACHE_EVICT_INTERVAL_SECS: u64 = 60;

pub const DEFAULT_LOOKUP_SIZE: u32 = 10;
pub const DEFAULT_UPSTREAM_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 3;

/// Ordered upstream key list: `VWORLD_KEYS` (comma-separated) wins over a
/// single `VWORLD_KEY`. Order matters — keys are tried first to last.
pub fn vworld_keys() -> Vec<String> {
    let raw = std::env::var("VWORLD_KEYS")
        .or_else(|_| std::env::var("VWORLD_KEY"))
        .unwrap_or_default();
    raw.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn naver_creds() -> Option<(String, String)> {
    let id = std::env::var("NAVER_CLIENT_ID").ok()?;
    let secret = std::env::var("NAVER_CLIENT_SECRET").ok()?;
    let id = id.trim().to_string();
    let secret = secret.trim().to_string();
    if id.is_empty() || secret.is_empty() {
        return None;
    }
    Some((id, secret))
}

/// Remote annotation table the browser replicates to. The key here is the
/// table's public (anon) key, echoed to clients by design.
pub fn sync_target() -> Option<(String, String)> {
    let url = std::env::var("SYNC_URL").ok()?;
    let api_key = std::env::var("SYNC_API_KEY").ok()?;
    let url = url.trim().to_string();
    let api_key = api_key.trim().to_string();
    if url.is_empty() || api_key.is_empty() {
        return None;
    }
    Some((url, api_key))
}

pub fn server_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(SERVER_PORT)
}

pub fn upstream_http_timeout() -> Duration {
    std::env::var("UPSTREAM_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_UPSTREAM_HTTP_TIMEOUT_SECS))
}

pub fn upstream_connect_timeout() -> Duration {
    std::env::var("UPSTREAM_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS))
}

#[cfg(test)]
mod tests {
    use super::{naver_creds, server_port, sync_target, vworld_keys};

    #[test]
    fn vworld_keys_splits_and_trims_the_ordered_list() {
        temp_env::with_var("VWORLD_KEYS", Some(" key-a , key-b ,, key-c "), || {
            assert_eq!(vworld_keys(), vec!["key-a", "key-b", "key-c"]);
        });
    }

    #[test]
    fn vworld_keys_falls_back_to_single_key_var() {
        temp_env::with_vars(
            [("VWORLD_KEYS", None), ("VWORLD_KEY", Some("solo-key"))],
            || {
                assert_eq!(vworld_keys(), vec!["solo-key"]);
            },
        );
    }

    #[test]
    fn vworld_keys_empty_when_unset() {
        temp_env::with_vars([("VWORLD_KEYS", None::<&str>), ("VWORLD_KEY", None)], || {
            assert!(vworld_keys().is_empty());
        });
    }

    #[test]
    fn naver_creds_require_both_halves() {
        temp_env::with_vars(
            [
                ("NAVER_CLIENT_ID", Some("id")),
                ("NAVER_CLIENT_SECRET", None),
            ],
            || {
                assert!(naver_creds().is_none());
            },
        );
        temp_env::with_vars(
            [
                ("NAVER_CLIENT_ID", Some("id")),
                ("NAVER_CLIENT_SECRET", Some("secret")),
            ],
            || {
                assert_eq!(naver_creds(), Some(("id".to_string(), "secret".to_string())));
            },
        );
    }

    #[test]
    fn sync_target_requires_both_url_and_key() {
        temp_env::with_vars([("SYNC_URL", Some("https://x")), ("SYNC_API_KEY", None)], || {
            assert!(sync_target().is_none());
        });
    }

    #[test]
    fn port_env_overrides_default() {
        temp_env::with_var("PORT", Some("8123"), || {
            assert_eq!(server_port(), 8123);
        });
        temp_env::with_var("PORT", Some("not-a-port"), || {
            assert_eq!(server_port(), super::SERVER_PORT);
        });
    }
}
