use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::{CACHE_EVICT_INTERVAL_SECS, LOOKUP_CACHE_TTL_SECS, MAX_LOOKUP_CACHE_ENTRIES};
use crate::state::AppState;

pub async fn run(state: AppState) {
    let mut interval = tokio::time::interval(Duration::from_secs(CACHE_EVICT_INTERVAL_SECS));
    loop {
        interval.tick().await;
        let evicted = prune(&state, Utc::now());
        if evicted > 0 {
            debug!(evicted, "lookup cache pruned");
        }
    }
}

/// Drop expired entries, then enforce the entry cap by evicting oldest
/// first. Returns how many entries went away.
pub(crate) fn prune(state: &AppState, now: DateTime<Utc>) -> usize {
    let before = state.lookup_cache.len();
    state
        .lookup_cache
        .retain(|_, entry| (now - entry.fetched_at).num_seconds() < LOOKUP_CACHE_TTL_SECS);

    let mut len = state.lookup_cache.len();
    if len > MAX_LOOKUP_CACHE_ENTRIES {
        let mut by_age: Vec<(String, DateTime<Utc>)> = state
            .lookup_cache
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().fetched_at))
            .collect();
        by_age.sort_by_key(|(_, fetched_at)| *fetched_at);
        for (key, _) in by_age.into_iter().take(len - MAX_LOOKUP_CACHE_ENTRIES) {
            state.lookup_cache.remove(&key);
        }
        len = state.lookup_cache.len();
    }

    before - len
}
