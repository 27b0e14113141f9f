use pilji_shared::{SESSION_STORE_KEY, SessionParcelRecord, SessionSnapshot};
use tracing::warn;

use crate::persist::{KeyValueStore, StoreError};
use crate::registry::ParcelRegistry;

/// Page-lifetime cache for the search collection: cleared when the tab
/// closes, survives a reload. Saves are synchronous; loads are defensive —
/// anything unreadable is discarded with a warning rather than aborting the
/// restore.
pub struct SessionCache<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> SessionCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn save(&mut self, registry: &ParcelRegistry, now_ms: i64) -> Result<(), StoreError> {
        let snapshot = SessionSnapshot::seal(registry.session_records(now_ms));
        let json = serde_json::to_string(&snapshot)
            .map_err(|e| StoreError::Backend(format!("serialize session snapshot: {e}")))?;
        self.store.set(SESSION_STORE_KEY, &json)
    }

    pub fn load(&self) -> Option<Vec<SessionParcelRecord>> {
        let raw = match self.store.get(SESSION_STORE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "session cache unreadable; skipping search restore");
                return None;
            }
        };

        let snapshot: SessionSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "session snapshot failed to parse; discarding");
                return None;
            }
        };

        if !snapshot.verify() {
            warn!("session snapshot checksum mismatch; discarding");
            return None;
        }

        Some(snapshot.parcels.into_values().collect())
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.store.remove(SESSION_STORE_KEY)
    }
}
