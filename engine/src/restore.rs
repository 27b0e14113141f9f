use pilji_shared::{DURABLE_STORE_KEY, DurableParcelRecord};
use tracing::{info, warn};

use crate::persist::{KeyValueStore, PersistenceAdapter};
use crate::projector::RenderProjector;
use crate::registry::ParcelRegistry;
use crate::session::SessionCache;
use crate::surface::DisplaySurface;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreSummary {
    pub search_restored: usize,
    pub click_restored: usize,
    pub skipped: usize,
}

/// Rebuild registry state on page load: session cache → search collection,
/// durable store → click collection, then exactly one full render sync.
///
/// Syncing per entry is deliberately avoided — that is how a restored label
/// could appear seconds before its polygon. Safe to run twice: entries whose
/// id is already tracked are skipped, so a second invocation only re-syncs.
pub fn run<S, L, C>(
    registry: &mut ParcelRegistry,
    projector: &mut RenderProjector<S>,
    durable: &PersistenceAdapter<L>,
    session: &SessionCache<C>,
) -> RestoreSummary
where
    S: DisplaySurface,
    L: KeyValueStore,
    C: KeyValueStore,
{
    let mut summary = RestoreSummary::default();

    if let Some(records) = session.load() {
        for record in records {
            if registry.rehydrate_search(record) {
                summary.search_restored += 1;
            } else {
                summary.skipped += 1;
            }
        }
    }

    match durable.get(DURABLE_STORE_KEY) {
        Ok(Some(raw)) => match serde_json::from_str::<Vec<DurableParcelRecord>>(&raw) {
            Ok(records) => {
                for record in records {
                    if registry.rehydrate_click(record) {
                        summary.click_restored += 1;
                    } else {
                        summary.skipped += 1;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "durable snapshot failed to parse; click collection starts empty");
            }
        },
        Ok(None) => {}
        Err(e) => {
            warn!(error = %e, "durable store unreadable; click collection starts empty");
        }
    }

    projector.sync_all(registry);

    info!(
        search = summary.search_restored,
        click = summary.click_restored,
        skipped = summary.skipped,
        "restore complete"
    );
    summary
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pilji_shared::{
        DURABLE_STORE_KEY, DurableParcelRecord, OwnerInfo, ParcelColor, ParcelGeometry, ParcelId,
    };

    use super::run;
    use crate::persist::{KeyValueStore, MemoryStore, PersistenceAdapter};
    use crate::projector::RenderProjector;
    use crate::registry::{ParcelCollection, ParcelRegistry};
    use crate::session::SessionCache;
    use crate::surface::{ArtifactKind, MemorySurface};

    fn square() -> ParcelGeometry {
        ParcelGeometry::Polygon(vec![vec![
            [0.0, 0.0],
            [1.0, 0.0],
            [1.0, 1.0],
            [0.0, 1.0],
        ]])
    }

    fn durable_record(pnu: &str) -> DurableParcelRecord {
        DurableParcelRecord {
            id: ParcelId::from(pnu),
            geometry: square(),
            properties: serde_json::json!({ "addr": "서울특별시 종로구 사직동 344-1" }),
            display_label: "사직동 344-1".to_string(),
            color: ParcelColor::Hex("#FF5252".to_string()),
            owner_info: Some(OwnerInfo {
                name: Some("김철수".to_string()),
                address: None,
                contact: None,
                memo: None,
                saved_at: Utc::now(),
            }),
            saved_at: Utc::now(),
        }
    }

    fn session_cache_with_record() -> SessionCache<MemoryStore> {
        let mut registry = ParcelRegistry::new();
        registry.upsert(
            ParcelCollection::Search,
            ParcelId::from("1111012900103440001"),
            square(),
            serde_json::json!({ "addr": "서울특별시 종로구 사직동 344-1" }),
        );
        let mut cache = SessionCache::new(MemoryStore::new());
        cache.save(&registry, 0).expect("save should succeed");
        cache
    }

    #[test]
    fn session_only_restore_attaches_polygon_and_label_together() {
        // Reload with only the session cache populated (scenario that used
        // to restore the label but not the polygon).
        let session = session_cache_with_record();
        let durable = PersistenceAdapter::new(MemoryStore::new(), false);
        let mut registry = ParcelRegistry::new();
        let mut projector = RenderProjector::new(MemorySurface::new());

        let summary = run(&mut registry, &mut projector, &durable, &session);
        assert_eq!(summary.search_restored, 1);
        assert_eq!(summary.click_restored, 0);

        registry.set_mode(ParcelCollection::Search);
        projector.sync_all(&mut registry);

        let record = registry
            .get(ParcelCollection::Search, &ParcelId::from("1111012900103440001"))
            .expect("record should be restored");
        let polygon = record.visual().polygon.expect("polygon should exist");
        let label = record.visual().label.expect("label should exist");
        assert!(projector.surface().is_attached(polygon));
        assert!(projector.surface().is_attached(label));
    }

    #[test]
    fn durable_restore_rebuilds_click_records_with_owner_info() {
        let mut store = MemoryStore::new();
        let records = vec![durable_record("1111012900103440001")];
        store
            .set(
                DURABLE_STORE_KEY,
                &serde_json::to_string(&records).expect("records should serialize"),
            )
            .expect("set should succeed");
        let durable = PersistenceAdapter::new(store, false);
        let session = SessionCache::new(MemoryStore::new());

        let mut registry = ParcelRegistry::new();
        let mut projector = RenderProjector::new(MemorySurface::new());
        let summary = run(&mut registry, &mut projector, &durable, &session);
        assert_eq!(summary.click_restored, 1);

        let record = registry
            .get(ParcelCollection::Click, &ParcelId::from("1111012900103440001"))
            .expect("record should be restored");
        assert_eq!(record.color, ParcelColor::Hex("#FF5252".to_string()));
        assert!(record.owner_info.is_some());
        // Mode defaults to click, so the restored parcel is immediately visible.
        let polygon = record.visual().polygon.expect("polygon should exist");
        assert!(projector.surface().is_attached(polygon));
        assert_eq!(projector.surface().count_of(ArtifactKind::Marker), 1);
    }

    #[test]
    fn second_invocation_is_a_pure_no_op() {
        let session = session_cache_with_record();
        let durable = PersistenceAdapter::new(MemoryStore::new(), false);
        let mut registry = ParcelRegistry::new();
        let mut projector = RenderProjector::new(MemorySurface::new());

        run(&mut registry, &mut projector, &durable, &session);
        let artifacts_after_first = projector.surface().len();
        let polygon = registry
            .get(ParcelCollection::Search, &ParcelId::from("1111012900103440001"))
            .expect("record should exist")
            .visual()
            .polygon;

        let summary = run(&mut registry, &mut projector, &durable, &session);
        assert_eq!(summary.search_restored, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(projector.surface().len(), artifacts_after_first);
        assert_eq!(
            registry
                .get(ParcelCollection::Search, &ParcelId::from("1111012900103440001"))
                .expect("record should exist")
                .visual()
                .polygon,
            polygon,
            "re-running restore must not recreate handles"
        );
    }

    #[test]
    fn corrupt_durable_snapshot_does_not_abort_search_restore() {
        let mut store = MemoryStore::new();
        store
            .set(DURABLE_STORE_KEY, "{definitely not an array")
            .expect("set should succeed");
        let durable = PersistenceAdapter::new(store, false);
        let session = session_cache_with_record();

        let mut registry = ParcelRegistry::new();
        let mut projector = RenderProjector::new(MemorySurface::new());
        let summary = run(&mut registry, &mut projector, &durable, &session);

        assert_eq!(summary.search_restored, 1);
        assert_eq!(summary.click_restored, 0);
        assert_eq!(registry.len(ParcelCollection::Click), 0);
    }
}
