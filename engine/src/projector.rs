use pilji_shared::PolygonStyle;
use tracing::warn;

use crate::registry::{ParcelCollection, ParcelRegistry, TrackedParcel, VisualHandles};
use crate::surface::DisplaySurface;

/// Projects tracked-parcel records onto the display surface.
///
/// Every polygon in the system, whether first-time or restore-time, is
/// created through the one `ensure_visual` path here; attach/detach is then
/// applied from the current-mode rule. Nothing else in the crate creates or
/// hides artifacts, which is what makes "visible set is a pure function of
/// mode" hold at every call site instead of most of them.
#[derive(Debug)]
pub struct RenderProjector<S: DisplaySurface> {
    surface: S,
}

impl<S: DisplaySurface> RenderProjector<S> {
    pub fn new(surface: S) -> Self {
        Self { surface }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Re-sync both collections. Used after a mode flip, where hiding the
    /// newly-inactive collection matters as much as showing the active one,
    /// and after restoration.
    pub fn sync_all(&mut self, registry: &mut ParcelRegistry) {
        self.sync_collection(registry, ParcelCollection::Search);
        self.sync_collection(registry, ParcelCollection::Click);
    }

    pub fn sync_collection(&mut self, registry: &mut ParcelRegistry, which: ParcelCollection) {
        let mode = registry.mode();
        for record in registry.records_mut(which) {
            ensure_visual(&mut self.surface, record);
            let attached = record.is_visible_in(mode);
            for handle in record.visual.iter() {
                self.surface.set_attached(handle, attached);
            }
        }
    }

    /// Destroy artifacts whose owning record is gone (removal, or the click
    /// record overwritten by a migration).
    pub fn destroy_visuals(&mut self, handles: VisualHandles) {
        for handle in handles.iter() {
            self.surface.destroy(handle);
        }
    }
}

/// Create missing artifacts for one record, restyle existing ones. An
/// existing polygon handle is never rebuilt from geometry; rebuilding is how
/// restored polygons used to miss the attach pass.
fn ensure_visual<S: DisplaySurface>(surface: &mut S, record: &mut TrackedParcel) {
    if !record.geometry.is_renderable() {
        warn!(parcel = %record.id, collection = %record.collection,
            "skipping record with unrenderable geometry");
        return;
    }

    let style = PolygonStyle::for_color(&record.color);
    match record.visual.polygon {
        Some(handle) => surface.restyle_polygon(handle, &style),
        None => record.visual.polygon = Some(surface.create_polygon(&record.geometry, &style)),
    }

    match record.collection {
        ParcelCollection::Search => {
            if record.visual.label.is_none()
                && let Some(at) = record.geometry.centroid()
            {
                record.visual.label = Some(surface.create_label(&record.display_label, at));
            }
        }
        ParcelCollection::Click => {
            // The marker signals saved annotation data; it never appears
            // before owner info exists.
            if record.owner_info.is_some()
                && record.visual.marker.is_none()
                && let Some(at) = record.geometry.centroid()
            {
                record.visual.marker = Some(surface.create_marker(at));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pilji_shared::{OwnerInfo, ParcelColor, ParcelGeometry, ParcelId};

    use super::RenderProjector;
    use crate::registry::{ParcelCollection, ParcelRegistry};
    use crate::surface::{ArtifactData, ArtifactKind, MemorySurface};

    fn pnu(n: u32) -> ParcelId {
        ParcelId::from(format!("11110129001{n:04}0001"))
    }

    fn square(offset: f64) -> ParcelGeometry {
        ParcelGeometry::Polygon(vec![vec![
            [offset, offset],
            [offset + 1.0, offset],
            [offset + 1.0, offset + 1.0],
            [offset, offset + 1.0],
        ]])
    }

    fn attributes() -> serde_json::Value {
        serde_json::json!({ "addr": "서울특별시 종로구 사직동 344-1" })
    }

    fn setup() -> (ParcelRegistry, RenderProjector<MemorySurface>) {
        (ParcelRegistry::new(), RenderProjector::new(MemorySurface::new()))
    }

    #[test]
    fn visibility_is_a_pure_function_of_mode() {
        let (mut registry, mut projector) = setup();
        registry.upsert(ParcelCollection::Click, pnu(1), square(0.0), attributes());
        registry.upsert(ParcelCollection::Search, pnu(2), square(2.0), attributes());
        projector.sync_all(&mut registry);

        let check = |registry: &ParcelRegistry, projector: &RenderProjector<MemorySurface>| {
            for which in [ParcelCollection::Search, ParcelCollection::Click] {
                for record in registry.records(which) {
                    let expected = record.collection == registry.mode();
                    for handle in record.visual().iter() {
                        assert_eq!(
                            projector.surface().is_attached(handle),
                            expected,
                            "attachment must equal (collection == mode) for {}",
                            record.id
                        );
                    }
                }
            }
        };

        check(&registry, &projector);

        registry.set_mode(ParcelCollection::Search);
        projector.sync_all(&mut registry);
        check(&registry, &projector);

        registry.set_mode(ParcelCollection::Click);
        projector.sync_all(&mut registry);
        check(&registry, &projector);
    }

    #[test]
    fn duplicate_upsert_reuses_artifacts() {
        let (mut registry, mut projector) = setup();
        registry.upsert(ParcelCollection::Search, pnu(1), square(0.0), attributes());
        projector.sync_all(&mut registry);

        let polygon = registry
            .get(ParcelCollection::Search, &pnu(1))
            .expect("record should exist")
            .visual()
            .polygon
            .expect("polygon should exist");

        registry.upsert(ParcelCollection::Search, pnu(1), square(0.0), attributes());
        projector.sync_all(&mut registry);

        assert_eq!(projector.surface().count_of(ArtifactKind::Polygon), 1);
        assert_eq!(projector.surface().count_of(ArtifactKind::Label), 1);
        assert_eq!(
            registry
                .get(ParcelCollection::Search, &pnu(1))
                .expect("record should exist")
                .visual()
                .polygon,
            Some(polygon),
            "the original handle must be reused, not recreated"
        );
    }

    #[test]
    fn recolor_restyles_existing_polygon_in_place() {
        let (mut registry, mut projector) = setup();
        registry.upsert(ParcelCollection::Click, pnu(1), square(0.0), attributes());
        projector.sync_all(&mut registry);

        let handle = registry
            .get(ParcelCollection::Click, &pnu(1))
            .expect("record should exist")
            .visual()
            .polygon
            .expect("polygon should exist");

        registry
            .set_color(
                ParcelCollection::Click,
                &pnu(1),
                ParcelColor::Hex("#FF5252".to_string()),
            )
            .expect("recolor should succeed");
        projector.sync_all(&mut registry);

        match &projector.surface().get(handle).expect("artifact should exist").data {
            ArtifactData::Polygon { style, .. } => {
                assert_eq!(style.fill, "rgba(255, 82, 82, 0.6)");
            }
            other => panic!("expected polygon, got {other:?}"),
        }
        assert_eq!(projector.surface().count_of(ArtifactKind::Polygon), 1);
    }

    #[test]
    fn transparent_click_parcel_renders_with_zero_alpha_fill() {
        let (mut registry, mut projector) = setup();
        registry.upsert(ParcelCollection::Click, pnu(1), square(0.0), attributes());
        projector.sync_all(&mut registry);

        let record = registry
            .get(ParcelCollection::Click, &pnu(1))
            .expect("record should exist");
        let handle = record.visual().polygon.expect("polygon should exist");
        assert!(projector.surface().is_attached(handle));
        match &projector.surface().get(handle).expect("artifact").data {
            ArtifactData::Polygon { style, .. } => assert!(!style.has_visible_fill()),
            other => panic!("expected polygon, got {other:?}"),
        }
    }

    #[test]
    fn marker_appears_only_after_owner_save_and_only_in_click_mode() {
        let (mut registry, mut projector) = setup();
        registry.upsert(ParcelCollection::Click, pnu(1), square(0.0), attributes());
        projector.sync_all(&mut registry);
        assert_eq!(projector.surface().count_of(ArtifactKind::Marker), 0);

        registry
            .save_owner_info(
                &pnu(1),
                OwnerInfo {
                    name: Some("김철수".to_string()),
                    address: None,
                    contact: None,
                    memo: None,
                    saved_at: Utc::now(),
                },
            )
            .expect("owner save should succeed");
        projector.sync_all(&mut registry);

        let marker = registry
            .get(ParcelCollection::Click, &pnu(1))
            .expect("record should exist")
            .visual()
            .marker
            .expect("marker should exist after owner save");
        assert!(projector.surface().is_attached(marker));

        registry.set_mode(ParcelCollection::Search);
        projector.sync_all(&mut registry);
        assert!(!projector.surface().is_attached(marker));
    }

    #[test]
    fn search_records_get_labels_click_records_do_not() {
        let (mut registry, mut projector) = setup();
        registry.upsert(ParcelCollection::Search, pnu(1), square(0.0), attributes());
        registry.upsert(ParcelCollection::Click, pnu(2), square(2.0), attributes());
        projector.sync_all(&mut registry);

        assert_eq!(projector.surface().count_of(ArtifactKind::Label), 1);
        assert!(
            registry
                .get(ParcelCollection::Click, &pnu(2))
                .expect("record should exist")
                .visual()
                .label
                .is_none()
        );
    }

    #[test]
    fn malformed_geometry_skips_record_but_not_batch() {
        let (mut registry, mut projector) = setup();
        registry.upsert(
            ParcelCollection::Click,
            pnu(1),
            ParcelGeometry::Polygon(vec![vec![[0.0, 0.0], [1.0, 1.0]]]),
            attributes(),
        );
        registry.upsert(ParcelCollection::Click, pnu(2), square(0.0), attributes());
        projector.sync_all(&mut registry);

        assert!(
            registry
                .get(ParcelCollection::Click, &pnu(1))
                .expect("record should exist")
                .visual()
                .is_empty()
        );
        assert!(
            registry
                .get(ParcelCollection::Click, &pnu(2))
                .expect("record should exist")
                .visual()
                .polygon
                .is_some()
        );
    }

    #[test]
    fn destroy_visuals_removes_artifacts_from_surface() {
        let (mut registry, mut projector) = setup();
        registry.upsert(ParcelCollection::Search, pnu(1), square(0.0), attributes());
        projector.sync_all(&mut registry);
        assert_eq!(projector.surface().len(), 2);

        let record = registry
            .remove(ParcelCollection::Search, &pnu(1))
            .expect("record should exist");
        projector.destroy_visuals(*record.visual());
        assert!(projector.surface().is_empty());
    }
}
