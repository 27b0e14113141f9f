use std::collections::BTreeMap;

use pilji_shared::{ParcelGeometry, PolygonStyle};
use tracing::debug;

/// Opaque handle to one render artifact, allocated by the display surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Polygon,
    Label,
    Marker,
}

/// The rendering seam the projector drives. Creation is separate from
/// attachment: a detached artifact keeps its geometry and style and can be
/// re-shown without rebuilding, which is what makes mode toggles cheap and
/// what keeps restore-time and first-time rendering on one code path.
pub trait DisplaySurface {
    fn create_polygon(&mut self, geometry: &ParcelGeometry, style: &PolygonStyle) -> ArtifactId;
    fn restyle_polygon(&mut self, id: ArtifactId, style: &PolygonStyle);
    fn create_label(&mut self, text: &str, at: [f64; 2]) -> ArtifactId;
    fn create_marker(&mut self, at: [f64; 2]) -> ArtifactId;
    fn set_attached(&mut self, id: ArtifactId, attached: bool);
    fn destroy(&mut self, id: ArtifactId);
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactData {
    Polygon {
        geometry: ParcelGeometry,
        style: PolygonStyle,
    },
    Label {
        text: String,
        at: [f64; 2],
    },
    Marker {
        at: [f64; 2],
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub data: ArtifactData,
    pub attached: bool,
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self.data {
            ArtifactData::Polygon { .. } => ArtifactKind::Polygon,
            ArtifactData::Label { .. } => ArtifactKind::Label,
            ArtifactData::Marker { .. } => ArtifactKind::Marker,
        }
    }
}

/// Retained display list. The wasm client draws its attached artifacts every
/// frame; tests inspect it directly. Keyed by a BTreeMap so draw order (and
/// therefore z-order) follows creation order.
#[derive(Debug, Default)]
pub struct MemorySurface {
    artifacts: BTreeMap<ArtifactId, Artifact>,
    next_id: u64,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ArtifactId) -> Option<&Artifact> {
        self.artifacts.get(&id)
    }

    pub fn is_attached(&self, id: ArtifactId) -> bool {
        self.artifacts.get(&id).is_some_and(|a| a.attached)
    }

    pub fn attached(&self) -> impl Iterator<Item = (ArtifactId, &Artifact)> {
        self.artifacts
            .iter()
            .filter(|(_, a)| a.attached)
            .map(|(id, a)| (*id, a))
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn count_of(&self, kind: ArtifactKind) -> usize {
        self.artifacts.values().filter(|a| a.kind() == kind).count()
    }

    fn alloc(&mut self, data: ArtifactData) -> ArtifactId {
        self.next_id += 1;
        let id = ArtifactId(self.next_id);
        self.artifacts.insert(
            id,
            Artifact {
                data,
                attached: false,
            },
        );
        id
    }
}

impl DisplaySurface for MemorySurface {
    fn create_polygon(&mut self, geometry: &ParcelGeometry, style: &PolygonStyle) -> ArtifactId {
        self.alloc(ArtifactData::Polygon {
            geometry: geometry.clone(),
            style: style.clone(),
        })
    }

    fn restyle_polygon(&mut self, id: ArtifactId, style: &PolygonStyle) {
        match self.artifacts.get_mut(&id) {
            Some(Artifact {
                data: ArtifactData::Polygon { style: current, .. },
                ..
            }) => *current = style.clone(),
            _ => debug!(artifact = id.0, "restyle of unknown polygon handle ignored"),
        }
    }

    fn create_label(&mut self, text: &str, at: [f64; 2]) -> ArtifactId {
        self.alloc(ArtifactData::Label {
            text: text.to_string(),
            at,
        })
    }

    fn create_marker(&mut self, at: [f64; 2]) -> ArtifactId {
        self.alloc(ArtifactData::Marker { at })
    }

    fn set_attached(&mut self, id: ArtifactId, attached: bool) {
        if let Some(artifact) = self.artifacts.get_mut(&id) {
            artifact.attached = attached;
        }
    }

    fn destroy(&mut self, id: ArtifactId) {
        if self.artifacts.remove(&id).is_none() {
            debug!(artifact = id.0, "destroy of unknown handle ignored");
        }
    }
}

#[cfg(test)]
mod tests {
    use pilji_shared::{ParcelColor, ParcelGeometry, PolygonStyle};

    use super::{ArtifactKind, DisplaySurface, MemorySurface};

    fn triangle() -> ParcelGeometry {
        ParcelGeometry::Polygon(vec![vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]])
    }

    #[test]
    fn artifacts_start_detached_and_survive_detach() {
        let mut surface = MemorySurface::new();
        let style = PolygonStyle::for_color(&ParcelColor::Transparent);
        let id = surface.create_polygon(&triangle(), &style);

        assert!(!surface.is_attached(id));
        surface.set_attached(id, true);
        assert!(surface.is_attached(id));
        surface.set_attached(id, false);
        assert!(!surface.is_attached(id));
        assert_eq!(surface.len(), 1, "detach must not destroy the artifact");
    }

    #[test]
    fn restyle_replaces_style_in_place() {
        let mut surface = MemorySurface::new();
        let id = surface.create_polygon(
            &triangle(),
            &PolygonStyle::for_color(&ParcelColor::Transparent),
        );
        let colored = PolygonStyle::for_color(&ParcelColor::Hex("#FF5252".to_string()));
        surface.restyle_polygon(id, &colored);

        let artifact = surface.get(id).expect("artifact should exist");
        match &artifact.data {
            super::ArtifactData::Polygon { style, .. } => assert_eq!(style, &colored),
            other => panic!("expected polygon artifact, got {other:?}"),
        }
        assert_eq!(surface.len(), 1);
    }

    #[test]
    fn destroy_removes_and_is_idempotent() {
        let mut surface = MemorySurface::new();
        let id = surface.create_marker([0.5, 0.5]);
        surface.destroy(id);
        surface.destroy(id);
        assert!(surface.is_empty());
    }

    #[test]
    fn attached_iterates_in_creation_order() {
        let mut surface = MemorySurface::new();
        let a = surface.create_polygon(
            &triangle(),
            &PolygonStyle::for_color(&ParcelColor::Transparent),
        );
        let b = surface.create_label("사직동 344-1", [0.5, 0.5]);
        surface.set_attached(a, true);
        surface.set_attached(b, true);

        let kinds: Vec<ArtifactKind> = surface.attached().map(|(_, art)| art.kind()).collect();
        assert_eq!(kinds, vec![ArtifactKind::Polygon, ArtifactKind::Label]);
    }
}
