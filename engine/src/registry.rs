use std::collections::{BTreeMap, HashMap, hash_map::Entry};

use chrono::Utc;
use pilji_shared::{
    DurableParcelRecord, OwnerInfo, ParcelColor, ParcelGeometry, ParcelId, SEARCH_HIGHLIGHT,
    SessionParcelRecord, format_display_label,
};
use thiserror::Error;

use crate::surface::ArtifactId;

/// The two tracked collections. The value doubles as the map mode: the
/// current mode names the collection whose records are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParcelCollection {
    Search,
    Click,
}

impl ParcelCollection {
    pub fn other(self) -> Self {
        match self {
            ParcelCollection::Search => ParcelCollection::Click,
            ParcelCollection::Click => ParcelCollection::Search,
        }
    }
}

impl std::fmt::Display for ParcelCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ParcelCollection::Search => "search",
            ParcelCollection::Click => "click",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Caller named an id the collection does not hold. Data-shape problems
    /// are routed around elsewhere; this one is a caller bug and fails loudly.
    #[error("no {collection} record for parcel {id}")]
    UnknownParcel {
        collection: ParcelCollection,
        id: ParcelId,
    },
}

/// Handles to the up-to-three render artifacts of one record. Exclusive to
/// that record: a migration copy starts empty, and removal hands them back
/// so the projector can destroy them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisualHandles {
    pub polygon: Option<ArtifactId>,
    pub label: Option<ArtifactId>,
    pub marker: Option<ArtifactId>,
}

impl VisualHandles {
    pub fn iter(&self) -> impl Iterator<Item = ArtifactId> {
        [self.polygon, self.label, self.marker].into_iter().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.polygon.is_none() && self.label.is_none() && self.marker.is_none()
    }
}

/// One tracked parcel. `display_label` is computed once at ingestion and
/// never mutated; `collection` changes only through migration.
#[derive(Debug, Clone)]
pub struct TrackedParcel {
    pub id: ParcelId,
    pub geometry: ParcelGeometry,
    pub attributes: serde_json::Value,
    pub display_label: String,
    pub color: ParcelColor,
    pub owner_info: Option<OwnerInfo>,
    pub collection: ParcelCollection,
    pub(crate) visual: VisualHandles,
}

impl TrackedParcel {
    /// The one visibility rule: a record is shown iff its collection is the
    /// current mode. No other flag may override this.
    pub fn is_visible_in(&self, mode: ParcelCollection) -> bool {
        self.collection == mode
    }

    pub fn visual(&self) -> &VisualHandles {
        &self.visual
    }
}

/// Result of a `set_color` call: whether the record was claimed into the
/// click collection, and the handles of any click record it overwrote.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ColorOutcome {
    pub migrated: bool,
    pub orphaned: VisualHandles,
}

/// Owner of both tracked collections and the mode. Every mutation of parcel
/// state funnels through this type so the visibility invariant has a single
/// enforcement point.
#[derive(Debug)]
pub struct ParcelRegistry {
    search: HashMap<ParcelId, TrackedParcel>,
    click: HashMap<ParcelId, TrackedParcel>,
    mode: ParcelCollection,
}

impl Default for ParcelRegistry {
    fn default() -> Self {
        Self {
            search: HashMap::new(),
            click: HashMap::new(),
            mode: ParcelCollection::Click,
        }
    }
}

impl ParcelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> ParcelCollection {
        self.mode
    }

    /// Returns true when the mode actually changed; the caller owes a full
    /// re-sync of both collections in that case.
    pub fn set_mode(&mut self, mode: ParcelCollection) -> bool {
        if self.mode == mode {
            return false;
        }
        self.mode = mode;
        true
    }

    pub fn is_visible(&self, record: &TrackedParcel) -> bool {
        record.is_visible_in(self.mode)
    }

    fn collection(&self, which: ParcelCollection) -> &HashMap<ParcelId, TrackedParcel> {
        match which {
            ParcelCollection::Search => &self.search,
            ParcelCollection::Click => &self.click,
        }
    }

    fn collection_mut(&mut self, which: ParcelCollection) -> &mut HashMap<ParcelId, TrackedParcel> {
        match which {
            ParcelCollection::Search => &mut self.search,
            ParcelCollection::Click => &mut self.click,
        }
    }

    pub fn get(&self, which: ParcelCollection, id: &ParcelId) -> Option<&TrackedParcel> {
        self.collection(which).get(id)
    }

    pub fn contains(&self, which: ParcelCollection, id: &ParcelId) -> bool {
        self.collection(which).contains_key(id)
    }

    pub fn len(&self, which: ParcelCollection) -> usize {
        self.collection(which).len()
    }

    pub fn records(&self, which: ParcelCollection) -> impl Iterator<Item = &TrackedParcel> {
        self.collection(which).values()
    }

    pub(crate) fn records_mut(
        &mut self,
        which: ParcelCollection,
    ) -> impl Iterator<Item = &mut TrackedParcel> {
        self.collection_mut(which).values_mut()
    }

    /// Insert or refresh a record from a lookup result. A refresh replaces
    /// geometry and attributes only: user edits (`color`, `owner_info`) and
    /// the cached label survive, and the existing visual handles are reused
    /// so no second artifact can ever be created for the same id.
    pub fn upsert(
        &mut self,
        which: ParcelCollection,
        id: ParcelId,
        geometry: ParcelGeometry,
        attributes: serde_json::Value,
    ) -> &mut TrackedParcel {
        match self.collection_mut(which).entry(id) {
            Entry::Occupied(entry) => {
                let record = entry.into_mut();
                record.geometry = geometry;
                record.attributes = attributes;
                record
            }
            Entry::Vacant(entry) => {
                let id = entry.key().clone();
                let display_label = format_display_label(&id, &attributes);
                entry.insert(TrackedParcel {
                    id,
                    geometry,
                    attributes,
                    display_label,
                    color: default_color(which),
                    owner_info: None,
                    collection: which,
                    visual: VisualHandles::default(),
                })
            }
        }
    }

    /// Restore-time insert for a session-cache entry. Skips (returns false)
    /// when the id is already tracked, which is what makes the restoration
    /// pipeline a no-op on its second invocation.
    pub fn rehydrate_search(&mut self, record: SessionParcelRecord) -> bool {
        if self.search.contains_key(&record.id) {
            return false;
        }
        let display_label = stored_or_derived_label(record.display_label, &record.id, &record.properties);
        self.search.insert(
            record.id.clone(),
            TrackedParcel {
                id: record.id,
                geometry: record.geometry,
                attributes: record.properties,
                display_label,
                color: record.color,
                owner_info: None,
                collection: ParcelCollection::Search,
                visual: VisualHandles::default(),
            },
        );
        true
    }

    /// Restore-time insert for a durable-store entry.
    pub fn rehydrate_click(&mut self, record: DurableParcelRecord) -> bool {
        if self.click.contains_key(&record.id) {
            return false;
        }
        let display_label = stored_or_derived_label(record.display_label, &record.id, &record.properties);
        self.click.insert(
            record.id.clone(),
            TrackedParcel {
                id: record.id,
                geometry: record.geometry,
                attributes: record.properties,
                display_label,
                color: record.color,
                owner_info: record.owner_info,
                collection: ParcelCollection::Click,
                visual: VisualHandles::default(),
            },
        );
        true
    }

    /// Recolor a record. Coloring a search record with anything visible
    /// claims it into the click collection (the search original keeps its
    /// own color so an identical future search still highlights normally).
    pub fn set_color(
        &mut self,
        which: ParcelCollection,
        id: &ParcelId,
        color: ParcelColor,
    ) -> Result<ColorOutcome, RegistryError> {
        if which == ParcelCollection::Search && !color.is_transparent() {
            let orphaned = self.migrate_with_color(id, Some(color))?;
            return Ok(ColorOutcome {
                migrated: true,
                orphaned,
            });
        }

        let record = self
            .collection_mut(which)
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownParcel {
                collection: which,
                id: id.clone(),
            })?;
        record.color = color;
        Ok(ColorOutcome::default())
    }

    /// Copy the search record for `id` into the click collection under the
    /// same id, last-write-wins. The search record stays untouched; the copy
    /// starts without visual handles. Returns the handles of any overwritten
    /// click record so the caller can destroy them.
    pub fn migrate_to_click(&mut self, id: &ParcelId) -> Result<VisualHandles, RegistryError> {
        self.migrate_with_color(id, None)
    }

    fn migrate_with_color(
        &mut self,
        id: &ParcelId,
        color: Option<ParcelColor>,
    ) -> Result<VisualHandles, RegistryError> {
        let source = self
            .search
            .get(id)
            .ok_or_else(|| RegistryError::UnknownParcel {
                collection: ParcelCollection::Search,
                id: id.clone(),
            })?;

        let mut copy = source.clone();
        copy.collection = ParcelCollection::Click;
        copy.visual = VisualHandles::default();
        if let Some(color) = color {
            copy.color = color;
        }

        let orphaned = match self.click.insert(id.clone(), copy) {
            Some(previous) => previous.visual,
            None => VisualHandles::default(),
        };
        Ok(orphaned)
    }

    /// Attach user annotation data. Click collection only: owner data is what
    /// promotes a record to durable, and only click records are durable.
    pub fn save_owner_info(&mut self, id: &ParcelId, info: OwnerInfo) -> Result<(), RegistryError> {
        let record = self
            .click
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownParcel {
                collection: ParcelCollection::Click,
                id: id.clone(),
            })?;
        record.owner_info = Some(info);
        Ok(())
    }

    /// Idempotent delete: an absent id is a no-op, never an error.
    pub fn remove(&mut self, which: ParcelCollection, id: &ParcelId) -> Option<TrackedParcel> {
        self.collection_mut(which).remove(id)
    }

    /// Bulk remove. Confirmation is the caller's business.
    pub fn clear_collection(&mut self, which: ParcelCollection) -> Vec<TrackedParcel> {
        self.collection_mut(which).drain().map(|(_, r)| r).collect()
    }

    /// Click records promoted to durable (those with owner data), in id
    /// order so repeated snapshots of the same state serialize identically.
    pub fn durable_records(&self) -> Vec<DurableParcelRecord> {
        let mut records: Vec<DurableParcelRecord> = self
            .click
            .values()
            .filter(|record| record.owner_info.is_some())
            .map(|record| DurableParcelRecord {
                id: record.id.clone(),
                geometry: record.geometry.clone(),
                properties: record.attributes.clone(),
                display_label: record.display_label.clone(),
                color: record.color.clone(),
                owner_info: record.owner_info.clone(),
                saved_at: record
                    .owner_info
                    .as_ref()
                    .map(|info| info.saved_at)
                    .unwrap_or_else(Utc::now),
            })
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Session-cache snapshot of the search collection.
    pub fn session_records(&self, now_ms: i64) -> BTreeMap<String, SessionParcelRecord> {
        self.search
            .values()
            .map(|record| {
                (
                    record.id.to_string(),
                    SessionParcelRecord {
                        id: record.id.clone(),
                        geometry: record.geometry.clone(),
                        properties: record.attributes.clone(),
                        display_label: record.display_label.clone(),
                        color: record.color.clone(),
                        timestamp: now_ms,
                    },
                )
            })
            .collect()
    }
}

fn default_color(which: ParcelCollection) -> ParcelColor {
    match which {
        ParcelCollection::Search => ParcelColor::Hex(SEARCH_HIGHLIGHT.to_string()),
        ParcelCollection::Click => ParcelColor::Transparent,
    }
}

fn stored_or_derived_label(
    stored: String,
    id: &ParcelId,
    properties: &serde_json::Value,
) -> String {
    if stored.trim().is_empty() {
        format_display_label(id, properties)
    } else {
        stored
    }
}
