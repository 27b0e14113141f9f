use pilji_shared::{DURABLE_STORE_KEY, OwnerInfo, ParcelColor, ParcelFeature, ParcelId};
use thiserror::Error;
use tracing::debug;

use crate::persist::{ConnectionState, KeyValueStore, PersistenceAdapter, RemoteWrite, StoreError};
use crate::projector::RenderProjector;
use crate::registry::{ParcelCollection, ParcelRegistry, RegistryError, TrackedParcel};
use crate::restore::{self, RestoreSummary};
use crate::session::SessionCache;
use crate::surface::DisplaySurface;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The single mutation funnel for parcel state. Every operation is
/// mutate → one render sync → persist-as-affected, with no suspension point
/// in between: lookups and remote pushes happen strictly before or after,
/// never inside, so the visible set stays a pure function of the mode.
///
/// In-memory state and the render sync always complete; a failed local
/// write surfaces as an error after the fact.
pub struct ParcelEngine<S, L, C>
where
    S: DisplaySurface,
    L: KeyValueStore,
    C: KeyValueStore,
{
    registry: ParcelRegistry,
    projector: RenderProjector<S>,
    durable: PersistenceAdapter<L>,
    session: SessionCache<C>,
}

impl<S, L, C> ParcelEngine<S, L, C>
where
    S: DisplaySurface,
    L: KeyValueStore,
    C: KeyValueStore,
{
    pub fn new(surface: S, durable: PersistenceAdapter<L>, session_store: C) -> Self {
        Self {
            registry: ParcelRegistry::new(),
            projector: RenderProjector::new(surface),
            durable,
            session: SessionCache::new(session_store),
        }
    }

    pub fn registry(&self) -> &ParcelRegistry {
        &self.registry
    }

    pub fn mode(&self) -> ParcelCollection {
        self.registry.mode()
    }

    pub fn surface(&self) -> &S {
        self.projector.surface()
    }

    pub fn durable(&self) -> &PersistenceAdapter<L> {
        &self.durable
    }

    /// Topmost tracked parcel of the active collection under a map point,
    /// checked before any lookup call goes out.
    pub fn parcel_at(&self, lon: f64, lat: f64) -> Option<&TrackedParcel> {
        self.registry
            .records(self.registry.mode())
            .find(|record| record.geometry.contains_point(lon, lat))
    }

    /// Rebuild state from the session cache and durable store. Idempotent;
    /// run once at mount, safely re-run after the map surface appears.
    pub fn restore(&mut self) -> RestoreSummary {
        restore::run(
            &mut self.registry,
            &mut self.projector,
            &self.durable,
            &self.session,
        )
    }

    /// A successful search pulls the map into search mode and tracks the
    /// hit. Applies unconditionally even if the user toggled modes while
    /// the lookup was in flight; the full sync afterwards keeps stale
    /// responses from surfacing in the wrong mode.
    pub fn ingest_search_result(
        &mut self,
        feature: ParcelFeature,
        now_ms: i64,
    ) -> Result<ParcelId, EngineError> {
        let id = feature.id.clone();
        self.registry.upsert(
            ParcelCollection::Search,
            feature.id,
            feature.geometry,
            feature.properties,
        );
        self.registry.set_mode(ParcelCollection::Search);
        self.projector.sync_all(&mut self.registry);
        self.save_session(now_ms)?;
        Ok(id)
    }

    /// Track a clicked parcel. The record is ephemeral (memory only) until
    /// owner data is saved on it.
    pub fn ingest_click_result(&mut self, feature: ParcelFeature) -> Result<ParcelId, EngineError> {
        let id = feature.id.clone();
        self.registry.upsert(
            ParcelCollection::Click,
            feature.id,
            feature.geometry,
            feature.properties,
        );
        self.projector.sync_all(&mut self.registry);
        self.save_durable()?;
        Ok(id)
    }

    /// Recolor; coloring a search record claims it into the click
    /// collection. Returns whether that migration happened.
    pub fn set_parcel_color(
        &mut self,
        which: ParcelCollection,
        id: &ParcelId,
        color: ParcelColor,
        now_ms: i64,
    ) -> Result<bool, EngineError> {
        let outcome = self.registry.set_color(which, id, color)?;
        self.projector.destroy_visuals(outcome.orphaned);
        self.projector.sync_all(&mut self.registry);
        match which {
            ParcelCollection::Search => {
                self.save_session(now_ms)?;
                if outcome.migrated {
                    self.save_durable()?;
                }
            }
            ParcelCollection::Click => self.save_durable()?,
        }
        Ok(outcome.migrated)
    }

    /// Attach owner data to a click record, promoting it to durable.
    pub fn save_owner_info(&mut self, id: &ParcelId, info: OwnerInfo) -> Result<(), EngineError> {
        self.registry.save_owner_info(id, info)?;
        self.projector.sync_all(&mut self.registry);
        self.save_durable()?;
        Ok(())
    }

    /// Idempotent delete; returns whether a record actually went away.
    pub fn remove_parcel(
        &mut self,
        which: ParcelCollection,
        id: &ParcelId,
        now_ms: i64,
    ) -> Result<bool, EngineError> {
        let removed = match self.registry.remove(which, id) {
            Some(record) => {
                self.projector.destroy_visuals(*record.visual());
                true
            }
            None => false,
        };
        self.projector.sync_all(&mut self.registry);
        match which {
            ParcelCollection::Search => self.save_session(now_ms)?,
            ParcelCollection::Click => self.save_durable()?,
        }
        Ok(removed)
    }

    /// Bulk remove one collection. The confirmation dialog is the UI's job.
    pub fn clear_collection(
        &mut self,
        which: ParcelCollection,
        now_ms: i64,
    ) -> Result<usize, EngineError> {
        let records = self.registry.clear_collection(which);
        let cleared = records.len();
        for record in records {
            self.projector.destroy_visuals(*record.visual());
        }
        self.projector.sync_all(&mut self.registry);
        match which {
            ParcelCollection::Search => self.save_session(now_ms)?,
            ParcelCollection::Click => self.save_durable()?,
        }
        debug!(collection = %which, cleared, "collection cleared");
        Ok(cleared)
    }

    /// Mode change re-syncs both collections: hiding the newly-inactive one
    /// matters as much as showing the active one.
    pub fn set_mode(&mut self, mode: ParcelCollection) {
        if self.registry.set_mode(mode) {
            self.projector.sync_all(&mut self.registry);
        }
    }

    pub fn toggle_mode(&mut self) -> ParcelCollection {
        let next = self.registry.mode().other();
        self.set_mode(next);
        next
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.durable.connection_state()
    }

    pub fn subscribe_connection(&mut self, callback: impl FnMut(ConnectionState) + 'static) {
        self.durable.subscribe(callback);
    }

    pub fn take_remote_write(&mut self) -> Option<RemoteWrite> {
        self.durable.take_remote_write()
    }

    pub fn complete_remote_write(&mut self, result: Result<(), String>) {
        self.durable.complete_remote_write(result);
    }

    fn save_session(&mut self, now_ms: i64) -> Result<(), StoreError> {
        self.session.save(&self.registry, now_ms)
    }

    fn save_durable(&mut self) -> Result<(), StoreError> {
        let records = self.registry.durable_records();
        let json = serde_json::to_string(&records)
            .map_err(|e| StoreError::Backend(format!("serialize durable snapshot: {e}")))?;
        self.durable.set(DURABLE_STORE_KEY, &json)
    }
}
