pub mod engine;
pub mod governor;
pub mod lookup;
pub mod persist;
pub mod projector;
pub mod registry;
pub mod restore;
pub mod session;
pub mod surface;

pub use engine::{EngineError, ParcelEngine};
pub use governor::{CallOutcome, CallRecord, GovernorLimit, RateGovernor};
pub use lookup::{GovernedLookup, LookupError, ParcelLookup};
pub use persist::{
    ConnectionState, KeyValueStore, MemoryStore, PersistenceAdapter, RemoteWrite, StoreError,
};
pub use projector::RenderProjector;
pub use registry::{
    ColorOutcome, ParcelCollection, ParcelRegistry, RegistryError, TrackedParcel, VisualHandles,
};
pub use restore::RestoreSummary;
pub use session::SessionCache;
pub use surface::{Artifact, ArtifactData, ArtifactId, ArtifactKind, DisplaySurface, MemorySurface};
