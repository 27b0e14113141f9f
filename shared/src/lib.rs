pub mod colors;
pub mod geometry;
pub mod label;
pub mod parcel;
pub mod snapshot;

pub use colors::{PALETTE, ParcelColor, PolygonStyle, SEARCH_HIGHLIGHT, rgba_css};
pub use geometry::{ParcelGeometry, Ring};
pub use label::format_display_label;
pub use parcel::{OwnerInfo, ParcelFeature, ParcelId};
pub use snapshot::{
    DURABLE_STORE_KEY, DurableParcelRecord, SESSION_STORE_KEY, SessionParcelRecord, SessionSnapshot,
};
