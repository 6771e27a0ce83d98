// ── Domain model ──
//
// Value types shared by the index, the policy code and every consumer.
// Records reference each other by id only.

pub mod category;
pub mod event;
pub mod ids;
pub mod resource;

// ── Re-exports ──────────────────────────────────────────────────────

pub use category::{AlarmCategory, CategorySet};
pub use event::{EventRecord, NewEvent};
pub use ids::{CorrelationId, EventId, JobId, ResourceId};
pub use resource::{
    CollectionAttributes, Colour, FormatCompat, NewCollection, ResourceRecord, Rights,
};
