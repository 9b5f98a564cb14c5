//! Typed ids for stored records.

pub use super::id::Id;

/// Marker type for graph search jobs.
pub struct GraphSearchRecord;

/// Typed id of a graph search job.
pub type GraphSearchId = Id<GraphSearchRecord>;
