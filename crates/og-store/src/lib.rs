//! og Store - Persistent object-name population
//!
//! Keeps a searchable population of object names across test runs so reads,
//! overwrites and deletes reference objects that actually exist on the target
//! store. Records are fixed-width and append into segmented files; deletion
//! swaps the victim with the final record and truncates.

pub mod record;
pub mod store;

// Re-exports
pub use record::{ObjectRecord, RECORDS_PER_SEGMENT, RECORD_SIZE, SEGMENT_SIZE};
pub use store::ObjectStore;
