//! Services - reduction and matching logic
//!
//! - `decimator` - time-interval downsampling
//! - `simplifier` - Douglas-Peucker polyline simplification
//! - `reduction` - decimation + simplification pipeline with statistics
//! - `chunk_planner` - overlapping, size-bounded windows for provider calls
//! - `reconciler` - stitches per-chunk segments into one path
//! - `cancellation` - generation tickets for superseding in-flight runs
//! - `engine` - sequential chunked matching driver

pub mod cancellation;
pub mod chunk_planner;
pub mod decimator;
pub mod engine;
pub mod reconciler;
pub mod reduction;
pub mod simplifier;

// Re-export commonly used types
pub use cancellation::{MatchGeneration, MatchTicket};
pub use chunk_planner::{plan_chunks, ChunkPlan};
pub use decimator::decimate;
pub use engine::{MatchEngine, MatchProgress};
pub use reconciler::{reconcile, Reconciler};
pub use reduction::{reduce, Reduction, ReductionOptions};
pub use simplifier::simplify;
