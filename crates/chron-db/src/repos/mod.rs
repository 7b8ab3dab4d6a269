//! Read-side queries over the stored audit graph.
//!
//! Each module adds methods to `ChronService` via `impl ChronService` blocks.

pub mod changes;
pub mod changesets;
