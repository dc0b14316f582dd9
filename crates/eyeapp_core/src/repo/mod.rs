//! Persistence layer.
//!
//! # Responsibility
//! - Keep SQLite and JSON encoding details behind `SnapshotRepository`.
//!
//! # Invariants
//! - Repository reads report invalid persisted data instead of masking it.

pub mod snapshot_repo;
