//! Domain model for patients, sessions and slide protocols.
//!
//! # Responsibility
//! - Define the records persisted in the local snapshot.
//! - Define the session export document and its building blocks.
//!
//! # Invariants
//! - Patient `id` never leaves the core; `code` is the only exported
//!   patient identifier.
//! - Session summaries are immutable after creation.

pub mod patient;
pub mod protocol;
pub mod session;
