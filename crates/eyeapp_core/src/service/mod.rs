//! Core use-case services.
//!
//! # Responsibility
//! - `registry`: the only writer of patients and session summaries.
//! - `session_engine`: slide-session lifecycle and timing.

pub mod registry;
pub mod session_engine;
