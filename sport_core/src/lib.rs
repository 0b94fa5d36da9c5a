#![forbid(unsafe_code)]

//! Core logic for the Sport workout tracker.
//!
//! This crate provides:
//! - Domain types (workouts, exercises, active sets, API request contracts)
//! - Timer arithmetic for the workout and rest timers
//! - The workout session state machine and its action vocabulary
//! - Persistence (session snapshot, key-value store, request outbox, CSV history)

pub mod types;
pub mod error;
pub mod timer;
pub mod session;
pub mod action;
pub mod config;
pub mod logging;
pub mod store;
pub mod kv;
pub mod outbox;
pub mod rollup;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use timer::{elapsed, format_duration, remaining_rest, RestTimer, WorkoutTimer};
pub use session::{WorkoutSession, DEFAULT_REST_SECONDS};
pub use action::Action;
pub use config::Config;
pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use outbox::{ApiRequest, JsonlOutbox, PendingRequest, RequestSink};
