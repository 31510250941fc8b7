//! Confer Core Library
//!
//! Conference models, lifecycle state machine, roster, permissions and
//! storage for the Confer conferencing service.

pub mod code;
pub mod error;
pub mod invariants;
pub mod lifecycle;
pub mod models;
pub mod permissions;
pub mod registry;
pub mod roster;
pub mod storage;

pub use error::{Error, Result};
pub use lifecycle::{ConferenceLifecycle, SettingsChanges, Transition};
pub use models::*;
pub use permissions::*;
pub use registry::SessionRegistry;
pub use roster::RosterManager;
pub use storage::{ConferenceRepository, Database, ParticipantRepository, Storage};
