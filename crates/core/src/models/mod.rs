//! Data models for Confer

mod conference;
mod participant;
mod settings;

pub use conference::*;
pub use participant::*;
pub use settings::*;
