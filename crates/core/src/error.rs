//! Error types for Confer Core

use thiserror::Error;
use uuid::Uuid;

use crate::models::{ConferenceCode, ConferenceStatus};
use crate::lifecycle::Transition;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Status precondition violated; callers should re-fetch the conference
    #[error("Cannot {transition} conference {conference_id} with status {status}")]
    InvalidTransition {
        conference_id: Uuid,
        status: ConferenceStatus,
        transition: Transition,
    },

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Host already has a live conference: {code} ({conference_id})")]
    HostAlreadyLive {
        conference_id: Uuid,
        code: ConferenceCode,
    },

    #[error("Conference is not joinable: {0}")]
    SessionNotJoinable(String),

    #[error("Conference is full ({max_participants} participants)")]
    ConferenceFull { max_participants: u32 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Could not generate a unique conference code after {attempts} attempts")]
    CodeGenerationExhausted { attempts: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable name, used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::NotAuthorized(_) => "not_authorized",
            Error::HostAlreadyLive { .. } => "host_already_live",
            Error::SessionNotJoinable(_) => "session_not_joinable",
            Error::ConferenceFull { .. } => "conference_full",
            Error::NotFound(_) => "not_found",
            Error::InvalidInput(_) => "invalid_input",
            Error::CodeGenerationExhausted { .. } => "code_generation_exhausted",
            Error::Database(_) | Error::Io(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(Error::NotAuthorized("x".into()).kind(), "not_authorized");
        assert_eq!(
            Error::ConferenceFull {
                max_participants: 2
            }
            .kind(),
            "conference_full"
        );
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(io.kind(), "internal");
        assert_eq!(
            Error::from(rusqlite::Error::QueryReturnedNoRows).kind(),
            "internal"
        );
    }
}
