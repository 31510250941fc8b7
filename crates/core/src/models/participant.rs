//! Participant model and join identities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Maximum display name length in characters
pub const MAX_DISPLAY_NAME_LEN: usize = 100;

/// Fallback name for a host whose identity carries no display name
pub const DEFAULT_HOST_NAME: &str = "Host";

/// Fallback name for a signed-in user without a display name
pub const DEFAULT_USER_NAME: &str = "Participant";

/// Who is joining a conference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParticipantIdentity {
    /// A user resolved by the identity provider
    User {
        user_id: Uuid,
        display_name: Option<String>,
    },
    /// An anonymous guest; the display name is mandatory
    Guest { display_name: String },
}

impl ParticipantIdentity {
    pub fn user(user_id: Uuid) -> Self {
        ParticipantIdentity::User {
            user_id,
            display_name: None,
        }
    }

    pub fn guest(display_name: impl Into<String>) -> Self {
        ParticipantIdentity::Guest {
            display_name: display_name.into(),
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            ParticipantIdentity::User { user_id, .. } => Some(*user_id),
            ParticipantIdentity::Guest { .. } => None,
        }
    }

    /// Resolve the name shown to other participants
    pub fn resolve_display_name(&self) -> Result<String> {
        match self {
            ParticipantIdentity::User { display_name, .. } => Ok(display_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(|n| truncate(n, MAX_DISPLAY_NAME_LEN))
                .unwrap_or_else(|| DEFAULT_USER_NAME.to_string())),
            ParticipantIdentity::Guest { display_name } => {
                let name = display_name.trim();
                if name.is_empty() {
                    return Err(Error::InvalidInput(
                        "guests must provide a display name".into(),
                    ));
                }
                Ok(truncate(name, MAX_DISPLAY_NAME_LEN))
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// A participant row; history is kept after leaving
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub conference_id: Uuid,
    /// Absent for guests
    pub user_id: Option<Uuid>,
    pub display_name: String,
    pub is_host: bool,
    pub can_speak: bool,
    pub is_muted: bool,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

impl Participant {
    /// The synthetic host participant created with its conference
    pub fn host(conference_id: Uuid, host_id: Uuid, display_name: Option<&str>) -> Self {
        let name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| truncate(n, MAX_DISPLAY_NAME_LEN))
            .unwrap_or_else(|| DEFAULT_HOST_NAME.to_string());

        Self {
            id: Uuid::new_v4(),
            conference_id,
            user_id: Some(host_id),
            display_name: name,
            is_host: true,
            can_speak: true,
            is_muted: false,
            joined_at: Utc::now(),
            left_at: None,
        }
    }

    /// A regular attendee
    pub fn attendee(conference_id: Uuid, identity: &ParticipantIdentity) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            conference_id,
            user_id: identity.user_id(),
            display_name: identity.resolve_display_name()?,
            is_host: false,
            can_speak: true,
            is_muted: false,
            joined_at: Utc::now(),
            left_at: None,
        })
    }

    pub fn is_present(&self) -> bool {
        self.left_at.is_none()
    }

    pub fn is_guest(&self) -> bool {
        self.user_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_requires_name() {
        assert!(ParticipantIdentity::guest("  ").resolve_display_name().is_err());
        assert_eq!(
            ParticipantIdentity::guest(" Alex ").resolve_display_name().unwrap(),
            "Alex"
        );
    }

    #[test]
    fn test_user_name_fallback() {
        let identity = ParticipantIdentity::user(Uuid::new_v4());
        assert_eq!(identity.resolve_display_name().unwrap(), DEFAULT_USER_NAME);
    }

    #[test]
    fn test_host_defaults() {
        let host = Participant::host(Uuid::new_v4(), Uuid::new_v4(), None);
        assert!(host.is_host);
        assert!(host.can_speak);
        assert!(!host.is_muted);
        assert_eq!(host.display_name, DEFAULT_HOST_NAME);
    }

    #[test]
    fn test_attendee_defaults() {
        let p = Participant::attendee(Uuid::new_v4(), &ParticipantIdentity::guest("Alex")).unwrap();
        assert!(!p.is_host);
        assert!(p.is_guest());
        assert!(p.is_present());
    }
}
