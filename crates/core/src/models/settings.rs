//! Per-conference settings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Settings row created alongside every conference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConferenceSettings {
    pub id: Uuid,
    pub conference_id: Uuid,
    /// Relay a translation after every chat message
    pub auto_translate: bool,
    pub recording_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConferenceSettings {
    pub fn defaults_for(conference_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            conference_id,
            auto_translate: true,
            recording_enabled: false,
            created_at: now,
            updated_at: now,
        }
    }
}
