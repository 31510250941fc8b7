//! Storage repository traits
//!
//! These traits define the storage interface, allowing for different
//! implementations (SQLite, mock, future network backend). Every method
//! is a single atomic unit: either it fully applies or it fails.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Conference, ConferenceSettings, ConferenceStatus, Participant};

/// Conference repository operations
pub trait ConferenceRepository {
    /// Insert a conference together with its host participant and settings
    fn create_conference(
        &self,
        conference: &Conference,
        host: &Participant,
        settings: &ConferenceSettings,
    ) -> Result<()>;

    /// Find conference by ID
    fn find_conference_by_id(&self, id: Uuid) -> Result<Option<Conference>>;

    /// Find conference by code, regardless of its active flag
    fn find_conference_by_code(&self, code: &str) -> Result<Option<Conference>>;

    /// Find the host's conference in STARTED or PAUSED
    fn find_live_conference_for_host(&self, host_id: Uuid) -> Result<Option<Conference>>;

    /// Whether a code was ever issued
    fn conference_code_exists(&self, code: &str) -> Result<bool>;

    /// Persist host-editable details
    fn update_conference_details(&self, conference: &Conference) -> Result<()>;

    /// Compare-and-set the status; returns false if the status was not `from`
    fn transition_conference(
        &self,
        id: Uuid,
        from: ConferenceStatus,
        to: ConferenceStatus,
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Set the visibility flag
    fn set_conference_active(&self, id: Uuid, is_active: bool) -> Result<()>;

    /// Delete a conference and everything scoped to it
    fn delete_conference(&self, id: Uuid) -> Result<bool>;

    /// List a host's conferences, newest first
    fn list_conferences_for_host(&self, host_id: Uuid, limit: u32, offset: u32)
        -> Result<Vec<Conference>>;

    /// Count a host's conferences
    fn count_conferences_for_host(&self, host_id: Uuid, only_active: bool) -> Result<u64>;

    /// Get settings for a conference
    fn find_settings(&self, conference_id: Uuid) -> Result<Option<ConferenceSettings>>;

    /// Update settings for a conference
    fn update_settings(&self, settings: &ConferenceSettings) -> Result<()>;
}

/// Participant repository operations
pub trait ParticipantRepository {
    /// Add a participant
    fn add_participant(&self, participant: &Participant) -> Result<()>;

    /// Find participant by ID
    fn find_participant_by_id(&self, id: Uuid) -> Result<Option<Participant>>;

    /// List all participants of a conference, including those who left
    fn list_participants(&self, conference_id: Uuid) -> Result<Vec<Participant>>;

    /// Set left_at if unset; returns whether it changed
    fn mark_participant_left(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// Update speak/mute flags
    fn update_participant_permissions(&self, id: Uuid, can_speak: bool, is_muted: bool)
        -> Result<()>;

    /// Count participants who have not left
    fn count_present_participants(&self, conference_id: Uuid) -> Result<u64>;

    /// Count present participants across a host's conferences
    fn count_present_participants_for_host(&self, host_id: Uuid) -> Result<u64>;
}

/// Combined storage interface
///
/// Provides access to all repository operations.
/// Implementations may be backed by SQLite, mocks, or network.
pub trait Storage: ConferenceRepository + ParticipantRepository {}

// Blanket implementation: any type implementing all traits implements Storage
impl<T> Storage for T where T: ConferenceRepository + ParticipantRepository {}
