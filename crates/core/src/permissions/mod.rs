//! Permission system for conference operations

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Conference, Participant};

/// Role of an actor within one conference, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ConferenceRole {
    /// The identity that created the conference
    Host = 3,
    /// A signed-in participant
    Member = 2,
    /// An anonymous participant, or anyone without a matching identity
    Guest = 1,
}

impl ConferenceRole {
    /// Role of an acting identity with respect to a conference
    pub fn of_actor(conference: &Conference, actor: Uuid) -> Self {
        if conference.is_hosted_by(actor) {
            ConferenceRole::Host
        } else {
            ConferenceRole::Member
        }
    }

    /// Role of a roster entry
    pub fn of_participant(participant: &Participant) -> Self {
        if participant.is_host {
            ConferenceRole::Host
        } else if participant.is_guest() {
            ConferenceRole::Guest
        } else {
            ConferenceRole::Member
        }
    }
}

/// Actions that can be performed on a conference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConferenceAction {
    // Lifecycle
    ManageLifecycle,
    EditDetails,
    ToggleVisibility,
    DeleteConference,

    // Roster moderation
    MuteParticipants,
    GrantSpeech,

    // Realtime
    SendChat,
    RequestTranslation,
}

impl ConferenceAction {
    fn label(self) -> &'static str {
        match self {
            ConferenceAction::ManageLifecycle => "manage the lifecycle of",
            ConferenceAction::EditDetails => "edit",
            ConferenceAction::ToggleVisibility => "change the visibility of",
            ConferenceAction::DeleteConference => "delete",
            ConferenceAction::MuteParticipants => "mute participants in",
            ConferenceAction::GrantSpeech => "change speaking rights in",
            ConferenceAction::SendChat => "chat in",
            ConferenceAction::RequestTranslation => "request translations in",
        }
    }
}

/// Permission matrix for conference roles
pub struct PermissionMatrix;

impl PermissionMatrix {
    /// Check if a role has permission to perform an action
    pub fn can_perform(role: ConferenceRole, action: ConferenceAction) -> bool {
        match action {
            // Conference management - host only
            ConferenceAction::ManageLifecycle
            | ConferenceAction::EditDetails
            | ConferenceAction::ToggleVisibility
            | ConferenceAction::DeleteConference => role == ConferenceRole::Host,

            // Moderation - host only
            ConferenceAction::MuteParticipants | ConferenceAction::GrantSpeech => {
                role == ConferenceRole::Host
            }

            // Realtime - everyone in the room
            ConferenceAction::SendChat | ConferenceAction::RequestTranslation => {
                role >= ConferenceRole::Guest
            }
        }
    }

    /// Check if an actor may moderate a target participant
    pub fn can_moderate(actor_role: ConferenceRole, target_role: ConferenceRole) -> bool {
        // Only roles below your own
        target_role < actor_role && actor_role == ConferenceRole::Host
    }
}

/// Fail with `NotAuthorized` unless `actor` may perform `action`
pub fn require(conference: &Conference, actor: Uuid, action: ConferenceAction) -> Result<()> {
    let role = ConferenceRole::of_actor(conference, actor);
    if PermissionMatrix::can_perform(role, action) {
        Ok(())
    } else {
        Err(Error::NotAuthorized(format!(
            "{} may not {} conference {}",
            actor,
            action.label(),
            conference.id
        )))
    }
}
