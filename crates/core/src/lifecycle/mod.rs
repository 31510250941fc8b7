//! Conference lifecycle state machine
//!
//! ```text
//! PENDING -> STARTED <-> PAUSED -> ENDED
//! PENDING -> CANCELLED
//! ```
//!
//! ENDED and CANCELLED are terminal. Every operation is authorized against
//! the conference's host. Entering the live band (create as INSTANT, start)
//! re-checks that the host has no other live conference while holding the
//! store lock, and the store itself rejects a second live row per host.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::code::{self, DEFAULT_MAX_ATTEMPTS};
use crate::error::{Error, Result};
use crate::invariants::assert_conference_invariants;
use crate::models::{
    Conference, ConferenceChanges, ConferenceSettings, ConferenceSpec, ConferenceStatus,
    ConferenceType, Participant,
};
use crate::permissions::{require, ConferenceAction};
use crate::registry::SessionRegistry;
use crate::storage::{is_constraint_violation, Storage};

/// A requested status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Start,
    Pause,
    Resume,
    End,
    Cancel,
}

impl Transition {
    /// Transition table: the status reached from `from`, if legal
    pub fn target(self, from: ConferenceStatus) -> Option<ConferenceStatus> {
        use ConferenceStatus::*;

        match (from, self) {
            (Pending, Transition::Start) => Some(Started),
            (Started, Transition::Pause) => Some(Paused),
            (Paused, Transition::Resume) => Some(Started),
            (Started | Paused, Transition::End) => Some(Ended),
            (Pending, Transition::Cancel) => Some(Cancelled),
            _ => None,
        }
    }

    /// Whether this transition moves a conference into the live band
    pub fn enters_live(self) -> bool {
        self == Transition::Start
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transition::Start => "start",
            Transition::Pause => "pause",
            Transition::Resume => "resume",
            Transition::End => "end",
            Transition::Cancel => "cancel",
        })
    }
}

/// Decide a transition: authorization first, then the table
pub fn check_transition(
    conference: &Conference,
    actor: Uuid,
    transition: Transition,
) -> Result<ConferenceStatus> {
    require(conference, actor, ConferenceAction::ManageLifecycle)?;

    transition
        .target(conference.status)
        .ok_or(Error::InvalidTransition {
            conference_id: conference.id,
            status: conference.status,
            transition,
        })
}

/// Host-editable settings
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SettingsChanges {
    pub auto_translate: Option<bool>,
    pub recording_enabled: Option<bool>,
}

/// Owns every write to a conference's status and lifecycle timestamps
pub struct ConferenceLifecycle<S> {
    registry: Arc<SessionRegistry<S>>,
    code_attempts: u32,
}

impl<S: Storage> ConferenceLifecycle<S> {
    pub fn new(registry: Arc<SessionRegistry<S>>) -> Self {
        Self {
            registry,
            code_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Override the code generation ceiling
    pub fn with_code_attempts(mut self, attempts: u32) -> Self {
        self.code_attempts = attempts.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry<S>> {
        &self.registry
    }

    /// Create a conference and its host participant
    ///
    /// INSTANT conferences start immediately and are refused while the
    /// host has another live conference.
    pub fn create(&self, spec: &ConferenceSpec, host_id: Uuid) -> Result<Conference> {
        spec.validate()?;

        let store = self.registry.lock_store();

        if spec.conference_type == ConferenceType::Instant {
            if let Some(live) = store.find_live_conference_for_host(host_id)? {
                return Err(host_already_live(&live));
            }
        }

        let code = code::generate_unique(&mut rand::thread_rng(), self.code_attempts, |c| {
            store.conference_code_exists(c.as_str())
        })?;

        let conference = Conference::new(spec, host_id, code);
        let host = Participant::host(conference.id, host_id, spec.host_name.as_deref());
        let settings = ConferenceSettings::defaults_for(conference.id);

        if let Err(e) = store.create_conference(&conference, &host, &settings) {
            return Err(live_conflict_or(&*store, host_id, e));
        }
        // Cache updates happen under the store lock, in commit order
        self.registry.note_status(&conference);
        drop(store);

        assert_conference_invariants(&conference);

        info!(
            conference_id = %conference.id,
            code = %conference.code,
            host_id = %host_id,
            status = %conference.status,
            "Conference created"
        );

        Ok(conference)
    }

    /// PENDING -> STARTED
    pub fn start(&self, id: Uuid, actor: Uuid) -> Result<Conference> {
        self.apply(id, actor, Transition::Start)
    }

    /// STARTED -> PAUSED
    pub fn pause(&self, id: Uuid, actor: Uuid) -> Result<Conference> {
        self.apply(id, actor, Transition::Pause)
    }

    /// PAUSED -> STARTED
    pub fn resume(&self, id: Uuid, actor: Uuid) -> Result<Conference> {
        self.apply(id, actor, Transition::Resume)
    }

    /// STARTED | PAUSED -> ENDED
    pub fn end(&self, id: Uuid, actor: Uuid) -> Result<Conference> {
        self.apply(id, actor, Transition::End)
    }

    /// PENDING -> CANCELLED
    pub fn cancel(&self, id: Uuid, actor: Uuid) -> Result<Conference> {
        self.apply(id, actor, Transition::Cancel)
    }

    fn apply(&self, id: Uuid, actor: Uuid, transition: Transition) -> Result<Conference> {
        let store = self.registry.lock_store();
        let conference = find_conference(&*store, id)?;
        let target = check_transition(&conference, actor, transition)?;

        if transition.enters_live() {
            if let Some(live) = store.find_live_conference_for_host(conference.host_id)? {
                if live.id != conference.id {
                    return Err(host_already_live(&live));
                }
            }
        }

        let now = Utc::now();
        let started_at = (target == ConferenceStatus::Started && conference.started_at.is_none())
            .then_some(now);
        let ended_at = target.is_terminal().then_some(now);

        let applied = match store.transition_conference(
            id,
            conference.status,
            target,
            started_at,
            ended_at,
        ) {
            Ok(applied) => applied,
            Err(e) => return Err(live_conflict_or(&*store, conference.host_id, e)),
        };

        let updated = find_conference(&*store, id)?;
        if applied {
            self.registry.note_status(&updated);
        }
        drop(store);

        if !applied {
            // Someone else moved it between our read and write
            warn!(conference_id = %id, %transition, status = %updated.status, "Stale transition");
            return Err(Error::InvalidTransition {
                conference_id: id,
                status: updated.status,
                transition,
            });
        }

        assert_conference_invariants(&updated);

        info!(
            conference_id = %id,
            %transition,
            from = %conference.status,
            to = %updated.status,
            "Conference transitioned"
        );

        Ok(updated)
    }

    /// Edit title, description, capacity, languages or schedule
    pub fn update(&self, id: Uuid, actor: Uuid, changes: &ConferenceChanges) -> Result<Conference> {
        let store = self.registry.lock_store();
        let mut conference = find_conference(&*store, id)?;
        require(&conference, actor, ConferenceAction::EditDetails)?;

        if changes.is_empty() {
            return Ok(conference);
        }

        changes.apply_to(&mut conference)?;
        store.update_conference_details(&conference)?;

        info!(conference_id = %id, "Conference details updated");
        Ok(conference)
    }

    /// Set the visibility flag; status is not affected
    pub fn set_active(&self, id: Uuid, actor: Uuid, is_active: bool) -> Result<Conference> {
        let store = self.registry.lock_store();
        let conference = find_conference(&*store, id)?;
        require(&conference, actor, ConferenceAction::ToggleVisibility)?;

        if conference.is_active != is_active {
            store.set_conference_active(id, is_active)?;
            info!(conference_id = %id, is_active, "Conference visibility changed");
        }

        find_conference(&*store, id)
    }

    /// Flip the visibility flag
    pub fn toggle_active(&self, id: Uuid, actor: Uuid) -> Result<Conference> {
        let current = self
            .registry
            .find_by_id(id)?
            .ok_or_else(|| Error::NotFound(format!("conference {}", id)))?;
        self.set_active(id, actor, !current.is_active)
    }

    /// Change per-conference settings
    pub fn update_settings(
        &self,
        id: Uuid,
        actor: Uuid,
        changes: SettingsChanges,
    ) -> Result<ConferenceSettings> {
        let store = self.registry.lock_store();
        let conference = find_conference(&*store, id)?;
        require(&conference, actor, ConferenceAction::EditDetails)?;

        let mut settings = store
            .find_settings(id)?
            .ok_or_else(|| Error::NotFound(format!("settings for conference {}", id)))?;

        if let Some(auto_translate) = changes.auto_translate {
            settings.auto_translate = auto_translate;
        }
        if let Some(recording_enabled) = changes.recording_enabled {
            settings.recording_enabled = recording_enabled;
        }
        settings.updated_at = Utc::now();
        store.update_settings(&settings)?;

        Ok(settings)
    }

    /// Delete a conference with its participants and settings
    pub fn delete(&self, id: Uuid, actor: Uuid) -> Result<()> {
        let store = self.registry.lock_store();
        let conference = find_conference(&*store, id)?;
        require(&conference, actor, ConferenceAction::DeleteConference)?;

        store.delete_conference(id)?;
        self.registry.forget_host(conference.host_id);
        drop(store);

        info!(conference_id = %id, code = %conference.code, "Conference deleted");
        Ok(())
    }
}

fn find_conference<S: Storage + ?Sized>(store: &S, id: Uuid) -> Result<Conference> {
    store
        .find_conference_by_id(id)?
        .ok_or_else(|| Error::NotFound(format!("conference {}", id)))
}

fn host_already_live(live: &Conference) -> Error {
    Error::HostAlreadyLive {
        conference_id: live.id,
        code: live.code.clone(),
    }
}

/// Map a store-level live-index violation to `HostAlreadyLive`
fn live_conflict_or<S: Storage + ?Sized>(store: &S, host_id: Uuid, e: Error) -> Error {
    if let Error::Database(db_err) = &e {
        if is_constraint_violation(db_err) {
            if let Ok(Some(live)) = store.find_live_conference_for_host(host_id) {
                return host_already_live(&live);
            }
        }
    }
    e
}
