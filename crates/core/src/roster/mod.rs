//! Participant roster
//!
//! Tracks who joined and left a conference. Rows are never deleted while
//! the conference exists; leaving only stamps `left_at`. Presence here is
//! independent of realtime connections.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Conference, Participant, ParticipantIdentity};
use crate::permissions::{ConferenceAction, ConferenceRole, PermissionMatrix};
use crate::registry::SessionRegistry;
use crate::storage::Storage;

/// Roster operations for every conference in a registry
pub struct RosterManager<S> {
    registry: Arc<SessionRegistry<S>>,
}

impl<S: Storage> RosterManager<S> {
    pub fn new(registry: Arc<SessionRegistry<S>>) -> Self {
        Self { registry }
    }

    /// Add an attendee to a conference
    pub fn join(&self, conference_id: Uuid, identity: &ParticipantIdentity) -> Result<Participant> {
        let participant = Participant::attendee(conference_id, identity)?;

        let store = self.registry.lock_store();
        let conference = find_conference(&*store, conference_id)?;
        ensure_joinable(&conference)?;

        let present = store.count_present_participants(conference_id)?;
        if present >= u64::from(conference.max_participants) {
            return Err(Error::ConferenceFull {
                max_participants: conference.max_participants,
            });
        }

        store.add_participant(&participant)?;
        drop(store);

        info!(
            conference_id = %conference_id,
            participant_id = %participant.id,
            display_name = %participant.display_name,
            guest = participant.is_guest(),
            "Participant joined"
        );

        Ok(participant)
    }

    /// Resume an existing roster entry after a reconnect
    ///
    /// Rows that belong to a user only reattach for that same `user_id`.
    /// A participant who had left is joined again as a fresh row, so
    /// history stays intact.
    pub fn rejoin(
        &self,
        conference_id: Uuid,
        participant_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<Participant> {
        let existing = {
            let store = self.registry.lock_store();
            let conference = find_conference(&*store, conference_id)?;
            ensure_joinable(&conference)?;
            find_member(&*store, conference_id, participant_id)?
        };

        if existing.user_id.is_some() && existing.user_id != user_id {
            return Err(Error::NotAuthorized(format!(
                "participant {} belongs to another user",
                participant_id
            )));
        }

        if existing.is_present() {
            debug!(conference_id = %conference_id, participant_id = %participant_id, "Participant resumed");
            return Ok(existing);
        }

        let identity = match existing.user_id {
            Some(user_id) => ParticipantIdentity::User {
                user_id,
                display_name: Some(existing.display_name.clone()),
            },
            None => ParticipantIdentity::guest(existing.display_name.clone()),
        };
        self.join(conference_id, &identity)
    }

    /// Mark a participant as gone; repeated calls are no-ops
    pub fn leave(&self, conference_id: Uuid, participant_id: Uuid) -> Result<()> {
        let store = self.registry.lock_store();
        find_member(&*store, conference_id, participant_id)?;

        if store.mark_participant_left(participant_id, Utc::now())? {
            info!(conference_id = %conference_id, participant_id = %participant_id, "Participant left");
        }
        Ok(())
    }

    /// Number of participants who have not left
    pub fn count(&self, conference_id: Uuid) -> Result<u64> {
        self.registry
            .lock_store()
            .count_present_participants(conference_id)
    }

    /// Everyone who ever joined, in join order
    pub fn participants(&self, conference_id: Uuid) -> Result<Vec<Participant>> {
        self.registry.lock_store().list_participants(conference_id)
    }

    /// Participants who have not left
    pub fn present(&self, conference_id: Uuid) -> Result<Vec<Participant>> {
        let mut participants = self.participants(conference_id)?;
        participants.retain(Participant::is_present);
        Ok(participants)
    }

    pub fn find_participant(
        &self,
        conference_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Option<Participant>> {
        let participant = self
            .registry
            .lock_store()
            .find_participant_by_id(participant_id)?;
        Ok(participant.filter(|p| p.conference_id == conference_id))
    }

    /// Host-only: mute or unmute an attendee
    pub fn set_muted(
        &self,
        conference_id: Uuid,
        actor: Uuid,
        participant_id: Uuid,
        is_muted: bool,
    ) -> Result<Participant> {
        self.moderate(conference_id, actor, participant_id, ConferenceAction::MuteParticipants, |p| {
            p.is_muted = is_muted
        })
    }

    /// Host-only: grant or revoke speaking rights
    pub fn set_can_speak(
        &self,
        conference_id: Uuid,
        actor: Uuid,
        participant_id: Uuid,
        can_speak: bool,
    ) -> Result<Participant> {
        self.moderate(conference_id, actor, participant_id, ConferenceAction::GrantSpeech, |p| {
            p.can_speak = can_speak
        })
    }

    fn moderate(
        &self,
        conference_id: Uuid,
        actor: Uuid,
        participant_id: Uuid,
        action: ConferenceAction,
        change: impl FnOnce(&mut Participant),
    ) -> Result<Participant> {
        let store = self.registry.lock_store();
        let conference = find_conference(&*store, conference_id)?;
        let mut target = find_member(&*store, conference_id, participant_id)?;

        let actor_role = ConferenceRole::of_actor(&conference, actor);
        let target_role = ConferenceRole::of_participant(&target);
        if !PermissionMatrix::can_perform(actor_role, action)
            || !PermissionMatrix::can_moderate(actor_role, target_role)
        {
            return Err(Error::NotAuthorized(format!(
                "{} may not moderate participant {}",
                actor, participant_id
            )));
        }

        change(&mut target);
        store.update_participant_permissions(target.id, target.can_speak, target.is_muted)?;

        info!(
            conference_id = %conference_id,
            participant_id = %participant_id,
            can_speak = target.can_speak,
            is_muted = target.is_muted,
            "Participant permissions changed"
        );
        Ok(target)
    }
}

fn find_conference<S: Storage + ?Sized>(store: &S, id: Uuid) -> Result<Conference> {
    store
        .find_conference_by_id(id)?
        .ok_or_else(|| Error::NotFound(format!("conference {}", id)))
}

fn find_member<S: Storage + ?Sized>(
    store: &S,
    conference_id: Uuid,
    participant_id: Uuid,
) -> Result<Participant> {
    store
        .find_participant_by_id(participant_id)?
        .filter(|p| p.conference_id == conference_id)
        .ok_or_else(|| {
            Error::NotFound(format!(
                "participant {} in conference {}",
                participant_id, conference_id
            ))
        })
}

fn ensure_joinable(conference: &Conference) -> Result<()> {
    if conference.is_joinable() {
        Ok(())
    } else if !conference.is_active {
        Err(Error::SessionNotJoinable(format!(
            "conference {} is not active",
            conference.code
        )))
    } else {
        Err(Error::SessionNotJoinable(format!(
            "conference {} is {}",
            conference.code, conference.status
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ConferenceLifecycle;
    use crate::models::{ConferenceSpec, ConferenceStatus};
    use crate::storage::Database;
    use chrono::Duration;

    struct Fixture {
        lifecycle: ConferenceLifecycle<Database>,
        roster: RosterManager<Database>,
        host: Uuid,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(SessionRegistry::new(Database::open_in_memory().unwrap()));
        Fixture {
            lifecycle: ConferenceLifecycle::new(Arc::clone(&registry)),
            roster: RosterManager::new(registry),
            host: Uuid::new_v4(),
        }
    }

    fn pending(f: &Fixture) -> Conference {
        f.lifecycle
            .create(
                &ConferenceSpec::scheduled("Review", Utc::now() + Duration::hours(1)),
                f.host,
            )
            .unwrap()
    }

    #[test]
    fn test_guest_joins_pending_conference() {
        let f = fixture();
        let conference = pending(&f);

        let alex = f
            .roster
            .join(conference.id, &ParticipantIdentity::guest("Alex"))
            .unwrap();
        assert_eq!(alex.display_name, "Alex");
        assert!(alex.user_id.is_none());
        assert!(!alex.is_host);
        assert!(alex.can_speak);
        assert!(!alex.is_muted);
        assert!(alex.left_at.is_none());

        // Host plus Alex
        assert_eq!(f.roster.count(conference.id).unwrap(), 2);
    }

    #[test]
    fn test_join_ended_conference_fails() {
        let f = fixture();
        let conference = f
            .lifecycle
            .create(&ConferenceSpec::instant("Now"), f.host)
            .unwrap();
        f.lifecycle.end(conference.id, f.host).unwrap();

        let err = f
            .roster
            .join(conference.id, &ParticipantIdentity::guest("Alex"))
            .unwrap_err();
        assert!(matches!(err, Error::SessionNotJoinable(_)));
    }

    #[test]
    fn test_join_inactive_conference_fails() {
        let f = fixture();
        let conference = pending(&f);
        f.lifecycle.set_active(conference.id, f.host, false).unwrap();

        assert!(matches!(
            f.roster.join(conference.id, &ParticipantIdentity::user(Uuid::new_v4())),
            Err(Error::SessionNotJoinable(_))
        ));
    }

    #[test]
    fn test_guest_requires_name() {
        let f = fixture();
        let conference = pending(&f);
        assert!(matches!(
            f.roster.join(conference.id, &ParticipantIdentity::guest("   ")),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(f.roster.count(conference.id).unwrap(), 1);
    }

    #[test]
    fn test_user_without_name_gets_default() {
        let f = fixture();
        let conference = pending(&f);
        let user = Uuid::new_v4();
        let p = f
            .roster
            .join(conference.id, &ParticipantIdentity::user(user))
            .unwrap();
        assert_eq!(p.user_id, Some(user));
        assert_eq!(p.display_name, "Participant");
    }

    #[test]
    fn test_leave_is_idempotent() {
        let f = fixture();
        let conference = pending(&f);
        let alex = f
            .roster
            .join(conference.id, &ParticipantIdentity::guest("Alex"))
            .unwrap();

        f.roster.leave(conference.id, alex.id).unwrap();
        let first = f
            .roster
            .find_participant(conference.id, alex.id)
            .unwrap()
            .unwrap()
            .left_at;
        assert!(first.is_some());

        f.roster.leave(conference.id, alex.id).unwrap();
        let second = f
            .roster
            .find_participant(conference.id, alex.id)
            .unwrap()
            .unwrap()
            .left_at;
        assert_eq!(first, second);
        assert_eq!(f.roster.count(conference.id).unwrap(), 1);

        // History is retained
        assert_eq!(f.roster.participants(conference.id).unwrap().len(), 2);
        assert_eq!(f.roster.present(conference.id).unwrap().len(), 1);
    }

    #[test]
    fn test_leave_unknown_participant() {
        let f = fixture();
        let conference = pending(&f);
        assert!(matches!(
            f.roster.leave(conference.id, Uuid::new_v4()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_capacity_enforced() {
        let f = fixture();
        let conference = f
            .lifecycle
            .create(
                &ConferenceSpec::instant("Small").with_max_participants(2),
                f.host,
            )
            .unwrap();

        let alex = f
            .roster
            .join(conference.id, &ParticipantIdentity::guest("Alex"))
            .unwrap();
        assert!(matches!(
            f.roster.join(conference.id, &ParticipantIdentity::guest("Sam")),
            Err(Error::ConferenceFull { max_participants: 2 })
        ));

        // A leave frees the seat
        f.roster.leave(conference.id, alex.id).unwrap();
        f.roster
            .join(conference.id, &ParticipantIdentity::guest("Sam"))
            .unwrap();
    }

    #[test]
    fn test_rejoin() {
        let f = fixture();
        let conference = pending(&f);
        let alex = f
            .roster
            .join(conference.id, &ParticipantIdentity::guest("Alex"))
            .unwrap();

        let same = f.roster.rejoin(conference.id, alex.id, None).unwrap();
        assert_eq!(same.id, alex.id);

        f.roster.leave(conference.id, alex.id).unwrap();
        let fresh = f.roster.rejoin(conference.id, alex.id, None).unwrap();
        assert_ne!(fresh.id, alex.id);
        assert_eq!(fresh.display_name, "Alex");
        assert_eq!(f.roster.count(conference.id).unwrap(), 2);
    }

    #[test]
    fn test_rejoin_checks_owner() {
        let f = fixture();
        let conference = pending(&f);
        let member = Uuid::new_v4();
        let joined = f
            .roster
            .join(conference.id, &ParticipantIdentity::user(member))
            .unwrap();
        let host_row = f
            .roster
            .participants(conference.id)
            .unwrap()
            .into_iter()
            .find(|p| p.is_host)
            .unwrap();

        assert!(matches!(
            f.roster.rejoin(conference.id, host_row.id, None),
            Err(Error::NotAuthorized(_))
        ));
        assert!(matches!(
            f.roster.rejoin(conference.id, host_row.id, Some(member)),
            Err(Error::NotAuthorized(_))
        ));

        let host = f
            .roster
            .rejoin(conference.id, host_row.id, Some(f.host))
            .unwrap();
        assert!(host.is_host);
        let same = f
            .roster
            .rejoin(conference.id, joined.id, Some(member))
            .unwrap();
        assert_eq!(same.id, joined.id);
    }

    #[test]
    fn test_moderation_is_host_only() {
        let f = fixture();
        let conference = pending(&f);
        let member = Uuid::new_v4();
        let alex = f
            .roster
            .join(conference.id, &ParticipantIdentity::guest("Alex"))
            .unwrap();
        f.roster
            .join(conference.id, &ParticipantIdentity::user(member))
            .unwrap();

        let muted = f.roster.set_muted(conference.id, f.host, alex.id, true).unwrap();
        assert!(muted.is_muted);
        let silenced = f
            .roster
            .set_can_speak(conference.id, f.host, alex.id, false)
            .unwrap();
        assert!(!silenced.can_speak);
        assert!(silenced.is_muted);

        assert!(matches!(
            f.roster.set_muted(conference.id, member, alex.id, false),
            Err(Error::NotAuthorized(_))
        ));

        let stored = f.roster.find_participant(conference.id, alex.id).unwrap().unwrap();
        assert!(stored.is_muted);
        assert!(!stored.can_speak);
    }

    #[test]
    fn test_host_cannot_mute_self() {
        let f = fixture();
        let conference = pending(&f);
        let host_row = f
            .roster
            .participants(conference.id)
            .unwrap()
            .into_iter()
            .find(|p| p.is_host)
            .unwrap();

        assert!(matches!(
            f.roster.set_muted(conference.id, f.host, host_row.id, true),
            Err(Error::NotAuthorized(_))
        ));
    }

    #[test]
    fn test_count_independent_of_status() {
        let f = fixture();
        let conference = f
            .lifecycle
            .create(&ConferenceSpec::instant("Now"), f.host)
            .unwrap();
        f.roster
            .join(conference.id, &ParticipantIdentity::guest("Alex"))
            .unwrap();
        let ended = f.lifecycle.end(conference.id, f.host).unwrap();
        assert_eq!(ended.status, ConferenceStatus::Ended);
        assert_eq!(f.roster.count(conference.id).unwrap(), 2);
    }
}
