//! Control requests - lifecycle and moderation over the realtime transport
//!
//! A connection that opens with `ClientMessage::Control` stays a control
//! connection: every frame is one request, answered in order. The acting
//! identity comes from the identity collaborator in front of the server
//! and is trusted as given.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use confer_core::{
    Conference, ConferenceChanges, ConferenceLifecycle, ConferenceSettings, ConferenceSpec,
    ConferenceSummary, HostStats, Participant, Result, RosterManager, SettingsChanges, Storage,
};

/// Largest page a control client gets without asking
const DEFAULT_PAGE: u32 = 20;

/// One control operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlCommand {
    Create { spec: ConferenceSpec },
    Start { conference_id: Uuid },
    Pause { conference_id: Uuid },
    Resume { conference_id: Uuid },
    End { conference_id: Uuid },
    Cancel { conference_id: Uuid },
    Update {
        conference_id: Uuid,
        changes: ConferenceChanges,
    },
    SetActive {
        conference_id: Uuid,
        is_active: bool,
    },
    ToggleActive { conference_id: Uuid },
    UpdateSettings {
        conference_id: Uuid,
        changes: SettingsChanges,
    },
    Delete { conference_id: Uuid },
    Lookup { code: String },
    ListMine {
        #[serde(default)]
        offset: u32,
        #[serde(default)]
        limit: Option<u32>,
    },
    Stats,
    Roster { conference_id: Uuid },
    SetMuted {
        conference_id: Uuid,
        participant_id: Uuid,
        is_muted: bool,
    },
    SetCanSpeak {
        conference_id: Uuid,
        participant_id: Uuid,
        can_speak: bool,
    },
}

/// Successful control outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", content = "data", rename_all = "snake_case")]
pub enum ControlReply {
    Conference(Conference),
    NotFound,
    Conferences(Vec<ConferenceSummary>),
    Stats(HostStats),
    Settings(ConferenceSettings),
    Participant(Participant),
    Participants(Vec<Participant>),
    Deleted,
}

/// Run one command on behalf of `actor`
pub fn execute<S: Storage>(
    lifecycle: &ConferenceLifecycle<S>,
    roster: &RosterManager<S>,
    actor: Uuid,
    command: ControlCommand,
) -> Result<ControlReply> {
    use ControlCommand::*;

    let registry = lifecycle.registry();

    Ok(match command {
        Create { spec } => ControlReply::Conference(lifecycle.create(&spec, actor)?),
        Start { conference_id } => ControlReply::Conference(lifecycle.start(conference_id, actor)?),
        Pause { conference_id } => ControlReply::Conference(lifecycle.pause(conference_id, actor)?),
        Resume { conference_id } => {
            ControlReply::Conference(lifecycle.resume(conference_id, actor)?)
        }
        End { conference_id } => ControlReply::Conference(lifecycle.end(conference_id, actor)?),
        Cancel { conference_id } => {
            ControlReply::Conference(lifecycle.cancel(conference_id, actor)?)
        }
        Update {
            conference_id,
            changes,
        } => ControlReply::Conference(lifecycle.update(conference_id, actor, &changes)?),
        SetActive {
            conference_id,
            is_active,
        } => ControlReply::Conference(lifecycle.set_active(conference_id, actor, is_active)?),
        ToggleActive { conference_id } => {
            ControlReply::Conference(lifecycle.toggle_active(conference_id, actor)?)
        }
        UpdateSettings {
            conference_id,
            changes,
        } => ControlReply::Settings(lifecycle.update_settings(conference_id, actor, changes)?),
        Delete { conference_id } => {
            lifecycle.delete(conference_id, actor)?;
            ControlReply::Deleted
        }
        Lookup { code } => registry
            .find_by_code(&code)?
            .map_or(ControlReply::NotFound, ControlReply::Conference),
        ListMine { offset, limit } => ControlReply::Conferences(registry.list_for_host(
            actor,
            offset,
            limit.unwrap_or(DEFAULT_PAGE),
        )?),
        Stats => ControlReply::Stats(registry.stats_for_host(actor)?),
        Roster { conference_id } => ControlReply::Participants(roster.present(conference_id)?),
        SetMuted {
            conference_id,
            participant_id,
            is_muted,
        } => ControlReply::Participant(roster.set_muted(
            conference_id,
            actor,
            participant_id,
            is_muted,
        )?),
        SetCanSpeak {
            conference_id,
            participant_id,
            can_speak,
        } => ControlReply::Participant(roster.set_can_speak(
            conference_id,
            actor,
            participant_id,
            can_speak,
        )?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use confer_core::{ConferenceStatus, Database, Error, ParticipantIdentity, SessionRegistry};
    use std::sync::Arc;

    fn services() -> (ConferenceLifecycle<Database>, RosterManager<Database>) {
        let registry = Arc::new(SessionRegistry::new(Database::open_in_memory().unwrap()));
        (
            ConferenceLifecycle::new(Arc::clone(&registry)),
            RosterManager::new(registry),
        )
    }

    fn conference(reply: ControlReply) -> Conference {
        match reply {
            ControlReply::Conference(c) => c,
            other => panic!("expected conference, got {other:?}"),
        }
    }

    #[test]
    fn test_command_wire_shape() {
        let json = r#"{"op":"create","spec":{"title":"Standup","conference_type":"INSTANT"}}"#;
        let command: ControlCommand = serde_json::from_str(json).unwrap();
        match command {
            ControlCommand::Create { spec } => {
                assert_eq!(spec.title, "Standup");
                assert_eq!(spec.language_from, "en");
                assert_eq!(spec.language_to, "vi");
                assert_eq!(spec.max_participants, 50);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let stats: ControlCommand = serde_json::from_str(r#"{"op":"stats"}"#).unwrap();
        assert!(matches!(stats, ControlCommand::Stats));
    }

    #[test]
    fn test_lifecycle_through_commands() {
        let (lifecycle, roster) = services();
        let host = Uuid::new_v4();

        let created = conference(
            execute(
                &lifecycle,
                &roster,
                host,
                ControlCommand::Create {
                    spec: ConferenceSpec::instant("Standup"),
                },
            )
            .unwrap(),
        );
        assert_eq!(created.status, ConferenceStatus::Started);

        let paused = conference(
            execute(
                &lifecycle,
                &roster,
                host,
                ControlCommand::Pause {
                    conference_id: created.id,
                },
            )
            .unwrap(),
        );
        assert_eq!(paused.status, ConferenceStatus::Paused);

        let found = conference(
            execute(
                &lifecycle,
                &roster,
                Uuid::new_v4(),
                ControlCommand::Lookup {
                    code: created.code.to_string(),
                },
            )
            .unwrap(),
        );
        assert_eq!(found.id, created.id);

        let err = execute(
            &lifecycle,
            &roster,
            Uuid::new_v4(),
            ControlCommand::End {
                conference_id: created.id,
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), "not_authorized");

        match execute(&lifecycle, &roster, host, ControlCommand::Stats).unwrap() {
            ControlReply::Stats(stats) => {
                assert_eq!(stats.total_conferences, 1);
                assert_eq!(stats.total_participants, 1);
            }
            other => panic!("unexpected reply {other:?}"),
        }

        match execute(
            &lifecycle,
            &roster,
            host,
            ControlCommand::ListMine {
                offset: 0,
                limit: None,
            },
        )
        .unwrap()
        {
            ControlReply::Conferences(list) => {
                assert_eq!(list.len(), 1);
                assert_eq!(list[0].participant_count, 1);
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn test_lookup_missing_code() {
        let (lifecycle, roster) = services();
        let reply = execute(
            &lifecycle,
            &roster,
            Uuid::new_v4(),
            ControlCommand::Lookup {
                code: "abc-defg-hij".into(),
            },
        )
        .unwrap();
        assert!(matches!(reply, ControlReply::NotFound));
    }

    #[test]
    fn test_moderation_commands() {
        let (lifecycle, roster) = services();
        let host = Uuid::new_v4();
        let created = lifecycle
            .create(&ConferenceSpec::instant("Standup"), host)
            .unwrap();
        let alex = roster
            .join(created.id, &ParticipantIdentity::guest("Alex"))
            .unwrap();

        let reply = execute(
            &lifecycle,
            &roster,
            host,
            ControlCommand::SetMuted {
                conference_id: created.id,
                participant_id: alex.id,
                is_muted: true,
            },
        )
        .unwrap();
        assert!(matches!(reply, ControlReply::Participant(p) if p.is_muted));

        match execute(
            &lifecycle,
            &roster,
            host,
            ControlCommand::Roster {
                conference_id: created.id,
            },
        )
        .unwrap()
        {
            ControlReply::Participants(list) => assert_eq!(list.len(), 2),
            other => panic!("unexpected reply {other:?}"),
        }

        let err = execute(
            &lifecycle,
            &roster,
            host,
            ControlCommand::Delete {
                conference_id: Uuid::new_v4(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
