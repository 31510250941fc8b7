//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use std::collections::HashSet;

use uuid::Uuid;

use crate::models::{Conference, ConferenceCode, ConferenceStatus, Participant};

/// Validate that a conference's lifecycle fields agree with its status
pub fn assert_conference_invariants(conference: &Conference) {
    debug_assert!(
        ConferenceCode::is_valid(conference.code.as_str()),
        "Conference {} has malformed code {}",
        conference.id,
        conference.code
    );

    // started_at is set by the first STARTED entry and never cleared
    let has_run = matches!(
        conference.status,
        ConferenceStatus::Started | ConferenceStatus::Paused | ConferenceStatus::Ended
    );
    debug_assert!(
        !has_run || conference.started_at.is_some(),
        "Conference {} is {} but has no started_at",
        conference.id,
        conference.status
    );

    // ended_at is set exactly on terminal entry
    debug_assert_eq!(
        conference.ended_at.is_some(),
        conference.status.is_terminal(),
        "Conference {} is {} with ended_at {:?}",
        conference.id,
        conference.status,
        conference.ended_at
    );

    if let (Some(started), Some(ended)) = (conference.started_at, conference.ended_at) {
        debug_assert!(
            ended >= started,
            "Conference {} ended before it started",
            conference.id
        );
    }

    debug_assert!(
        !conference.title.trim().is_empty(),
        "Conference {} has empty title",
        conference.id
    );
}

/// Validate a conference's roster
pub fn assert_roster_invariants(conference: &Conference, participants: &[Participant]) {
    // Exactly one host row, linked to the conference's host identity
    let hosts: Vec<_> = participants.iter().filter(|p| p.is_host).collect();
    debug_assert_eq!(
        hosts.len(),
        1,
        "Conference {} has {} host participants, expected 1",
        conference.id,
        hosts.len()
    );
    if let Some(host) = hosts.first() {
        debug_assert_eq!(
            host.user_id,
            Some(conference.host_id),
            "Conference {} host participant is not the host",
            conference.id
        );
    }

    for participant in participants {
        debug_assert_eq!(
            participant.conference_id, conference.id,
            "Participant {} listed under the wrong conference",
            participant.id
        );
        debug_assert!(
            !participant.display_name.trim().is_empty(),
            "Participant {} has empty display name",
            participant.id
        );
    }
}

/// Validate that no host has two live conferences
pub fn assert_single_live_per_host(conferences: &[Conference]) {
    let mut live_hosts: HashSet<Uuid> = HashSet::new();
    for conference in conferences.iter().filter(|c| c.is_live()) {
        debug_assert!(
            live_hosts.insert(conference.host_id),
            "Host {} has more than one live conference",
            conference.host_id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::models::{ConferenceSpec, ParticipantIdentity};

    fn make_conference(spec: ConferenceSpec) -> Conference {
        Conference::new(&spec, Uuid::new_v4(), ConferenceCode::parse("abc-defg-hij").unwrap())
    }

    #[test]
    fn test_valid_conference() {
        assert_conference_invariants(&make_conference(ConferenceSpec::instant("Standup")));
        assert_conference_invariants(&make_conference(ConferenceSpec::scheduled("Later", Utc::now())));
    }

    #[test]
    fn test_valid_roster() {
        let conference = make_conference(ConferenceSpec::instant("Standup"));
        let roster = vec![
            Participant::host(conference.id, conference.host_id, None),
            Participant::attendee(conference.id, &ParticipantIdentity::guest("Alex")).unwrap(),
        ];
        assert_roster_invariants(&conference, &roster);
    }

    #[test]
    #[should_panic(expected = "has no started_at")]
    fn test_ended_without_start() {
        let mut conference = make_conference(ConferenceSpec::scheduled("Later", Utc::now()));
        conference.status = ConferenceStatus::Ended;
        conference.ended_at = Some(Utc::now());
        assert_conference_invariants(&conference);
    }

    #[test]
    #[should_panic(expected = "more than one live conference")]
    fn test_two_live_for_host() {
        let a = make_conference(ConferenceSpec::instant("A"));
        let mut b = make_conference(ConferenceSpec::instant("B"));
        b.host_id = a.host_id;
        assert_single_live_per_host(&[a, b]);
    }
}
