//! Conference model - one scheduled or instant multi-party session

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Maximum title length in characters
pub const MAX_TITLE_LEN: usize = 255;

/// Upper bound for a conference's capacity
pub const MAX_PARTICIPANTS_LIMIT: u32 = 100;

/// Capacity used when the creator does not pick one
pub const DEFAULT_MAX_PARTICIPANTS: u32 = 50;

/// Maximum length of a language tag
pub const MAX_LANGUAGE_TAG_LEN: usize = 10;

pub const DEFAULT_LANGUAGE_FROM: &str = "en";
pub const DEFAULT_LANGUAGE_TO: &str = "vi";

/// Lifecycle status of a conference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConferenceStatus {
    /// Created, not started yet
    Pending,
    /// Running
    Started,
    /// Temporarily halted, still live
    Paused,
    /// Finished after having run
    Ended,
    /// Abandoned before starting
    Cancelled,
}

impl ConferenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConferenceStatus::Pending => "PENDING",
            ConferenceStatus::Started => "STARTED",
            ConferenceStatus::Paused => "PAUSED",
            ConferenceStatus::Ended => "ENDED",
            ConferenceStatus::Cancelled => "CANCELLED",
        }
    }

    /// Live means STARTED or PAUSED
    pub fn is_live(&self) -> bool {
        matches!(self, ConferenceStatus::Started | ConferenceStatus::Paused)
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConferenceStatus::Ended | ConferenceStatus::Cancelled)
    }
}

impl fmt::Display for ConferenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConferenceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(ConferenceStatus::Pending),
            "STARTED" => Ok(ConferenceStatus::Started),
            "PAUSED" => Ok(ConferenceStatus::Paused),
            "ENDED" => Ok(ConferenceStatus::Ended),
            "CANCELLED" => Ok(ConferenceStatus::Cancelled),
            other => Err(Error::InvalidInput(format!("unknown status '{}'", other))),
        }
    }
}

/// How a conference is meant to begin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConferenceType {
    /// Starts immediately on creation
    Instant,
    /// Created pending, started later by the host
    Scheduled,
}

impl ConferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConferenceType::Instant => "INSTANT",
            ConferenceType::Scheduled => "SCHEDULED",
        }
    }
}

impl fmt::Display for ConferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConferenceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "INSTANT" => Ok(ConferenceType::Instant),
            "SCHEDULED" => Ok(ConferenceType::Scheduled),
            other => Err(Error::InvalidInput(format!("unknown type '{}'", other))),
        }
    }
}

/// Human-shareable session code, `abc-defg-hij`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConferenceCode(String);

impl ConferenceCode {
    /// Group lengths of the code, in order
    pub const GROUPS: [usize; 3] = [3, 4, 3];
    pub const DELIMITER: char = '-';

    /// Validate and wrap a code string
    pub fn parse(s: &str) -> Result<Self> {
        if Self::is_valid(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::InvalidInput(format!("malformed conference code '{}'", s)))
        }
    }

    /// Check `[a-z]{3}-[a-z]{4}-[a-z]{3}`
    pub fn is_valid(s: &str) -> bool {
        let groups: Vec<&str> = s.split(Self::DELIMITER).collect();
        groups.len() == Self::GROUPS.len()
            && groups
                .iter()
                .zip(Self::GROUPS)
                .all(|(g, len)| g.len() == len && g.bytes().all(|b| b.is_ascii_lowercase()))
    }

    pub(crate) fn from_trusted(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConferenceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ConferenceCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ConferenceCode> for String {
    fn from(code: ConferenceCode) -> Self {
        code.0
    }
}

/// A conference row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conference {
    pub id: Uuid,
    pub code: ConferenceCode,
    pub title: String,
    pub description: Option<String>,
    pub host_id: Uuid,
    pub status: ConferenceStatus,
    pub conference_type: ConferenceType,
    pub max_participants: u32,
    pub language_from: String,
    pub language_to: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Set on first STARTED entry, never cleared
    pub started_at: Option<DateTime<Utc>>,
    /// Set once on ENDED or CANCELLED entry
    pub ended_at: Option<DateTime<Utc>>,
    /// Visibility toggle, independent of status
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conference {
    /// Build a fresh conference from a validated spec
    pub fn new(spec: &ConferenceSpec, host_id: Uuid, code: ConferenceCode) -> Self {
        let now = Utc::now();
        let (status, started_at, scheduled_at) = match spec.conference_type {
            ConferenceType::Instant => (ConferenceStatus::Started, Some(now), None),
            ConferenceType::Scheduled => (ConferenceStatus::Pending, None, spec.scheduled_at),
        };

        Self {
            id: Uuid::new_v4(),
            code,
            title: spec.title.trim().to_string(),
            description: spec.description.clone(),
            host_id,
            status,
            conference_type: spec.conference_type,
            max_participants: spec.max_participants,
            language_from: spec.language_from.clone(),
            language_to: spec.language_to.clone(),
            scheduled_at,
            started_at,
            ended_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }

    pub fn is_hosted_by(&self, user_id: Uuid) -> bool {
        self.host_id == user_id
    }

    /// Whether new participants may enter
    pub fn is_joinable(&self) -> bool {
        self.is_active && !self.status.is_terminal()
    }
}

/// Creation request for a conference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConferenceSpec {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub conference_type: ConferenceType,
    /// Required for SCHEDULED, ignored for INSTANT
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default = "default_language_from")]
    pub language_from: String,
    #[serde(default = "default_language_to")]
    pub language_to: String,
    #[serde(default = "default_max_participants")]
    pub max_participants: u32,
    /// Display name for the synthetic host participant
    #[serde(default)]
    pub host_name: Option<String>,
}

fn default_language_from() -> String {
    DEFAULT_LANGUAGE_FROM.to_string()
}

fn default_language_to() -> String {
    DEFAULT_LANGUAGE_TO.to_string()
}

fn default_max_participants() -> u32 {
    DEFAULT_MAX_PARTICIPANTS
}

impl ConferenceSpec {
    pub fn instant(title: impl Into<String>) -> Self {
        Self::with_type(title.into(), ConferenceType::Instant, None)
    }

    pub fn scheduled(title: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::with_type(title.into(), ConferenceType::Scheduled, Some(at))
    }

    fn with_type(
        title: String,
        conference_type: ConferenceType,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            title,
            description: None,
            conference_type,
            scheduled_at,
            language_from: default_language_from(),
            language_to: default_language_to(),
            max_participants: default_max_participants(),
            host_name: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_languages(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.language_from = from.into();
        self.language_to = to.into();
        self
    }

    pub fn with_max_participants(mut self, max: u32) -> Self {
        self.max_participants = max;
        self
    }

    pub fn with_host_name(mut self, name: impl Into<String>) -> Self {
        self.host_name = Some(name.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_title(&self.title)?;
        validate_capacity(self.max_participants)?;
        validate_language_tag(&self.language_from)?;
        validate_language_tag(&self.language_to)?;

        if self.conference_type == ConferenceType::Scheduled && self.scheduled_at.is_none() {
            return Err(Error::InvalidInput(
                "scheduled conferences need a scheduled time".into(),
            ));
        }

        Ok(())
    }
}

/// Host-editable details; status and lifecycle timestamps are not here
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConferenceChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub max_participants: Option<u32>,
    pub language_from: Option<String>,
    pub language_to: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl ConferenceChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.max_participants.is_none()
            && self.language_from.is_none()
            && self.language_to.is_none()
            && self.scheduled_at.is_none()
    }

    /// Validate and apply onto a conference
    pub fn apply_to(&self, conference: &mut Conference) -> Result<()> {
        if let Some(title) = &self.title {
            validate_title(title)?;
            conference.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            conference.description = description.clone();
        }
        if let Some(max) = self.max_participants {
            validate_capacity(max)?;
            conference.max_participants = max;
        }
        if let Some(from) = &self.language_from {
            validate_language_tag(from)?;
            conference.language_from = from.clone();
        }
        if let Some(to) = &self.language_to {
            validate_language_tag(to)?;
            conference.language_to = to.clone();
        }
        if let Some(at) = self.scheduled_at {
            conference.scheduled_at = Some(at);
        }
        conference.updated_at = Utc::now();
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<()> {
    let len = title.trim().chars().count();
    if len == 0 || len > MAX_TITLE_LEN {
        return Err(Error::InvalidInput(format!(
            "title must be 1-{} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(())
}

fn validate_capacity(max: u32) -> Result<()> {
    if max == 0 || max > MAX_PARTICIPANTS_LIMIT {
        return Err(Error::InvalidInput(format!(
            "max_participants must be between 1 and {}",
            MAX_PARTICIPANTS_LIMIT
        )));
    }
    Ok(())
}

fn validate_language_tag(tag: &str) -> Result<()> {
    if tag.trim().is_empty() || tag.len() > MAX_LANGUAGE_TAG_LEN {
        return Err(Error::InvalidInput(format!("invalid language tag '{}'", tag)));
    }
    Ok(())
}

/// A conference with its present participant count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConferenceSummary {
    pub conference: Conference,
    pub participant_count: u64,
}

/// Per-host aggregate counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStats {
    pub total_conferences: u64,
    pub active_conferences: u64,
    pub total_participants: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_pattern() {
        assert!(ConferenceCode::is_valid("abc-defg-hij"));
        assert!(!ConferenceCode::is_valid("abc-def-hij"));
        assert!(!ConferenceCode::is_valid("ABC-defg-hij"));
        assert!(!ConferenceCode::is_valid("abc_defg_hij"));
        assert!(!ConferenceCode::is_valid("abc-defg-hij-"));
        assert!(!ConferenceCode::is_valid("ab1-defg-hij"));
    }

    #[test]
    fn test_code_deserialize_rejects_malformed() {
        let ok: ConferenceCode = serde_json::from_str("\"cqx-jhyz-ive\"").unwrap();
        assert_eq!(ok.as_str(), "cqx-jhyz-ive");
        assert!(serde_json::from_str::<ConferenceCode>("\"nope\"").is_err());
    }

    #[test]
    fn test_status_strings() {
        for status in [
            ConferenceStatus::Pending,
            ConferenceStatus::Started,
            ConferenceStatus::Paused,
            ConferenceStatus::Ended,
            ConferenceStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<ConferenceStatus>().unwrap(), status);
        }
        assert!(ConferenceStatus::Paused.is_live());
        assert!(!ConferenceStatus::Pending.is_live());
        assert!(ConferenceStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_instant_starts_immediately() {
        let spec = ConferenceSpec::instant("Standup");
        let conference = Conference::new(&spec, Uuid::new_v4(), ConferenceCode::parse("abc-defg-hij").unwrap());
        assert_eq!(conference.status, ConferenceStatus::Started);
        assert!(conference.started_at.is_some());
        assert!(conference.scheduled_at.is_none());
    }

    #[test]
    fn test_scheduled_requires_time() {
        let mut spec = ConferenceSpec::scheduled("Review", Utc::now());
        assert!(spec.validate().is_ok());
        spec.scheduled_at = None;
        assert!(matches!(spec.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_spec_validation() {
        assert!(ConferenceSpec::instant("   ").validate().is_err());
        assert!(ConferenceSpec::instant("x".repeat(256)).validate().is_err());
        assert!(ConferenceSpec::instant("ok").with_max_participants(0).validate().is_err());
        assert!(ConferenceSpec::instant("ok").with_max_participants(101).validate().is_err());
        assert!(ConferenceSpec::instant("ok").with_languages("", "vi").validate().is_err());
        assert!(ConferenceSpec::instant("ok").with_languages("en", "vi").validate().is_ok());
    }

    #[test]
    fn test_changes_leave_status_alone() {
        let spec = ConferenceSpec::instant("Standup");
        let mut conference = Conference::new(&spec, Uuid::new_v4(), ConferenceCode::parse("abc-defg-hij").unwrap());
        let changes = ConferenceChanges {
            title: Some("Retro".into()),
            max_participants: Some(10),
            ..Default::default()
        };
        changes.apply_to(&mut conference).unwrap();
        assert_eq!(conference.title, "Retro");
        assert_eq!(conference.max_participants, 10);
        assert_eq!(conference.status, ConferenceStatus::Started);
    }
}
