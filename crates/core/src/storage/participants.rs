//! Participant storage operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_datetime_opt, parse_uuid, parse_uuid_opt, OptionalExt};
use crate::error::Result;
use crate::models::Participant;

const COLUMNS: &str =
    "id, conference_id, user_id, display_name, is_host, can_speak, is_muted, joined_at, left_at";

fn participant_from_row(row: &Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        conference_id: parse_uuid(&row.get::<_, String>(1)?)?,
        user_id: parse_uuid_opt(row.get::<_, Option<String>>(2)?)?,
        display_name: row.get(3)?,
        is_host: row.get::<_, i32>(4)? != 0,
        can_speak: row.get::<_, i32>(5)? != 0,
        is_muted: row.get::<_, i32>(6)? != 0,
        joined_at: parse_datetime(&row.get::<_, String>(7)?)?,
        left_at: parse_datetime_opt(row.get::<_, Option<String>>(8)?)?,
    })
}

pub struct ParticipantStore<'a> {
    conn: &'a Connection,
}

impl<'a> ParticipantStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    #[instrument(skip(self, participant), fields(participant_id = %participant.id, conference_id = %participant.conference_id))]
    pub fn create(&self, participant: &Participant) -> Result<()> {
        self.conn.execute(
            "INSERT INTO conference_participants (id, conference_id, user_id, display_name, is_host,
                can_speak, is_muted, joined_at, left_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                participant.id.to_string(),
                participant.conference_id.to_string(),
                participant.user_id.map(|u| u.to_string()),
                participant.display_name,
                participant.is_host as i32,
                participant.can_speak as i32,
                participant.is_muted as i32,
                participant.joined_at.to_rfc3339(),
                participant.left_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Participant>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM conference_participants WHERE id = ?1",
            COLUMNS
        ))?;
        let participant = stmt
            .query_row(params![id.to_string()], participant_from_row)
            .optional()?;
        Ok(participant)
    }

    /// All participants of a conference, including those who left
    #[instrument(skip(self))]
    pub fn list_for_conference(&self, conference_id: Uuid) -> Result<Vec<Participant>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM conference_participants WHERE conference_id = ?1
             ORDER BY joined_at",
            COLUMNS
        ))?;
        let participants = stmt
            .query_map(params![conference_id.to_string()], participant_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(participants)
    }

    /// Set left_at if unset; returns whether anything changed
    #[instrument(skip(self))]
    pub fn mark_left(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE conference_participants SET left_at = ?1 WHERE id = ?2 AND left_at IS NULL",
            params![at.to_rfc3339(), id.to_string()],
        )?;
        Ok(changed == 1)
    }

    #[instrument(skip(self))]
    pub fn update_permissions(&self, id: Uuid, can_speak: bool, is_muted: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE conference_participants SET can_speak = ?1, is_muted = ?2 WHERE id = ?3",
            params![can_speak as i32, is_muted as i32, id.to_string()],
        )?;
        Ok(())
    }

    /// Participants who have not left
    pub fn count_present(&self, conference_id: Uuid) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM conference_participants
             WHERE conference_id = ?1 AND left_at IS NULL",
            params![conference_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Present participants across all of a host's conferences
    pub fn count_present_for_host(&self, host_id: Uuid) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM conference_participants p
             INNER JOIN conferences c ON c.id = p.conference_id
             WHERE c.host_id = ?1 AND p.left_at IS NULL",
            params![host_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
