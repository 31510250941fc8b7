//! Conference storage operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{
    parse_code, parse_datetime, parse_datetime_opt, parse_status, parse_type, parse_uuid,
    OptionalExt,
};
use crate::error::Result;
use crate::models::{Conference, ConferenceStatus};

const COLUMNS: &str = "id, code, title, description, host_id, status, conference_type, max_participants,
     language_from, language_to, scheduled_at, started_at, ended_at, is_active, created_at, updated_at";

fn conference_from_row(row: &Row<'_>) -> rusqlite::Result<Conference> {
    Ok(Conference {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        code: parse_code(&row.get::<_, String>(1)?)?,
        title: row.get(2)?,
        description: row.get(3)?,
        host_id: parse_uuid(&row.get::<_, String>(4)?)?,
        status: parse_status(&row.get::<_, String>(5)?)?,
        conference_type: parse_type(&row.get::<_, String>(6)?)?,
        max_participants: row.get(7)?,
        language_from: row.get(8)?,
        language_to: row.get(9)?,
        scheduled_at: parse_datetime_opt(row.get::<_, Option<String>>(10)?)?,
        started_at: parse_datetime_opt(row.get::<_, Option<String>>(11)?)?,
        ended_at: parse_datetime_opt(row.get::<_, Option<String>>(12)?)?,
        is_active: row.get::<_, i32>(13)? != 0,
        created_at: parse_datetime(&row.get::<_, String>(14)?)?,
        updated_at: parse_datetime(&row.get::<_, String>(15)?)?,
    })
}

pub struct ConferenceStore<'a> {
    conn: &'a Connection,
}

impl<'a> ConferenceStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a new conference row
    #[instrument(skip(self, conference), fields(conference_id = %conference.id, code = %conference.code))]
    pub fn create(&self, conference: &Conference) -> Result<()> {
        self.conn.execute(
            "INSERT INTO conferences (id, code, title, description, host_id, status, conference_type,
                max_participants, language_from, language_to, scheduled_at, started_at, ended_at,
                is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                conference.id.to_string(),
                conference.code.as_str(),
                conference.title,
                conference.description,
                conference.host_id.to_string(),
                conference.status.as_str(),
                conference.conference_type.as_str(),
                conference.max_participants,
                conference.language_from,
                conference.language_to,
                conference.scheduled_at.map(|t| t.to_rfc3339()),
                conference.started_at.map(|t| t.to_rfc3339()),
                conference.ended_at.map(|t| t.to_rfc3339()),
                conference.is_active as i32,
                conference.created_at.to_rfc3339(),
                conference.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Conference>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM conferences WHERE id = ?1", COLUMNS))?;
        let conference = stmt
            .query_row(params![id.to_string()], conference_from_row)
            .optional()?;
        Ok(conference)
    }

    #[instrument(skip(self))]
    pub fn find_by_code(&self, code: &str) -> Result<Option<Conference>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM conferences WHERE code = ?1", COLUMNS))?;
        let conference = stmt
            .query_row(params![code], conference_from_row)
            .optional()?;
        Ok(conference)
    }

    /// Find the host's conference in STARTED or PAUSED, if any
    #[instrument(skip(self))]
    pub fn find_live_for_host(&self, host_id: Uuid) -> Result<Option<Conference>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM conferences
             WHERE host_id = ?1 AND status IN ('STARTED', 'PAUSED')
             LIMIT 1",
            COLUMNS
        ))?;
        let conference = stmt
            .query_row(params![host_id.to_string()], conference_from_row)
            .optional()?;
        Ok(conference)
    }

    /// Whether a code has ever been issued
    pub fn code_exists(&self, code: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM conferences WHERE code = ?1",
            params![code],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Update host-editable details; status and lifecycle timestamps are untouched
    #[instrument(skip(self, conference), fields(conference_id = %conference.id))]
    pub fn update_details(&self, conference: &Conference) -> Result<()> {
        self.conn.execute(
            "UPDATE conferences SET title = ?1, description = ?2, max_participants = ?3,
                language_from = ?4, language_to = ?5, scheduled_at = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                conference.title,
                conference.description,
                conference.max_participants,
                conference.language_from,
                conference.language_to,
                conference.scheduled_at.map(|t| t.to_rfc3339()),
                conference.updated_at.to_rfc3339(),
                conference.id.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Conditionally move a conference from `from` to `to`
    ///
    /// Lifecycle timestamps are only filled when still unset. Returns false
    /// when the row was not in `from` anymore.
    #[instrument(skip(self))]
    pub fn transition(
        &self,
        id: Uuid,
        from: ConferenceStatus,
        to: ConferenceStatus,
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE conferences
             SET status = ?1,
                 started_at = COALESCE(started_at, ?2),
                 ended_at = COALESCE(ended_at, ?3),
                 updated_at = ?4
             WHERE id = ?5 AND status = ?6",
            params![
                to.as_str(),
                started_at.map(|t| t.to_rfc3339()),
                ended_at.map(|t| t.to_rfc3339()),
                now.to_rfc3339(),
                id.to_string(),
                from.as_str(),
            ],
        )?;
        Ok(changed == 1)
    }

    #[instrument(skip(self))]
    pub fn set_active(&self, id: Uuid, is_active: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE conferences SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
            params![is_active as i32, Utc::now().to_rfc3339(), id.to_string()],
        )?;
        Ok(())
    }

    /// Delete a conference; participants and settings cascade
    #[instrument(skip(self))]
    pub fn delete(&self, id: Uuid) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM conferences WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(deleted > 0)
    }

    /// List a host's conferences, newest first
    #[instrument(skip(self))]
    pub fn list_for_host(&self, host_id: Uuid, limit: u32, offset: u32) -> Result<Vec<Conference>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM conferences WHERE host_id = ?1
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            COLUMNS
        ))?;
        let conferences = stmt
            .query_map(params![host_id.to_string(), limit, offset], conference_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(conferences)
    }

    pub fn count_for_host(&self, host_id: Uuid, only_active: bool) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM conferences WHERE host_id = ?1 AND (?2 = 0 OR is_active = 1)",
            params![host_id.to_string(), only_active as i32],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
