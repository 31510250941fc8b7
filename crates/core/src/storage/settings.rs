//! Conference settings storage operations

use rusqlite::{params, Connection};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_uuid, OptionalExt};
use crate::error::Result;
use crate::models::ConferenceSettings;

pub struct SettingsStore<'a> {
    conn: &'a Connection,
}

impl<'a> SettingsStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    #[instrument(skip(self, settings), fields(conference_id = %settings.conference_id))]
    pub fn create(&self, settings: &ConferenceSettings) -> Result<()> {
        self.conn.execute(
            "INSERT INTO conference_settings (id, conference_id, auto_translate, recording_enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                settings.id.to_string(),
                settings.conference_id.to_string(),
                settings.auto_translate as i32,
                settings.recording_enabled as i32,
                settings.created_at.to_rfc3339(),
                settings.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn find_for_conference(&self, conference_id: Uuid) -> Result<Option<ConferenceSettings>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, conference_id, auto_translate, recording_enabled, created_at, updated_at
             FROM conference_settings WHERE conference_id = ?1",
        )?;

        let settings = stmt
            .query_row(params![conference_id.to_string()], |row| {
                Ok(ConferenceSettings {
                    id: parse_uuid(&row.get::<_, String>(0)?)?,
                    conference_id: parse_uuid(&row.get::<_, String>(1)?)?,
                    auto_translate: row.get::<_, i32>(2)? != 0,
                    recording_enabled: row.get::<_, i32>(3)? != 0,
                    created_at: parse_datetime(&row.get::<_, String>(4)?)?,
                    updated_at: parse_datetime(&row.get::<_, String>(5)?)?,
                })
            })
            .optional()?;

        Ok(settings)
    }

    #[instrument(skip(self, settings), fields(conference_id = %settings.conference_id))]
    pub fn update(&self, settings: &ConferenceSettings) -> Result<()> {
        self.conn.execute(
            "UPDATE conference_settings SET auto_translate = ?1, recording_enabled = ?2, updated_at = ?3
             WHERE conference_id = ?4",
            params![
                settings.auto_translate as i32,
                settings.recording_enabled as i32,
                settings.updated_at.to_rfc3339(),
                settings.conference_id.to_string(),
            ],
        )?;
        Ok(())
    }
}
