//! SQLite storage layer for Confer

mod conferences;
mod migrations;
mod parse;
mod participants;
mod settings;
mod traits;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use tracing::instrument;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Conference, ConferenceSettings, ConferenceStatus, Participant};

pub use conferences::ConferenceStore;
pub use parse::is_constraint_violation;
pub use participants::ParticipantStore;
pub use settings::SettingsStore;
pub use traits::{ConferenceRepository, ParticipantRepository, Storage};

/// Main database handle
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initialize database schema via migrations
    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    pub fn conferences(&self) -> ConferenceStore<'_> {
        ConferenceStore::new(&self.conn)
    }

    pub fn participants(&self) -> ParticipantStore<'_> {
        ParticipantStore::new(&self.conn)
    }

    pub fn settings(&self) -> SettingsStore<'_> {
        SettingsStore::new(&self.conn)
    }
}

// Implement repository traits for Database
// This enables using Database through the trait interface

impl ConferenceRepository for Database {
    #[instrument(skip_all, fields(conference_id = %conference.id))]
    fn create_conference(
        &self,
        conference: &Conference,
        host: &Participant,
        settings: &ConferenceSettings,
    ) -> Result<()> {
        // Dropping the transaction without commit rolls everything back
        let tx = self.conn.unchecked_transaction()?;
        ConferenceStore::new(&tx).create(conference)?;
        SettingsStore::new(&tx).create(settings)?;
        ParticipantStore::new(&tx).create(host)?;
        tx.commit()?;
        Ok(())
    }

    fn find_conference_by_id(&self, id: Uuid) -> Result<Option<Conference>> {
        self.conferences().find_by_id(id)
    }

    fn find_conference_by_code(&self, code: &str) -> Result<Option<Conference>> {
        self.conferences().find_by_code(code)
    }

    fn find_live_conference_for_host(&self, host_id: Uuid) -> Result<Option<Conference>> {
        self.conferences().find_live_for_host(host_id)
    }

    fn conference_code_exists(&self, code: &str) -> Result<bool> {
        self.conferences().code_exists(code)
    }

    fn update_conference_details(&self, conference: &Conference) -> Result<()> {
        self.conferences().update_details(conference)
    }

    fn transition_conference(
        &self,
        id: Uuid,
        from: ConferenceStatus,
        to: ConferenceStatus,
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        self.conferences()
            .transition(id, from, to, started_at, ended_at, Utc::now())
    }

    fn set_conference_active(&self, id: Uuid, is_active: bool) -> Result<()> {
        self.conferences().set_active(id, is_active)
    }

    fn delete_conference(&self, id: Uuid) -> Result<bool> {
        self.conferences().delete(id)
    }

    fn list_conferences_for_host(
        &self,
        host_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conference>> {
        self.conferences().list_for_host(host_id, limit, offset)
    }

    fn count_conferences_for_host(&self, host_id: Uuid, only_active: bool) -> Result<u64> {
        self.conferences().count_for_host(host_id, only_active)
    }

    fn find_settings(&self, conference_id: Uuid) -> Result<Option<ConferenceSettings>> {
        self.settings().find_for_conference(conference_id)
    }

    fn update_settings(&self, settings: &ConferenceSettings) -> Result<()> {
        self.settings().update(settings)
    }
}

impl ParticipantRepository for Database {
    fn add_participant(&self, participant: &Participant) -> Result<()> {
        self.participants().create(participant)
    }

    fn find_participant_by_id(&self, id: Uuid) -> Result<Option<Participant>> {
        self.participants().find_by_id(id)
    }

    fn list_participants(&self, conference_id: Uuid) -> Result<Vec<Participant>> {
        self.participants().list_for_conference(conference_id)
    }

    fn mark_participant_left(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.participants().mark_left(id, at)
    }

    fn update_participant_permissions(
        &self,
        id: Uuid,
        can_speak: bool,
        is_muted: bool,
    ) -> Result<()> {
        self.participants().update_permissions(id, can_speak, is_muted)
    }

    fn count_present_participants(&self, conference_id: Uuid) -> Result<u64> {
        self.participants().count_present(conference_id)
    }

    fn count_present_participants_for_host(&self, host_id: Uuid) -> Result<u64> {
        self.participants().count_present_for_host(host_id)
    }
}
