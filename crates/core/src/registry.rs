//! Session registry - conference lookups backed by the store
//!
//! The registry owns the shared store handle. Lookups lock it briefly;
//! the lifecycle and roster managers lock it for their whole
//! check-then-write sequence. A small cache answers "is this host live"
//! without a query once the answer is known.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Conference, ConferenceCode, ConferenceSettings, ConferenceSummary, HostStats,
};
use crate::storage::Storage;

/// Largest page handed out by `list_for_host`
pub const MAX_PAGE_SIZE: u32 = 100;

/// Conference registry - central lookup for conferences and hosts
pub struct SessionRegistry<S> {
    store: Arc<Mutex<S>>,
    /// Host -> live conference (None = known idle)
    live_hosts: RwLock<HashMap<Uuid, Option<Uuid>>>,
}

impl<S: Storage> SessionRegistry<S> {
    /// Create a registry owning the store
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(Mutex::new(store)))
    }

    /// Create a registry over an already shared store
    pub fn from_shared(store: Arc<Mutex<S>>) -> Self {
        Self {
            store,
            live_hosts: RwLock::new(HashMap::new()),
        }
    }

    /// Lock the store for an atomic check-then-write sequence
    ///
    /// A panic while holding the lock leaves SQLite consistent (every
    /// write is its own statement or transaction), so poisoning is ignored.
    pub(crate) fn lock_store(&self) -> MutexGuard<'_, S> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Direct lookup by id, including inactive conferences
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Conference>> {
        self.lock_store().find_conference_by_id(id)
    }

    /// Public lookup by code
    ///
    /// Inactive conferences and malformed codes are reported as not found.
    pub fn find_by_code(&self, code: &str) -> Result<Option<Conference>> {
        let Ok(code) = ConferenceCode::parse(code) else {
            return Ok(None);
        };
        let conference = self.lock_store().find_conference_by_code(code.as_str())?;
        Ok(conference.filter(|c| c.is_active))
    }

    /// The host's conference in STARTED or PAUSED, straight from the store
    pub fn find_live_by_host(&self, host_id: Uuid) -> Result<Option<Conference>> {
        let store = self.lock_store();
        let live = store.find_live_conference_for_host(host_id)?;
        self.remember(host_id, live.as_ref().map(|c| c.id));
        drop(store);
        Ok(live)
    }

    /// Cheap liveness check, answered from cache when possible
    pub fn is_host_live(&self, host_id: Uuid) -> Result<bool> {
        let cached = self
            .live_hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&host_id)
            .copied();

        match cached {
            Some(entry) => Ok(entry.is_some()),
            None => Ok(self.find_live_by_host(host_id)?.is_some()),
        }
    }

    /// Settings for a conference
    pub fn settings(&self, conference_id: Uuid) -> Result<Option<ConferenceSettings>> {
        self.lock_store().find_settings(conference_id)
    }

    /// A host's conferences with their present participant counts
    pub fn list_for_host(
        &self,
        host_id: Uuid,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<ConferenceSummary>> {
        let store = self.lock_store();
        let conferences =
            store.list_conferences_for_host(host_id, limit.clamp(1, MAX_PAGE_SIZE), offset)?;

        conferences
            .into_iter()
            .map(|conference| -> Result<ConferenceSummary> {
                let participant_count = store.count_present_participants(conference.id)?;
                Ok(ConferenceSummary {
                    conference,
                    participant_count,
                })
            })
            .collect()
    }

    /// Aggregate counts for a host's dashboard
    pub fn stats_for_host(&self, host_id: Uuid) -> Result<HostStats> {
        let store = self.lock_store();
        Ok(HostStats {
            total_conferences: store.count_conferences_for_host(host_id, false)?,
            active_conferences: store.count_conferences_for_host(host_id, true)?,
            total_participants: store.count_present_participants_for_host(host_id)?,
        })
    }

    /// Record a conference's post-transition status in the cache
    pub(crate) fn note_status(&self, conference: &Conference) {
        let mut live_hosts = self
            .live_hosts
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if conference.is_live() {
            live_hosts.insert(conference.host_id, Some(conference.id));
        } else if live_hosts.get(&conference.host_id) == Some(&Some(conference.id)) {
            live_hosts.insert(conference.host_id, None);
        }
    }

    /// Drop whatever the cache knows about a host
    pub(crate) fn forget_host(&self, host_id: Uuid) {
        self.live_hosts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&host_id);
    }

    fn remember(&self, host_id: Uuid, live: Option<Uuid>) {
        debug!(host_id = %host_id, live = ?live, "Cached host liveness");
        self.live_hosts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host_id, live);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConferenceSpec, Participant};
    use crate::storage::{ConferenceRepository, Database, ParticipantRepository};
    use chrono::Utc;

    fn seed(registry: &SessionRegistry<Database>, spec: ConferenceSpec, host_id: Uuid, code: &str) -> Conference {
        let conference = Conference::new(&spec, host_id, ConferenceCode::parse(code).unwrap());
        let host = Participant::host(conference.id, host_id, None);
        let settings = ConferenceSettings::defaults_for(conference.id);
        registry
            .lock_store()
            .create_conference(&conference, &host, &settings)
            .unwrap();
        conference
    }

    #[test]
    fn test_find_by_code_hides_inactive() {
        let registry = SessionRegistry::new(Database::open_in_memory().unwrap());
        let conference = seed(&registry, ConferenceSpec::instant("Standup"), Uuid::new_v4(), "abc-defg-hij");

        assert!(registry.find_by_code("abc-defg-hij").unwrap().is_some());

        registry.lock_store().set_conference_active(conference.id, false).unwrap();
        assert!(registry.find_by_code("abc-defg-hij").unwrap().is_none());
        // Direct lookups still see it
        assert!(registry.find_by_id(conference.id).unwrap().is_some());
    }

    #[test]
    fn test_find_by_code_malformed() {
        let registry = SessionRegistry::new(Database::open_in_memory().unwrap());
        assert!(registry.find_by_code("not a code").unwrap().is_none());
    }

    #[test]
    fn test_live_cache_follows_notes() {
        let registry = SessionRegistry::new(Database::open_in_memory().unwrap());
        let host_id = Uuid::new_v4();
        assert!(!registry.is_host_live(host_id).unwrap());

        let mut conference = seed(&registry, ConferenceSpec::instant("Standup"), host_id, "abc-defg-hij");
        // Cache still says idle until told otherwise
        assert!(!registry.is_host_live(host_id).unwrap());
        registry.note_status(&conference);
        assert!(registry.is_host_live(host_id).unwrap());

        conference.status = crate::models::ConferenceStatus::Ended;
        registry.note_status(&conference);
        assert!(!registry.is_host_live(host_id).unwrap());

        registry.forget_host(host_id);
        // Falls back to the store, which still has it STARTED
        assert!(registry.is_host_live(host_id).unwrap());
    }

    #[test]
    fn test_list_and_stats() {
        let registry = SessionRegistry::new(Database::open_in_memory().unwrap());
        let host_id = Uuid::new_v4();
        let live = seed(&registry, ConferenceSpec::instant("Now"), host_id, "aaa-aaaa-aaa");
        let later = seed(&registry, ConferenceSpec::scheduled("Later", Utc::now()), host_id, "bbb-bbbb-bbb");
        registry.lock_store().set_conference_active(later.id, false).unwrap();

        let guest = Participant::attendee(
            live.id,
            &crate::models::ParticipantIdentity::guest("Alex"),
        )
        .unwrap();
        registry.lock_store().add_participant(&guest).unwrap();

        let summaries = registry.list_for_host(host_id, 0, 10).unwrap();
        assert_eq!(summaries.len(), 2);
        let live_summary = summaries.iter().find(|s| s.conference.id == live.id).unwrap();
        assert_eq!(live_summary.participant_count, 2);

        let stats = registry.stats_for_host(host_id).unwrap();
        assert_eq!(stats.total_conferences, 2);
        assert_eq!(stats.active_conferences, 1);
        assert_eq!(stats.total_participants, 3);
    }
}
