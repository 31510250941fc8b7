//! Connection hub - per-conference fanout
//!
//! The hub is the only owner of the conference -> connections map. Every
//! connection is a bounded queue drained by that connection's writer task.
//! Broadcast holds the write lock for the whole pass, so all connections of
//! a conference observe the hub's events in one order. A connection whose
//! queue is full or closed is unregistered on the spot and the pass goes on.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::protocol::{EventPayload, RealtimeEvent, SenderIdentity, ServerMessage};
use crate::translation::{self, Translator, Unconfigured, DEFAULT_TIMEOUT};

/// Queue depth per connection
pub const CONNECTION_QUEUE_DEPTH: usize = 64;

/// Identifies one realtime connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A translation to relay into a conference
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub text: String,
    pub source_language: String,
    pub target_language: String,
}

type Sessions = HashMap<Uuid, HashMap<ConnectionId, mpsc::Sender<ServerMessage>>>;

/// Conference connection registry and fanout
pub struct ConnectionHub {
    sessions: RwLock<Sessions>,
    translator: Arc<dyn Translator>,
    translation_timeout: Duration,
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new(Arc::new(Unconfigured), DEFAULT_TIMEOUT)
    }
}

impl ConnectionHub {
    pub fn new(translator: Arc<dyn Translator>, translation_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            translator,
            translation_timeout,
        }
    }

    /// Create a connection queue and register it
    pub async fn connect(
        &self,
        conference_id: Uuid,
    ) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(CONNECTION_QUEUE_DEPTH);
        let connection_id = ConnectionId::new();
        self.register(conference_id, connection_id, tx).await;
        (connection_id, rx)
    }

    /// Add a connection to a conference's set
    pub async fn register(
        &self,
        conference_id: Uuid,
        connection_id: ConnectionId,
        tx: mpsc::Sender<ServerMessage>,
    ) {
        let mut sessions = self.sessions.write().await;
        let connections = sessions.entry(conference_id).or_default();
        connections.insert(connection_id, tx);

        debug!(
            conference_id = %conference_id,
            connection_id = %connection_id,
            connections = connections.len(),
            "Connection registered"
        );
    }

    /// Remove a connection; empty conference entries are dropped
    ///
    /// Returns whether the connection was registered.
    pub async fn unregister(&self, conference_id: Uuid, connection_id: ConnectionId) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(connections) = sessions.get_mut(&conference_id) else {
            return false;
        };

        let removed = connections.remove(&connection_id).is_some();
        if connections.is_empty() {
            sessions.remove(&conference_id);
            debug!(conference_id = %conference_id, "Removed empty conference from hub");
        }

        if removed {
            debug!(conference_id = %conference_id, connection_id = %connection_id, "Connection unregistered");
        }
        removed
    }

    /// Stamp and fan out an event; returns the number of connections reached
    ///
    /// `origin` is skipped for echo-suppressing payloads. Failed deliveries
    /// unregister their connection and never reach the caller.
    pub async fn broadcast(
        &self,
        conference_id: Uuid,
        origin: Option<ConnectionId>,
        sender: SenderIdentity,
        payload: EventPayload,
    ) -> usize {
        let skip = origin.filter(|_| payload.suppresses_echo());
        let kind = payload.kind();
        let message = ServerMessage::Event(RealtimeEvent {
            conference_id,
            sender,
            payload,
            timestamp: Utc::now(),
        });

        let mut sessions = self.sessions.write().await;
        let Some(connections) = sessions.get_mut(&conference_id) else {
            return 0;
        };

        let mut delivered = 0;
        connections.retain(|connection_id, tx| {
            if skip == Some(*connection_id) {
                return true;
            }
            match tx.try_send(message.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(e) => {
                    warn!(
                        conference_id = %conference_id,
                        connection_id = %connection_id,
                        error = %e,
                        "Delivery failed, dropping connection"
                    );
                    false
                }
            }
        });

        if connections.is_empty() {
            sessions.remove(&conference_id);
        }

        debug!(conference_id = %conference_id, kind, delivered, "Broadcast");
        delivered
    }

    /// Translate and fan out the result
    ///
    /// Backend failures and timeouts still produce an event, carrying the
    /// fallback marker as the translated text.
    pub async fn relay_translation(
        &self,
        conference_id: Uuid,
        origin: Option<ConnectionId>,
        sender: SenderIdentity,
        request: TranslationRequest,
    ) -> usize {
        let translated = translation::translate_or_fallback(
            self.translator.as_ref(),
            &request.text,
            &request.source_language,
            &request.target_language,
            self.translation_timeout,
        )
        .await;

        self.broadcast(
            conference_id,
            origin,
            sender,
            EventPayload::TranslationResult {
                original: request.text,
                translated,
                source_language: request.source_language,
                target_language: request.target_language,
            },
        )
        .await
    }

    /// Send a message to a single connection
    ///
    /// A failed delivery unregisters the connection, as in `broadcast`.
    pub async fn send_to(
        &self,
        conference_id: Uuid,
        connection_id: ConnectionId,
        message: ServerMessage,
    ) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(connections) = sessions.get_mut(&conference_id) else {
            return false;
        };
        let Some(tx) = connections.get(&connection_id) else {
            return false;
        };

        if let Err(e) = tx.try_send(message) {
            warn!(
                conference_id = %conference_id,
                connection_id = %connection_id,
                error = %e,
                "Delivery failed, dropping connection"
            );
            connections.remove(&connection_id);
            if connections.is_empty() {
                sessions.remove(&conference_id);
            }
            return false;
        }
        true
    }

    /// Tell every connection the server is going away and forget them all
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.write().await;
        for connections in sessions.values() {
            for tx in connections.values() {
                let _ = tx.try_send(ServerMessage::ServerShutdown);
            }
        }
        sessions.clear();
    }

    pub async fn connection_count(&self, conference_id: Uuid) -> usize {
        self.sessions
            .read()
            .await
            .get(&conference_id)
            .map_or(0, HashMap::len)
    }

    /// Number of conferences with at least one connection
    pub async fn conference_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
