//! Realtime TCP server
//!
//! One task per connection. A connection joins a conference by code, is
//! attached to the roster, registered with the hub, and from then on its
//! chat and translation requests are fanned out to every connection of the
//! same conference. Connections that open with a control frame carry
//! lifecycle and moderation requests instead.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use confer_core::{
    Conference, ConferenceLifecycle, ParticipantIdentity, RosterManager, SessionRegistry, Storage,
};

use crate::control::{self, ControlCommand};
use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::hub::{ConnectionHub, ConnectionId, TranslationRequest, CONNECTION_QUEUE_DEPTH};
use crate::protocol::{ClientMessage, EventPayload, SenderIdentity, ServerMessage};

/// A client has this long to send its first frame
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Services a connection needs
struct Shared<S> {
    registry: Arc<SessionRegistry<S>>,
    lifecycle: Arc<ConferenceLifecycle<S>>,
    roster: RosterManager<S>,
    hub: Arc<ConnectionHub>,
}

/// A connection that completed the join handshake
struct Session {
    conference: Conference,
    connection_id: ConnectionId,
    participant_id: Uuid,
    is_host: bool,
    sender: SenderIdentity,
    auto_translate: bool,
}

/// Realtime server handle
pub struct Server {
    addr: SocketAddr,
    hub: Arc<ConnectionHub>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind and start accepting connections
    pub async fn start<S>(
        addr: SocketAddr,
        lifecycle: Arc<ConferenceLifecycle<S>>,
        hub: Arc<ConnectionHub>,
    ) -> Result<Self>
    where
        S: Storage + Send + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "Realtime server started");

        let (shutdown_tx, _) = broadcast::channel(1);
        let registry = Arc::clone(lifecycle.registry());
        let shared = Arc::new(Shared {
            roster: RosterManager::new(Arc::clone(&registry)),
            registry,
            lifecycle,
            hub: Arc::clone(&hub),
        });

        tokio::spawn(accept_loop(listener, shared, shutdown_tx.clone()));

        Ok(Server {
            addr: bound_addr,
            hub,
            shutdown_tx,
        })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// Notify and drop every connection, then stop accepting
    pub async fn shutdown(&self) {
        self.hub.shutdown().await;
        let _ = self.shutdown_tx.send(());
        info!("Server shutdown initiated");
    }
}

/// Accept incoming connections
async fn accept_loop<S>(
    listener: TcpListener,
    shared: Arc<Shared<S>>,
    shutdown_tx: broadcast::Sender<()>,
) where
    S: Storage + Send + 'static,
{
    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "New connection");
                        let shared = Arc::clone(&shared);
                        let shutdown_rx = shutdown_tx.subscribe();
                        tokio::spawn(handle_connection(stream, addr, shared, shutdown_rx));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Handle a single client connection
async fn handle_connection<S>(
    stream: TcpStream,
    addr: SocketAddr,
    shared: Arc<Shared<S>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) where
    S: Storage + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let first = tokio::time::timeout(HANDSHAKE_TIMEOUT, read_frame::<ClientMessage, _>(&mut reader)).await;
    let join = match first {
        Ok(Ok(ClientMessage::Control { actor, command })) => {
            debug!(addr = %addr, "Control connection");
            control_loop(&shared, (actor, command), reader, writer, &mut shutdown_rx).await;
            return;
        }
        Ok(Ok(msg)) => msg,
        Ok(Err(e)) => {
            debug!(addr = %addr, error = %e, "Handshake read failed");
            return;
        }
        Err(_) => {
            debug!(addr = %addr, "Handshake timed out");
            return;
        }
    };

    let (tx, rx) = mpsc::channel(CONNECTION_QUEUE_DEPTH);
    let session = match accept_join(&shared, join, &tx).await {
        Ok(session) => session,
        Err(e) => {
            warn!(addr = %addr, error = %e, "Join rejected");
            let _ = write_frame(
                &mut writer,
                &ServerMessage::Rejected {
                    reason: e.to_string(),
                },
            )
            .await;
            return;
        }
    };

    let conference_id = session.conference.id;
    info!(
        addr = %addr,
        conference_id = %conference_id,
        connection_id = %session.connection_id,
        participant_id = %session.participant_id,
        "Connection joined"
    );

    let mut writer_done = tokio::spawn(writer_task(writer, rx));
    shared
        .hub
        .register(conference_id, session.connection_id, tx)
        .await;
    shared
        .hub
        .broadcast(
            conference_id,
            Some(session.connection_id),
            session.sender.clone(),
            EventPayload::ParticipantJoined,
        )
        .await;

    read_loop(
        &shared,
        &session,
        &mut reader,
        &mut writer_done,
        &mut shutdown_rx,
    )
    .await;

    shared
        .hub
        .unregister(conference_id, session.connection_id)
        .await;
    shared
        .hub
        .broadcast(
            conference_id,
            Some(session.connection_id),
            session.sender.clone(),
            EventPayload::ParticipantLeft,
        )
        .await;

    info!(conference_id = %conference_id, connection_id = %session.connection_id, "Connection closed");
}

/// Validate the join frame and attach the connection to the roster
///
/// The welcome is queued on `tx` so it precedes every fanned-out event.
async fn accept_join<S>(
    shared: &Arc<Shared<S>>,
    join: ClientMessage,
    tx: &mpsc::Sender<ServerMessage>,
) -> Result<Session>
where
    S: Storage + Send + 'static,
{
    let ClientMessage::Join {
        conference_code,
        user_id,
        display_name,
        participant_id,
    } = join
    else {
        return Err(Error::Protocol("Expected join".into()));
    };

    let (conference, participant, auto_translate) = blocking(shared, move |shared| {
        let conference = shared
            .registry
            .find_by_code(&conference_code)?
            .ok_or_else(|| {
                confer_core::Error::NotFound(format!("conference {}", conference_code))
            })?;

        let participant = match (participant_id, user_id) {
            (Some(participant_id), user_id) => {
                shared.roster.rejoin(conference.id, participant_id, user_id)?
            }
            // The host reattaches to the row created with the conference
            (None, Some(user_id)) if conference.is_hosted_by(user_id) => {
                if !conference.is_joinable() {
                    return Err(confer_core::Error::SessionNotJoinable(format!(
                        "conference {} is {}",
                        conference.code, conference.status
                    )));
                }
                shared
                    .roster
                    .present(conference.id)?
                    .into_iter()
                    .find(|p| p.is_host)
                    .ok_or_else(|| confer_core::Error::NotFound("host participant".into()))?
            }
            (None, Some(user_id)) => shared.roster.join(
                conference.id,
                &ParticipantIdentity::User {
                    user_id,
                    display_name,
                },
            )?,
            (None, None) => shared.roster.join(
                conference.id,
                &ParticipantIdentity::guest(display_name.unwrap_or_default()),
            )?,
        };

        let auto_translate = shared
            .registry
            .settings(conference.id)?
            .is_some_and(|s| s.auto_translate);

        Ok((conference, participant, auto_translate))
    })
    .await?;

    let connection_id = ConnectionId::new();
    tx.send(ServerMessage::Welcome {
        conference_id: conference.id,
        connection_id: connection_id.as_uuid(),
        participant_id: participant.id,
        display_name: participant.display_name.clone(),
        language_from: conference.language_from.clone(),
        language_to: conference.language_to.clone(),
    })
    .await
    .map_err(|_| Error::ConnectionClosed)?;

    Ok(Session {
        connection_id,
        participant_id: participant.id,
        is_host: participant.is_host,
        sender: SenderIdentity {
            participant_id: participant.id,
            display_name: participant.display_name,
        },
        auto_translate,
        conference,
    })
}

/// Dispatch client frames until the client leaves or disconnects
///
/// Also stops once the writer ends, which happens when the hub drops the
/// connection after a failed delivery.
async fn read_loop<S, R>(
    shared: &Arc<Shared<S>>,
    session: &Session,
    reader: &mut R,
    writer_done: &mut JoinHandle<()>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) where
    S: Storage + Send + 'static,
    R: AsyncRead + Unpin,
{
    loop {
        let msg = tokio::select! {
            result = read_frame::<ClientMessage, _>(reader) => result,
            _ = &mut *writer_done => {
                debug!(connection_id = %session.connection_id, "Dropped by hub");
                break;
            }
            _ = shutdown_rx.recv() => break,
        };

        match msg {
            // The host row stays present for the life of the conference
            Ok(ClientMessage::Leave) if session.is_host => break,
            Ok(ClientMessage::Leave) => {
                let conference_id = session.conference.id;
                let participant_id = session.participant_id;
                if let Err(e) = blocking(shared, move |shared| {
                    shared.roster.leave(conference_id, participant_id)
                })
                .await
                {
                    warn!(participant_id = %participant_id, error = %e, "Leave failed");
                }
                break;
            }
            Ok(msg) => handle_message(shared, session, msg).await,
            Err(Error::ConnectionClosed) => {
                debug!(connection_id = %session.connection_id, "Connection closed");
                break;
            }
            Err(e) => {
                warn!(connection_id = %session.connection_id, error = %e, "Read error");
                break;
            }
        }
    }
}

/// Handle an incoming message
async fn handle_message<S>(shared: &Arc<Shared<S>>, session: &Session, msg: ClientMessage)
where
    S: Storage + Send + 'static,
{
    let conference = &session.conference;

    match msg {
        ClientMessage::Chat { content } => {
            if content.trim().is_empty() {
                return;
            }

            shared
                .hub
                .broadcast(
                    conference.id,
                    Some(session.connection_id),
                    session.sender.clone(),
                    EventPayload::ChatMessage {
                        content: content.clone(),
                    },
                )
                .await;

            if session.auto_translate {
                shared
                    .hub
                    .relay_translation(
                        conference.id,
                        Some(session.connection_id),
                        session.sender.clone(),
                        TranslationRequest {
                            text: content,
                            source_language: conference.language_from.clone(),
                            target_language: conference.language_to.clone(),
                        },
                    )
                    .await;
            }
        }
        ClientMessage::Translate {
            text,
            source_language,
            target_language,
        } => {
            shared
                .hub
                .relay_translation(
                    conference.id,
                    Some(session.connection_id),
                    session.sender.clone(),
                    TranslationRequest {
                        text,
                        source_language: source_language
                            .unwrap_or_else(|| conference.language_from.clone()),
                        target_language: target_language
                            .unwrap_or_else(|| conference.language_to.clone()),
                    },
                )
                .await;
        }
        ClientMessage::Ping => {
            shared
                .hub
                .send_to(conference.id, session.connection_id, ServerMessage::Pong)
                .await;
        }
        ClientMessage::Join { .. } | ClientMessage::Leave | ClientMessage::Control { .. } => {
            debug!(connection_id = %session.connection_id, "Ignoring unexpected message type");
        }
    }
}

/// Answer control frames in order until the client goes away
async fn control_loop<S>(
    shared: &Arc<Shared<S>>,
    first: (Uuid, ControlCommand),
    mut reader: ReadHalf<TcpStream>,
    mut writer: WriteHalf<TcpStream>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) where
    S: Storage + Send + 'static,
{
    let mut pending = Some(first);

    loop {
        let (actor, command) = match pending.take() {
            Some(request) => request,
            None => {
                let msg = tokio::select! {
                    result = read_frame::<ClientMessage, _>(&mut reader) => result,
                    _ = shutdown_rx.recv() => break,
                };
                match msg {
                    Ok(ClientMessage::Control { actor, command }) => (actor, command),
                    Ok(ClientMessage::Ping) => {
                        if write_frame(&mut writer, &ServerMessage::Pong).await.is_err() {
                            break;
                        }
                        continue;
                    }
                    Ok(_) => {
                        let reply = ServerMessage::Failed {
                            kind: "protocol".into(),
                            message: "control connections only accept control frames".into(),
                        };
                        if write_frame(&mut writer, &reply).await.is_err() {
                            break;
                        }
                        continue;
                    }
                    Err(e) => {
                        debug!(error = %e, "Control connection closed");
                        break;
                    }
                }
            }
        };

        let reply = match blocking(shared, move |shared| {
            control::execute(&shared.lifecycle, &shared.roster, actor, command)
        })
        .await
        {
            Ok(reply) => ServerMessage::Reply { reply },
            Err(Error::Core(e)) => {
                debug!(actor = %actor, kind = e.kind(), error = %e, "Control request failed");
                ServerMessage::Failed {
                    kind: e.kind().into(),
                    message: e.to_string(),
                }
            }
            Err(e) => {
                error!(actor = %actor, error = %e, "Control request failed");
                ServerMessage::Failed {
                    kind: "internal".into(),
                    message: e.to_string(),
                }
            }
        };

        if let Err(e) = write_frame(&mut writer, &reply).await {
            debug!(error = %e, "Control write failed");
            break;
        }
    }
}

/// Writer task - sends queued messages to the client
async fn writer_task(mut writer: WriteHalf<TcpStream>, mut rx: mpsc::Receiver<ServerMessage>) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &msg).await {
            debug!(error = %e, "Write failed");
            break;
        }
    }
}

/// Run a store-backed operation off the async workers
async fn blocking<S, T, F>(shared: &Arc<Shared<S>>, f: F) -> Result<T>
where
    S: Storage + Send + 'static,
    T: Send + 'static,
    F: FnOnce(&Shared<S>) -> confer_core::Result<T> + Send + 'static,
{
    let shared = Arc::clone(shared);
    tokio::task::spawn_blocking(move || f(&shared))
        .await
        .map_err(|e| Error::Protocol(format!("Store task failed: {}", e)))?
        .map_err(Error::from)
}
