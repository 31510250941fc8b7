//! TCP client for the realtime server
//!
//! Used by tests and tooling. `connect` performs the join handshake and
//! only returns once the server has welcomed the connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::control::{ControlCommand, ControlReply};
use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{ClientMessage, ServerMessage};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// How to join a conference
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub conference_code: String,
    pub user_id: Option<Uuid>,
    pub display_name: Option<String>,
    pub participant_id: Option<Uuid>,
}

impl JoinRequest {
    pub fn guest(code: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            conference_code: code.into(),
            user_id: None,
            display_name: Some(display_name.into()),
            participant_id: None,
        }
    }

    pub fn user(code: impl Into<String>, user_id: Uuid) -> Self {
        Self {
            conference_code: code.into(),
            user_id: Some(user_id),
            display_name: None,
            participant_id: None,
        }
    }

    /// Reattach to an existing roster entry
    pub fn rejoin(code: impl Into<String>, participant_id: Uuid) -> Self {
        Self {
            conference_code: code.into(),
            user_id: None,
            display_name: None,
            participant_id: Some(participant_id),
        }
    }

    fn into_message(self) -> ClientMessage {
        ClientMessage::Join {
            conference_code: self.conference_code,
            user_id: self.user_id,
            display_name: self.display_name,
            participant_id: self.participant_id,
        }
    }
}

/// What the server told us when it accepted the join
#[derive(Debug, Clone)]
pub struct Welcome {
    pub conference_id: Uuid,
    pub connection_id: Uuid,
    pub participant_id: Uuid,
    pub display_name: String,
    pub language_from: String,
    pub language_to: String,
}

/// Client handle
pub struct Client {
    welcome: Welcome,
    state: Arc<RwLock<ConnectionState>>,
    event_rx: mpsc::Receiver<ServerMessage>,
    cmd_tx: mpsc::Sender<ClientCommand>,
}

enum ClientCommand {
    Send(ClientMessage),
    Disconnect,
}

impl Client {
    /// Connect and join a conference
    pub async fn connect(addr: SocketAddr, join: JoinRequest) -> Result<Self> {
        info!(addr = %addr, code = %join.conference_code, "Connecting to server");

        let stream = TcpStream::connect(addr).await?;
        let (mut reader, mut writer) = tokio::io::split(stream);

        write_frame(&mut writer, &join.into_message()).await?;

        let welcome = match read_frame::<ServerMessage, _>(&mut reader).await? {
            ServerMessage::Welcome {
                conference_id,
                connection_id,
                participant_id,
                display_name,
                language_from,
                language_to,
            } => Welcome {
                conference_id,
                connection_id,
                participant_id,
                display_name,
                language_from,
                language_to,
            },
            ServerMessage::Rejected { reason } => return Err(Error::Rejected(reason)),
            other => {
                return Err(Error::Protocol(format!(
                    "Expected welcome, got {:?}",
                    other
                )))
            }
        };

        let state = Arc::new(RwLock::new(ConnectionState::Connected));
        let (event_tx, event_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        tokio::spawn(connection_task(
            reader,
            writer,
            Arc::clone(&state),
            event_tx,
            cmd_rx,
        ));

        Ok(Client {
            welcome,
            state,
            event_rx,
            cmd_tx,
        })
    }

    pub fn welcome(&self) -> &Welcome {
        &self.welcome
    }

    /// Next message from the server; `None` once disconnected
    pub async fn next_event(&mut self) -> Option<ServerMessage> {
        self.event_rx.recv().await
    }

    pub async fn send_chat(&self, content: impl Into<String>) -> Result<()> {
        self.send(ClientMessage::Chat {
            content: content.into(),
        })
        .await
    }

    /// Request a translation; `None` languages use the conference's pair
    pub async fn translate(
        &self,
        text: impl Into<String>,
        source_language: Option<String>,
        target_language: Option<String>,
    ) -> Result<()> {
        self.send(ClientMessage::Translate {
            text: text.into(),
            source_language,
            target_language,
        })
        .await
    }

    pub async fn ping(&self) -> Result<()> {
        self.send(ClientMessage::Ping).await
    }

    /// Leave the roster; the server closes the connection afterwards
    pub async fn leave(&self) -> Result<()> {
        self.send(ClientMessage::Leave).await
    }

    /// Drop the connection without leaving the roster
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(ClientCommand::Disconnect).await;
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    async fn send(&self, msg: ClientMessage) -> Result<()> {
        self.cmd_tx
            .send(ClientCommand::Send(msg))
            .await
            .map_err(|_| Error::NotConnected)
    }
}

/// Request/response client for control connections
pub struct ControlClient {
    actor: Uuid,
    reader: ReadHalf<TcpStream>,
    writer: WriteHalf<TcpStream>,
}

impl ControlClient {
    /// Open a control connection acting as `actor`
    pub async fn connect(addr: SocketAddr, actor: Uuid) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = tokio::io::split(stream);
        Ok(Self {
            actor,
            reader,
            writer,
        })
    }

    /// Send one command and wait for its answer
    pub async fn request(&mut self, command: ControlCommand) -> Result<ControlReply> {
        let msg = ClientMessage::Control {
            actor: self.actor,
            command,
        };
        write_frame(&mut self.writer, &msg).await?;

        match read_frame::<ServerMessage, _>(&mut self.reader).await? {
            ServerMessage::Reply { reply } => Ok(reply),
            ServerMessage::Failed { kind, message } => Err(Error::Failed { kind, message }),
            ServerMessage::ServerShutdown => Err(Error::ConnectionClosed),
            other => Err(Error::Protocol(format!("Unexpected reply: {:?}", other))),
        }
    }
}

/// Main connection task
async fn connection_task(
    mut reader: ReadHalf<TcpStream>,
    mut writer: WriteHalf<TcpStream>,
    state: Arc<RwLock<ConnectionState>>,
    event_tx: mpsc::Sender<ServerMessage>,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
) {
    loop {
        tokio::select! {
            result = read_frame::<ServerMessage, _>(&mut reader) => {
                match result {
                    Ok(msg) => {
                        let shutdown = matches!(msg, ServerMessage::ServerShutdown);
                        if event_tx.send(msg).await.is_err() || shutdown {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Connection lost");
                        break;
                    }
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Send(msg)) => {
                        if let Err(e) = write_frame(&mut writer, &msg).await {
                            debug!(error = %e, "Send failed");
                            break;
                        }
                    }
                    Some(ClientCommand::Disconnect) | None => break,
                }
            }
        }
    }

    *state.write().await = ConnectionState::Disconnected;
}
