//! Confer Network Library
//!
//! Realtime fanout for live conferences.
//!
//! # Architecture
//!
//! - **Server**: accepts TCP connections, one task per connection
//! - **Control**: lifecycle and moderation requests on their own connections
//! - **Hub**: per-conference connection sets and best-effort fanout
//! - **Translation**: external backend behind a trait, with a fallback marker
//! - **Protocol**: length-prefixed JSON messages
//!
//! # Usage
//!
//! ```ignore
//! let hub = Arc::new(ConnectionHub::new(translator, timeout));
//! let server = Server::start(addr, lifecycle, hub).await?;
//!
//! let mut client = Client::connect(server.addr(), JoinRequest::guest("abc-defg-hij", "Alex")).await?;
//! client.send_chat("hello").await?;
//! while let Some(msg) = client.next_event().await {
//!     if let ServerMessage::Event(event) = msg { /* handle */ }
//! }
//! ```

pub mod client;
pub mod control;
pub mod error;
mod frame;
pub mod hub;
pub mod protocol;
pub mod server;
pub mod translation;

pub use client::{Client, ConnectionState, ControlClient, JoinRequest, Welcome};
pub use control::{ControlCommand, ControlReply};
pub use error::{Error, Result};
pub use hub::{ConnectionHub, ConnectionId, TranslationRequest};
pub use protocol::{ClientMessage, EventPayload, RealtimeEvent, SenderIdentity, ServerMessage};
pub use server::Server;
pub use translation::{
    fallback_text, supported_languages, HttpTranslator, Language, TranslationUnavailable,
    Translator, Unconfigured,
};

/// Default port for the realtime server
pub const DEFAULT_PORT: u16 = 8001;
