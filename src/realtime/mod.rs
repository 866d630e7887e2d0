pub mod client;
pub mod messages;

pub use client::{Connector, Transport, WebSocketConnector, WebSocketTransport};
pub use messages::{
    decode_server_frame, ClientEvent, Inbound, ServerEvent, SessionSettings, TranscriptionSettings,
};
