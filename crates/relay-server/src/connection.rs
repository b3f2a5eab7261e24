//! Mapping between WebSocket transport messages and relay frames.

use axum::extract::ws::Message;
use relay_core::Frame;

/// What the inbound pump should do with one transport message.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// A text payload to decode as a client frame.
    Text(String),
    /// The peer asked to close.
    Close,
    /// Control or undecodable traffic.
    Ignored,
}

/// Classify a transport message. Binary frames are accepted when they carry
/// UTF-8 text.
pub fn classify(message: Message) -> Inbound {
    match message {
        Message::Text(text) => Inbound::Text(text.as_str().to_owned()),
        Message::Binary(data) => match std::str::from_utf8(&data) {
            Ok(text) => Inbound::Text(text.to_owned()),
            Err(_) => {
                tracing::debug!(len = data.len(), "received non-UTF8 binary frame");
                Inbound::Ignored
            }
        },
        Message::Close(_) => Inbound::Close,
        // Answered by the transport.
        Message::Ping(_) | Message::Pong(_) => Inbound::Ignored,
    }
}

pub fn text_message(frame: &Frame) -> Message {
    Message::Text(frame.to_string().into())
}

pub fn close_message() -> Message {
    Message::Close(None)
}
