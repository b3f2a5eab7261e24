//! # relay-core
//!
//! Shared types for the relay: connection handles and the JSON wire protocol.

pub mod errors;
pub mod ids;
pub mod wire;

pub use errors::WireError;
pub use ids::ConnectionId;
pub use wire::{ChatMessage, ClientFrame, Frame, PresenceSnapshot, ServerFrame, TypingEvent};
