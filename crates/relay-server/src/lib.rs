//! # relay-server
//!
//! WebSocket chat relay: the hub, per-connection sessions, and the HTTP
//! surface (`/ws`, `/history`, `/health`).

pub mod config;
pub mod connection;
pub mod error;
pub mod health;
pub mod hub;
pub mod server;
pub mod session;
pub mod shutdown;

pub use config::ServerConfig;
pub use error::ServerError;
pub use hub::Hub;
pub use server::{build_router, start, AppState, ServerHandle};
