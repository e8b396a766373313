//! HTTP surface
//!
//! REST endpoints for harvest, validation and hub diagnostics plus the
//! observer WebSocket.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::{ApiServer, AppState};
