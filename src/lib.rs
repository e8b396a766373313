//! Proxyscout - proxy harvesting and validation hub
//!
//! Collects public proxy lists, checks them through real test sites and
//! streams progress to connected observers.
//!
//! ## Features
//!
//! - Concurrent harvest across plain-text, JSON API and HTML table sources
//! - HTTP, HTTPS (CONNECT), SOCKS4 and SOCKS5 validation with anonymity classification
//! - Event hub with bounded per-observer queues, heartbeats and idle eviction
//! - REST endpoints and a WebSocket event stream

pub mod api;
pub mod config;
pub mod error;
pub mod harvest;
pub mod hub;
pub mod models;
pub mod retry;
pub mod services;
pub mod validator;

pub use config::Config;
pub use error::{Result, ScoutError};
pub use hub::EventHub;
