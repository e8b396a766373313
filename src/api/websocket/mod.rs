//! WebSocket handlers

pub mod events;

use std::time::Duration;

/// Upper bound for a single frame write before the observer is dropped
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);
