//! Background services

pub mod heartbeat;

pub use heartbeat::{HeartbeatHandle, HeartbeatService};
