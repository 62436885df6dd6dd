//! Callbridge API Library Crate
//!
//! This library contains all the core logic for the outbound-call bridge:
//! the application state, HTTP handlers for call initiation and TwiML,
//! the WebSocket relay between Twilio and the conversational agent, and
//! routing. The `bin/api.rs` binary is a thin wrapper around this library.

pub mod config;
pub mod elevenlabs;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod twilio;
pub mod ws;
