//! Bidirectional media relay between a Twilio media stream and the
//! conversational agent. It is structured into submodules for clarity:
//!
//! - `protocol`: Defines both legs' JSON frame formats.
//! - `translate`: Pure functions mapping one protocol's frames to the other's.
//! - `session`: Per-call state and the Twilio-side connection lifecycle.
//! - `agent`: The outbound agent connection, its dispatch, and reconnection.

mod agent;
pub mod protocol;
pub mod session;
pub mod translate;

pub use session::ws_handler;
