//! Shared Application State
//!
//! This module defines the `AppState` struct holding the shared, clonable
//! resources (configuration and the external-service clients) plus the
//! registry of live call sessions.

use crate::{config::Config, elevenlabs::SignedUrlProvider, twilio::CallInitiator};
use crate::ws::session::SharedSession;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// The shared application state, created once at startup and passed to all
/// handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub calls: Arc<dyn CallInitiator>,
    pub agent_endpoints: Arc<dyn SignedUrlProvider>,
    pub registry: SessionRegistry,
}

/// Explicit registry of live call sessions, keyed by connection identity.
/// Entries live exactly as long as their Twilio connection.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<u32, SharedSession>>>,
}

impl SessionRegistry {
    pub fn register(&self, connection_id: u32, session: SharedSession) {
        self.inner
            .lock()
            .expect("session registry lock poisoned")
            .insert(connection_id, session);
    }

    pub fn deregister(&self, connection_id: u32) -> Option<SharedSession> {
        self.inner
            .lock()
            .expect("session registry lock poisoned")
            .remove(&connection_id)
    }

    pub fn active_calls(&self) -> usize {
        self.inner
            .lock()
            .expect("session registry lock poisoned")
            .len()
    }
}
