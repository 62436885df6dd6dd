//! Telephony-leg lifecycle: one Twilio media-stream connection per call.

use super::{
    agent::{self, AgentCommand},
    protocol::{TwilioEvent, TwilioOutbound},
};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::SplitSink,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Per-call state: the single source of truth for one call's identifiers,
/// custom parameters, and active flag. Created when Twilio opens the
/// media-stream connection and torn down when that connection closes.
#[derive(Debug, Default)]
pub struct CallSession {
    stream_sid: Option<String>,
    call_sid: Option<String>,
    custom_parameters: HashMap<String, String>,
    is_active: bool,
    ended: bool,
}

impl CallSession {
    /// Applies the `start` event. The stream id is set at most once; a
    /// duplicate start is rejected and the original identity kept.
    pub fn begin_stream(
        &mut self,
        stream_sid: String,
        call_sid: String,
        custom_parameters: HashMap<String, String>,
    ) -> bool {
        if self.stream_sid.is_some() || self.ended {
            return false;
        }
        self.stream_sid = Some(stream_sid);
        self.call_sid = Some(call_sid);
        self.custom_parameters = custom_parameters;
        self.is_active = true;
        true
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn call_sid(&self) -> Option<&str> {
        self.call_sid.as_deref()
    }

    pub fn custom_parameters(&self) -> &HashMap<String, String> {
        &self.custom_parameters
    }

    /// True from stream start until a stop event or connection closure.
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// True once the call has been deliberately ended. Distinct from
    /// `is_active`: a session that never saw a start event is inactive but
    /// not ended, and the agent leg may still retry its setup for it.
    pub fn has_ended(&self) -> bool {
        self.ended
    }

    /// Marks the call over. Irreversible; no reconnection of the agent leg
    /// happens past this point.
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.ended = true;
    }
}

pub type SharedSession = Arc<Mutex<CallSession>>;

/// Axum handler to upgrade the Twilio media-stream HTTP request.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for one Twilio media-stream connection.
///
/// Agent-leg setup is spawned immediately so it never blocks telephony
/// frames; audio that arrives before the agent socket is open is dropped,
/// never buffered.
#[instrument(name = "media_stream", skip_all, fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id: u32 = rand::random();
    tracing::Span::current().record("connection_id", connection_id);
    info!("Twilio media-stream connection opened");

    let (socket_tx, mut socket_rx) = socket.split();
    let socket_tx = Arc::new(Mutex::new(socket_tx));

    let session: SharedSession = Arc::new(Mutex::new(CallSession::default()));
    state.registry.register(connection_id, session.clone());

    let agent_open = Arc::new(AtomicBool::new(false));
    let (agent_tx, _agent_task) = agent::spawn_agent_leg(
        state.clone(),
        session.clone(),
        agent_open.clone(),
        socket_tx.clone(),
    );

    while let Some(msg_result) = socket_rx.next().await {
        let msg = match msg_result {
            Ok(msg) => msg,
            Err(e) => {
                error!(error = ?e, "Error receiving from Twilio WebSocket");
                break;
            }
        };
        match msg {
            Message::Text(text) => {
                let event = match serde_json::from_str::<TwilioEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "Discarding unparseable Twilio frame");
                        continue;
                    }
                };
                match event {
                    TwilioEvent::Start { start } => {
                        let accepted = session.lock().await.begin_stream(
                            start.stream_sid.clone(),
                            start.call_sid.clone(),
                            start.custom_parameters,
                        );
                        if accepted {
                            info!(
                                stream_sid = %start.stream_sid,
                                call_sid = %start.call_sid,
                                "Media stream started"
                            );
                        } else {
                            warn!("Ignoring duplicate start event; stream id already set");
                        }
                    }
                    TwilioEvent::Media { media } => {
                        if agent_open.load(Ordering::Acquire) {
                            // try_send: if the agent leg stalls, audio is
                            // dropped rather than buffered.
                            if agent_tx.try_send(AgentCommand::Audio(media.payload)).is_err() {
                                debug!("Dropped media frame; agent leg not accepting audio");
                            }
                        } else {
                            debug!("Dropped media frame; agent leg not open");
                        }
                    }
                    TwilioEvent::Stop => {
                        info!("Stop event received; call ended by telephony side");
                        session.lock().await.deactivate();
                        let _ = agent_tx.try_send(AgentCommand::Hangup("call ended"));
                    }
                    TwilioEvent::Unknown => {
                        warn!("Ignoring unrecognized Twilio event type");
                    }
                }
            }
            Message::Close(_) => {
                info!("Twilio closed the media-stream connection");
                break;
            }
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    // The telephony connection closing is the session's sole teardown
    // trigger: mark it over and close the agent leg if it is still open.
    session.lock().await.deactivate();
    let _ = agent_tx.try_send(AgentCommand::Hangup("client disconnected"));
    state.registry.deregister(connection_id);
    info!("Call session torn down");
}

/// Serializes and sends one frame over the Twilio media-stream socket.
pub(crate) async fn send_frame(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    frame: &TwilioOutbound,
) -> Result<()> {
    let serialized = serde_json::to_string(frame)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_session() -> CallSession {
        let mut session = CallSession::default();
        assert!(session.begin_stream(
            "ST1".to_string(),
            "CA1".to_string(),
            HashMap::from([("name".to_string(), "Ana".to_string())]),
        ));
        session
    }

    #[test]
    fn session_starts_empty_and_inactive() {
        let session = CallSession::default();
        assert_eq!(session.stream_sid(), None);
        assert_eq!(session.call_sid(), None);
        assert!(!session.is_active());
        assert!(!session.has_ended());
    }

    #[test]
    fn begin_stream_populates_identity_and_activates() {
        let session = started_session();
        assert_eq!(session.stream_sid(), Some("ST1"));
        assert_eq!(session.call_sid(), Some("CA1"));
        assert_eq!(session.custom_parameters()["name"], "Ana");
        assert!(session.is_active());
    }

    #[test]
    fn stream_sid_is_set_at_most_once() {
        let mut session = started_session();
        assert!(!session.begin_stream("ST2".to_string(), "CA2".to_string(), HashMap::new()));
        assert_eq!(session.stream_sid(), Some("ST1"));
        assert_eq!(session.call_sid(), Some("CA1"));
    }

    #[test]
    fn deactivate_is_irreversible() {
        let mut session = started_session();
        session.deactivate();
        assert!(!session.is_active());
        assert!(session.has_ended());
        // A late start event must not resurrect the session.
        assert!(!session.begin_stream("ST2".to_string(), "CA2".to_string(), HashMap::new()));
        assert!(!session.is_active());
    }

    #[test]
    fn session_without_start_is_inactive_but_not_ended() {
        let session = CallSession::default();
        assert!(!session.is_active());
        assert!(!session.has_ended());
    }
}
