//! Agent-leg lifecycle: the outbound conversational-agent WebSocket, its
//! message dispatch, and the reconnection policy after abnormal disconnects.

use super::{
    protocol::{AgentEvent, TwilioOutbound},
    session::{SharedSession, send_frame},
    translate,
};
use crate::state::AppState;
use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket};
use futures_util::{
    SinkExt, StreamExt,
    stream::SplitSink,
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    net::TcpStream,
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::sleep,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::protocol::{
        CloseFrame, Message as WsMessage,
        frame::coding::CloseCode,
    },
};
use tracing::{debug, error, info, warn};

/// Delay before re-running agent setup after an abnormal disconnect.
const RECONNECT_DELAY: Duration = Duration::from_millis(3000);
/// Grace period between sending Twilio the stop frame and dropping its socket.
const HANGUP_GRACE: Duration = Duration::from_millis(2000);

/// Close code reported when the agent stream ends without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;
const NORMAL_CLOSURE: u16 = 1000;

type AgentSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type TwilioSink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Commands the telephony leg sends to the agent leg.
#[derive(Debug)]
pub enum AgentCommand {
    /// Base64 audio from a Twilio media frame.
    Audio(String),
    /// Close the agent connection with a normal-closure code and this reason.
    Hangup(&'static str),
}

/// Why one agent connection ended.
#[derive(Debug, PartialEq)]
enum LegExit {
    /// Deliberate shutdown; the leg is done for this call.
    Finished,
    /// Abnormal loss while the call is live; setup is re-run after a delay.
    Reconnect,
}

/// Spawns the task owning the agent leg for one call session.
pub(crate) fn spawn_agent_leg(
    state: Arc<AppState>,
    session: SharedSession,
    agent_open: Arc<AtomicBool>,
    twilio_tx: TwilioSink,
) -> (mpsc::Sender<AgentCommand>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(128);
    let handle = tokio::spawn(async move {
        run_agent_leg(state, session, agent_open, twilio_tx, rx).await;
    });
    (tx, handle)
}

/// Owns the whole agent-leg lifecycle for one call, reconnects included.
///
/// A single task holding both the connection and the retry delay is what
/// guarantees at most one live agent connection (or pending attempt) per
/// session. A delay that outlives the call is a no-op: the ended flag is
/// re-checked after every sleep.
async fn run_agent_leg(
    state: Arc<AppState>,
    session: SharedSession,
    agent_open: Arc<AtomicBool>,
    twilio_tx: TwilioSink,
    mut rx: mpsc::Receiver<AgentCommand>,
) {
    loop {
        let exit = match run_leg_once(&state, &session, &agent_open, &twilio_tx, &mut rx).await {
            Ok(exit) => exit,
            Err(e) => {
                error!(error = ?e, "Agent leg failed");
                LegExit::Reconnect
            }
        };
        agent_open.store(false, Ordering::Release);

        if exit == LegExit::Finished {
            break;
        }
        sleep(RECONNECT_DELAY).await;
        if session.lock().await.has_ended() {
            debug!("Skipping reconnect; call already ended");
            break;
        }
        info!("Reconnecting agent leg");
    }
    info!("Agent leg finished");
}

/// One connection attempt: fetch a signed URL, connect, initialize, relay
/// until the connection ends one way or another.
async fn run_leg_once(
    state: &Arc<AppState>,
    session: &SharedSession,
    agent_open: &Arc<AtomicBool>,
    twilio_tx: &TwilioSink,
    rx: &mut mpsc::Receiver<AgentCommand>,
) -> Result<LegExit> {
    let url = state
        .agent_endpoints
        .signed_url(&state.config.elevenlabs_agent_id)
        .await
        .context("Failed to fetch signed agent URL")?;

    let (ws_stream, _) = connect_async(url)
        .await
        .context("Failed to connect to agent WebSocket")?;
    info!("Connected to agent WebSocket");
    let (mut agent_tx, mut agent_rx) = ws_stream.split();

    // First message: dynamic variables only. The agent's configured prompt
    // and greeting are untouched.
    let init = {
        let guard = session.lock().await;
        translate::initiation_message(guard.custom_parameters(), guard.call_sid())
    };
    agent_tx
        .send(WsMessage::Text(serde_json::to_string(&init)?.into()))
        .await?;
    agent_open.store(true, Ordering::Release);

    loop {
        tokio::select! {
            command = rx.recv() => {
                match command {
                    Some(AgentCommand::Audio(payload)) => {
                        match translate::media_to_user_chunk(&payload) {
                            Some(chunk) => {
                                let serialized = serde_json::to_string(&chunk)?;
                                agent_tx.send(WsMessage::Text(serialized.into())).await?;
                            }
                            None => warn!("Discarding media frame with invalid base64 payload"),
                        }
                    }
                    // An explicit hangup, or the channel closing because the
                    // telephony handler is gone. Either way the agent socket
                    // must not outlive the call.
                    command => {
                        let reason = hangup_reason(&command);
                        info!(reason, "Closing agent connection");
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: reason.into(),
                        };
                        let _ = agent_tx.send(WsMessage::Close(Some(frame))).await;
                        return Ok(LegExit::Finished);
                    }
                }
            }
            message = agent_rx.next() => {
                match message {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_agent_message(&text, session, twilio_tx, &mut agent_tx).await?;
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        let code = frame
                            .as_ref()
                            .map(|f| u16::from(f.code))
                            .unwrap_or(ABNORMAL_CLOSURE);
                        let reason = frame.as_ref().map(|f| f.reason.to_string()).unwrap_or_default();
                        info!(code, reason = %reason, "Agent closed the connection");
                        return handle_agent_close(code, session, twilio_tx).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(error = %e, "Agent WebSocket error");
                        return Ok(LegExit::Reconnect);
                    }
                    None => {
                        warn!("Agent stream ended without a close frame");
                        return handle_agent_close(ABNORMAL_CLOSURE, session, twilio_tx).await;
                    }
                }
            }
        }
    }
}

/// Dispatches one inbound agent message. Malformed payloads are logged and
/// dropped; the connection stays open.
async fn handle_agent_message(
    text: &str,
    session: &SharedSession,
    twilio_tx: &TwilioSink,
    agent_tx: &mut AgentSink,
) -> Result<()> {
    let event = match serde_json::from_str::<AgentEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Discarding unparseable agent message");
            return Ok(());
        }
    };

    match event {
        AgentEvent::ConversationInitiationMetadata => {
            info!("Agent conversation initialized");
        }
        audio @ AgentEvent::Audio { .. } => {
            let (stream_sid, ended) = {
                let guard = session.lock().await;
                (guard.stream_sid().map(str::to_string), guard.has_ended())
            };
            match audio_disposition(&audio, stream_sid.as_deref(), ended) {
                AudioDisposition::Forward(frame) => {
                    send_frame(&mut *twilio_tx.lock().await, &frame).await?;
                }
                AudioDisposition::DropEnded => {
                    warn!("Dropping agent audio; call already ended");
                }
                AudioDisposition::DropNoStream => {
                    warn!("Dropping agent audio; stream id not yet known");
                }
                AudioDisposition::DropNoPayload => {
                    warn!("Agent audio message carried no payload");
                }
            }
        }
        AgentEvent::Interruption => {
            let stream_sid = session.lock().await.stream_sid().map(str::to_string);
            if let Some(stream_sid) = stream_sid {
                info!("Interruption; clearing buffered playback");
                send_frame(
                    &mut *twilio_tx.lock().await,
                    &translate::clear_frame(&stream_sid),
                )
                .await?;
            } else {
                debug!("Interruption before stream start; nothing to clear");
            }
        }
        AgentEvent::Ping { ping_event } => {
            let pong = translate::pong_for(ping_event.event_id);
            let serialized = serde_json::to_string(&pong)?;
            agent_tx.send(WsMessage::Text(serialized.into())).await?;
        }
        AgentEvent::AgentResponse {
            agent_response_event,
        } => {
            let response = agent_response_event
                .map(|e| e.agent_response)
                .unwrap_or_default();
            info!(response = %response, "Agent response");
        }
        AgentEvent::UserTranscript {
            user_transcription_event,
        } => {
            let transcript = user_transcription_event
                .map(|e| e.user_transcript)
                .unwrap_or_default();
            info!(transcript = %transcript, "User transcript");
        }
        AgentEvent::Unknown => {
            warn!("Unhandled agent message type");
        }
    }
    Ok(())
}

/// Applies the close policy after the agent connection went away.
///
/// An abnormal close while the call is live leaves the session untouched and
/// asks for a reconnect. A deliberate close ends the call on the telephony
/// side too: stop frame, deactivation, and a grace-delayed socket close.
async fn handle_agent_close(
    code: u16,
    session: &SharedSession,
    twilio_tx: &TwilioSink,
) -> Result<LegExit> {
    let (active, stream_sid) = {
        let guard = session.lock().await;
        (guard.is_active(), guard.stream_sid().map(str::to_string))
    };

    if close_disposition(code, active) == LegExit::Reconnect {
        return Ok(LegExit::Reconnect);
    }

    if active {
        if let Some(stream_sid) = stream_sid {
            send_frame(
                &mut *twilio_tx.lock().await,
                &translate::stop_frame(&stream_sid),
            )
            .await?;
            session.lock().await.deactivate();

            let twilio_tx = twilio_tx.clone();
            tokio::spawn(async move {
                sleep(HANGUP_GRACE).await;
                let _ = twilio_tx.lock().await.send(Message::Close(None)).await;
            });
        }
    }
    Ok(LegExit::Finished)
}

/// Reconnect only after an abnormal close while the call is still live.
fn close_disposition(code: u16, session_active: bool) -> LegExit {
    if session_active && code != NORMAL_CLOSURE {
        LegExit::Reconnect
    } else {
        LegExit::Finished
    }
}

/// Where one inbound agent audio message goes: forwarded to the known
/// stream, or dropped for a stated reason.
#[derive(Debug, PartialEq)]
enum AudioDisposition {
    Forward(TwilioOutbound),
    DropNoPayload,
    DropEnded,
    DropNoStream,
}

fn audio_disposition(
    event: &AgentEvent,
    stream_sid: Option<&str>,
    ended: bool,
) -> AudioDisposition {
    let Some(payload) = translate::agent_audio_payload(event) else {
        return AudioDisposition::DropNoPayload;
    };
    if ended {
        return AudioDisposition::DropEnded;
    }
    match stream_sid {
        Some(stream_sid) => {
            AudioDisposition::Forward(translate::audio_to_media(stream_sid, payload.to_string()))
        }
        None => AudioDisposition::DropNoStream,
    }
}

/// The close reason carried by a hangup command. A command channel that
/// returned `None` closed because the telephony handler is gone, which is
/// the same shutdown as a client disconnect.
fn hangup_reason(command: &Option<AgentCommand>) -> &'static str {
    match command {
        Some(AgentCommand::Hangup(reason)) => reason,
        _ => "client disconnected",
    }
}
