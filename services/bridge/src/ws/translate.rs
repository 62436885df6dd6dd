//! Pure, stateless translation between the Twilio and agent wire formats.

use super::protocol::{
    AgentEvent, AgentMessage, DynamicVariables, OutboundMedia, TwilioOutbound, UserAudioChunk,
};
use base64::Engine;
use std::collections::HashMap;

pub const DEFAULT_NAME: &str = "Cliente";
pub const DEFAULT_ORGANIZATION: &str = "Datágora";
pub const DEFAULT_CREDIT_AMOUNT: &str = "50000";
pub const FALLBACK_CLIENT_ID: &str = "unknown_call";
pub const FALLBACK_PHONE_NUMBER: &str = "unknown_number";

/// Assembles the variable set for `conversation_initiation_client_data` from
/// the call's custom parameters, applying the documented defaults for any
/// missing field. The client id falls back to the call id before the literal.
pub fn dynamic_variables(
    params: &HashMap<String, String>,
    call_sid: Option<&str>,
) -> DynamicVariables {
    let get = |key: &str| params.get(key).map(String::as_str);
    DynamicVariables {
        name: get("name").unwrap_or(DEFAULT_NAME).to_string(),
        organization: get("organization").unwrap_or(DEFAULT_ORGANIZATION).to_string(),
        credit_amount: get("credit_amount")
            .unwrap_or(DEFAULT_CREDIT_AMOUNT)
            .to_string(),
        client_id: get("client_id")
            .or(call_sid)
            .unwrap_or(FALLBACK_CLIENT_ID)
            .to_string(),
        phone_number: get("phone_number")
            .unwrap_or(FALLBACK_PHONE_NUMBER)
            .to_string(),
    }
}

/// Builds the initialization message sent right after the agent socket opens.
pub fn initiation_message(
    params: &HashMap<String, String>,
    call_sid: Option<&str>,
) -> AgentMessage {
    AgentMessage::ConversationInitiationClientData {
        dynamic_variables: dynamic_variables(params, call_sid),
    }
}

/// Wraps a Twilio media payload in the agent's audio envelope.
///
/// The decode/re-encode round trip is a no-op on the bytes; it validates the
/// payload and preserves the framing the agent expects. Returns `None` for
/// payloads that are not valid base64 (the caller logs and drops the frame).
pub fn media_to_user_chunk(payload: &str) -> Option<UserAudioChunk> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .ok()?;
    Some(UserAudioChunk {
        user_audio_chunk: base64::engine::general_purpose::STANDARD.encode(bytes),
    })
}

/// Extracts the audio payload from either shape the agent uses.
pub fn agent_audio_payload(event: &AgentEvent) -> Option<&str> {
    match event {
        AgentEvent::Audio { audio, audio_event } => audio
            .as_ref()
            .and_then(|a| a.chunk.as_deref())
            .or_else(|| audio_event.as_ref().and_then(|a| a.audio_base_64.as_deref())),
        _ => None,
    }
}

/// Agent audio → Twilio media frame addressed to `stream_sid`.
pub fn audio_to_media(stream_sid: &str, payload: String) -> TwilioOutbound {
    TwilioOutbound::Media {
        stream_sid: stream_sid.to_string(),
        media: OutboundMedia { payload },
    }
}

pub fn clear_frame(stream_sid: &str) -> TwilioOutbound {
    TwilioOutbound::Clear {
        stream_sid: stream_sid.to_string(),
    }
}

pub fn stop_frame(stream_sid: &str) -> TwilioOutbound {
    TwilioOutbound::Stop {
        stream_sid: stream_sid.to_string(),
    }
}

pub fn pong_for(event_id: serde_json::Value) -> AgentMessage {
    AgentMessage::Pong { event_id }
}
