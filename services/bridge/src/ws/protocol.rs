//! Wire formats for the two legs of the relay: the Twilio media-stream
//! protocol and the ElevenLabs conversational-agent protocol.
//!
//! Both sides use JSON frames discriminated by a tag field. Unknown tags
//! deserialize into an explicit `Unknown` variant so new message kinds fail
//! closed: logged and ignored, never silently matched.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// --- Telephony leg: inbound frames from Twilio ---

/// Frames Twilio sends over the media-stream WebSocket.
#[derive(Deserialize, Debug)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioEvent {
    /// The media stream has started; carries the stream identity and the
    /// custom parameters attached by the TwiML.
    Start { start: StreamStart },
    /// One chunk of base64 call audio.
    Media { media: MediaPayload },
    /// The call ended on the telephony side.
    Stop,
    /// Any other event type (e.g. `connected`, `mark`). Logged and ignored.
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StreamStart {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid")]
    pub call_sid: String,
    #[serde(rename = "customParameters", default)]
    pub custom_parameters: HashMap<String, String>,
}

#[derive(Deserialize, Debug)]
pub struct MediaPayload {
    pub payload: String,
}

// --- Telephony leg: outbound frames to Twilio ---

/// Frames this service sends back over the media-stream WebSocket.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioOutbound {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    /// Discards any audio Twilio has buffered for playback.
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
    Stop {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OutboundMedia {
    pub payload: String,
}

// --- Agent leg: inbound messages from the agent ---

/// Messages the conversational agent sends over its WebSocket.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Informational; no action beyond logging.
    ConversationInitiationMetadata,
    /// Agent speech. The payload arrives in one of two shapes depending on
    /// the agent version: `audio.chunk` or `audio_event.audio_base_64`.
    Audio {
        #[serde(default)]
        audio: Option<AudioChunk>,
        #[serde(default)]
        audio_event: Option<AudioEvent>,
    },
    /// The caller spoke over the agent; buffered playback must be discarded.
    Interruption,
    /// Liveness probe; answered immediately with a pong echoing the id.
    Ping { ping_event: PingEvent },
    AgentResponse {
        #[serde(default)]
        agent_response_event: Option<AgentResponseEvent>,
    },
    UserTranscript {
        #[serde(default)]
        user_transcription_event: Option<UserTranscriptionEvent>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug)]
pub struct AudioChunk {
    #[serde(default)]
    pub chunk: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct AudioEvent {
    #[serde(default)]
    pub audio_base_64: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct PingEvent {
    /// Echoed verbatim in the pong; the agent has used both numeric and
    /// string ids across versions, so it is kept as an opaque value.
    #[serde(default)]
    pub event_id: serde_json::Value,
}

#[derive(Deserialize, Debug)]
pub struct AgentResponseEvent {
    #[serde(default)]
    pub agent_response: String,
}

#[derive(Deserialize, Debug)]
pub struct UserTranscriptionEvent {
    #[serde(default)]
    pub user_transcript: String,
}

// --- Agent leg: outbound messages to the agent ---

/// Typed messages this service sends to the agent.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    /// First message after the socket opens. Carries dynamic variables only;
    /// it must not override the agent's configured prompt or greeting.
    ConversationInitiationClientData { dynamic_variables: DynamicVariables },
    Pong { event_id: serde_json::Value },
}

/// Caller audio toward the agent uses a bare single-field envelope with no
/// type tag.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserAudioChunk {
    pub user_audio_chunk: String,
}

/// The variable set substituted into the agent conversation at start.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DynamicVariables {
    pub name: String,
    pub organization: String,
    pub credit_amount: String,
    pub client_id: String,
    pub phone_number: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_twilio_start_event() {
        let raw = r#"{
            "event": "start",
            "sequenceNumber": "1",
            "start": {
                "streamSid": "ST1",
                "callSid": "CA1",
                "accountSid": "AC1",
                "customParameters": {"name": "Ana", "client_id": "c-42"}
            }
        }"#;
        let event: TwilioEvent = serde_json::from_str(raw).unwrap();
        match event {
            TwilioEvent::Start { start } => {
                assert_eq!(start.stream_sid, "ST1");
                assert_eq!(start.call_sid, "CA1");
                assert_eq!(start.custom_parameters["name"], "Ana");
            }
            other => panic!("Expected start event, got {:?}", other),
        }
    }

    #[test]
    fn parses_twilio_media_and_stop_events() {
        let media: TwilioEvent =
            serde_json::from_str(r#"{"event": "media", "media": {"payload": "AAAA"}}"#).unwrap();
        assert!(matches!(
            media,
            TwilioEvent::Media { media: MediaPayload { ref payload } } if payload == "AAAA"
        ));

        let stop: TwilioEvent =
            serde_json::from_str(r#"{"event": "stop", "stop": {"callSid": "CA1"}}"#).unwrap();
        assert!(matches!(stop, TwilioEvent::Stop));
    }

    #[test]
    fn unknown_twilio_event_types_fail_closed() {
        let event: TwilioEvent =
            serde_json::from_str(r#"{"event": "connected", "protocol": "Call"}"#).unwrap();
        assert!(matches!(event, TwilioEvent::Unknown));
    }

    #[test]
    fn serializes_outbound_media_frame() {
        let frame = TwilioOutbound::Media {
            stream_sid: "ST1".to_string(),
            media: OutboundMedia {
                payload: "AAAA".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"event": "media", "streamSid": "ST1", "media": {"payload": "AAAA"}})
        );
    }

    #[test]
    fn serializes_clear_and_stop_frames() {
        assert_eq!(
            serde_json::to_value(TwilioOutbound::Clear {
                stream_sid: "ST1".to_string()
            })
            .unwrap(),
            json!({"event": "clear", "streamSid": "ST1"})
        );
        assert_eq!(
            serde_json::to_value(TwilioOutbound::Stop {
                stream_sid: "ST1".to_string()
            })
            .unwrap(),
            json!({"event": "stop", "streamSid": "ST1"})
        );
    }

    #[test]
    fn parses_agent_audio_in_both_shapes() {
        let nested_chunk: AgentEvent =
            serde_json::from_str(r#"{"type": "audio", "audio": {"chunk": "QUJD"}}"#).unwrap();
        match nested_chunk {
            AgentEvent::Audio { audio, .. } => {
                assert_eq!(audio.unwrap().chunk.as_deref(), Some("QUJD"))
            }
            other => panic!("Expected audio event, got {:?}", other),
        }

        let nested_event: AgentEvent = serde_json::from_str(
            r#"{"type": "audio", "audio_event": {"audio_base_64": "QUJD", "event_id": 7}}"#,
        )
        .unwrap();
        match nested_event {
            AgentEvent::Audio { audio_event, .. } => {
                assert_eq!(audio_event.unwrap().audio_base_64.as_deref(), Some("QUJD"))
            }
            other => panic!("Expected audio event, got {:?}", other),
        }
    }

    #[test]
    fn parses_ping_with_string_or_numeric_id() {
        let string_id: AgentEvent =
            serde_json::from_str(r#"{"type": "ping", "ping_event": {"event_id": "abc"}}"#)
                .unwrap();
        match string_id {
            AgentEvent::Ping { ping_event } => assert_eq!(ping_event.event_id, json!("abc")),
            other => panic!("Expected ping, got {:?}", other),
        }

        let numeric_id: AgentEvent = serde_json::from_str(
            r#"{"type": "ping", "ping_event": {"event_id": 12, "ping_ms": 50}}"#,
        )
        .unwrap();
        match numeric_id {
            AgentEvent::Ping { ping_event } => assert_eq!(ping_event.event_id, json!(12)),
            other => panic!("Expected ping, got {:?}", other),
        }
    }

    #[test]
    fn unknown_agent_message_types_fail_closed() {
        let event: AgentEvent =
            serde_json::from_str(r#"{"type": "vad_score", "vad_score_event": {"score": 0.9}}"#)
                .unwrap();
        assert!(matches!(event, AgentEvent::Unknown));
    }

    #[test]
    fn serializes_initiation_message_with_type_tag() {
        let message = AgentMessage::ConversationInitiationClientData {
            dynamic_variables: DynamicVariables {
                name: "Ana".to_string(),
                organization: "Datágora".to_string(),
                credit_amount: "50000".to_string(),
                client_id: "CA1".to_string(),
                phone_number: "+5491155550000".to_string(),
            },
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "conversation_initiation_client_data");
        assert_eq!(json["dynamic_variables"]["name"], "Ana");
        assert_eq!(json["dynamic_variables"]["organization"], "Datágora");
    }

    #[test]
    fn serializes_user_audio_chunk_without_type_tag() {
        let chunk = UserAudioChunk {
            user_audio_chunk: "QUJD".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({"user_audio_chunk": "QUJD"})
        );
    }
}
