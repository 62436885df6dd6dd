//! Request and response payloads for the HTTP surface.

use serde::{Deserialize, Serialize};

/// Body of `POST /outbound-call`.
#[derive(Deserialize, Debug)]
pub struct OutboundCallPayload {
    /// Destination phone number in E.164 form.
    pub number: String,
    /// Displayed name of the callee, substituted into the agent conversation.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    /// Numeric-as-string amount quoted by the agent.
    #[serde(default)]
    pub credit_amount: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct OutboundCallResponse {
    pub success: bool,
    pub message: String,
    #[serde(rename = "callSid")]
    pub call_sid: String,
}

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_call_payload_accepts_partial_metadata() {
        let payload: OutboundCallPayload =
            serde_json::from_str(r#"{"number": "+5491155550000", "name": "Ana"}"#).unwrap();
        assert_eq!(payload.number, "+5491155550000");
        assert_eq!(payload.name.as_deref(), Some("Ana"));
        assert_eq!(payload.organization, None);
        assert_eq!(payload.credit_amount, None);
    }

    #[test]
    fn outbound_call_response_uses_twilio_casing() {
        let response = OutboundCallResponse {
            success: true,
            message: "Call initiated".to_string(),
            call_sid: "CA123".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["callSid"], "CA123");
    }
}
