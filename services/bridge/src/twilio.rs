//! Twilio REST collaborator: places outbound calls and builds the TwiML
//! that directs the platform to open its media stream against this service.

use async_trait::async_trait;
use serde_json::Value;
use tracing::error;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("transport error talking to Twilio: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Twilio rejected the call request ({status}): {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Twilio accepted the call but returned no call sid")]
    MissingCallSid,
}

/// Places an outbound call through the telephony platform.
#[async_trait]
pub trait CallInitiator: Send + Sync {
    /// Asks the platform to dial `to` and fetch call instructions from
    /// `twiml_url` once the call connects. Returns the platform's call id.
    async fn place_call(&self, to: &str, twiml_url: &str) -> Result<String, CallError>;
}

pub struct TwilioClient {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioClient {
    pub fn new(
        http: reqwest::Client,
        account_sid: String,
        auth_token: String,
        from_number: String,
    ) -> Self {
        Self {
            http,
            account_sid,
            auth_token,
            from_number,
        }
    }
}

#[async_trait]
impl CallInitiator for TwilioClient {
    async fn place_call(&self, to: &str, twiml_url: &str) -> Result<String, CallError> {
        let url = format!("{}/Accounts/{}/Calls.json", TWILIO_API_BASE, self.account_sid);
        let response = self
            .http
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", to),
                ("From", self.from_number.as_str()),
                ("Url", twiml_url),
                ("Method", "POST"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, %body, "Twilio call request failed");
            return Err(CallError::Rejected { status, body });
        }

        let body: Value = response.json().await?;
        call_sid_from_response(&body)
    }
}

/// Pulls the call sid out of a successful Calls API response.
fn call_sid_from_response(body: &Value) -> Result<String, CallError> {
    body["sid"]
        .as_str()
        .map(str::to_string)
        .ok_or(CallError::MissingCallSid)
}

/// Builds the TwiML that tells Twilio to open a media stream at `ws_url`,
/// attaching the call metadata as stream parameters.
pub fn stream_twiml(ws_url: &str, parameters: &[(String, String)]) -> String {
    let mut params_xml = String::new();
    for (name, value) in parameters {
        params_xml.push_str(&format!(
            "\n      <Parameter name=\"{}\" value=\"{}\" />",
            xml_escape(name),
            xml_escape(value)
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <Stream url="{}">{}
    </Stream>
  </Connect>
</Response>"#,
        xml_escape(ws_url),
        params_xml
    )
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twiml_embeds_stream_url_and_parameters() {
        let params = vec![
            ("name".to_string(), "Ana".to_string()),
            ("organization".to_string(), "Datágora".to_string()),
        ];
        let twiml = stream_twiml("wss://bridge.example.com/outbound-media-stream", &params);

        assert!(twiml.contains(r#"<Stream url="wss://bridge.example.com/outbound-media-stream">"#));
        assert!(twiml.contains(r#"<Parameter name="name" value="Ana" />"#));
        assert!(twiml.contains(r#"<Parameter name="organization" value="Datágora" />"#));
        assert!(twiml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
    }

    #[test]
    fn twiml_escapes_xml_metacharacters() {
        let params = vec![("name".to_string(), r#"A<B>&"C'"#.to_string())];
        let twiml = stream_twiml("wss://example.com/ws", &params);

        assert!(twiml.contains("A&lt;B&gt;&amp;&quot;C&apos;"));
        assert!(!twiml.contains(r#"value="A<B>"#));
    }

    #[test]
    fn twiml_without_parameters_has_no_parameter_elements() {
        let twiml = stream_twiml("wss://example.com/ws", &[]);
        assert!(!twiml.contains("<Parameter"));
    }

    #[test]
    fn call_sid_is_read_from_the_response_body() {
        let body = serde_json::json!({"sid": "CA123", "status": "queued"});
        assert_eq!(call_sid_from_response(&body).unwrap(), "CA123");
    }

    #[test]
    fn response_without_call_sid_is_an_error() {
        let body = serde_json::json!({"status": "queued"});
        assert!(matches!(
            call_sid_from_response(&body),
            Err(CallError::MissingCallSid)
        ));
    }
}
