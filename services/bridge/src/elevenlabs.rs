//! ElevenLabs collaborator: fetches the short-lived signed URL used to open
//! the conversational-agent WebSocket.

use async_trait::async_trait;
use serde::Deserialize;

const SIGNED_URL_ENDPOINT: &str =
    "https://api.elevenlabs.io/v1/convai/conversation/get_signed_url";

#[derive(Debug, thiserror::Error)]
pub enum SignedUrlError {
    #[error("transport error fetching signed URL: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("signed URL request failed with status {0}")]
    Status(reqwest::StatusCode),
}

/// Returns a short-lived authenticated WebSocket URL for an agent.
#[async_trait]
pub trait SignedUrlProvider: Send + Sync {
    async fn signed_url(&self, agent_id: &str) -> Result<String, SignedUrlError>;
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    signed_url: String,
}

pub struct ElevenLabsClient {
    http: reqwest::Client,
    api_key: String,
}

impl ElevenLabsClient {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self { http, api_key }
    }
}

#[async_trait]
impl SignedUrlProvider for ElevenLabsClient {
    async fn signed_url(&self, agent_id: &str) -> Result<String, SignedUrlError> {
        let response = self
            .http
            .get(SIGNED_URL_ENDPOINT)
            .query(&[("agent_id", agent_id)])
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SignedUrlError::Status(status));
        }

        let body: SignedUrlResponse = response.json().await?;
        Ok(body.signed_url)
    }
}
