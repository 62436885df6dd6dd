//! Axum Handlers for the HTTP surface
//!
//! Call initiation (`/outbound-call`), the TwiML callback Twilio fetches when
//! the call connects (`/outbound-call-twiml`), and a liveness probe.

use axum::{
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use std::{collections::HashMap, sync::Arc};
use tracing::{error, info};

use crate::{
    models::{ErrorResponse, OutboundCallPayload, OutboundCallResponse},
    state::AppState,
    twilio::{self, CallError},
};

pub enum ApiError {
    BadRequest(String),
    /// The telephony platform refused or could not be reached. Surfaced to
    /// the caller as a structured failure; never retried here.
    BadGateway(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::BadGateway(message) => {
                (StatusCode::BAD_GATEWAY, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl From<CallError> for ApiError {
    fn from(err: CallError) -> Self {
        error!(error = %err, "Call placement failed");
        Self::BadGateway(err.to_string())
    }
}

/// Place an outbound call to the given number, with the call metadata
/// attached so the media stream can hand it to the agent.
pub async fn outbound_call(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OutboundCallPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.number.trim().is_empty() {
        return Err(ApiError::BadRequest("`number` is required".to_string()));
    }

    let twiml_url = twiml_callback_url(&state.config.server_url, &payload)?;
    let call_sid = state
        .calls
        .place_call(&payload.number, twiml_url.as_str())
        .await?;

    info!(%call_sid, "Outbound call initiated");
    Ok((
        StatusCode::OK,
        Json(OutboundCallResponse {
            success: true,
            message: "Call initiated".to_string(),
            call_sid,
        }),
    ))
}

/// Builds the TwiML callback URL carrying the call metadata as query
/// parameters, so the TwiML handler can attach them to the media stream.
fn twiml_callback_url(
    server_url: &str,
    payload: &OutboundCallPayload,
) -> Result<reqwest::Url, ApiError> {
    let mut params: Vec<(&str, &str)> = vec![("phone_number", payload.number.as_str())];
    for (key, value) in [
        ("name", &payload.name),
        ("organization", &payload.organization),
        ("credit_amount", &payload.credit_amount),
        ("client_id", &payload.client_id),
    ] {
        if let Some(value) = value {
            params.push((key, value.as_str()));
        }
    }

    reqwest::Url::parse_with_params(&format!("{}/outbound-call-twiml", server_url), params)
        .map_err(|e| ApiError::InternalServerError(e.into()))
}

/// Returns the TwiML directing Twilio to open its media stream against this
/// service, with the query parameters attached as stream parameters.
pub async fn outbound_call_twiml(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let ws_url = format!(
        "{}/outbound-media-stream",
        state
            .config
            .server_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1)
    );

    // Sorted for a stable parameter order in the generated document.
    let mut parameters: Vec<(String, String)> = params.into_iter().collect();
    parameters.sort();

    let twiml = twilio::stream_twiml(&ws_url, &parameters);
    ([(header::CONTENT_TYPE, "text/xml")], twiml)
}

pub async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "active_calls": state.registry.active_calls(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutboundCallPayload;

    fn payload(number: &str) -> OutboundCallPayload {
        OutboundCallPayload {
            number: number.to_string(),
            name: Some("Ana".to_string()),
            organization: None,
            credit_amount: Some("75000".to_string()),
            client_id: None,
        }
    }

    #[test]
    fn twiml_callback_url_carries_only_supplied_metadata() {
        let Ok(url) = twiml_callback_url("https://bridge.example.com", &payload("+5491155550000"))
        else {
            panic!("URL should build");
        };

        assert!(url.as_str().starts_with("https://bridge.example.com/outbound-call-twiml?"));
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["phone_number"], "+5491155550000");
        assert_eq!(query["name"], "Ana");
        assert_eq!(query["credit_amount"], "75000");
        assert!(!query.contains_key("organization"));
        assert!(!query.contains_key("client_id"));
    }

    #[test]
    fn twiml_callback_url_percent_encodes_values() {
        let mut call = payload("+5491155550000");
        call.name = Some("Ana María".to_string());
        let Ok(url) = twiml_callback_url("https://bridge.example.com", &call) else {
            panic!("URL should build");
        };
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["name"], "Ana María");
    }
}
