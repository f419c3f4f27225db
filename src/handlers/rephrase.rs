use std::sync::Arc;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::handlers::response::json_response;
use crate::rephraser::normalizer::normalize;
use crate::rephraser::service::RephraseService;

pub const MESSAGE_REQUIRED_ERROR: &str = "Message is required";
pub const REPHRASE_FAILED_ERROR: &str = "Failed to rephrase message";

#[derive(Debug, Deserialize)]
struct RephraseRequest {
    #[serde(default)]
    message: Option<String>,
}

pub async fn rephrase(
    request: Request<Incoming>,
    service: Arc<RephraseService>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    let body = request.collect().await?.to_bytes();
    Ok(rephrase_message(&body, service).await)
}

/// Validates the payload, asks the completion service for the raw reply, and
/// normalizes it into the three-variant result. A missing or blank message
/// short-circuits to 400 without touching the upstream; upstream failures
/// surface as a generic 500 with detail logged server-side only.
pub async fn rephrase_message(
    body: &[u8],
    service: Arc<RephraseService>,
) -> Response<BoxBody<Bytes, hyper::Error>> {
    let message = match serde_json::from_slice::<RephraseRequest>(body) {
        Ok(RephraseRequest {
            message: Some(message),
        }) if !message.trim().is_empty() => message,
        Ok(_) => {
            debug!("rejected rephrase request with missing or empty message");
            return json_response(
                StatusCode::BAD_REQUEST,
                &serde_json::json!({"error": MESSAGE_REQUIRED_ERROR}),
            );
        }
        Err(err) => {
            debug!("failed to parse rephrase request body: {}", err);
            return json_response(
                StatusCode::BAD_REQUEST,
                &serde_json::json!({"error": MESSAGE_REQUIRED_ERROR}),
            );
        }
    };

    info!(
        message_len = message.len(),
        "rephrase request received, request type: chat_completion"
    );

    let raw = match service.rephrase(&message).await {
        Ok(raw) => raw,
        Err(err) => {
            warn!("rephrase call failed: {}", err);
            return json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &serde_json::json!({"error": REPHRASE_FAILED_ERROR}),
            );
        }
    };

    let rephrased = normalize(&raw);
    json_response(
        StatusCode::OK,
        &serde_json::json!({ "rephrased": rephrased }),
    )
}
