use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::apis::openai::{
    ChatCompletionsRequest, ChatCompletionsResponse, Message, Role, CHAT_COMPLETIONS_PATH,
};

const SYSTEM_PROMPT: &str = "You are a helpful assistant that always rephrases text into 3 \
    distinct styles: Formal, Polite, and Casual. Return them clearly labeled as 1. Formal, \
    2. Polite, 3. Casual.";

// Output cap: keeps a misbehaving model from producing unbounded completions.
const MAX_COMPLETION_TOKENS: u32 = 300;
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RephraseError {
    #[error("Failed to send request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Upstream returned status {0}: {1}")]
    UpstreamStatus(reqwest::StatusCode, String),

    #[error("Failed to parse JSON: {0}, JSON: {1}")]
    Json(serde_json::Error, String),

    #[error("No choices in completion response")]
    EmptyChoices,
}

pub type Result<T> = std::result::Result<T, RephraseError>;

/// Client for the upstream chat-completion service. Constructed once at
/// startup and shared across request tasks; holds no per-request state.
pub struct RephraseService {
    completions_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl RephraseService {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self::with_timeout(base_url, api_key, model, UPSTREAM_TIMEOUT)
    }

    /// Same as [`new`](Self::new) with a caller-chosen upstream deadline.
    pub fn with_timeout(
        base_url: String,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        RephraseService {
            completions_url: format!(
                "{}{}",
                base_url.trim_end_matches('/'),
                CHAT_COMPLETIONS_PATH
            ),
            api_key,
            model,
            client,
        }
    }

    /// Asks the model for the three rephrasings of `message` and returns the
    /// first candidate's text, trimmed. The reply is free text; turning it
    /// into the three-variant shape is the normalizer's job.
    pub async fn rephrase(&self, message: &str) -> Result<String> {
        let request = self.build_request(message);

        debug!(
            endpoint = %self.completions_url,
            model = %self.model,
            "sending rephrase request to completion service"
        );

        let start_time = std::time::Instant::now();

        // The call has no upstream side effects, so one retry on transport
        // failure is safe. Error statuses are deterministic and not retried.
        let res = match self.send(&request).await {
            Ok(res) => res,
            Err(err) if err.is_connect() || err.is_timeout() => {
                warn!("transient upstream failure, retrying once: {}", err);
                self.send(&request).await?
            }
            Err(err) => return Err(RephraseError::Request(err)),
        };

        let status = res.status();
        let body = res.text().await?;
        let upstream_response_time = start_time.elapsed();

        if !status.is_success() {
            warn!("upstream returned {}: {}", status, body);
            return Err(RephraseError::UpstreamStatus(status, body));
        }

        let completion: ChatCompletionsResponse = match serde_json::from_str(&body) {
            Ok(completion) => completion,
            Err(err) => {
                warn!("Failed to parse JSON: {}. Body: {}", err, body);
                return Err(RephraseError::Json(err, body));
            }
        };

        let content = completion
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .ok_or(RephraseError::EmptyChoices)?;

        debug!(
            "completion received, response time: {}ms",
            upstream_response_time.as_millis()
        );

        Ok(content.trim().to_string())
    }

    fn build_request(&self, message: &str) -> ChatCompletionsRequest {
        ChatCompletionsRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: Role::System,
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: Role::User,
                    content: format!(
                        "Rephrase this message into 3 different styles:\n\n\"{}\"",
                        message
                    ),
                },
            ],
            max_tokens: Some(MAX_COMPLETION_TOKENS),
            temperature: None,
        }
    }

    async fn send(&self, request: &ChatCompletionsRequest) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(&self.completions_url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;

    fn service_for(server: &Server) -> RephraseService {
        RephraseService::new(
            server.url(),
            "test-key".to_string(),
            "gpt-4o-mini".to_string(),
        )
    }

    fn completion_body(content: &str) -> String {
        serde_json::json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 40, "completion_tokens": 30, "total_tokens": 70}
        })
        .to_string()
    }

    #[tokio::test]
    async fn sends_two_message_prompt_with_token_cap() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(serde_json::json!({
                    "model": "gpt-4o-mini",
                    "max_tokens": 300
                })),
                Matcher::PartialJson(serde_json::json!({
                    "messages": [
                        {"role": "system", "content": SYSTEM_PROMPT},
                        {
                            "role": "user",
                            "content": "Rephrase this message into 3 different styles:\n\n\"hi\""
                        }
                    ]
                })),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("Formal: Hello."))
            .create_async()
            .await;

        let service = service_for(&server);
        let raw = service.rephrase("hi").await.unwrap();

        mock.assert_async().await;
        assert_eq!(raw, "Formal: Hello.");
    }

    #[tokio::test]
    async fn trims_first_choice_content() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(completion_body("  \n1. Formal text\n2. Polite text\n  "))
            .create_async()
            .await;

        let service = service_for(&server);
        let raw = service.rephrase("hi").await.unwrap();
        assert_eq!(raw, "1. Formal text\n2. Polite text");
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"id": "chatcmpl-test", "choices": []}"#)
            .create_async()
            .await;

        let service = service_for(&server);
        let err = service.rephrase("hi").await.unwrap_err();
        assert!(matches!(err, RephraseError::EmptyChoices));
    }

    #[tokio::test]
    async fn upstream_error_status_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body(r#"{"error": {"message": "rate limited"}}"#)
            .expect(1)
            .create_async()
            .await;

        let service = service_for(&server);
        let err = service.rephrase("hi").await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(
            err,
            RephraseError::UpstreamStatus(status, _) if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        ));
    }

    #[tokio::test]
    async fn malformed_json_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body("not json at all")
            .create_async()
            .await;

        let service = service_for(&server);
        let err = service.rephrase("hi").await.unwrap_err();
        assert!(matches!(err, RephraseError::Json(_, _)));
    }

    #[tokio::test]
    async fn transport_timeout_is_retried_once_then_succeeds() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let stub_hits = Arc::clone(&hits);
        let body = completion_body("Formal: Hello.");

        // First connection stalls without answering until the client's
        // deadline fires; the second answers normally.
        tokio::spawn(async move {
            let (stalled, _) = listener.accept().await.unwrap();
            stub_hits.fetch_add(1, Ordering::SeqCst);

            let (mut stream, _) = listener.accept().await.unwrap();
            stub_hits.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;
            drop(stalled);
        });

        let service = RephraseService::with_timeout(
            format!("http://{}", addr),
            "test-key".to_string(),
            "gpt-4o-mini".to_string(),
            Duration::from_millis(200),
        );

        let raw = service.rephrase("hi").await.unwrap();
        assert_eq!(raw, "Formal: Hello.");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreachable_upstream_is_an_error_after_retry() {
        // Nothing listens on the discard port.
        let service = RephraseService::new(
            "http://127.0.0.1:9".to_string(),
            "test-key".to_string(),
            "gpt-4o-mini".to_string(),
        );
        let err = service.rephrase("hi").await.unwrap_err();
        assert!(matches!(err, RephraseError::Request(_)));
    }
}
