//! Chat-completion client used to talk to the model.
//!
//! [`CompletionClient`] is the seam between the processing pipeline and the
//! network. [`GroqClient`] implements it against an OpenAI-compatible
//! `/chat/completions` endpoint using a blocking HTTP client, since the whole
//! run is sequential.

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Classification of a failed completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// HTTP 429 or provider-reported rate limiting
    RateLimited,
    /// HTTP 5xx
    ServerError,
    /// Request did not complete in time
    Timeout,
    /// Connection could not be established or was dropped
    Connection,
    /// HTTP 401/403
    Authentication,
    /// HTTP 400/404/422 and similar caller errors
    InvalidRequest,
    /// Response body could not be understood
    InvalidResponse,
}

impl ApiErrorKind {
    /// Returns true if a later attempt may succeed.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::ServerError
                | Self::Timeout
                | Self::Connection
                | Self::InvalidResponse
        )
    }
}

/// Error returned by a [`CompletionClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct ApiError {
    /// What went wrong
    pub kind: ApiErrorKind,
    /// Provider or transport message
    pub message: String,
}

impl ApiError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns true if a later attempt may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Classifies an unsuccessful HTTP response.
    #[must_use]
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorResponse>(body)
            .map(|r| r.error.message)
            .unwrap_or_else(|_| body.to_string());

        let kind = match status {
            429 => ApiErrorKind::RateLimited,
            401 | 403 => ApiErrorKind::Authentication,
            408 => ApiErrorKind::Timeout,
            500..=599 => ApiErrorKind::ServerError,
            400..=499 => ApiErrorKind::InvalidRequest,
            _ => ApiErrorKind::InvalidResponse,
        };

        Self::new(kind, format!("HTTP {status}: {message}"))
    }

    fn from_transport(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ApiErrorKind::Timeout
        } else if err.is_decode() {
            ApiErrorKind::InvalidResponse
        } else {
            ApiErrorKind::Connection
        };
        Self::new(kind, err.to_string())
    }
}

/// A single completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Full user message (prompt followed by file content)
    pub message: String,
    /// Sampling temperature
    pub temperature: f32,
}

/// Sends completion requests to a model.
pub trait CompletionClient {
    /// Sends one request and returns the text of the first choice.
    ///
    /// # Errors
    ///
    /// Returns a classified [`ApiError`] when the request fails.
    fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, ApiError>;
}

impl<C: CompletionClient + ?Sized> CompletionClient for &C {
    fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, ApiError> {
        (**self).complete(request)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Client for the Groq OpenAI-compatible chat completion API.
#[derive(Debug)]
pub struct GroqClient {
    http: reqwest::blocking::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl GroqClient {
    /// Creates a client from API configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("code-refiner/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }

    /// Returns the model this client sends requests to.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl CompletionClient for GroqClient {
    fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, ApiError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.message,
            }],
            temperature: request.temperature,
        };

        debug!(
            "Sending {} byte request to {} ({})",
            request.message.len(),
            self.endpoint,
            self.model
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| ApiError::from_transport(&e))?;

        let status = response.status();
        let text = response.text().map_err(|e| ApiError::from_transport(&e))?;

        if !status.is_success() {
            return Err(ApiError::from_response(status.as_u16(), &text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            ApiError::new(
                ApiErrorKind::InvalidResponse,
                format!("Failed to parse chat completion response: {e}"),
            )
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ApiError::new(ApiErrorKind::InvalidResponse, "No choices returned"))
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted client for processor and pipeline tests.

    use super::{ApiError, CompletionClient, CompletionRequest};
    use std::cell::RefCell;
    use std::collections::VecDeque;

    type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String, ApiError>>;

    /// Answers every request through a closure and records what it was sent.
    pub(crate) struct MockClient {
        responder: Responder,
        scripted: RefCell<VecDeque<Result<String, ApiError>>>,
        pub(crate) requests: RefCell<Vec<CompletionRequest>>,
    }

    impl MockClient {
        pub(crate) fn new(
            responder: impl Fn(&CompletionRequest) -> Result<String, ApiError> + 'static,
        ) -> Self {
            Self {
                responder: Box::new(responder),
                scripted: RefCell::new(VecDeque::new()),
                requests: RefCell::new(Vec::new()),
            }
        }

        /// Replies with scripted results first, then falls back to the responder.
        pub(crate) fn scripted(
            results: Vec<Result<String, ApiError>>,
            responder: impl Fn(&CompletionRequest) -> Result<String, ApiError> + 'static,
        ) -> Self {
            let client = Self::new(responder);
            *client.scripted.borrow_mut() = results.into();
            client
        }

        pub(crate) fn call_count(&self) -> usize {
            self.requests.borrow().len()
        }
    }

    impl CompletionClient for MockClient {
        fn complete(&self, request: &CompletionRequest) -> Result<String, ApiError> {
            self.requests.borrow_mut().push(request.clone());
            if let Some(result) = self.scripted.borrow_mut().pop_front() {
                return result;
            }
            (self.responder)(request)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_codes() {
        assert_eq!(ApiError::from_response(429, "").kind, ApiErrorKind::RateLimited);
        assert_eq!(ApiError::from_response(401, "").kind, ApiErrorKind::Authentication);
        assert_eq!(ApiError::from_response(400, "").kind, ApiErrorKind::InvalidRequest);
        assert_eq!(ApiError::from_response(503, "").kind, ApiErrorKind::ServerError);
        assert_eq!(ApiError::from_response(302, "").kind, ApiErrorKind::InvalidResponse);
    }

    #[test]
    fn test_transient_kinds() {
        assert!(ApiErrorKind::RateLimited.is_transient());
        assert!(ApiErrorKind::ServerError.is_transient());
        assert!(ApiErrorKind::Connection.is_transient());
        assert!(!ApiErrorKind::Authentication.is_transient());
        assert!(!ApiErrorKind::InvalidRequest.is_transient());
    }

    #[test]
    fn test_error_body_message_is_extracted() {
        let body = r#"{"error":{"message":"Rate limit reached for model","type":"tokens"}}"#;
        let err = ApiError::from_response(429, body);
        assert_eq!(err.message, "HTTP 429: Rate limit reached for model");
    }

    #[test]
    fn test_non_json_body_is_kept() {
        let err = ApiError::from_response(502, "Bad Gateway");
        assert!(err.message.contains("Bad Gateway"));
    }

    #[test]
    fn test_chat_request_shape() {
        let body = ChatRequest {
            model: "m",
            messages: vec![ChatMessage {
                role: "user",
                content: "hello",
            }],
            temperature: 0.1,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
    }

    #[test]
    fn test_chat_response_parsing() {
        let text = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"ok"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(text).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("ok"));
    }

    #[test]
    fn test_groq_client_endpoint() {
        let config = ApiConfig {
            api_key: "key".to_string(),
            base_url: "https://example.test/v1/".to_string(),
            ..ApiConfig::default()
        };
        let client = GroqClient::new(&config).unwrap();
        assert_eq!(client.endpoint, "https://example.test/v1/chat/completions");
        assert_eq!(client.model(), config.model);
    }
}
