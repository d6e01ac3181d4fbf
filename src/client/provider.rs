//! Generation Backend Boundary
//!
//! The [`Generator`] trait is the single call contract this crate consumes:
//! prompt in, text out, or a classified [`GenerationError`]. The backend is
//! opaque; it may return less than the logically complete document.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::network;
use crate::types::{ErrorClassifier, ErrorKind, GenerationError, GenerationRequest};

/// Shared generator handle for concurrent candidate tasks
pub type SharedGenerator = Arc<dyn Generator + Send + Sync>;

/// Single call contract against the external generation service
#[async_trait]
pub trait Generator: Send + Sync {
    /// Perform one generation call.
    ///
    /// Implementations classify every failure into an [`ErrorKind`]; callers
    /// never see raw transport errors.
    async fn generate(&self, request: &GenerationRequest)
    -> std::result::Result<String, GenerationError>;

    /// Endpoint name for logging and circuit breaker keying
    fn name(&self) -> &str;
}

// =============================================================================
// Backend Configuration
// =============================================================================

/// Configuration for the HTTP generation backend
///
/// Note: the API key is never serialized and is redacted in debug output.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Endpoint name used for breaker keying and logs
    pub endpoint: String,
    /// API base URL
    pub api_base: String,
    /// Default model identifier
    pub model: String,
    /// API key, read from config or the DOCLOOM_BACKEND_API_KEY env var
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("endpoint", &self.endpoint)
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "primary".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
            connect_timeout_secs: network::CONNECTION_TIMEOUT_SECS,
        }
    }
}

// =============================================================================
// HTTP Generator
// =============================================================================

/// HTTP backend speaking an OpenAI-style chat completions API
pub struct HttpGenerator {
    endpoint: String,
    api_base: String,
    model: String,
    /// Stored securely - never exposed in logs or debug output
    api_key: SecretString,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGenerator")
            .field("endpoint", &self.endpoint)
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl HttpGenerator {
    pub fn new(config: BackendConfig) -> crate::types::Result<Self> {
        let api_key = config
            .api_key
            .or_else(|| std::env::var("DOCLOOM_BACKEND_API_KEY").ok())
            .ok_or_else(|| {
                crate::types::LoomError::Config(
                    "backend API key not found. Set DOCLOOM_BACKEND_API_KEY or provide in config"
                        .to_string(),
                )
            })?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| {
                crate::types::LoomError::Config(format!("failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            endpoint: config.endpoint,
            api_base: config.api_base,
            model: config.model,
            api_key: SecretString::from(api_key),
            client,
        })
    }

    fn build_request(&self, request: &GenerationRequest) -> ChatCompletionRequest {
        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };

        ChatCompletionRequest {
            model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_output_tokens,
        }
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<String, GenerationError> {
        let body = self.build_request(request);
        let url = format!("{}/chat/completions", self.api_base);

        debug!(
            endpoint = %self.endpoint,
            model = %body.model,
            prompt_chars = request.prompt.len(),
            "sending generation request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, &self.endpoint))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, &self.endpoint))?;

        if !(200..300).contains(&status) {
            // Prefer the structured error code when the body carries one
            if let Ok(err_body) = serde_json::from_str::<ErrorResponse>(&text) {
                let code = err_body
                    .error
                    .code
                    .or(err_body.error.error_type)
                    .unwrap_or_default();
                return Err(ErrorClassifier::classify_code(
                    &code,
                    &err_body.error.message,
                    &self.endpoint,
                ));
            }
            return Err(ErrorClassifier::classify_http_status(
                status,
                &text,
                &self.endpoint,
            ));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text).map_err(|e| {
            warn!(endpoint = %self.endpoint, "malformed completion envelope: {e}");
            GenerationError::with_endpoint(
                ErrorKind::Internal,
                format!("malformed completion envelope: {e}"),
                &self.endpoint,
            )
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                GenerationError::with_endpoint(
                    ErrorKind::Internal,
                    "completion response contained no choices",
                    &self.endpoint,
                )
            })?;

        debug!(
            endpoint = %self.endpoint,
            response_chars = content.len(),
            "generation request succeeded"
        );

        Ok(content)
    }

    fn name(&self) -> &str {
        &self.endpoint
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    top_p: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default, rename = "type")]
    error_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_config_debug_redacts_key() {
        let config = BackendConfig {
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_error_body_accepts_code_or_type() {
        let with_code = r#"{"error":{"message":"slow down","code":"rate_limit_exceeded"}}"#;
        let parsed: ErrorResponse = serde_json::from_str(with_code).unwrap();
        assert_eq!(parsed.error.code.as_deref(), Some("rate_limit_exceeded"));

        let with_type = r#"{"error":{"message":"bad","type":"invalid_request_error"}}"#;
        let parsed: ErrorResponse = serde_json::from_str(with_type).unwrap();
        assert_eq!(
            parsed.error.error_type.as_deref(),
            Some("invalid_request_error")
        );
    }
}
