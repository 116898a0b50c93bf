//! reqwest implementation of [`AnswerService`]

use super::types::{
    AuthResponse, ChatReply, ChatRequest, ChatResponse, HistoryEntry, LoginRequest,
    RegisterRequest, SpeechRequest, SpeechResponse, UserIdentity, UserResponse,
};
use super::AnswerService;
use crate::integration::ClientConfig;
use crate::messages::AudioClip;
use crate::{AyurError, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

/// Format assumed for synthesized audio when the service does not say
pub const DEFAULT_AUDIO_FORMAT: &str = "audio/mp3";

const AUTH_REQUIRED: &str = "Authentication required. Please login again.";

/// Which error fields to consult for one endpoint, most specific first
struct ErrorContext {
    fields: &'static [&'static str],
    fallback: &'static str,
}

const LOGIN_ERRORS: ErrorContext = ErrorContext {
    fields: &["non_field_errors", "email", "password", "error", "detail"],
    fallback: "Login failed. Please try again.",
};

const REGISTER_ERRORS: ErrorContext = ErrorContext {
    fields: &["error", "username", "email", "password", "non_field_errors", "detail"],
    fallback: "Registration failed. Please try again.",
};

const USER_ERRORS: ErrorContext = ErrorContext {
    fields: &["detail", "error"],
    fallback: "Session expired. Please login again.",
};

const CHAT_ERRORS: ErrorContext = ErrorContext {
    fields: &["error", "detail"],
    fallback: "Failed to get a response. Please try again.",
};

const HISTORY_ERRORS: ErrorContext = ErrorContext {
    fields: &["error", "detail"],
    fallback: "Failed to load chat history. Please try again later.",
};

const DELETE_ERRORS: ErrorContext = ErrorContext {
    fields: &["error", "detail"],
    fallback: "Failed to delete the conversation. Please try again.",
};

const SPEECH_ERRORS: ErrorContext = ErrorContext {
    fields: &["error", "detail"],
    fallback: "Could not play audio. Please try again.",
};

/// Answering service reached over HTTP
#[derive(Clone)]
pub struct HttpAnswerService {
    client: Client,
    base_url: String,
    auth_scheme: String,
}

impl HttpAnswerService {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| AyurError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    /// Use an existing reqwest client (shared connection pool)
    pub fn with_client(client: Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_scheme: config.auth_scheme.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder.header(AUTHORIZATION, format!("{} {}", self.auth_scheme, token))
    }

    async fn send(&self, builder: RequestBuilder, ctx: &ErrorContext) -> Result<Response> {
        let response = builder.send().await.map_err(|err| {
            warn!("Request failed before a response arrived: {}", err);
            AyurError::Service {
                status: None,
                message: ctx.fallback.to_string(),
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!("Service answered {}: {}", status, body);
        Err(error_from_status(status, &body, ctx))
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        response
            .json()
            .await
            .map_err(|e| AyurError::Decode(format!("Failed to parse service response: {}", e)))
    }
}

fn error_from_status(status: StatusCode, body: &str, ctx: &ErrorContext) -> AyurError {
    let message = extract_error_message(body, ctx.fields);
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return AyurError::Auth(message.unwrap_or_else(|| AUTH_REQUIRED.to_string()));
    }
    AyurError::Service {
        status: Some(status.as_u16()),
        message: message.unwrap_or_else(|| ctx.fallback.to_string()),
    }
}

/// Pick the most specific error message from a service error body.
///
/// Values may be plain strings or lists of strings; for lists the first
/// entry wins. Returns `None` when no listed field carries text.
pub fn extract_error_message(body: &str, fields: &[&str]) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;

    fields.iter().find_map(|field| match object.get(*field)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Array(items) => items
            .iter()
            .find_map(|item| item.as_str().filter(|s| !s.trim().is_empty()))
            .map(str::to_string),
        _ => None,
    })
}

#[async_trait]
impl AnswerService for HttpAnswerService {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse> {
        let builder = self.client.post(self.url("login/")).json(request);
        let response = self.send(builder, &LOGIN_ERRORS).await?;
        Self::read_json(response).await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse> {
        let builder = self.client.post(self.url("register/")).json(request);
        let response = self.send(builder, &REGISTER_ERRORS).await?;
        Self::read_json(response).await
    }

    async fn current_user(&self, token: &str) -> Result<UserIdentity> {
        let builder = self.authorized(self.client.get(self.url("user/")), token);
        let response = self.send(builder, &USER_ERRORS).await?;
        let body: UserResponse = Self::read_json(response).await?;
        Ok(body.user)
    }

    async fn ask(&self, token: &str, request: &ChatRequest) -> Result<ChatReply> {
        let builder = self.authorized(self.client.post(self.url("chat/")), token).json(request);
        let response = self.send(builder, &CHAT_ERRORS).await?;
        let body: ChatResponse = Self::read_json(response).await?;

        // Audio is only usable together with its format
        let audio = match (body.audio, body.content_type) {
            (Some(data), Some(format)) => match AudioClip::from_base64(&data, format) {
                Ok(clip) => Some(clip),
                Err(e) => {
                    warn!("Dropping undecodable answer audio: {}", e);
                    None
                }
            },
            (Some(_), None) => {
                debug!("Answer audio arrived without a content type, ignoring it");
                None
            }
            _ => None,
        };

        Ok(ChatReply {
            answer: body.answer,
            audio,
            processing_steps: body.processing_steps,
            chat_id: body.chat_id,
        })
    }

    async fn history(&self, token: &str) -> Result<Vec<HistoryEntry>> {
        let builder = self.authorized(self.client.get(self.url("chat-history/")), token);
        let response = self.send(builder, &HISTORY_ERRORS).await?;
        Self::read_json(response).await
    }

    async fn delete_history(&self, token: &str, id: i64) -> Result<()> {
        let path = format!("chat-history/{}/", id);
        let builder = self.authorized(self.client.delete(self.url(&path)), token);
        self.send(builder, &DELETE_ERRORS).await?;
        Ok(())
    }

    async fn synthesize(&self, token: &str, request: &SpeechRequest) -> Result<AudioClip> {
        let builder = self
            .authorized(self.client.post(self.url("text-to-speech/")), token)
            .json(request);
        let response = self.send(builder, &SPEECH_ERRORS).await?;
        let body: SpeechResponse = Self::read_json(response).await?;
        let format = body
            .content_type
            .unwrap_or_else(|| DEFAULT_AUDIO_FORMAT.to_string());
        AudioClip::from_base64(&body.audio, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_prefers_earlier_fields() {
        let body = r#"{"error": "generic", "non_field_errors": ["Incorrect Credentials"]}"#;
        assert_eq!(
            extract_error_message(body, LOGIN_ERRORS.fields).as_deref(),
            Some("Incorrect Credentials")
        );
    }

    #[test]
    fn test_extract_reads_plain_strings_and_lists() {
        let body = r#"{"email": ["A user with this email already exists."]}"#;
        assert_eq!(
            extract_error_message(body, REGISTER_ERRORS.fields).as_deref(),
            Some("A user with this email already exists.")
        );

        let body = r#"{"error": "No question provided"}"#;
        assert_eq!(
            extract_error_message(body, CHAT_ERRORS.fields).as_deref(),
            Some("No question provided")
        );
    }

    #[test]
    fn test_extract_ignores_unusable_bodies() {
        assert_eq!(extract_error_message("<html>502</html>", &["error"]), None);
        assert_eq!(extract_error_message(r#"["error"]"#, &["error"]), None);
        assert_eq!(extract_error_message(r#"{"error": ""}"#, &["error"]), None);
        assert_eq!(extract_error_message(r#"{"error": 42}"#, &["error"]), None);
    }

    #[test]
    fn test_unauthorized_maps_to_auth_error() {
        let err = error_from_status(
            StatusCode::UNAUTHORIZED,
            r#"{"detail": "Invalid token."}"#,
            &CHAT_ERRORS,
        );
        assert_eq!(err, AyurError::Auth("Invalid token.".into()));

        let err = error_from_status(StatusCode::FORBIDDEN, "", &CHAT_ERRORS);
        assert!(err.is_auth());
    }

    #[test]
    fn test_other_status_falls_back_to_endpoint_message() {
        let err = error_from_status(StatusCode::BAD_GATEWAY, "", &CHAT_ERRORS);
        assert_eq!(
            err,
            AyurError::Service {
                status: Some(502),
                message: "Failed to get a response. Please try again.".into(),
            }
        );
    }
}
