//! reqwest implementation of the message API
//!
//! Every response uses the envelope `{ success, data?, error? }`, where
//! `error` is a plain message or a `{ code, message }` object. Non-success
//! statuses are mapped onto `DomainError` so the engine can classify them.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use chat_common::ApiConfig;
use chat_core::{
    ApiResult, AuthProvider, DomainError, Message, MessageApi, MessageId, MessagePage, ScopeKey,
    SendMessagePayload,
};

use crate::error::{TransportError, TransportResult};

/// Response envelope
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    error: Option<ApiError>,
}

/// Error field of the envelope
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ApiError {
    Message(String),
    Detail(ErrorDetail),
}

impl ApiError {
    pub fn message(&self) -> &str {
        match self {
            Self::Message(message) => message,
            Self::Detail(detail) => &detail.message,
        }
    }
}

/// Structured error body
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
struct EditBody<'a> {
    content: &'a str,
}

/// HTTP message API client
#[derive(Clone)]
pub struct HttpMessageApi {
    client: Client,
    base_url: Url,
    auth: Arc<dyn AuthProvider>,
}

impl HttpMessageApi {
    /// Build a client for `config.base_url` with the configured timeout
    pub fn new(config: &ApiConfig, auth: Arc<dyn AuthProvider>) -> TransportResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(config.base_url.clone()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            auth,
        })
    }

    /// Base URL joined with percent-encoded path segments
    fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| DomainError::Network(format!("invalid base URL {}", self.base_url)))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn scope_endpoint(&self, scope: &ScopeKey) -> ApiResult<Url> {
        match scope {
            ScopeKey::Channel(id) => self.endpoint(&["channels", id.as_str(), "messages"]),
            ScopeKey::Thread(root) => self.endpoint(&["threads", root.as_str(), "messages"]),
        }
    }

    fn reaction_endpoint(&self, id: &MessageId, emoji: &str) -> ApiResult<Url> {
        self.endpoint(&["messages", id.as_str(), "reactions", emoji, "@me"])
    }

    /// Attach the bearer credential, or fail before touching the network
    fn authorize(&self, request: RequestBuilder) -> ApiResult<RequestBuilder> {
        let credential = self.auth.credential().ok_or(DomainError::Unauthenticated)?;
        Ok(request.header(reqwest::header::AUTHORIZATION, credential.bearer()))
    }

    /// Send a request and unwrap the envelope
    ///
    /// `not_found` is the error reported for a 404.
    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        not_found: DomainError,
    ) -> ApiResult<Option<T>> {
        let response = self
            .authorize(request)?
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(request_error)?;

        // Error bodies are best effort; the status decides the outcome
        let envelope: Option<ApiEnvelope<T>> = if body.is_empty() {
            None
        } else {
            match serde_json::from_slice(&body) {
                Ok(envelope) => Some(envelope),
                Err(e) if status.is_success() => {
                    return Err(DomainError::InvalidResponse(e.to_string()));
                }
                Err(_) => None,
            }
        };

        let result = settle(status, envelope, not_found);
        if let Err(err) = &result {
            if err.is_auth() {
                tracing::warn!(status = status.as_u16(), "API rejected the credential");
                self.auth.invalidate();
            }
        }
        result
    }

    async fn execute_data<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        not_found: DomainError,
    ) -> ApiResult<T> {
        self.execute(request, not_found)
            .await?
            .ok_or_else(|| DomainError::InvalidResponse("missing data".to_string()))
    }
}

impl std::fmt::Debug for HttpMessageApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMessageApi")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

#[async_trait]
impl MessageApi for HttpMessageApi {
    #[tracing::instrument(skip(self, scope), fields(scope = %scope))]
    async fn list_messages(
        &self,
        scope: &ScopeKey,
        before: Option<&MessageId>,
        limit: usize,
    ) -> ApiResult<MessagePage> {
        let mut url = self.scope_endpoint(scope)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(before) = before {
                query.append_pair("before", before.as_str());
            }
        }

        let page: MessagePage = self
            .execute_data(self.client.get(url), DomainError::ScopeNotLoaded(scope.clone()))
            .await?;
        tracing::debug!(count = page.len(), "Fetched message page");
        Ok(page)
    }

    #[tracing::instrument(skip(self, payload), fields(channel_id = %payload.channel_id, nonce = %payload.nonce))]
    async fn send_message(&self, payload: &SendMessagePayload) -> ApiResult<Message> {
        let url = self.endpoint(&["channels", payload.channel_id.as_str(), "messages"])?;
        let scope = match &payload.thread_id {
            Some(root) => ScopeKey::Thread(root.clone()),
            None => ScopeKey::Channel(payload.channel_id.clone()),
        };
        self.execute_data(
            self.client.post(url).json(payload),
            DomainError::ScopeNotLoaded(scope),
        )
        .await
    }

    #[tracing::instrument(skip(self, id, content), fields(message_id = %id))]
    async fn edit_message(&self, id: &MessageId, content: &str) -> ApiResult<Message> {
        let url = self.endpoint(&["messages", id.as_str()])?;
        self.execute_data(
            self.client.patch(url).json(&EditBody { content }),
            DomainError::MessageNotFound(id.clone()),
        )
        .await
    }

    #[tracing::instrument(skip(self, id), fields(message_id = %id))]
    async fn delete_message(&self, id: &MessageId) -> ApiResult<()> {
        let url = self.endpoint(&["messages", id.as_str()])?;
        self.execute::<serde_json::Value>(
            self.client.delete(url),
            DomainError::MessageNotFound(id.clone()),
        )
        .await
        .map(|_| ())
    }

    #[tracing::instrument(skip(self, id), fields(message_id = %id))]
    async fn add_reaction(&self, id: &MessageId, emoji: &str) -> ApiResult<()> {
        let url = self.reaction_endpoint(id, emoji)?;
        self.execute::<serde_json::Value>(
            self.client.put(url),
            DomainError::MessageNotFound(id.clone()),
        )
        .await
        .map(|_| ())
    }

    #[tracing::instrument(skip(self, id), fields(message_id = %id))]
    async fn remove_reaction(&self, id: &MessageId, emoji: &str) -> ApiResult<()> {
        let url = self.reaction_endpoint(id, emoji)?;
        self.execute::<serde_json::Value>(
            self.client.delete(url),
            DomainError::MessageNotFound(id.clone()),
        )
        .await
        .map(|_| ())
    }
}

/// Map a transport-level reqwest failure
fn request_error(err: reqwest::Error) -> DomainError {
    if err.is_timeout() {
        DomainError::Timeout
    } else {
        DomainError::Network(err.to_string())
    }
}

/// Outcome of a response given its status and parsed envelope
fn settle<T>(
    status: StatusCode,
    envelope: Option<ApiEnvelope<T>>,
    not_found: DomainError,
) -> ApiResult<Option<T>> {
    if !status.is_success() {
        let error = envelope.and_then(|e| e.error);
        return Err(status_error(status, error.as_ref(), not_found));
    }

    match envelope {
        Some(envelope) if !envelope.success => Err(DomainError::Rejected {
            status: status.as_u16(),
            message: error_message(status, envelope.error.as_ref()),
        }),
        Some(envelope) => Ok(envelope.data),
        None => Ok(None),
    }
}

/// Server message, or the status reason when the body carried none
fn error_message(status: StatusCode, error: Option<&ApiError>) -> String {
    error
        .map(ApiError::message)
        .filter(|m| !m.is_empty())
        .map_or_else(
            || status.canonical_reason().unwrap_or("request failed").to_string(),
            str::to_string,
        )
}

/// Map a non-success status onto the domain taxonomy
fn status_error(status: StatusCode, error: Option<&ApiError>, not_found: DomainError) -> DomainError {
    let message = error_message(status, error);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DomainError::Unauthenticated,
        StatusCode::NOT_FOUND => not_found,
        StatusCode::CONFLICT => DomainError::Conflict(message),
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE | StatusCode::UNPROCESSABLE_ENTITY => {
            DomainError::ValidationError(message)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => DomainError::Timeout,
        _ => DomainError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}
