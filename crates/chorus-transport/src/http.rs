//! REST handler
//!
//! Every response is classified before its body is trusted: non-2xx becomes
//! `RemoteError::Rejected` carrying the status and the server's message, and
//! 2xx bodies are decoded against the explicit schemas in
//! `chorus_core::protocol`.

use crate::error::TransportError;
use async_trait::async_trait;
use chorus_core::protocol::{
    server_message, validate_engagement_response, CreatePostResponse, FeedResponse, RepostRequest,
};
use chorus_core::{
    ClientConfig, EngagementEffects, EngagementMutation, FeedEntry, Post, PostDraft, PostEffects,
    PostId, RemoteError,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Response, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP client for the feed API.
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    client: Client,
    base: Url,
    bearer_token: Option<String>,
    timeout: Duration,
}

impl HttpApiClient {
    /// Build a client from configuration.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let base = Url::parse(&config.api_base_url)
            .map_err(|e| TransportError::invalid_url(&config.api_base_url, e))?;
        if base.cannot_be_a_base() {
            return Err(TransportError::invalid_url(
                &config.api_base_url,
                "cannot be used as a base URL",
            ));
        }

        let timeout = config.request_timeout();
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            bearer_token: None,
            timeout,
        })
    }

    /// Authenticate requests with a bearer token.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// URL for `segments` appended to the base path.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::invalid_url(self.base.as_str(), "cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            TransportError::from(err).into()
        }
    }

    /// Read a response body as JSON, turning non-2xx into a rejection.
    ///
    /// An empty 2xx body reads as `{}`.
    async fn read_json(&self, response: Response) -> Result<Value, RemoteError> {
        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .as_ref()
                .and_then(server_message)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            warn!(status = status.as_u16(), %message, "request rejected");
            return Err(RemoteError::Rejected {
                status: Some(status.as_u16()),
                message,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&text).map_err(|e| TransportError::Codec(e).into())
    }
}

fn engagement_route(mutation: &EngagementMutation) -> Method {
    match mutation.transition() {
        chorus_core::Transition::Apply => Method::POST,
        chorus_core::Transition::Revoke => Method::DELETE,
    }
}

#[async_trait]
impl EngagementEffects for HttpApiClient {
    async fn mutate_engagement(
        &self,
        post: &PostId,
        mutation: &EngagementMutation,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&["posts", post.as_str(), mutation.kind().as_str()])?;
        let method = engagement_route(mutation);
        debug!(%method, %url, "engagement request");

        let mut request = self.request(method, url);
        if let EngagementMutation::CreateRepost { comment } = mutation {
            request = request.json(&RepostRequest {
                comment: comment.clone(),
            });
        }

        let response = request.send().await.map_err(|e| self.map_send_error(e))?;
        let body = self.read_json(response).await?;
        validate_engagement_response(mutation, &body)
    }
}

#[async_trait]
impl PostEffects for HttpApiClient {
    async fn create_post(&self, draft: &PostDraft) -> Result<Post, RemoteError> {
        let url = self.endpoint(&["posts"])?;
        let mut form = Form::new().text("content", draft.trimmed_content().to_string());
        if let Some(image) = &draft.image {
            let part = Part::bytes(image.bytes.clone())
                .file_name(image.file_name.clone())
                .mime_str(&image.content_type)
                .map_err(TransportError::from)?;
            form = form.part("image", part);
        }

        let response = self
            .request(Method::POST, url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let body = self.read_json(response).await?;
        let created: CreatePostResponse =
            serde_json::from_value(body).map_err(TransportError::from)?;
        debug!(post = %created.post.id, "post committed");
        Ok(created.post)
    }

    async fn fetch_posts(&self) -> Result<Vec<FeedEntry>, RemoteError> {
        let url = self.endpoint(&["posts"])?;
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let body = self.read_json(response).await?;
        let feed: FeedResponse = serde_json::from_value(body).map_err(TransportError::from)?;
        debug!(posts = feed.posts.len(), "baseline fetched");
        Ok(feed.posts)
    }
}
