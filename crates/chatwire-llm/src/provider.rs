use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument, warn};

use chatwire_core::errors::GatewayError;
use chatwire_core::provider::{ChatProvider, ChatRequest, ChunkStream};

use crate::converter;
use crate::error_body;
use crate::sse::SseChunkStream;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api/v1";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const SSE_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Connection settings for an OpenAI-compatible gateway.
#[derive(Debug)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Sent as `Authorization: Bearer`. Takes precedence over the cookie.
    pub api_key: Option<SecretString>,
    /// Forwarded verbatim as the `Cookie` header when no key is set.
    pub credential_cookie: Option<SecretString>,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            credential_cookie: None,
            connect_timeout: CONNECT_TIMEOUT,
            idle_timeout: SSE_IDLE_TIMEOUT,
        }
    }
}

pub struct OpenAiCompatProvider {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    credential_cookie: Option<SecretString>,
    idle_timeout: Duration,
}

impl OpenAiCompatProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| GatewayError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key,
            credential_cookie: config.credential_cookie,
            idle_timeout: config.idle_timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(&self, request: &ChatRequest) -> reqwest::RequestBuilder {
        let body = converter::build_request_body(request);

        let mut req = self.client.post(&self.endpoint);

        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key.expose_secret()));
        } else if let Some(cookie) = &self.credential_cookie {
            req = req.header("Cookie", cookie.expose_secret());
        }

        req = req.header("accept", "text/event-stream");
        req = req.header("content-type", "application/json");
        req.json(&body)
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    #[instrument(skip(self, request), fields(model = %request.model, messages = request.messages.len(), tools = request.tools.len()))]
    async fn stream(&self, request: &ChatRequest) -> Result<ChunkStream, GatewayError> {
        let resp = self
            .build_request(request)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let status = status.as_u16();
            let body = resp.text().await.unwrap_or_default();
            let message = error_body::extract_error_message(status, &body);
            warn!(status, error = %message, "gateway rejected request");
            return Err(GatewayError::Http { status, message });
        }

        debug!(status = status.as_u16(), "event stream opened");
        let stream = SseChunkStream::new(resp.bytes_stream(), self.idle_timeout);
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatwire_core::messages::HistoryEntry;
    use futures::StreamExt;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gpt-test".into(),
            messages: vec![HistoryEntry::User { content: "hi".into(), attachments: vec![] }],
            tools: vec![],
        }
    }

    fn provider(server: &MockServer, api_key: Option<&str>, cookie: Option<&str>) -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(ProviderConfig {
            base_url: format!("{}/api/v1/", server.uri()),
            api_key: api_key.map(|k| SecretString::from(k.to_string())),
            credential_cookie: cookie.map(|c| SecretString::from(c.to_string())),
            ..ProviderConfig::default()
        })
        .unwrap()
    }

    const SSE_BODY: &str = "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n\
data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n\
data: {\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2}}\n\n\
data: [DONE]\n\n";

    #[test]
    fn endpoint_strips_trailing_slash() {
        let p = OpenAiCompatProvider::new(ProviderConfig {
            base_url: "https://gw.example/api/v1/".into(),
            ..ProviderConfig::default()
        })
        .unwrap();
        assert_eq!(p.endpoint(), "https://gw.example/api/v1/chat/completions");
    }

    #[tokio::test]
    async fn streams_chunks_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-test", "stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let p = provider(&server, Some("sk-test"), Some("session=ignored"));
        let stream = p.stream(&request()).await.unwrap();
        let chunks: Vec<_> = stream.collect().await;

        assert_eq!(chunks.len(), 3);
        let text: String = chunks[..2]
            .iter()
            .map(|c| c.as_ref().unwrap().choices[0].delta.content.clone().unwrap())
            .collect();
        assert_eq!(text, "Hello");
        let usage = chunks[2].as_ref().unwrap().usage.as_ref().unwrap();
        assert_eq!(usage.prompt_tokens, Some(5));
    }

    #[tokio::test]
    async fn cookie_used_without_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("cookie", "token=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("data: [DONE]\n\n", "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let p = provider(&server, None, Some("token=abc"));
        let chunks: Vec<_> = p.stream(&request()).await.unwrap().collect().await;
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn error_status_surfaces_json_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(402)
                    .set_body_json(json!({"error": {"message": "Insufficient credits"}})),
            )
            .mount(&server)
            .await;

        let p = provider(&server, Some("sk"), None);
        let err = p.stream(&request()).await.err().unwrap();
        assert!(matches!(&err, GatewayError::Http { status: 402, .. }));
        assert_eq!(err.to_string(), "Insufficient credits");
    }

    #[tokio::test]
    async fn error_status_with_empty_body_uses_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let p = provider(&server, Some("sk"), None);
        let err = p.stream(&request()).await.err().unwrap();
        assert_eq!(err.to_string(), "HTTP 503");
    }

    #[tokio::test]
    async fn tools_are_sent_in_function_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"tools": [{"type": "function", "function": {"name": "search"}}]})))
            .respond_with(ResponseTemplate::new(200).set_body_raw("data: [DONE]\n\n", "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let mut req = request();
        req.tools.push(chatwire_core::tools::ToolDefinition {
            name: "search".into(),
            description: "Search".into(),
            parameters_schema: json!({"type": "object"}),
        });
        let p = provider(&server, Some("sk"), None);
        let _: Vec<_> = p.stream(&req).await.unwrap().collect().await;
    }

    #[tokio::test]
    async fn unreachable_gateway_is_network_error() {
        let p = OpenAiCompatProvider::new(ProviderConfig {
            base_url: "http://127.0.0.1:9".into(),
            ..ProviderConfig::default()
        })
        .unwrap();
        let err = p.stream(&request()).await.err().unwrap();
        assert_eq!(err.error_kind(), "network");
    }
}
