//! Gemini Backend Implementation
//!
//! Backend for Gemini models served by either Google API surface.
//!
//! # Google AI (Generative Language API)
//!
//! - `POST /v1beta/models/{model}:generateContent` - one full response
//! - `POST /v1beta/models/{model}:streamGenerateContent?alt=sse` - server-sent
//!   events, one `GenerateContentResponse` JSON object per `data:` line
//! - `GET /v1beta/models` - list models (used for health checks)
//!
//! The API key travels in the `x-goog-api-key` header.
//!
//! # Vertex AI
//!
//! Same request and response bodies under
//! `/v1/projects/{project}/locations/{location}/publishers/google/models/{model}`,
//! authenticated with an OAuth access token as a bearer token. Health checks
//! fetch the location resource.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::traits::{
    Chunk, ChunkStream, Content, GenerateRequest, GenerateResponse, GenerativeBackend,
    GroundingMetadata, GroundingSource, Part,
};
use crate::config::BackendSettings;
use crate::error::TransportError;

/// Default Google AI API host
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google API surface serving the model
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Platform {
    /// Generative Language API, authenticated with an API key
    #[default]
    GoogleAi,
    /// Vertex AI, authenticated with an OAuth access token
    VertexAi {
        /// Google Cloud project ID
        project: String,
        /// Region, for example `us-central1`
        location: String,
    },
}

impl Platform {
    /// API root used when no base URL is configured
    #[must_use]
    pub fn default_base_url(&self) -> String {
        match self {
            Self::GoogleAi => DEFAULT_BASE_URL.to_string(),
            Self::VertexAi { location, .. } => {
                format!("https://{location}-aiplatform.googleapis.com")
            }
        }
    }
}

/// Gemini backend client
#[derive(Clone)]
pub struct GeminiBackend {
    /// API root, without trailing slash
    base_url: String,
    /// Which API surface `base_url` speaks
    platform: Platform,
    /// API key or access token (some proxies inject it themselves)
    credential: Option<String>,
    /// HTTP client
    http_client: reqwest::Client,
}

impl GeminiBackend {
    /// Create a Google AI backend
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (TLS setup).
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            platform: Platform::GoogleAi,
            credential: api_key,
            http_client,
        })
    }

    /// Serve requests through `platform`; the credential becomes an access token on Vertex AI
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Create from [`BackendSettings`]
    ///
    /// # Errors
    ///
    /// Returns an error if the settings name Vertex AI without a project, or
    /// if the HTTP client cannot be built.
    pub fn from_settings(settings: &BackendSettings) -> Result<Self, TransportError> {
        let platform = settings
            .platform()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| platform.default_base_url());
        Ok(Self::new(base_url, settings.api_key.clone(), settings.timeout)?.with_platform(platform))
    }

    /// Get the base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the platform
    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Resource path of a model, relative to the API root
    fn model_path(&self, model: &str) -> String {
        match self.platform {
            Platform::GoogleAi => format!("{}/v1beta/models/{model}", self.base_url),
            Platform::VertexAi {
                ref project,
                ref location,
            } => format!(
                "{}/v1/projects/{project}/locations/{location}/publishers/google/models/{model}",
                self.base_url
            ),
        }
    }

    /// Get generate endpoint URL
    fn generate_url(&self, model: &str) -> String {
        format!("{}:generateContent", self.model_path(model))
    }

    /// Get streaming endpoint URL
    fn stream_url(&self, model: &str) -> String {
        format!("{}:streamGenerateContent?alt=sse", self.model_path(model))
    }

    /// Get the URL fetched by health checks
    fn health_url(&self) -> String {
        match self.platform {
            Platform::GoogleAi => format!("{}/v1beta/models", self.base_url),
            Platform::VertexAi {
                ref project,
                ref location,
            } => format!("{}/v1/projects/{project}/locations/{location}", self.base_url),
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&self.platform, &self.credential) {
            (_, None) => builder,
            (Platform::GoogleAi, Some(key)) => builder.header("x-goog-api-key", key),
            (Platform::VertexAi { .. }, Some(token)) => builder.bearer_auth(token),
        }
    }

    fn post(&self, url: &str, request: &GenerateRequest) -> reqwest::RequestBuilder {
        self.authorize(self.http_client.post(url).json(&build_body(request)))
    }
}

/// Serialize a request into the API's JSON shape
fn build_body(request: &GenerateRequest) -> serde_json::Value {
    let contents: Vec<serde_json::Value> = request.contents.iter().map(content_json).collect();

    let mut body = serde_json::json!({ "contents": contents });

    if let Some(ref system) = request.system_instruction {
        body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": system }] });
    }

    if !request.generation.is_default() {
        let mut generation = serde_json::Map::new();
        if let Some(temperature) = request.generation.temperature {
            generation.insert("temperature".to_string(), serde_json::json!(temperature));
        }
        if let Some(max) = request.generation.max_output_tokens {
            generation.insert("maxOutputTokens".to_string(), serde_json::json!(max));
        }
        body["generationConfig"] = serde_json::Value::Object(generation);
    }

    body
}

fn content_json(content: &Content) -> serde_json::Value {
    let parts: Vec<serde_json::Value> = content
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => serde_json::json!({ "text": text }),
            Part::InlineData { mime_type, data } => serde_json::json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(data),
                }
            }),
            Part::FileData { mime_type, uri } => serde_json::json!({
                "fileData": { "mimeType": mime_type, "fileUri": uri }
            }),
        })
        .collect();

    serde_json::json!({ "role": content.role.as_str(), "parts": parts })
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    usage_metadata: Option<WireUsage>,
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    content: Option<WireContent>,
    grounding_metadata: Option<WireGrounding>,
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Deserialize)]
struct WirePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireGrounding {
    #[serde(default)]
    web_search_queries: Vec<String>,
    #[serde(default)]
    grounding_chunks: Vec<WireGroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct WireGroundingChunk {
    web: Option<WireWeb>,
}

#[derive(Debug, Deserialize)]
struct WireWeb {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsage {
    total_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct WireErrorEnvelope {
    error: WireError,
}

impl WireResponse {
    /// Concatenated text of the first candidate
    fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let mut texts = parts.iter().filter_map(|p| p.text.as_deref()).peekable();
        texts.peek()?;
        Some(texts.collect())
    }

    fn grounding(&self) -> Option<GroundingMetadata> {
        let wire = self.candidates.first()?.grounding_metadata.as_ref()?;
        Some(GroundingMetadata {
            web_search_queries: wire.web_search_queries.clone(),
            sources: wire
                .grounding_chunks
                .iter()
                .filter_map(|c| c.web.as_ref())
                .filter_map(|web| {
                    Some(GroundingSource {
                        title: web.title.clone(),
                        uri: web.uri.clone()?,
                    })
                })
                .collect(),
        })
    }

    fn into_chunk(self) -> Result<Chunk, TransportError> {
        if let Some(error) = self.error {
            return Err(wire_error(error));
        }
        Ok(Chunk {
            text: self.text(),
            grounding: self.grounding(),
        })
    }
}

fn wire_error(error: WireError) -> TransportError {
    TransportError::from_status(error.code.unwrap_or(500), error.message)
}

/// Turn a non-success HTTP response into a transport error
async fn status_error(response: reqwest::Response) -> TransportError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<WireErrorEnvelope>(&body)
        .map(|env| env.error.message)
        .unwrap_or(body);
    TransportError::from_status(status, message)
}

/// Splits a server-sent event byte stream into `data:` payloads
///
/// Network reads can end anywhere, including inside a UTF-8 sequence, so
/// bytes are buffered until a full line is available.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed bytes and collect every complete `data:` payload
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush a trailing line that had no newline
    pub(crate) fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let payload = line.trim().strip_prefix("data:")?.trim();
    if payload.is_empty() {
        None
    } else {
        Some(payload.to_string())
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    fn name(&self) -> &str {
        match self.platform {
            Platform::GoogleAi => "Gemini",
            Platform::VertexAi { .. } => "Vertex AI",
        }
    }

    async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, TransportError> {
        let start = Instant::now();
        let response = self
            .post(&self.generate_url(&request.model), request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body = response.text().await?;
        let data: WireResponse = serde_json::from_str(&body)?;
        if let Some(error) = data.error {
            return Err(wire_error(error));
        }

        Ok(GenerateResponse {
            text: data.text(),
            grounding: data.grounding(),
            model: request.model.clone(),
            tokens_used: data.usage_metadata.as_ref().and_then(|u| u.total_token_count),
            duration_ms: Some(start.elapsed().as_millis() as u64),
        })
    }

    async fn generate_stream(
        &self,
        request: &GenerateRequest,
    ) -> Result<ChunkStream, TransportError> {
        let response = self
            .post(&self.stream_url(&request.model), request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let (tx, rx) = mpsc::channel(100);
        let mut bytes = response.bytes_stream();
        let model = request.model.clone();

        tokio::spawn(async move {
            let mut decoder = SseDecoder::default();
            let mut chunks = 0usize;

            while let Some(read) = bytes.next().await {
                let payloads = match read {
                    Ok(data) => decoder.push(&data),
                    Err(e) => {
                        let _ = tx.send(Err(TransportError::Network(e.to_string()))).await;
                        return;
                    }
                };

                for payload in payloads {
                    let item = serde_json::from_str::<WireResponse>(&payload)
                        .map_err(TransportError::from)
                        .and_then(WireResponse::into_chunk);
                    let failed = item.is_err();
                    if tx.send(item).await.is_err() {
                        // Receiver dropped, stop streaming
                        tracing::debug!(model = %model, chunks, "Stream consumer went away");
                        return;
                    }
                    if failed {
                        return;
                    }
                    chunks += 1;
                }
            }

            if let Some(payload) = decoder.finish() {
                let item = serde_json::from_str::<WireResponse>(&payload)
                    .map_err(TransportError::from)
                    .and_then(WireResponse::into_chunk);
                let _ = tx.send(item).await;
            }

            tracing::debug!(model = %model, chunks, "Stream finished");
        });

        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn health_check(&self) -> bool {
        let request = self.authorize(
            self.http_client
                .get(self.health_url())
                .timeout(Duration::from_secs(5)),
        );
        match request.send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::debug!(status = %response.status(), "Health check rejected");
                false
            }
            Err(e) => {
                tracing::debug!(error = %e, "Health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::backend::Role;
    use crate::config::PlatformKind;

    fn backend() -> GeminiBackend {
        GeminiBackend::new(
            "https://example.test/",
            Some("key".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let backend = backend();
        assert_eq!(backend.base_url(), "https://example.test");
        assert_eq!(
            backend.generate_url("gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            backend.stream_url("gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
        assert_eq!(backend.health_url(), "https://example.test/v1beta/models");
        assert_eq!(backend.name(), "Gemini");
    }

    #[test]
    fn test_vertex_urls() {
        let backend = backend().with_platform(Platform::VertexAi {
            project: "proj".to_string(),
            location: "us-east1".to_string(),
        });
        assert_eq!(
            backend.generate_url("gemini-2.5-flash"),
            "https://example.test/v1/projects/proj/locations/us-east1/publishers/google/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            backend.stream_url("m"),
            "https://example.test/v1/projects/proj/locations/us-east1/publishers/google/models/m:streamGenerateContent?alt=sse"
        );
        assert_eq!(
            backend.health_url(),
            "https://example.test/v1/projects/proj/locations/us-east1"
        );
        assert_eq!(backend.name(), "Vertex AI");
    }

    #[test]
    fn test_from_settings_picks_platform_host() {
        let settings = BackendSettings {
            platform: PlatformKind::VertexAi,
            project: Some("proj".to_string()),
            location: Some("europe-west4".to_string()),
            ..BackendSettings::default()
        };
        let backend = GeminiBackend::from_settings(&settings).unwrap();
        assert_eq!(
            backend.base_url(),
            "https://europe-west4-aiplatform.googleapis.com"
        );

        let backend = GeminiBackend::from_settings(&BackendSettings::default()).unwrap();
        assert_eq!(backend.base_url(), DEFAULT_BASE_URL);
        assert_eq!(backend.platform(), &Platform::GoogleAi);

        let missing_project = BackendSettings {
            platform: PlatformKind::VertexAi,
            ..BackendSettings::default()
        };
        assert!(matches!(
            GeminiBackend::from_settings(&missing_project),
            Err(TransportError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_build_body() {
        let request = GenerateRequest::new("m")
            .with_turn(Content::user_text("earlier"))
            .with_turn(Content {
                role: Role::Model,
                parts: vec![Part::Text("reply".to_string())],
            })
            .with_turn(Content {
                role: Role::User,
                parts: vec![
                    Part::Text("what is this".to_string()),
                    Part::InlineData {
                        mime_type: "image/png".to_string(),
                        data: b"abc".to_vec(),
                    },
                    Part::FileData {
                        mime_type: "video/mp4".to_string(),
                        uri: "gs://b/v.mp4".to_string(),
                    },
                ],
            })
            .with_system("be brief")
            .with_max_output_tokens(64);

        let body = build_body(&request);
        assert_eq!(
            body,
            serde_json::json!({
                "contents": [
                    { "role": "user", "parts": [{ "text": "earlier" }] },
                    { "role": "model", "parts": [{ "text": "reply" }] },
                    { "role": "user", "parts": [
                        { "text": "what is this" },
                        { "inlineData": { "mimeType": "image/png", "data": "YWJj" } },
                        { "fileData": { "mimeType": "video/mp4", "fileUri": "gs://b/v.mp4" } },
                    ]},
                ],
                "systemInstruction": { "parts": [{ "text": "be brief" }] },
                "generationConfig": { "maxOutputTokens": 64 },
            })
        );
    }

    #[test]
    fn test_body_omits_defaults() {
        let body = build_body(&GenerateRequest::new("m").with_turn(Content::user_text("hi")));
        assert!(body.get("systemInstruction").is_none());
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn test_parse_response_with_grounding() {
        let json = r#"{
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hel" }, { "text": "lo" }] },
                "groundingMetadata": {
                    "webSearchQueries": ["hello"],
                    "groundingChunks": [
                        { "web": { "uri": "https://a.example", "title": "A" } },
                        { "web": { "title": "no uri" } }
                    ]
                }
            }],
            "usageMetadata": { "totalTokenCount": 12 }
        }"#;
        let data: WireResponse = serde_json::from_str(json).unwrap();
        assert_eq!(data.text().as_deref(), Some("Hello"));
        assert_eq!(
            data.grounding(),
            Some(GroundingMetadata {
                web_search_queries: vec!["hello".to_string()],
                sources: vec![GroundingSource {
                    title: Some("A".to_string()),
                    uri: "https://a.example".to_string(),
                }],
            })
        );
        assert_eq!(data.usage_metadata.unwrap().total_token_count, Some(12));
    }

    #[test]
    fn test_chunk_without_text() {
        let data: WireResponse =
            serde_json::from_str(r#"{"candidates":[{"content":{"parts":[]}}]}"#).unwrap();
        assert_eq!(data.into_chunk().unwrap(), Chunk::default());
    }

    #[test]
    fn test_inline_error_payload() {
        let data: WireResponse = serde_json::from_str(
            r#"{"error":{"code":429,"message":"Resource exhausted","status":"RESOURCE_EXHAUSTED"}}"#,
        )
        .unwrap();
        assert_eq!(
            data.into_chunk(),
            Err(TransportError::Quota("Resource exhausted".to_string()))
        );
    }

    #[test]
    fn test_sse_decoder_handles_split_reads() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        assert_eq!(decoder.push(b"1}\r\n\r\ndata: {\"b\""), vec!["{\"a\":1}"]);
        assert_eq!(decoder.push(b":2}\n"), vec!["{\"b\":2}"]);
        assert!(decoder.push(b": keep-alive comment\n").is_empty());
        decoder.push(b"data: {\"c\":3}");
        assert_eq!(decoder.finish().as_deref(), Some("{\"c\":3}"));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_sse_decoder_keeps_multibyte_chars_across_reads() {
        let mut decoder = SseDecoder::default();
        let line = "data: {\"t\":\"¡Hola!\"}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC2).unwrap() + 1;
        assert!(decoder.push(&line[..split]).is_empty());
        assert_eq!(decoder.push(&line[split..]), vec!["{\"t\":\"¡Hola!\"}"]);
    }

    // ========================================================================
    // HTTP
    // ========================================================================

    const HEL: &str = r#"data: {"candidates":[{"content":{"parts":[{"text":"Hel"}]}}]}"#;
    const LO: &str = r#"data: {"candidates":[{"content":{"parts":[{"text":"lo"}]}}]}"#;

    fn local(server: &MockServer) -> GeminiBackend {
        GeminiBackend::new(server.uri(), Some("key".to_string()), Duration::from_secs(5)).unwrap()
    }

    fn hi() -> GenerateRequest {
        GenerateRequest::new("m").with_turn(Content::user_text("hi"))
    }

    async fn mount_stream(server: &MockServer, body: String) {
        Mock::given(method("POST"))
            .and(path("/v1beta/models/m:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .and(header("x-goog-api-key", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn open_stream(
        backend: &GeminiBackend,
    ) -> Result<Vec<Result<Chunk, TransportError>>, TransportError> {
        let stream = backend.generate_stream(&hi()).await?;
        Ok(stream.collect().await)
    }

    #[tokio::test]
    async fn test_generate_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/m:generateContent"))
            .and(header("x-goog-api-key", "key"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{ "role": "user", "parts": [{ "text": "hi" }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "content": { "parts": [{ "text": "Hello!" }] } }],
                "usageMetadata": { "totalTokenCount": 7 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = local(&server).generate(&hi()).await.unwrap();
        assert_eq!(response.text.as_deref(), Some("Hello!"));
        assert_eq!(response.tokens_used, Some(7));
        assert_eq!(response.model, "m");
        assert!(response.duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_generate_maps_quota_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/m:generateContent"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {
                    "code": 429,
                    "message": "Resource exhausted",
                    "status": "RESOURCE_EXHAUSTED"
                }
            })))
            .mount(&server)
            .await;

        let result = local(&server).generate(&hi()).await;
        assert_eq!(
            result,
            Err(TransportError::Quota("Resource exhausted".to_string()))
        );
    }

    #[tokio::test]
    async fn test_stream_open_maps_server_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/m:streamGenerateContent"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        assert_eq!(
            open_stream(&local(&server)).await,
            Err(TransportError::Server {
                status: 503,
                message: "overloaded".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_stream_stops_after_error_event() {
        let server = MockServer::start().await;
        let error = r#"data: {"error":{"code":500,"message":"internal"}}"#;
        mount_stream(&server, format!("{HEL}\r\n\r\n{error}\r\n\r\n{LO}\r\n\r\n")).await;

        let items = open_stream(&local(&server)).await.unwrap();
        assert_eq!(
            items,
            vec![
                Ok(Chunk::text("Hel")),
                Err(TransportError::Server {
                    status: 500,
                    message: "internal".to_string(),
                }),
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_flushes_event_without_trailing_newline() {
        let server = MockServer::start().await;
        mount_stream(&server, format!("{HEL}\n\n{LO}")).await;

        let items = open_stream(&local(&server)).await.unwrap();
        assert_eq!(items, vec![Ok(Chunk::text("Hel")), Ok(Chunk::text("lo"))]);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend =
            GeminiBackend::new(format!("http://{addr}"), None, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            backend.generate(&hi()).await,
            Err(TransportError::Network(_))
        ));
        assert!(!backend.health_check().await);
    }

    /// Read one HTTP request, headers and body
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut read = [0u8; 1024];
        loop {
            let n = socket.read(&mut read).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&read[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_truncated_stream_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            let event = format!("{HEL}\n\n");
            // Promise more bytes than are sent, then hang up
            let head = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\n\r\n",
                event.len() + 100
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(event.as_bytes()).await.unwrap();
        });

        let backend =
            GeminiBackend::new(format!("http://{addr}"), None, Duration::from_secs(5)).unwrap();
        let items = open_stream(&backend).await.unwrap();
        assert_eq!(items.first(), Some(&Ok(Chunk::text("Hel"))));
        assert!(matches!(items.last(), Some(Err(TransportError::Network(_)))));
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .and(header("x-goog-api-key", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": []
            })))
            .mount(&server)
            .await;
        assert!(local(&server).health_check().await);

        let unauthorized = GeminiBackend::new(server.uri(), None, Duration::from_secs(5)).unwrap();
        assert!(!unauthorized.health_check().await);
    }

    #[tokio::test]
    async fn test_vertex_uses_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(
                "/v1/projects/proj/locations/us-central1/publishers/google/models/m:generateContent",
            ))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "content": { "parts": [{ "text": "Hola" }] } }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/proj/locations/us-central1"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let backend = GeminiBackend::new(server.uri(), Some("token".to_string()), Duration::from_secs(5))
            .unwrap()
            .with_platform(Platform::VertexAi {
                project: "proj".to_string(),
                location: "us-central1".to_string(),
            });
        let response = backend.generate(&hi()).await.unwrap();
        assert_eq!(response.text.as_deref(), Some("Hola"));
        assert!(backend.health_check().await);
    }
}
