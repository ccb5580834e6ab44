//! Streaming chat transport against the Gemini generative-language API.
//!
//! One invocation of [`ChatTransport::send_message_stream`] opens one
//! `streamGenerateContent` call (SSE) and yields text increments. Grounding
//! citations returned by the maps/search tools are rendered inline as a
//! markdown block appended to the increment that carried them. A failed call
//! surfaces immediately; there is no retry layer.

use std::collections::VecDeque;
use std::mem;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::GeminiParams;
use crate::content::SYSTEM_PROMPT;
use crate::error::AppError;

const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const TEMPERATURE: f32 = 0.7;

/// One-shot coordinates used to bias the retrieval tools. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Prior conversation turn in the transport's shape (assistant turns are
/// renamed to `model` on the wire).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    pub role: TurnRole,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Model,
}

impl TurnRole {
    const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// Closed classification of transport failures. The vendor's error wording is
/// string-matched here and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Auth,
    Network,
    Unknown,
}

/// Classifies a transport failure. Credential problems are detected by
/// message content, which is how the vendor reports them across otherwise
/// unrelated status codes.
pub fn classify_failure(error: &AppError) -> FailureKind {
    let message = error.to_string().to_lowercase();
    if message.contains("api key")
        || message.contains("requested entity was not found")
        || message.contains("status code: 0")
    {
        return FailureKind::Auth;
    }
    if let AppError::Http(e) = error {
        if e.is_connect() || e.is_timeout() {
            return FailureKind::Network;
        }
    }
    FailureKind::Unknown
}

/// Lazy sequence of rendered text increments.
pub type IncrementStream = Pin<Box<dyn Stream<Item = Result<String, AppError>> + Send>>;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Opens one streaming call with `history` as prior context and `text` as
    /// the new user turn. Blank input yields an empty stream.
    async fn send_message_stream(
        &self,
        text: &str,
        history: Vec<HistoryTurn>,
        location: Option<LocationCoordinates>,
    ) -> Result<IncrementStream, AppError>;
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    system_instruction: Content,
    generation_config: GenerationConfig,
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<ToolConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

/// Gemini tool entries serialize as `{"googleMaps": {}}` / `{"googleSearch": {}}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    #[serde(skip_serializing_if = "Option::is_none")]
    google_maps: Option<EmptyConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    google_search: Option<EmptyConfig>,
}

#[derive(Debug, Serialize)]
struct EmptyConfig {}

impl Tool {
    fn maps() -> Self {
        Self {
            google_maps: Some(EmptyConfig {}),
            google_search: None,
        }
    }

    fn search() -> Self {
        Self {
            google_maps: None,
            google_search: Some(EmptyConfig {}),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolConfig {
    retrieval_config: RetrievalConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrievalConfig {
    lat_lng: LocationCoordinates,
}

#[derive(Debug, Deserialize)]
struct StreamingResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
    #[serde(rename = "groundingMetadata")]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct GroundingMetadata {
    #[serde(rename = "groundingChunks")]
    grounding_chunks: Option<Vec<GroundingChunk>>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<GroundingSource>,
    maps: Option<GroundingSource>,
}

#[derive(Debug, Deserialize)]
struct GroundingSource {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// ============================================================================
// Citations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CitationKind {
    Location,
    Web,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub label: String,
    pub uri: String,
    pub kind: CitationKind,
}

/// Renders citations as the markdown block appended to a streamed increment.
/// Empty input renders nothing.
pub fn render_citations(citations: &[Citation]) -> String {
    let links: String = citations
        .iter()
        .map(|c| {
            let tag = match c.kind {
                CitationKind::Location => "📍",
                CitationKind::Web => "🔗",
            };
            format!("\n{tag} [{}]({})", c.label, c.uri)
        })
        .collect();

    if links.is_empty() {
        String::new()
    } else {
        format!("\n\n**Verified Resources:**{links}")
    }
}

fn extract_citations(candidate: &Candidate) -> Vec<Citation> {
    let Some(chunks) = candidate
        .grounding_metadata
        .as_ref()
        .and_then(|m| m.grounding_chunks.as_ref())
    else {
        return Vec::new();
    };

    chunks
        .iter()
        .filter_map(|chunk| {
            let (source, kind) = match (&chunk.maps, &chunk.web) {
                (Some(maps), _) => (maps, CitationKind::Location),
                (None, Some(web)) => (web, CitationKind::Web),
                (None, None) => return None,
            };
            let uri = source.uri.clone()?;
            let label = source.title.clone().unwrap_or_else(|| uri.clone());
            Some(Citation { label, uri, kind })
        })
        .collect()
}

/// Parses one SSE `data:` payload into a rendered increment. Chunks without
/// text yield nothing, even when they carry grounding metadata.
pub fn parse_stream_payload(payload: &str) -> Option<String> {
    let response: StreamingResponse = match serde_json::from_str(payload) {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Failed to parse streaming chunk");
            return None;
        }
    };

    let candidate = response.candidates?.into_iter().next()?;
    let text: String = candidate
        .content
        .as_ref()?
        .parts
        .iter()
        .map(|p| p.text.as_str())
        .collect();
    if text.is_empty() {
        return None;
    }

    let citations = extract_citations(&candidate);
    Some(format!("{text}{}", render_citations(&citations)))
}

// ============================================================================
// SSE framing
// ============================================================================

/// Line-buffering SSE parser. SSE events are newline-delimited, but TCP does
/// not align chunk boundaries with lines: a JSON payload may arrive split
/// across two reads, and several events may arrive in one. Incomplete lines
/// stay buffered until the terminating `\n` arrives.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes, returning the `data:` payloads of every line
    /// completed by this chunk.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut payloads = Vec::new();
        while let Some(newline_pos) = self.buffer.find('\n') {
            let line = self.buffer[..newline_pos].trim_end_matches('\r').to_owned();
            self.buffer = self.buffer[newline_pos + 1..].to_owned();
            if let Some(payload) = Self::data_payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Drains a trailing partial line once the byte stream ends.
    pub fn flush(&mut self) -> Vec<String> {
        let remaining = mem::take(&mut self.buffer);
        Self::data_payload(&remaining).into_iter().collect()
    }

    // Non-data SSE fields (event:, id:, retry:, ": comment") are ignored.
    fn data_payload(line: &str) -> Option<String> {
        let data = line.trim().strip_prefix("data: ")?;
        if data.trim().is_empty() {
            None
        } else {
            Some(data.to_owned())
        }
    }
}

/// Turns a raw byte stream into rendered text increments, maintaining the
/// line buffer across reads and flushing it when the stream ends.
fn sse_increment_stream<S>(byte_stream: S) -> IncrementStream
where
    S: Stream<Item = Result<Vec<u8>, AppError>> + Send + 'static,
{
    struct StreamState {
        parser: SseLineBuffer,
        pending: VecDeque<Result<String, AppError>>,
        ended: bool,
    }

    let state = StreamState {
        parser: SseLineBuffer::new(),
        pending: VecDeque::new(),
        ended: false,
    };

    let stream = stream::unfold(
        (Box::pin(byte_stream), state),
        |(mut byte_stream, mut state)| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, (byte_stream, state)));
                }
                if state.ended {
                    return None;
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        for payload in state.parser.feed(&bytes) {
                            if let Some(increment) = parse_stream_payload(&payload) {
                                state.pending.push_back(Ok(increment));
                            }
                        }
                    }
                    Some(Err(e)) => {
                        state.ended = true;
                        state.pending.push_back(Err(e));
                    }
                    None => {
                        state.ended = true;
                        for payload in state.parser.flush() {
                            if let Some(increment) = parse_stream_payload(&payload) {
                                state.pending.push_back(Ok(increment));
                            }
                        }
                    }
                }
            }
        },
    );

    Box::pin(stream)
}

// ============================================================================
// Client
// ============================================================================

pub struct GeminiClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Builds a client from the stored settings. A blank api key is reported
    /// as a configuration error, which classifies as [`FailureKind::Auth`].
    pub fn from_config(params: &GeminiParams) -> Result<Self, AppError> {
        if params.api_key.trim().is_empty() {
            return Err(AppError::Config(
                "Gemini API key is not set in the configuration file.".to_string(),
            ));
        }
        Ok(Self {
            api_key: params.api_key.clone(),
            model: params.model.clone(),
            client: reqwest::Client::new(),
        })
    }

    fn build_url(&self) -> String {
        format!(
            "{API_BASE_URL}/models/{}:streamGenerateContent?key={}&alt=sse",
            self.model, self.api_key
        )
    }

    fn map_api_error(status: u16, response_text: &str) -> AppError {
        let message = serde_json::from_str::<ApiErrorEnvelope>(response_text)
            .ok()
            .and_then(|envelope| envelope.error)
            .map_or_else(|| response_text.to_owned(), |e| e.message);
        AppError::Api { status, message }
    }
}

/// Builds the request body: prior turns plus the new user turn, the system
/// instruction, both retrieval tools, and the location bias when present.
fn build_request(
    text: &str,
    history: &[HistoryTurn],
    location: Option<LocationCoordinates>,
) -> GenerateRequest {
    let mut contents: Vec<Content> = history
        .iter()
        .map(|turn| Content {
            role: Some(turn.role.as_str().to_owned()),
            parts: vec![Part {
                text: turn.text.clone(),
            }],
        })
        .collect();
    contents.push(Content {
        role: Some(TurnRole::User.as_str().to_owned()),
        parts: vec![Part {
            text: text.to_owned(),
        }],
    });

    GenerateRequest {
        contents,
        system_instruction: Content {
            role: None,
            parts: vec![Part {
                text: SYSTEM_PROMPT.to_owned(),
            }],
        },
        generation_config: GenerationConfig {
            temperature: TEMPERATURE,
        },
        tools: vec![Tool::maps(), Tool::search()],
        tool_config: location.map(|lat_lng| ToolConfig {
            retrieval_config: RetrievalConfig { lat_lng },
        }),
    }
}

#[async_trait]
impl ChatTransport for GeminiClient {
    #[instrument(skip(self, text, history), fields(model = %self.model, turns = history.len()))]
    async fn send_message_stream(
        &self,
        text: &str,
        history: Vec<HistoryTurn>,
        location: Option<LocationCoordinates>,
    ) -> Result<IncrementStream, AppError> {
        if text.trim().is_empty() {
            return Ok(Box::pin(stream::empty()));
        }

        let request = build_request(text, &history, location);
        debug!(located = location.is_some(), "Starting streaming request to Gemini");

        let response = self
            .client
            .post(self.build_url())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GeminiClient::map_api_error(status.as_u16(), &error_text));
        }

        let bytes = response
            .bytes_stream()
            .map(|result| match result {
                Ok(chunk) => Ok(chunk.to_vec()),
                Err(e) => Err(AppError::Stream(e.to_string())),
            });
        Ok(sse_increment_stream(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: TurnRole, text: &str) -> HistoryTurn {
        HistoryTurn {
            role,
            text: text.to_string(),
        }
    }

    #[test]
    fn request_carries_both_tools_and_temperature() {
        let request = build_request("hi", &[], None);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value["tools"],
            serde_json::json!([{ "googleMaps": {} }, { "googleSearch": {} }])
        );
        assert_eq!(value["generationConfig"]["temperature"], 0.7);
        assert!(value["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("MINDA"));
        assert!(value.get("toolConfig").is_none());
    }

    #[test]
    fn request_appends_new_text_after_history_with_wire_roles() {
        let history = vec![turn(TurnRole::User, "earlier"), turn(TurnRole::Model, "reply")];
        let request = build_request("now", &history, None);
        let value = serde_json::to_value(&request).unwrap();

        let contents = value["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["text"], "now");
    }

    #[test]
    fn request_biases_retrieval_when_located() {
        let location = LocationCoordinates {
            latitude: 12.97,
            longitude: 77.59,
        };
        let request = build_request("hi", &[], Some(location));
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value["toolConfig"]["retrievalConfig"]["latLng"]["latitude"],
            12.97
        );
        assert_eq!(
            value["toolConfig"]["retrievalConfig"]["latLng"]["longitude"],
            77.59
        );
    }

    #[test]
    fn line_buffer_reassembles_payload_split_across_reads() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.feed(b"data: {\"candidates\":").is_empty());
        let payloads = buffer.feed(b"null}\n");
        assert_eq!(payloads, vec!["{\"candidates\":null}".to_string()]);
    }

    #[test]
    fn line_buffer_emits_every_event_in_one_read() {
        let mut buffer = SseLineBuffer::new();
        let payloads = buffer.feed(b"data: {\"a\":1}\r\n\r\ndata: {\"b\":2}\n");
        assert_eq!(payloads, vec!["{\"a\":1}".to_string(), "{\"b\":2}".to_string()]);
    }

    #[test]
    fn line_buffer_ignores_non_data_fields_and_flushes_tail() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.feed(b"event: ping\nid: 7\ndata: {\"tail\":true}").is_empty());
        assert_eq!(buffer.flush(), vec!["{\"tail\":true}".to_string()]);
        assert!(buffer.flush().is_empty());
    }

    #[test]
    fn payload_text_passes_through_verbatim() {
        let payload = r#"{"candidates":[{"content":{"parts":[{"text":"Hello"}]}}]}"#;
        assert_eq!(parse_stream_payload(payload), Some("Hello".to_string()));
    }

    #[test]
    fn payload_without_text_yields_nothing() {
        assert_eq!(parse_stream_payload(r#"{"candidates":null}"#), None);
        assert_eq!(
            parse_stream_payload(r#"{"candidates":[{"content":{"parts":[{"text":""}]}}]}"#),
            None
        );
        assert_eq!(parse_stream_payload("not json"), None);
    }

    #[test]
    fn grounded_payload_appends_tagged_resource_block() {
        let payload = r#"{
            "candidates": [{
                "content": { "parts": [{ "text": "Here are options." }] },
                "groundingMetadata": {
                    "groundingChunks": [
                        { "maps": { "title": "Calm Clinic", "uri": "https://maps.example/1" } },
                        { "web": { "title": "NIMH", "uri": "https://nimh.example" } }
                    ]
                }
            }]
        }"#;

        let increment = parse_stream_payload(payload).unwrap();
        assert!(increment.starts_with("Here are options."));
        assert!(increment.contains("**Verified Resources:**"));
        assert!(increment.contains("\n📍 [Calm Clinic](https://maps.example/1)"));
        assert!(increment.contains("\n🔗 [NIMH](https://nimh.example)"));
    }

    #[test]
    fn citations_without_uri_are_dropped() {
        let payload = r#"{
            "candidates": [{
                "content": { "parts": [{ "text": "ok" }] },
                "groundingMetadata": { "groundingChunks": [ { "web": { "title": "no uri" } } ] }
            }]
        }"#;
        assert_eq!(parse_stream_payload(payload), Some("ok".to_string()));
    }

    #[test]
    fn classify_detects_credential_failures_by_message() {
        let not_found = AppError::Api {
            status: 404,
            message: "Requested entity was not found.".to_string(),
        };
        assert_eq!(classify_failure(&not_found), FailureKind::Auth);

        let missing_key = AppError::Config(
            "Gemini API key is not set in the configuration file.".to_string(),
        );
        assert_eq!(classify_failure(&missing_key), FailureKind::Auth);

        let opaque = AppError::Stream("status code: 0".to_string());
        assert_eq!(classify_failure(&opaque), FailureKind::Auth);
    }

    #[test]
    fn classify_leaves_other_failures_unknown() {
        let server = AppError::Api {
            status: 500,
            message: "internal".to_string(),
        };
        assert_eq!(classify_failure(&server), FailureKind::Unknown);
        assert_eq!(
            classify_failure(&AppError::Stream("connection reset".to_string())),
            FailureKind::Unknown
        );
    }

    #[tokio::test]
    async fn increment_stream_survives_chunk_boundaries() {
        let first = br#"data: {"candidates":[{"content":{"parts":[{"text":"Hel"#.to_vec();
        let second = br#"lo"}]}}]}
data: {"candidates":[{"content":{"parts":[{"text":" there"}]}}]}
"#
        .to_vec();

        let stream = sse_increment_stream(stream::iter(vec![Ok(first), Ok(second)]));
        let increments: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(increments, vec!["Hello".to_string(), " there".to_string()]);
    }

    #[tokio::test]
    async fn increment_stream_surfaces_read_errors() {
        let chunks: Vec<Result<Vec<u8>, AppError>> = vec![
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"a\"}]}}]}\n".to_vec()),
            Err(AppError::Stream("reset".to_string())),
        ];
        let mut stream = sse_increment_stream(stream::iter(chunks));

        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn blank_key_is_rejected_at_construction() {
        let err = GeminiClient::from_config(&GeminiParams {
            api_key: "  ".to_string(),
            model: "gemini-3-flash-preview".to_string(),
        })
        .unwrap_err();
        assert_eq!(classify_failure(&err), FailureKind::Auth);
    }

    #[test]
    fn api_error_prefers_envelope_message() {
        let err = GeminiClient::map_api_error(
            429,
            r#"{"error":{"message":"Quota exceeded"}}"#,
        );
        assert_eq!(err.to_string(), "Gemini API error (429): Quota exceeded");

        let raw = GeminiClient::map_api_error(502, "bad gateway");
        assert!(raw.to_string().contains("bad gateway"));
    }
}
