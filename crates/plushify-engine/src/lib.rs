use std::fmt;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use plushify_contracts::events::EventWriter;
use plushify_contracts::transform::{ResultImage, TransformError, TransformOutcome};
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Map, Value};

pub mod config;

pub use config::{TransformConfig, PLUSH_MODEL};

pub const PLUSH_PROMPT: &str = "Transform this character into a high-quality, professional designer plush toy (soft toy).
- Maintain character colors, hair style, and facial features.
- Use soft, premium fabric texture (minky or fleece).
- Set on a clean, minimal white or soft grey studio background.
- Ensure it looks like a real physical product photography.
Output ONLY the image of the plush toy.";

const SAFETY_FINISH_REASONS: &[&str] = &["SAFETY", "IMAGE_SAFETY"];
const CREDENTIAL_PROVIDER_STATUSES: &[&str] = &["PERMISSION_DENIED", "UNAUTHENTICATED"];
const CREDENTIAL_REASONS: &[&str] = &["API_KEY_INVALID", "API_KEY_SERVICE_BLOCKED"];
const QUOTA_HTTP_STATUSES: &[u16] = &[429];
const QUOTA_PROVIDER_STATUSES: &[&str] = &["RESOURCE_EXHAUSTED"];

/// A failed exchange with the generation service, with whatever structure
/// the provider exposed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderFailure {
    pub http_status: Option<u16>,
    pub provider_status: Option<String>,
    pub reason: Option<String>,
    pub message: String,
}

impl ProviderFailure {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    fn is_quota(&self) -> bool {
        self.http_status
            .is_some_and(|status| QUOTA_HTTP_STATUSES.contains(&status))
            || self
                .provider_status
                .as_deref()
                .is_some_and(|status| QUOTA_PROVIDER_STATUSES.contains(&status))
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(status) = self.provider_status.as_deref() {
            write!(f, " [status={status}]")?;
        }
        if let Some(reason) = self.reason.as_deref() {
            write!(f, " [reason={reason}]")?;
        }
        Ok(())
    }
}

/// One `generateContent` round trip. Implementations make exactly one
/// outbound call and never retry.
pub trait GenerateContentTransport: Send + Sync {
    fn name(&self) -> &str;
    fn generate_content(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &Value,
    ) -> std::result::Result<Value, ProviderFailure>;
}

pub struct HttpTransport {
    http: HttpClient,
}

impl HttpTransport {
    /// The client carries no request timeout; the service's own limits apply.
    pub fn new() -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(None::<std::time::Duration>)
            .build()
            .context("failed building HTTP client")?;
        Ok(Self::from_client(http))
    }

    fn from_client(http: HttpClient) -> Self {
        Self { http }
    }
}

impl GenerateContentTransport for HttpTransport {
    fn name(&self) -> &str {
        "gemini-http"
    }

    fn generate_content(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &Value,
    ) -> std::result::Result<Value, ProviderFailure> {
        let response = self
            .http
            .post(endpoint)
            .header("x-goog-api-key", api_key)
            .json(payload)
            .send()
            .map_err(|err| ProviderFailure {
                http_status: err.status().map(|status| status.as_u16()),
                message: error_chain_text(
                    &anyhow::Error::new(err).context(format!("Gemini request failed ({endpoint})")),
                    512,
                ),
                ..ProviderFailure::default()
            })?;

        let status = response.status();
        let body = response.text().map_err(|err| ProviderFailure {
            http_status: Some(status.as_u16()),
            message: format!("Gemini response body read failed: {err}"),
            ..ProviderFailure::default()
        })?;
        if !status.is_success() {
            return Err(failure_from_http(status.as_u16(), &body));
        }
        serde_json::from_str(&body).map_err(|err| ProviderFailure {
            http_status: Some(status.as_u16()),
            message: format!("Gemini returned invalid JSON payload: {err}"),
            ..ProviderFailure::default()
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
    details: Option<Vec<Value>>,
}

fn failure_from_http(code: u16, body: &str) -> ProviderFailure {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .unwrap_or_default();
    let reason = envelope
        .details
        .unwrap_or_default()
        .iter()
        .filter_map(|detail| detail.get("reason").and_then(Value::as_str))
        .map(str::to_string)
        .next();
    let detail = envelope
        .message
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| truncate_text(body.trim(), 512));
    ProviderFailure {
        http_status: Some(envelope.code.unwrap_or(code)),
        provider_status: envelope.status,
        reason,
        message: format!("Gemini request failed ({code}): {detail}"),
    }
}

/// Maps a provider failure onto the user-facing taxonomy.
///
/// Structured signals decide first. When they do not mark the failure as an
/// authorization problem, the message is searched for `403` or `api key`
/// unless the failure is a quota rejection. That fallback is a heuristic and
/// can misfire on unrelated text.
fn classify_failure(failure: &ProviderFailure) -> TransformError {
    let structured_auth = matches!(failure.http_status, Some(401 | 403))
        || failure
            .provider_status
            .as_deref()
            .is_some_and(|status| CREDENTIAL_PROVIDER_STATUSES.contains(&status))
        || failure
            .reason
            .as_deref()
            .is_some_and(|reason| CREDENTIAL_REASONS.contains(&reason));
    if structured_auth {
        return TransformError::CredentialInvalid;
    }
    if !failure.is_quota() {
        let lowered = failure.message.to_ascii_lowercase();
        if lowered.contains("403") || lowered.contains("api key") {
            return TransformError::CredentialInvalid;
        }
    }
    TransformError::ProviderError(truncate_text(&failure.message, 512))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default, alias = "finish_reason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, alias = "inline_data")]
    inline_data: Option<InlineData>,
}

/// The reported MIME type is ignored; results are presented as PNG.
#[derive(Debug, Deserialize)]
struct InlineData {
    #[serde(default)]
    data: Option<String>,
}

fn build_payload(image_bytes: &[u8], mime_type: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                {
                    "inlineData": {
                        "mimeType": mime_type,
                        "data": BASE64.encode(image_bytes),
                    }
                },
                { "text": PLUSH_PROMPT },
            ],
        }],
    })
}

/// Reads the first candidate: safety stops fail, otherwise the first part
/// carrying inline data wins.
fn interpret_response(response: Value) -> TransformOutcome {
    let parsed: GenerateContentResponse = serde_json::from_value(response).map_err(|err| {
        TransformError::ProviderError(format!("Gemini returned an unexpected payload: {err}"))
    })?;
    let Some(candidate) = parsed.candidates.unwrap_or_default().into_iter().next() else {
        return Err(TransformError::NoResponse);
    };
    if candidate
        .finish_reason
        .as_deref()
        .is_some_and(|reason| SAFETY_FINISH_REASONS.contains(&reason))
    {
        return Err(TransformError::SafetyBlocked);
    }

    let parts = candidate
        .content
        .and_then(|content| content.parts)
        .unwrap_or_default();
    for part in parts {
        let Some(data) = part
            .inline_data
            .and_then(|inline| inline.data)
            .filter(|data| !data.trim().is_empty())
        else {
            continue;
        };
        let bytes = BASE64.decode(data.trim().as_bytes()).map_err(|err| {
            TransformError::ProviderError(format!("Gemini image base64 decode failed: {err}"))
        })?;
        return Ok(Some(ResultImage::new(bytes)));
    }
    Ok(None)
}

/// Sends a character image to the generation service with the fixed plush
/// prompt.
pub struct PlushTransformer {
    config: TransformConfig,
    transport: Box<dyn GenerateContentTransport>,
    events: Option<EventWriter>,
}

impl PlushTransformer {
    pub fn new<T: GenerateContentTransport + 'static>(config: TransformConfig, transport: T) -> Self {
        Self {
            config,
            transport: Box::new(transport),
            events: None,
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(TransformConfig::from_env(), HttpTransport::new()?))
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    pub fn transform(&self, image_bytes: &[u8], mime_type: &str) -> TransformOutcome {
        let Some(api_key) = self.config.resolve_credential() else {
            let err = TransformError::CredentialMissing;
            self.record_failure(&err, &format!("{} not set", self.config.credential_var));
            return Err(err);
        };

        let endpoint = self.config.endpoint();
        let payload = build_payload(image_bytes, mime_type);
        self.record(
            "transform_started",
            json!({
                "model": self.config.model,
                "transport": self.transport.name(),
                "mime_type": mime_type,
                "bytes": image_bytes.len(),
            }),
        );

        let response = match self
            .transport
            .generate_content(&endpoint, &api_key, &payload)
        {
            Ok(response) => response,
            Err(failure) => {
                let err = classify_failure(&failure);
                self.record_failure(&err, &failure.to_string());
                return Err(err);
            }
        };

        match interpret_response(response) {
            Ok(Some(image)) => {
                self.record("transform_succeeded", json!({ "bytes": image.bytes().len() }));
                Ok(Some(image))
            }
            Ok(None) => {
                self.record("transform_empty", json!({}));
                Ok(None)
            }
            Err(err) => {
                self.record_failure(&err, &err.to_string());
                Err(err)
            }
        }
    }

    fn record_failure(&self, err: &TransformError, detail: &str) {
        self.record(
            "transform_failed",
            json!({
                "kind": err.kind(),
                "message": err.to_string(),
                "detail": detail,
            }),
        );
    }

    fn record(&self, event_type: &str, payload: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = events.emit(event_type, map_object(payload)) {
            eprintln!("plushify event log write failed: {err:#}");
        }
    }
}

fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
