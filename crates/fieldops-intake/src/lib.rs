#![forbid(unsafe_code)]

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use fieldops_domain::JobExtraction;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

/// Failures raised by the upstream collaborators (transcription and
/// extraction). These surface at the boundary layer before the orchestrator
/// begins; they are a separate category from tool outcomes and never enter a
/// run.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("audio clip too small ({0} bytes); record a longer clip")]
    AudioTooSmall(usize),
    #[error("could not transcribe; got '{0}' which looks like silence or background noise")]
    SuspectTranscript(String),
    #[error("transcript too short; speak clearly for at least a few seconds")]
    TranscriptTooShort,
    #[error("missing env var '{0}' holding the API credential")]
    MissingCredential(String),
    #[error("http request failed: {0}")]
    Http(String),
    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),
    #[error("extraction is invalid: {0}")]
    InvalidExtraction(String),
}

const MIN_AUDIO_BYTES: usize = 1000;
const MIN_TRANSCRIPT_CHARS: usize = 5;

/// Phrases speech models are known to hallucinate on silent or very quiet
/// audio. A transcript that is nothing but one of these is rejected.
const HALLUCINATIONS: &[&str] = &[
    "thank you",
    "thanks for watching",
    "thanks for listening",
    "bye",
    "goodbye",
    "see you",
    "you",
    "thanks",
    "the end",
    "subtitles by",
    "thank you for watching",
];

/// Apply the transcript sanity guards and return the trimmed transcript.
///
/// # Errors
/// Returns an error when the transcript is a known silence hallucination or
/// too short to carry a job report.
pub fn validate_transcript(raw: &str) -> Result<String, IntakeError> {
    let transcript = raw.trim().to_string();
    let normalized = transcript
        .to_lowercase()
        .trim_matches(|c: char| c == '.' || c == '!' || c.is_whitespace())
        .to_string();
    if HALLUCINATIONS.contains(&normalized.as_str()) {
        return Err(IntakeError::SuspectTranscript(transcript));
    }
    if transcript.chars().count() < MIN_TRANSCRIPT_CHARS {
        return Err(IntakeError::TranscriptTooShort);
    }
    Ok(transcript)
}

pub trait Transcriber {
    /// Turn raw audio bytes into a transcript.
    ///
    /// # Errors
    /// Returns an [`IntakeError`] when the audio is unusable or the upstream
    /// service fails.
    fn transcribe(&self, audio: &[u8], mime: &str) -> Result<String, IntakeError>;
}

pub trait Extractor {
    /// Turn a transcript into a validated structured extraction.
    ///
    /// # Errors
    /// Returns an [`IntakeError`] when the upstream service fails or returns
    /// data that violates the extraction invariants.
    fn extract(&self, transcript: &str) -> Result<JobExtraction, IntakeError>;
}

/// Endpoint and credential settings for the HTTP adapters. Defaults target a
/// Groq-compatible OpenAI-style API.
#[derive(Debug, Clone)]
pub struct HttpIntakeConfig {
    pub api_base: String,
    pub llm_model: String,
    pub whisper_model: String,
    pub auth_env: String,
    pub timeout_ms: u64,
}

impl Default for HttpIntakeConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.groq.com/openai/v1".to_string(),
            llm_model: "llama-3.3-70b-versatile".to_string(),
            whisper_model: "whisper-large-v3".to_string(),
            auth_env: "GROQ_API_KEY".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl HttpIntakeConfig {
    /// Build the config from environment variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: std::env::var("FIELDOPS_API_BASE").unwrap_or(defaults.api_base),
            llm_model: std::env::var("GROQ_LLM_MODEL").unwrap_or(defaults.llm_model),
            whisper_model: std::env::var("GROQ_WHISPER_MODEL").unwrap_or(defaults.whisper_model),
            auth_env: defaults.auth_env,
            timeout_ms: defaults.timeout_ms,
        }
    }

    fn bearer_token(&self) -> Result<String, IntakeError> {
        std::env::var(&self.auth_env)
            .map_err(|_| IntakeError::MissingCredential(self.auth_env.clone()))
    }

    fn agent(&self) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(self.timeout_ms))
            .build()
    }
}

/// Canned transcriber for tests and offline runs; ignores the audio bytes.
#[derive(Debug, Clone)]
pub struct FixedTranscriber {
    pub transcript: String,
}

impl Transcriber for FixedTranscriber {
    fn transcribe(&self, _audio: &[u8], _mime: &str) -> Result<String, IntakeError> {
        Ok(self.transcript.clone())
    }
}

/// HTTP adapter for a JSON-speaking transcription gateway: posts the audio as
/// base64 and expects `{ "text": ... }` back.
#[derive(Debug, Clone)]
pub struct HttpJsonTranscriber {
    config: HttpIntakeConfig,
}

impl HttpJsonTranscriber {
    #[must_use]
    pub fn new(config: HttpIntakeConfig) -> Self {
        Self { config }
    }
}

impl Transcriber for HttpJsonTranscriber {
    fn transcribe(&self, audio: &[u8], mime: &str) -> Result<String, IntakeError> {
        if audio.len() < MIN_AUDIO_BYTES {
            return Err(IntakeError::AudioTooSmall(audio.len()));
        }
        let token = self.config.bearer_token()?;
        info!(bytes = audio.len(), mime, "transcribing audio clip");

        let body = json!({
            "model": self.config.whisper_model,
            "language": "en",
            "mime": mime,
            "audio_b64": BASE64.encode(audio),
        });
        let url = format!("{}/audio/transcriptions", self.config.api_base);
        let response = send_json(&self.config.agent(), &url, &token, &body)?;

        let text = response
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| IntakeError::InvalidResponse("missing 'text' field".to_string()))?;
        let transcript = validate_transcript(text)?;
        info!(%transcript, "transcription complete");
        Ok(transcript)
    }
}

/// Canned extractor for tests and offline runs; echoes the transcript into
/// `raw_transcript` like the live adapter does.
#[derive(Debug, Clone)]
pub struct FixedExtractor {
    pub extraction: JobExtraction,
}

impl Extractor for FixedExtractor {
    fn extract(&self, transcript: &str) -> Result<JobExtraction, IntakeError> {
        let mut extraction = self.extraction.clone();
        extraction.raw_transcript = transcript.to_string();
        extraction
            .validate()
            .map_err(|err| IntakeError::InvalidExtraction(err.to_string()))?;
        Ok(extraction)
    }
}

const SYSTEM_PROMPT: &str = "You are an assistant for FieldOps, a field service management system.\n\
Your job is to extract structured data from voice transcripts of field service workers.\n\
\n\
Extract the following information accurately:\n\
- customer_name: The customer or client name mentioned\n\
- job_type: Type of work performed (plumbing, electrical, HVAC, painting, carpentry, general maintenance, etc.)\n\
- labor_hours: Hours worked (numeric)\n\
- follow_up_date: If a follow-up is mentioned, extract the date (ISO format or a relative phrase like '6 months') or null\n\
- follow_up_reason: Why follow-up is needed or null\n\
- invoice_required: true if the job was completed and should be billed (default true). Set to false if the user explicitly says not to bill.\n\
- confidence_score: Confidence in extraction accuracy (0.0 to 1.0)\n\
\n\
For materials used, return a list where each item has:\n\
- item: Material name\n\
- quantity: Quantity used (integer, at least 1)\n\
- unit: Unit of measurement (default to 'piece' if not mentioned)\n\
\n\
Rules:\n\
- If someone says 'don't bill' or 'no charge', set invoice_required to false\n\
- Always attempt to infer job_type from context even if not explicitly stated\n\
- Respond ONLY with valid JSON matching the schema. No markdown formatting or extra text.";

/// HTTP adapter for an OpenAI-style chat-completions endpoint returning the
/// extraction as a JSON object.
#[derive(Debug, Clone)]
pub struct HttpLlmExtractor {
    config: HttpIntakeConfig,
}

impl HttpLlmExtractor {
    #[must_use]
    pub fn new(config: HttpIntakeConfig) -> Self {
        Self { config }
    }
}

impl Extractor for HttpLlmExtractor {
    fn extract(&self, transcript: &str) -> Result<JobExtraction, IntakeError> {
        let token = self.config.bearer_token()?;
        let preview: String = transcript.chars().take(80).collect();
        info!(%preview, "extracting job data");

        let body = json!({
            "model": self.config.llm_model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!(
                        "Extract job data from this transcript and return ONLY JSON:\n\n\"{transcript}\""
                    ),
                },
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.0,
            "max_tokens": 500,
        });
        let url = format!("{}/chat/completions", self.config.api_base);
        let response = send_json(&self.config.agent(), &url, &token, &body)?;

        let content = response["choices"]
            .get(0)
            .and_then(|choice| choice["message"]["content"].as_str())
            .ok_or_else(|| {
                IntakeError::InvalidResponse("missing choices[0].message.content".to_string())
            })?;

        parse_extraction(content, transcript)
    }
}

fn send_json(
    agent: &ureq::Agent,
    url: &str,
    token: &str,
    body: &Value,
) -> Result<Value, IntakeError> {
    let request = agent
        .request("POST", url)
        .set("content-type", "application/json")
        .set("authorization", &format!("Bearer {token}"));

    match request.send_json(body) {
        Ok(response) => response
            .into_json()
            .map_err(|err| IntakeError::InvalidResponse(err.to_string())),
        Err(ureq::Error::Status(code, _)) => Err(IntakeError::Http(format!("http status {code}"))),
        Err(ureq::Error::Transport(err)) => Err(IntakeError::Http(err.to_string())),
    }
}

/// Parse raw LLM output into a validated extraction. Tolerates markdown
/// fences and fills the per-material defaults the model is allowed to omit.
///
/// # Errors
/// Returns an error when the content is not JSON or violates the extraction
/// invariants (e.g. a zero material quantity).
pub fn parse_extraction(content: &str, transcript: &str) -> Result<JobExtraction, IntakeError> {
    let cleaned = strip_markdown_fences(content);
    let mut value: Value = serde_json::from_str(cleaned.trim())
        .map_err(|err| IntakeError::InvalidExtraction(format!("not valid JSON: {err}")))?;

    if let Some(materials) = value
        .get_mut("materials_used")
        .and_then(Value::as_array_mut)
    {
        for line in materials {
            if let Some(obj) = line.as_object_mut() {
                obj.entry("item").or_insert_with(|| json!("Unknown"));
                obj.entry("quantity").or_insert_with(|| json!(1));
                obj.entry("unit").or_insert_with(|| json!("piece"));
            }
        }
    }
    if let Some(obj) = value.as_object_mut() {
        obj.insert("raw_transcript".to_string(), json!(transcript));
    }

    let extraction: JobExtraction = serde_json::from_value(value)
        .map_err(|err| IntakeError::InvalidExtraction(err.to_string()))?;
    extraction
        .validate()
        .map_err(|err| IntakeError::InvalidExtraction(err.to_string()))?;

    if extraction.follow_up_date.is_none() && extraction.follow_up_reason.is_some() {
        warn!("extraction has a follow-up reason but no date; follow-up will not be scheduled");
    }
    Ok(extraction)
}

fn strip_markdown_fences(content: &str) -> String {
    content.replace("```json", "").replace("```", "")
}

#[cfg(test)]
mod tests {
    use super::{
        parse_extraction, validate_transcript, Extractor, FixedExtractor, FixedTranscriber,
        IntakeError, Transcriber,
    };
    use fieldops_domain::JobExtraction;

    #[test]
    fn hallucinated_transcripts_are_rejected() {
        for raw in ["Thank you.", "thanks for watching", " you "] {
            let result = validate_transcript(raw);
            assert!(matches!(result, Err(IntakeError::SuspectTranscript(_))));
        }
    }

    #[test]
    fn short_transcripts_are_rejected() {
        assert!(matches!(
            validate_transcript("hm"),
            Err(IntakeError::TranscriptTooShort)
        ));
        assert!(validate_transcript("replaced the heater valve").is_ok());
    }

    #[test]
    fn parse_extraction_strips_markdown_fences() {
        let content = "```json\n{\"customer_name\": \"Sharma\", \"labor_hours\": 2.0}\n```";
        let parsed = parse_extraction(content, "raw words");
        assert!(parsed.is_ok());
        let parsed = parsed.unwrap_or_else(|_| unreachable!());
        assert_eq!(parsed.customer_name, "Sharma");
        assert_eq!(parsed.raw_transcript, "raw words");
        assert!(parsed.invoice_required);
    }

    #[test]
    fn parse_extraction_fills_material_defaults() {
        let content = r#"{"materials_used": [{"item": "copper pipe"}]}"#;
        let parsed = parse_extraction(content, "t e s t");
        assert!(parsed.is_ok());
        let parsed = parsed.unwrap_or_else(|_| unreachable!());
        assert_eq!(parsed.materials_used.len(), 1);
        assert_eq!(parsed.materials_used[0].quantity, 1);
        assert_eq!(parsed.materials_used[0].unit, "piece");
    }

    #[test]
    fn parse_extraction_rejects_zero_quantity() {
        let content = r#"{"materials_used": [{"item": "wire", "quantity": 0}]}"#;
        assert!(matches!(
            parse_extraction(content, "words"),
            Err(IntakeError::InvalidExtraction(_))
        ));
    }

    #[test]
    fn parse_extraction_rejects_non_json() {
        assert!(matches!(
            parse_extraction("sorry, I cannot help with that", "words"),
            Err(IntakeError::InvalidExtraction(_))
        ));
    }

    #[test]
    fn fixed_transcriber_ignores_audio_bytes() {
        let transcriber = FixedTranscriber {
            transcript: "replaced the water heater element".to_string(),
        };
        let transcript = transcriber.transcribe(&[], "audio/webm");
        assert!(transcript.is_ok());
        assert_eq!(
            transcript.unwrap_or_else(|_| unreachable!()),
            "replaced the water heater element"
        );
    }

    #[test]
    fn fixed_extractor_echoes_transcript() {
        let fixture: Result<JobExtraction, _> = serde_json::from_str("{}");
        assert!(fixture.is_ok());
        let extractor = FixedExtractor {
            extraction: fixture.unwrap_or_else(|_| unreachable!()),
        };
        let extraction = extractor.extract("fixed the sink");
        assert!(extraction.is_ok());
        assert_eq!(
            extraction.unwrap_or_else(|_| unreachable!()).raw_transcript,
            "fixed the sink"
        );
    }
}
