//! The AI extraction capability and its LLM-backed implementation.
//!
//! The engine sees one narrow contract: thread text in, raw tagged
//! candidates out. Raw candidates are untrusted; the orchestrator validates
//! them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

/// Max tokens for the extraction LLM call.
const EXTRACTION_MAX_TOKENS: u32 = 2048;

/// Low temperature keeps phrasing stable across reprocessing runs.
const EXTRACTION_TEMPERATURE: f32 = 0.0;

/// One message as shown to the capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageExcerpt {
    pub id: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub sent_date: DateTime<Utc>,
    pub body: String,
}

/// Input to one capability call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub thread_id: String,
    pub matter_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub participants: Vec<String>,
    /// Messages to mine, oldest first.
    pub messages: Vec<MessageExcerpt>,
}

/// Candidate exactly as the model produced it. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    #[serde(default, alias = "type")]
    pub kind: String,
    #[serde(default)]
    pub confidence: String,
    #[serde(default)]
    pub source_message_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub party: Option<String>,
    #[serde(default, alias = "commitment_text")]
    pub text: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub suggested_assignee: Option<String>,
}

/// Narrow contract for the external AI capability.
#[async_trait]
pub trait ExtractionCapability: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    async fn extract(&self, request: ExtractionRequest) -> Result<Vec<RawCandidate>, LlmError>;
}

/// Extraction capability driven by a chat-completion model.
pub struct LlmExtractor {
    llm: Arc<dyn LlmProvider>,
    max_message_chars: usize,
}

impl LlmExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>, max_message_chars: usize) -> Self {
        Self {
            llm,
            max_message_chars,
        }
    }
}

#[async_trait]
impl ExtractionCapability for LlmExtractor {
    fn name(&self) -> &str {
        self.llm.model_name()
    }

    async fn extract(&self, request: ExtractionRequest) -> Result<Vec<RawCandidate>, LlmError> {
        let completion = CompletionRequest::new(vec![
            ChatMessage::system(build_extraction_system_prompt()),
            ChatMessage::user(build_extraction_user_prompt(&request, self.max_message_chars)),
        ])
        .with_temperature(EXTRACTION_TEMPERATURE)
        .with_max_tokens(EXTRACTION_MAX_TOKENS);

        let response = self.llm.complete(completion).await?;

        if response.output_tokens >= u64::from(EXTRACTION_MAX_TOKENS) {
            warn!(
                thread_id = %request.thread_id,
                output_tokens = response.output_tokens,
                messages = request.messages.len(),
                "Extraction response hit the token limit"
            );
            return Err(LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: format!("response truncated at {EXTRACTION_MAX_TOKENS} tokens"),
            });
        }

        let candidates = parse_candidates(&response.content).map_err(|e| {
            warn!(
                thread_id = %request.thread_id,
                raw_response = %response.content,
                error = %e,
                "Failed to parse extraction response"
            );
            LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: e,
            }
        })?;

        debug!(
            thread_id = %request.thread_id,
            count = candidates.len(),
            "Extraction response parsed"
        );
        Ok(candidates)
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_extraction_system_prompt() -> String {
    "You extract actionable items from legal correspondence.\n\n\
     Item kinds:\n\
     - \"deadline\": a dated obligation (filing, response, hearing). Fields: description, due_date.\n\
     - \"commitment\": a promise made by a named participant. Fields: party (their address), text, date (optional).\n\
     - \"action_item\": work someone should do. Fields: description, priority (low|medium|high|urgent), suggested_assignee (optional).\n\n\
     Every item also needs:\n\
     - \"kind\": one of the kinds above\n\
     - \"confidence\": \"low\", \"medium\" or \"high\"\n\
     - \"source_message_id\": the id of the message the item comes from\n\n\
     Respond with ONLY a JSON array of items. Use ISO 8601 dates (YYYY-MM-DD or full timestamps). \
     Return [] when there is nothing actionable. Do not invent parties who are not in the thread."
        .to_string()
}

fn build_extraction_user_prompt(request: &ExtractionRequest, max_message_chars: usize) -> String {
    let mut prompt = String::with_capacity(1024);

    prompt.push_str(&format!("Matter: {}\n", request.matter_id));
    if let Some(ref subject) = request.subject {
        prompt.push_str(&format!("Subject: {}\n", subject));
    }
    prompt.push_str(&format!("Participants: {}\n", request.participants.join(", ")));

    prompt.push_str("\nMessages:\n");
    for msg in &request.messages {
        let body: String = msg.body.chars().take(max_message_chars).collect();
        prompt.push_str(&format!(
            "--- id: {} | from: {} | to: {} | sent: {}\n{}\n",
            msg.id,
            msg.sender,
            msg.recipients.join(", "),
            msg.sent_date.to_rfc3339(),
            body
        ));
    }

    prompt
}

// ── Response parsing ────────────────────────────────────────────────

/// Parse the model output into raw candidates.
///
/// Accepts a bare array, an `{"items": [...]}` wrapper, or either inside a
/// markdown fence.
fn parse_candidates(raw: &str) -> Result<Vec<RawCandidate>, String> {
    let json_str = extract_json(raw);
    let value: serde_json::Value =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;

    let array = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("items") {
            Some(serde_json::Value::Array(items)) => items,
            _ => return Err("expected a JSON array of items".into()),
        },
        _ => return Err("expected a JSON array of items".into()),
    };

    // A single malformed element should not sink its siblings.
    Ok(array
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<RawCandidate>(v) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(error = %e, "Skipping unparseable candidate");
                None
            }
        })
        .collect())
}

/// Extract a JSON array or object from LLM output (handles markdown wrapping).
fn extract_json(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
