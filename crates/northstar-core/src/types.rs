//! Domain types shared by every NorthStar crate.
//!
//! Covers the inbound query contract, intents, evidence items, the context
//! bundle handed to synthesis, conversation turns and the final answer.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Query
// =============================================================================

/// A raw user query with the optional session it continues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub raw_text: String,
    pub session_id: Option<String>,
}

impl Query {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            session_id: None,
        }
    }

    pub fn in_session(raw_text: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            session_id: Some(session_id.into()),
        }
    }
}

/// Inbound request body: `{query, session_id?}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl From<QueryRequest> for Query {
    fn from(req: QueryRequest) -> Self {
        Query {
            raw_text: req.query,
            session_id: req.session_id,
        }
    }
}

/// Outbound response body: `{answer, session_id, used_model, evidence_refs}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub session_id: String,
    pub used_model: UsedModel,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
}

impl From<Answer> for QueryResponse {
    fn from(answer: Answer) -> Self {
        QueryResponse {
            answer: answer.text,
            session_id: answer.session_id,
            used_model: answer.used_model,
            evidence_refs: answer.evidence_refs,
        }
    }
}

// =============================================================================
// Intent
// =============================================================================

/// Closed set of intent labels a query can be classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntentKind {
    PolicyLookup,
    ClaimLookup,
    DocumentRequirement,
    GeneralKnowledge,
    Unclassified,
}

impl IntentKind {
    pub const ALL: [IntentKind; 5] = [
        IntentKind::PolicyLookup,
        IntentKind::ClaimLookup,
        IntentKind::DocumentRequirement,
        IntentKind::GeneralKnowledge,
        IntentKind::Unclassified,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            IntentKind::PolicyLookup => "PolicyLookup",
            IntentKind::ClaimLookup => "ClaimLookup",
            IntentKind::DocumentRequirement => "DocumentRequirement",
            IntentKind::GeneralKnowledge => "GeneralKnowledge",
            IntentKind::Unclassified => "Unclassified",
        }
    }

    /// Parse a label in CamelCase, snake_case or spaced form, ignoring case.
    pub fn from_label(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        IntentKind::ALL
            .into_iter()
            .find(|kind| kind.label().to_ascii_lowercase() == normalized)
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A classified intent with a confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub confidence: f32,
}

impl Intent {
    /// Create an intent, clamping the confidence into `[0, 1]`.
    pub fn new(kind: IntentKind, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self { kind, confidence }
    }

    pub fn unclassified() -> Self {
        Self::new(IntentKind::Unclassified, 0.0)
    }
}

// =============================================================================
// Records and passages
// =============================================================================

/// Kind of structured record a retrieval call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Policy,
    Claim,
    DocumentRule,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Policy => "policy",
            RecordKind::Claim => "claim",
            RecordKind::DocumentRule => "document_rule",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retrieval boundary request: `{kind, key}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRequest {
    pub kind: RecordKind,
    pub key: String,
}

impl RecordRequest {
    pub fn new(kind: RecordKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }
}

/// Retrieval boundary response: `{found, payload?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordResponse {
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl RecordResponse {
    pub fn found(payload: Value) -> Self {
        Self {
            found: true,
            payload: Some(payload),
        }
    }

    pub fn not_found() -> Self {
        Self {
            found: false,
            payload: None,
        }
    }
}

/// Settled result of one retrieval call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RecordOutcome {
    Found(Value),
    NotFound,
    Unavailable(String),
}

/// A ranked passage returned by semantic search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    pub score: f32,
    pub source_ref: String,
}

/// Semantic search boundary request: `{query_text, top_k}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query_text: String,
    pub top_k: usize,
}

/// One unit of retrieved information feeding synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvidenceItem {
    Record {
        kind: RecordKind,
        key: String,
        outcome: RecordOutcome,
    },
    Passage(Passage),
}

impl EvidenceItem {
    pub fn record(kind: RecordKind, key: impl Into<String>, outcome: RecordOutcome) -> Self {
        EvidenceItem::Record {
            kind,
            key: key.into(),
            outcome,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, EvidenceItem::Record { .. })
    }

    pub fn is_found_record(&self) -> bool {
        matches!(
            self,
            EvidenceItem::Record {
                outcome: RecordOutcome::Found(_),
                ..
            }
        )
    }

    /// Reference recorded on the answer: `kind:key` for found records,
    /// the source reference for passages. Missing records have none.
    pub fn reference(&self) -> Option<String> {
        match self {
            EvidenceItem::Record {
                kind,
                key,
                outcome: RecordOutcome::Found(_),
            } => Some(format!("{}:{}", kind, key)),
            EvidenceItem::Record { .. } => None,
            EvidenceItem::Passage(p) => Some(p.source_ref.clone()),
        }
    }

    /// Character cost of this item against the context budget.
    pub fn size(&self) -> usize {
        match self {
            EvidenceItem::Record { kind, key, outcome } => {
                let body = match outcome {
                    RecordOutcome::Found(payload) => payload.to_string(),
                    RecordOutcome::NotFound => "not found".to_string(),
                    RecordOutcome::Unavailable(reason) => format!("unavailable ({})", reason),
                };
                format!("{} {}: {}", kind, key, body).chars().count()
            }
            EvidenceItem::Passage(p) => p.text.chars().count(),
        }
    }
}

// =============================================================================
// Generation boundary
// =============================================================================

/// Which tier of the generation chain a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSelector {
    Primary,
    Fallback,
}

/// Generation boundary request: `{prompt, model_selector}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model_selector: ModelSelector,
}

/// Generation boundary response: `{text}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub text: String,
}

// =============================================================================
// Conversation
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp,
        }
    }

    pub fn assistant(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp,
        }
    }
}

/// An append-only, timestamp-ordered sequence of turns for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

impl Conversation {
    pub fn empty(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            turns: Vec::new(),
        }
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.turns.last().map(|t| t.timestamp)
    }

    /// The most recent `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }
}

/// True when every turn is strictly later than the one before it.
pub fn turns_strictly_ordered(turns: &[Turn]) -> bool {
    turns.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
}

/// Pick a timestamp strictly after `previous`, preferring `candidate`.
pub fn next_timestamp(previous: Option<DateTime<Utc>>, candidate: DateTime<Utc>) -> DateTime<Utc> {
    match previous {
        Some(prev) if candidate <= prev => prev + Duration::microseconds(1),
        _ => candidate,
    }
}

// =============================================================================
// Context bundle and answer
// =============================================================================

/// Size-bounded input assembled for the synthesis step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub session_id: String,
    pub query: String,
    /// Structured records first, then passages by descending score.
    pub evidence: Vec<EvidenceItem>,
    /// Prior turns, oldest first.
    pub history: Vec<Turn>,
    /// Character budget the bundle was assembled under.
    pub budget: usize,
    /// Number of items dropped to respect the budget.
    pub evicted: usize,
}

impl ContextBundle {
    /// Total characters counted against the budget.
    pub fn size(&self) -> usize {
        self.query.chars().count()
            + self.evidence.iter().map(EvidenceItem::size).sum::<usize>()
            + self.history.iter().map(|t| t.text.chars().count()).sum::<usize>()
    }

    pub fn structured(&self) -> impl Iterator<Item = &EvidenceItem> {
        self.evidence.iter().filter(|e| e.is_structured())
    }

    pub fn passages(&self) -> impl Iterator<Item = &Passage> {
        self.evidence.iter().filter_map(|e| match e {
            EvidenceItem::Passage(p) => Some(p),
            EvidenceItem::Record { .. } => None,
        })
    }
}

/// Which generation tier produced the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsedModel {
    Primary,
    Fallback,
    None,
}

impl fmt::Display for UsedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UsedModel::Primary => "primary",
            UsedModel::Fallback => "fallback",
            UsedModel::None => "none",
        };
        f.write_str(s)
    }
}

/// Final answer returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub session_id: String,
    pub used_model: UsedModel,
    pub evidence_refs: Vec<String>,
}
