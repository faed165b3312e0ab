//! Intent router.
//!
//! Asks the generation backend to label the query, and falls back to a
//! deterministic table of regex rows when the backend is down, slow, or
//! returns something unparsable. Identifier rows (claim and policy ids) are
//! merged into every result, so a query carrying a well-formed id always
//! triggers the matching lookup.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use northstar_core::config::RouterConfig;
use northstar_core::types::{GenerationRequest, Intent, IntentKind, ModelSelector};
use northstar_core::Generation;

use crate::error::AgentError;
use crate::keys::{CLAIM_ID, LOSS_VOCABULARY, POLICY_ID};
use crate::prompt::{classification_prompt, parse_classification};

static DOCUMENT_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:documents?|docs|paperwork|forms?|proof|receipts?|photos?|reports?|required|requirements?|submit|provide)\b",
    )
    .expect("Invalid document words regex")
});

static CLAIM_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bclaims?\b").expect("Invalid claim word regex"));

static POLICY_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:polic(?:y|ies)|coverage|covered|deductibles?|premiums?|limits?)\b")
        .expect("Invalid policy words regex")
});

static QUESTION_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:^\s*(?:what|how|why|when|where|who|which|can|could|does|do|is|are|should|will)\b|\?\s*$)",
    )
    .expect("Invalid question regex")
});

/// One heuristic row: every pattern must match for the row to fire.
struct HeuristicRule {
    patterns: Vec<&'static LazyLock<Regex>>,
    kind: IntentKind,
    confidence: f32,
    /// Identifier rows fire regardless of what the model said.
    identifier: bool,
}

static RULES: LazyLock<Vec<HeuristicRule>> = LazyLock::new(|| {
    let row = |patterns: Vec<&'static LazyLock<Regex>>,
               kind: IntentKind,
               confidence: f32,
               identifier: bool| HeuristicRule {
        patterns,
        kind,
        confidence,
        identifier,
    };
    vec![
        row(vec![&CLAIM_ID], IntentKind::ClaimLookup, 0.95, true),
        row(vec![&POLICY_ID], IntentKind::PolicyLookup, 0.95, true),
        row(
            vec![&LOSS_VOCABULARY, &DOCUMENT_WORDS],
            IntentKind::DocumentRequirement,
            0.85,
            false,
        ),
        row(vec![&DOCUMENT_WORDS], IntentKind::DocumentRequirement, 0.7, false),
        row(vec![&LOSS_VOCABULARY], IntentKind::DocumentRequirement, 0.6, false),
        row(vec![&CLAIM_WORD], IntentKind::ClaimLookup, 0.6, false),
        row(vec![&POLICY_WORDS], IntentKind::PolicyLookup, 0.6, false),
        row(vec![&QUESTION_FORM], IntentKind::GeneralKnowledge, 0.5, false),
    ]
});

/// Keep the best confidence per label, drop `Unclassified` when anything
/// else is present, and sort by confidence then label order.
fn normalize(intents: Vec<Intent>) -> Vec<Intent> {
    let mut best: Vec<Intent> = Vec::new();
    for intent in intents {
        match best.iter_mut().find(|b| b.kind == intent.kind) {
            Some(existing) if existing.confidence < intent.confidence => *existing = intent,
            Some(_) => {}
            None => best.push(intent),
        }
    }

    if best.iter().any(|i| i.kind != IntentKind::Unclassified) {
        best.retain(|i| i.kind != IntentKind::Unclassified);
    }
    if best.is_empty() {
        return vec![Intent::unclassified()];
    }

    best.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.kind.cmp(&b.kind))
    });
    best
}

pub struct IntentRouter {
    generation: Arc<dyn Generation>,
    config: RouterConfig,
}

impl IntentRouter {
    pub fn new(generation: Arc<dyn Generation>, config: RouterConfig) -> Self {
        Self { generation, config }
    }

    /// Classify a query. Never fails: an unusable model answer falls back
    /// to [`IntentRouter::heuristic`].
    pub async fn classify(&self, raw_text: &str) -> Vec<Intent> {
        if raw_text.trim().is_empty() {
            return vec![Intent::unclassified()];
        }

        match self.classify_with_model(raw_text).await {
            Ok(mut intents) => {
                intents.extend(self.identifier_intents(raw_text));
                let intents = normalize(intents);
                debug!(intents = ?intents, "Query classified by model");
                intents
            }
            Err(e) => {
                let intents = self.heuristic(raw_text);
                warn!(error = %e, intents = ?intents, "Falling back to heuristic classification");
                intents
            }
        }
    }

    async fn classify_with_model(&self, raw_text: &str) -> Result<Vec<Intent>, AgentError> {
        let request = GenerationRequest {
            prompt: classification_prompt(raw_text),
            model_selector: ModelSelector::Primary,
        };
        let timeout = Duration::from_millis(self.config.timeout_ms);

        let response = match tokio::time::timeout(timeout, self.generation.generate(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(AgentError::ClassificationUnavailable(e.to_string())),
            Err(_) => {
                return Err(AgentError::ClassificationUnavailable(format!(
                    "timed out after {} ms",
                    self.config.timeout_ms
                )))
            }
        };

        parse_classification(&response.text, self.config.min_confidence).ok_or_else(|| {
            AgentError::ClassificationUnavailable("unparsable classification output".to_string())
        })
    }

    /// Deterministic keyword classification. Pure: the same text always
    /// yields the same intents.
    pub fn heuristic(&self, raw_text: &str) -> Vec<Intent> {
        if raw_text.trim().is_empty() {
            return vec![Intent::unclassified()];
        }
        let threshold = self.config.heuristic_threshold;

        let fired: Vec<Intent> = RULES
            .iter()
            .filter(|rule| rule.patterns.iter().all(|p| p.is_match(raw_text)))
            .filter_map(|rule| {
                if rule.identifier {
                    Some(Intent::new(rule.kind, rule.confidence.max(threshold)))
                } else if rule.confidence >= threshold {
                    Some(Intent::new(rule.kind, rule.confidence))
                } else {
                    None
                }
            })
            .collect();

        normalize(fired)
    }

    fn identifier_intents(&self, raw_text: &str) -> Vec<Intent> {
        let threshold = self.config.heuristic_threshold;
        RULES
            .iter()
            .filter(|rule| rule.identifier && rule.patterns.iter().all(|p| p.is_match(raw_text)))
            .map(|rule| Intent::new(rule.kind, rule.confidence.max(threshold)))
            .collect()
    }
}
