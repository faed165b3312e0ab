//! Prompt construction and model-output parsing.
//!
//! Holds the classification prompt and its parser, the answer prompt built
//! from a context bundle, structured-fact rendering and the deterministic
//! default answer.

use serde::Deserialize;
use serde_json::Value;

use northstar_core::types::{
    ContextBundle, EvidenceItem, Intent, IntentKind, RecordKind, RecordOutcome, Role,
};

/// Payload fields rendered as dollar amounts.
const MONEY_FIELDS: &[&str] = &["estimated_damage", "coverage_limit", "deductible"];

// =============================================================================
// Classification
// =============================================================================

pub fn classification_prompt(raw_text: &str) -> String {
    format!(
        "Classify the insurance customer message below into one or more intents.\n\
         Allowed intents:\n\
         - PolicyLookup: questions about a specific policy, its coverage, limits or deductible\n\
         - ClaimLookup: questions about the status or details of a specific claim\n\
         - DocumentRequirement: which documents a claim or loss type needs\n\
         - GeneralKnowledge: general insurance questions not tied to one record\n\
         - Unclassified: anything else\n\
         Reply with only a JSON array such as \
         [{{\"intent\": \"ClaimLookup\", \"confidence\": 0.9}}]. \
         Include every intent that applies.\n\n\
         Message: {}",
        raw_text.trim()
    )
}

#[derive(Debug, Deserialize)]
struct RawIntent {
    intent: String,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

/// Parse the model's classification output.
///
/// Accepts the JSON array on its own or embedded in surrounding prose.
/// Unknown labels are skipped and intents below `min_confidence` dropped.
/// Returns `None` when nothing usable remains.
pub fn parse_classification(output: &str, min_confidence: f32) -> Option<Vec<Intent>> {
    let start = output.find('[')?;
    let end = output.rfind(']')?;
    if end < start {
        return None;
    }
    let raw: Vec<RawIntent> = serde_json::from_str(&output[start..=end]).ok()?;

    let intents: Vec<Intent> = raw
        .into_iter()
        .filter_map(|r| IntentKind::from_label(&r.intent).map(|k| Intent::new(k, r.confidence)))
        .filter(|i| i.confidence >= min_confidence)
        .collect();

    if intents.is_empty() {
        None
    } else {
        Some(intents)
    }
}

// =============================================================================
// Fact rendering
// =============================================================================

/// Format a JSON number as a dollar amount with thousands separators.
pub fn format_amount(value: &Value) -> Option<String> {
    if let Some(n) = value.as_i64() {
        let sign = if n < 0 { "-" } else { "" };
        return Some(format!("{}${}", sign, group_thousands(n.unsigned_abs())));
    }
    let f = value.as_f64()?;
    if !f.is_finite() {
        return None;
    }
    let cents = (f.abs() * 100.0).round() as u64;
    let sign = if f < 0.0 { "-" } else { "" };
    Some(format!(
        "{}${}.{:02}",
        sign,
        group_thousands(cents / 100),
        cents % 100
    ))
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn render_value(field: &str, value: &Value) -> String {
    if MONEY_FIELDS.contains(&field) {
        if let Some(amount) = format_amount(value) {
            return amount;
        }
    }
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(|v| render_value("", v)).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Null => "none".to_string(),
        other => other.to_string(),
    }
}

fn render_payload(payload: &Value) -> String {
    match payload {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}={}", k, render_value(k, v)))
            .collect::<Vec<_>>()
            .join(", "),
        other => render_value("", other),
    }
}

/// One line per structured record, e.g.
/// `claim CLM-003C7AFB: estimated_damage=$14,089, status=submitted`.
pub fn render_record(kind: RecordKind, key: &str, outcome: &RecordOutcome) -> String {
    match outcome {
        RecordOutcome::Found(payload) => format!("{} {}: {}", kind, key, render_payload(payload)),
        RecordOutcome::NotFound => format!("{} {}: no record found", kind, key),
        RecordOutcome::Unavailable(_) => {
            format!("{} {}: record system unavailable, status unknown", kind, key)
        }
    }
}

fn structured_lines(bundle: &ContextBundle) -> Vec<String> {
    bundle
        .structured()
        .filter_map(|item| match item {
            EvidenceItem::Record { kind, key, outcome } => Some(render_record(*kind, key, outcome)),
            EvidenceItem::Passage(_) => None,
        })
        .collect()
}

// =============================================================================
// Answer prompt
// =============================================================================

/// Build the synthesis prompt from a bundle.
pub fn answer_prompt(bundle: &ContextBundle) -> String {
    let mut prompt = String::from(
        "You are NorthStar, an assistant for insurance policy and claim questions.\n\
         Answer the customer's question using ONLY the evidence below.\n\
         Structured facts are authoritative; passages are background only.\n\
         If the evidence is insufficient, say so plainly instead of guessing.\n",
    );

    if !bundle.history.is_empty() {
        prompt.push_str("\nConversation so far:\n");
        for turn in &bundle.history {
            let speaker = match turn.role {
                Role::User => "Customer",
                Role::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{}: {}\n", speaker, turn.text));
        }
    }

    prompt.push_str("\nStructured facts:\n");
    let facts = structured_lines(bundle);
    if facts.is_empty() {
        prompt.push_str("(none)\n");
    }
    for line in facts {
        prompt.push_str(&format!("- {}\n", line));
    }

    prompt.push_str("\nReference passages:\n");
    let mut any_passage = false;
    for passage in bundle.passages() {
        any_passage = true;
        prompt.push_str(&format!("[{}] {}\n", passage.source_ref, passage.text.trim()));
    }
    if !any_passage {
        prompt.push_str("(none)\n");
    }

    prompt.push_str(&format!("\nQuestion: {}\nAnswer:", bundle.query));
    prompt
}

/// Answer used when every generation tier failed. Never empty.
pub fn default_answer(bundle: &ContextBundle) -> String {
    let found: Vec<String> = bundle
        .structured()
        .filter(|item| item.is_found_record())
        .filter_map(|item| match item {
            EvidenceItem::Record { kind, key, outcome } => Some(render_record(*kind, key, outcome)),
            EvidenceItem::Passage(_) => None,
        })
        .collect();

    let mut text = String::from("I'm sorry, I can't generate a complete answer right now.");
    if found.is_empty() {
        text.push_str(" Please try again in a few moments.");
    } else {
        text.push_str(" Here is what I found in your records:\n");
        for line in found {
            text.push_str(&format!("- {}\n", line));
        }
        text.truncate(text.trim_end().len());
    }
    text
}
