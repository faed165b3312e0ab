//! Lookup-key extraction from raw query text.
//!
//! Identifiers follow the insurance data layout: claims are `CLM-` plus
//! eight hex digits, policies are `AUTO-` or `HOME-` plus five digits. Loss
//! types are matched through a small vocabulary of everyday phrasings.

use std::sync::LazyLock;

use regex::Regex;

pub static CLAIM_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bCLM-[0-9A-F]{8}\b").expect("Invalid claim id regex"));

pub static POLICY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:AUTO|HOME)-\d{5}\b").expect("Invalid policy id regex"));

/// Canonical loss types and the phrases that map to them.
pub const LOSS_TYPES: &[(&str, &[&str])] = &[
    (
        "auto_collision",
        &["auto collision", "auto_collision", "car accident", "collision", "crash"],
    ),
    (
        "auto_theft",
        &["auto theft", "auto_theft", "car theft", "vehicle theft", "stolen"],
    ),
    ("home_fire", &["home fire", "home_fire", "house fire", "fire"]),
    (
        "water_damage",
        &["water damage", "water_damage", "burst pipe", "flood", "leak"],
    ),
];

struct LossPattern {
    regex: Regex,
    loss_type: &'static str,
}

static LOSS_PATTERNS: LazyLock<Vec<LossPattern>> = LazyLock::new(|| {
    LOSS_TYPES
        .iter()
        .flat_map(|&(loss_type, phrases)| {
            phrases.iter().map(move |phrase| {
                let body = regex::escape(phrase).replace(' ', r"\s+");
                LossPattern {
                    regex: Regex::new(&format!(r"(?i)\b{}(?:s|ed|ing)?\b", body))
                        .expect("Invalid loss type regex"),
                    loss_type,
                }
            })
        })
        .collect()
});

/// Any loss-type phrase, for heuristic rows.
pub static LOSS_VOCABULARY: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives: Vec<String> = LOSS_TYPES
        .iter()
        .flat_map(|&(_, phrases)| phrases.iter())
        .map(|p| regex::escape(p).replace(' ', r"\s+"))
        .collect();
    Regex::new(&format!(r"(?i)\b(?:{})(?:s|ed|ing)?\b", alternatives.join("|")))
        .expect("Invalid loss vocabulary regex")
});

fn push_unique(keys: &mut Vec<String>, key: String) {
    if !keys.contains(&key) {
        keys.push(key);
    }
}

/// Claim ids in order of first appearance, upper-cased and deduplicated.
pub fn claim_ids(text: &str) -> Vec<String> {
    let mut keys = Vec::new();
    for m in CLAIM_ID.find_iter(text) {
        push_unique(&mut keys, m.as_str().to_ascii_uppercase());
    }
    keys
}

/// Policy ids in order of first appearance, upper-cased and deduplicated.
pub fn policy_ids(text: &str) -> Vec<String> {
    let mut keys = Vec::new();
    for m in POLICY_ID.find_iter(text) {
        push_unique(&mut keys, m.as_str().to_ascii_uppercase());
    }
    keys
}

/// Canonical loss types mentioned in `text`, ordered by first mention.
pub fn loss_types(text: &str) -> Vec<String> {
    let mut hits: Vec<(usize, &'static str)> = LOSS_PATTERNS
        .iter()
        .filter_map(|p| p.regex.find(text).map(|m| (m.start(), p.loss_type)))
        .collect();
    hits.sort();

    let mut keys = Vec::new();
    for (_, loss_type) in hits {
        push_unique(&mut keys, loss_type.to_string());
    }
    keys
}
