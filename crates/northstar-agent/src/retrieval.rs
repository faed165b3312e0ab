//! Retrieval coordinator.
//!
//! Maps each intent to a record kind and key extractor through a static
//! strategy table, runs every lookup concurrently with its own timeout, and
//! records each outcome as evidence. A failed or slow call never blocks or
//! fails the others.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{debug, warn};

use northstar_core::config::RetrievalConfig;
use northstar_core::error::CapabilityError;
use northstar_core::types::{
    EvidenceItem, Intent, IntentKind, RecordKind, RecordOutcome, RecordRequest,
};
use northstar_core::RecordStore;

use crate::keys;

/// How one intent turns into record lookups.
pub struct Strategy {
    pub intent: IntentKind,
    pub kind: RecordKind,
    pub extract: fn(&str) -> Vec<String>,
}

/// `GeneralKnowledge` and `Unclassified` have no structured source.
pub const STRATEGIES: &[Strategy] = &[
    Strategy {
        intent: IntentKind::PolicyLookup,
        kind: RecordKind::Policy,
        extract: keys::policy_ids,
    },
    Strategy {
        intent: IntentKind::ClaimLookup,
        kind: RecordKind::Claim,
        extract: keys::claim_ids,
    },
    Strategy {
        intent: IntentKind::DocumentRequirement,
        kind: RecordKind::DocumentRule,
        extract: keys::loss_types,
    },
];

pub fn strategy_for(intent: IntentKind) -> Option<&'static Strategy> {
    STRATEGIES.iter().find(|s| s.intent == intent)
}

/// Planned lookups for the intents, deduplicated, in intent order.
pub fn plan(intents: &[Intent], raw_text: &str) -> Vec<RecordRequest> {
    let mut requests: Vec<RecordRequest> = Vec::new();
    for intent in intents {
        let Some(strategy) = strategy_for(intent.kind) else {
            continue;
        };
        let keys = (strategy.extract)(raw_text);
        if keys.is_empty() {
            debug!(intent = %intent.kind, "No lookup key in query, skipping intent");
            continue;
        }
        for key in keys {
            let request = RecordRequest::new(strategy.kind, key);
            if !requests.contains(&request) {
                requests.push(request);
            }
        }
    }
    requests
}

pub struct RetrievalCoordinator {
    store: Arc<dyn RecordStore>,
    config: RetrievalConfig,
}

impl RetrievalCoordinator {
    pub fn new(store: Arc<dyn RecordStore>, config: RetrievalConfig) -> Self {
        Self { store, config }
    }

    /// Gather structured evidence for the intents.
    ///
    /// Returns once every call has settled. Evidence follows plan order.
    /// When document requirements were asked for, rules for the loss types
    /// of found claims are looked up as well, so "what is missing on claim
    /// X" works without naming the loss type.
    pub async fn gather(&self, intents: &[Intent], raw_text: &str) -> Vec<EvidenceItem> {
        let requests = plan(intents, raw_text);
        let started = Instant::now();
        let mut evidence = self.lookup_all(&requests).await;

        if intents.iter().any(|i| i.kind == IntentKind::DocumentRequirement) {
            let derived = derived_rule_requests(&requests, &evidence);
            if !derived.is_empty() {
                debug!(count = derived.len(), "Looking up document rules for found claims");
                evidence.extend(self.lookup_all(&derived).await);
            }
        }

        annotate_document_status(&mut evidence);
        debug!(
            calls = evidence.len(),
            found = evidence.iter().filter(|e| e.is_found_record()).count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Retrieval complete"
        );
        evidence
    }

    async fn lookup_all(&self, requests: &[RecordRequest]) -> Vec<EvidenceItem> {
        join_all(requests.iter().map(|r| self.lookup(r))).await
    }

    async fn lookup(&self, request: &RecordRequest) -> EvidenceItem {
        let timeout = Duration::from_millis(self.config.call_timeout_ms);
        let outcome = match tokio::time::timeout(timeout, self.store.lookup(request)).await {
            Ok(Ok(resp)) if resp.found => RecordOutcome::Found(resp.payload.unwrap_or(Value::Null)),
            Ok(Ok(_)) => RecordOutcome::NotFound,
            Ok(Err(e)) => {
                warn!(kind = %request.kind, key = %request.key, error = %e, "Record lookup failed");
                RecordOutcome::Unavailable(e.to_string())
            }
            Err(_) => {
                warn!(
                    kind = %request.kind,
                    key = %request.key,
                    timeout_ms = self.config.call_timeout_ms,
                    "Record lookup timed out"
                );
                RecordOutcome::Unavailable(
                    CapabilityError::Timeout(self.config.call_timeout_ms).to_string(),
                )
            }
        };
        EvidenceItem::record(request.kind, request.key.clone(), outcome)
    }
}

fn found_payload(item: &EvidenceItem, want: RecordKind) -> Option<&Value> {
    match item {
        EvidenceItem::Record {
            kind,
            outcome: RecordOutcome::Found(payload),
            ..
        } if *kind == want => Some(payload),
        _ => None,
    }
}

/// Rule lookups for loss types of found claims that were not already planned.
fn derived_rule_requests(planned: &[RecordRequest], evidence: &[EvidenceItem]) -> Vec<RecordRequest> {
    let mut derived: Vec<RecordRequest> = Vec::new();
    for payload in evidence.iter().filter_map(|e| found_payload(e, RecordKind::Claim)) {
        let Some(loss_type) = payload.get("loss_type").and_then(Value::as_str) else {
            continue;
        };
        let request = RecordRequest::new(RecordKind::DocumentRule, loss_type);
        if !planned.contains(&request) && !derived.contains(&request) {
            derived.push(request);
        }
    }
    derived
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Mark each found document rule with what every found claim of the same
/// loss type is still missing, one `claims` entry per claim in evidence order.
pub fn annotate_document_status(evidence: &mut [EvidenceItem]) {
    let claims: Vec<(String, String, Vec<String>)> = evidence
        .iter()
        .filter_map(|e| found_payload(e, RecordKind::Claim))
        .filter_map(|claim| {
            let loss_type = claim.get("loss_type")?.as_str()?.to_string();
            let claim_id = claim
                .get("claim_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Some((loss_type, claim_id, string_list(claim.get("documents_submitted"))))
        })
        .collect();

    for item in evidence.iter_mut() {
        let EvidenceItem::Record {
            kind: RecordKind::DocumentRule,
            key,
            outcome: RecordOutcome::Found(Value::Object(rule)),
        } = item
        else {
            continue;
        };

        let required = string_list(rule.get("required_documents"));
        let statuses: Vec<Value> = claims
            .iter()
            .filter(|(loss, _, _)| loss.as_str() == key.as_str())
            .map(|(_, claim_id, submitted)| {
                let missing: Vec<&String> =
                    required.iter().filter(|doc| !submitted.contains(*doc)).collect();
                json!({
                    "claim_id": claim_id,
                    "complete": missing.is_empty(),
                    "missing_documents": missing,
                })
            })
            .collect();
        if !statuses.is_empty() {
            rule.insert("claims".to_string(), Value::Array(statuses));
        }
    }
}
