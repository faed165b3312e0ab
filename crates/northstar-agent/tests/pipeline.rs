//! End-to-end tests for the query pipeline with in-memory capabilities.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use northstar_agent::{AgentError, AgentOrchestrator};
use northstar_core::config::NorthstarConfig;
use northstar_core::error::{CapabilityError, GenerationError};
use northstar_core::types::{
    GenerationRequest, GenerationResponse, ModelSelector, Passage, Query, RecordKind,
    RecordRequest, RecordResponse, Role, SearchRequest, Turn, UsedModel,
};
use northstar_core::{ConversationStore, Generation, RecordStore, SemanticSearch};
use northstar_storage::{MemoryConversationStore, MemoryRecordStore};

// =============================================================================
// Fakes
// =============================================================================

#[derive(Clone, Copy, PartialEq)]
enum Tier {
    Echo,
    Fail,
    Hang,
}

/// Classification calls fail so the router uses its heuristic. Answer calls
/// echo the structured facts section of the prompt.
struct EchoGeneration {
    primary: Tier,
    fallback: Tier,
    answer_calls: Mutex<Vec<ModelSelector>>,
    last_prompt: Mutex<String>,
}

impl EchoGeneration {
    fn new(primary: Tier, fallback: Tier) -> Arc<Self> {
        Arc::new(Self {
            primary,
            fallback,
            answer_calls: Mutex::new(Vec::new()),
            last_prompt: Mutex::new(String::new()),
        })
    }
}

#[async_trait]
impl Generation for EchoGeneration {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        if request.prompt.starts_with("Classify") {
            return Err(GenerationError::Transport("classifier offline".into()));
        }

        self.answer_calls.lock().unwrap().push(request.model_selector);
        *self.last_prompt.lock().unwrap() = request.prompt.clone();

        let tier = match request.model_selector {
            ModelSelector::Primary => self.primary,
            ModelSelector::Fallback => self.fallback,
        };
        match tier {
            Tier::Echo => {
                let facts = request
                    .prompt
                    .split("Structured facts:")
                    .nth(1)
                    .and_then(|rest| rest.split("Reference passages:").next())
                    .unwrap_or_default();
                Ok(GenerationResponse {
                    text: format!("Here is what I found:{}", facts),
                })
            }
            Tier::Fail => Err(GenerationError::Transport("model crashed".into())),
            Tier::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(GenerationResponse { text: "late".into() })
            }
        }
    }
}

struct StaticSearch {
    passages: Vec<Passage>,
    calls: AtomicUsize,
}

impl StaticSearch {
    fn new(passages: Vec<Passage>) -> Arc<Self> {
        Arc::new(Self {
            passages,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SemanticSearch for StaticSearch {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Passage>, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.passages.iter().take(request.top_k).cloned().collect())
    }
}

struct FailingSearch;

#[async_trait]
impl SemanticSearch for FailingSearch {
    async fn search(&self, _request: &SearchRequest) -> Result<Vec<Passage>, CapabilityError> {
        Err(CapabilityError::Unavailable("index offline".into()))
    }
}

/// Conversation store whose writes can be switched off.
struct FlakyConversations {
    inner: MemoryConversationStore,
    fail_puts: AtomicBool,
}

#[async_trait]
impl ConversationStore for FlakyConversations {
    async fn get(&self, session_id: &str) -> Result<Vec<Turn>, CapabilityError> {
        self.inner.get(session_id).await
    }

    async fn put(&self, session_id: &str, turns: &[Turn]) -> Result<(), CapabilityError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(CapabilityError::Unavailable("disk full".into()));
        }
        self.inner.put(session_id, turns).await
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn records() -> Arc<MemoryRecordStore> {
    Arc::new(
        MemoryRecordStore::new()
            .with_record(
                RecordKind::Claim,
                "CLM-003C7AFB",
                json!({
                    "claim_id": "CLM-003C7AFB",
                    "policy_id": "AUTO-10001",
                    "loss_type": "auto_collision",
                    "state": "TX",
                    "estimated_damage": 14089,
                    "documents_submitted": ["police_report"],
                    "status": "submitted"
                }),
            )
            .with_record(
                RecordKind::Policy,
                "AUTO-10001",
                json!({
                    "policy_id": "AUTO-10001",
                    "customer_name": "Jordan Lee",
                    "state": "TX",
                    "coverage_limit": 50000,
                    "deductible": 500,
                    "policy_type": "auto",
                    "active": true
                }),
            )
            .with_record(
                RecordKind::DocumentRule,
                "auto_collision",
                json!({
                    "loss_type": "auto_collision",
                    "required_documents": ["police_report", "photos", "repair_estimate"]
                }),
            ),
    )
}

fn passages() -> Vec<Passage> {
    vec![
        Passage {
            text: "Claims move from submitted to under_review once an adjuster is assigned.".into(),
            score: 0.8,
            source_ref: "claims-faq.md#0".into(),
        },
        Passage {
            text: "Unrelated text about gardening.".into(),
            score: 0.05,
            source_ref: "misc.md#3".into(),
        },
    ]
}

fn config() -> NorthstarConfig {
    let mut config = NorthstarConfig::default();
    config.synthesis.timeout_ms = 200;
    config.router.timeout_ms = 200;
    config
}

fn orchestrator(
    generation: Arc<EchoGeneration>,
    search: Arc<dyn SemanticSearch>,
    conversations: Arc<dyn ConversationStore>,
) -> AgentOrchestrator {
    AgentOrchestrator::from_config(&config(), records(), search, generation, conversations)
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_claim_status_answer_grounded_in_record() {
    let gen = EchoGeneration::new(Tier::Echo, Tier::Fail);
    let conversations = Arc::new(MemoryConversationStore::new());
    let agent = orchestrator(gen.clone(), StaticSearch::new(passages()), conversations.clone());

    let answer = agent
        .handle(Query::in_session("What is the status of claim CLM-003C7AFB?", "s-claim"))
        .await
        .unwrap();

    assert_eq!(answer.used_model, UsedModel::Primary);
    assert_eq!(answer.session_id, "s-claim");
    assert!(answer.text.contains("CLM-003C7AFB"));
    assert!(answer.text.contains("submitted"));
    assert!(answer.text.contains("14,089"));
    assert!(answer.evidence_refs.contains(&"claim:CLM-003C7AFB".to_string()));
    assert!(!answer.evidence_refs.contains(&"misc.md#3".to_string()));

    let prompt = gen.last_prompt.lock().unwrap().clone();
    assert!(prompt.contains("claims-faq.md#0"));
    assert!(!prompt.contains("gardening"));
}

#[tokio::test]
async fn test_claim_status_question_makes_one_lookup_and_stores_the_pair() {
    let gen = EchoGeneration::new(Tier::Echo, Tier::Echo);
    let store = CountingRecords::new(records());
    let conversations = Arc::new(MemoryConversationStore::new());
    let agent = AgentOrchestrator::from_config(
        &config(),
        store.clone(),
        StaticSearch::new(passages()),
        gen,
        conversations.clone(),
    );

    let query = "What's the status of my claim CLM-003C7AFB?";
    let answer = agent
        .handle(Query::in_session(query, "s-status"))
        .await
        .unwrap();

    assert_eq!(answer.used_model, UsedModel::Primary);
    assert!(answer.text.contains("submitted"));
    assert!(answer.evidence_refs.contains(&"claim:CLM-003C7AFB".to_string()));

    let claim_lookups: Vec<RecordRequest> = store
        .calls()
        .into_iter()
        .filter(|r| r.kind == RecordKind::Claim)
        .collect();
    assert_eq!(
        claim_lookups,
        vec![RecordRequest::new(RecordKind::Claim, "CLM-003C7AFB")]
    );

    let stored = conversations.get("s-status").await.unwrap();
    assert!(stored.len() >= 2);
    let last_two: Vec<(Role, &str)> = stored[stored.len() - 2..]
        .iter()
        .map(|t| (t.role, t.text.as_str()))
        .collect();
    assert_eq!(
        last_two,
        vec![(Role::User, query), (Role::Assistant, answer.text.as_str())]
    );
}

#[tokio::test]
async fn test_two_claims_with_same_loss_type_each_get_missing_documents() {
    let store = Arc::new(
        MemoryRecordStore::new()
            .with_record(
                RecordKind::Claim,
                "CLM-AAAAAAAA",
                json!({
                    "claim_id": "CLM-AAAAAAAA",
                    "loss_type": "auto_collision",
                    "documents_submitted": ["police_report", "photos", "repair_estimate"]
                }),
            )
            .with_record(
                RecordKind::Claim,
                "CLM-BBBBBBBB",
                json!({
                    "claim_id": "CLM-BBBBBBBB",
                    "loss_type": "auto_collision",
                    "documents_submitted": []
                }),
            )
            .with_record(
                RecordKind::DocumentRule,
                "auto_collision",
                json!({
                    "loss_type": "auto_collision",
                    "required_documents": ["police_report", "photos", "repair_estimate"]
                }),
            ),
    );
    let gen = EchoGeneration::new(Tier::Echo, Tier::Fail);
    let agent = AgentOrchestrator::from_config(
        &config(),
        store,
        StaticSearch::new(Vec::new()),
        gen.clone(),
        Arc::new(MemoryConversationStore::new()),
    );

    agent
        .handle(Query::new(
            "Which documents are missing for CLM-AAAAAAAA and CLM-BBBBBBBB?",
        ))
        .await
        .unwrap();

    let prompt = gen.last_prompt.lock().unwrap().clone();
    assert!(prompt.contains(r#""claim_id":"CLM-AAAAAAAA","complete":true"#));
    assert!(prompt.contains(r#""claim_id":"CLM-BBBBBBBB","complete":false"#));
}

#[tokio::test(start_paused = true)]
async fn test_search_runs_alongside_stalled_classification() {
    let search = Arc::new(DelayedSearch {
        delay: Duration::from_millis(150),
        passages: passages(),
    });
    let gen = Arc::new(StalledClassifier(EchoGeneration::new(Tier::Echo, Tier::Fail)));
    let agent = AgentOrchestrator::from_config(
        &config(),
        records(),
        search,
        gen,
        Arc::new(MemoryConversationStore::new()),
    );

    let started = tokio::time::Instant::now();
    let answer = agent
        .handle(Query::new("What is the status of claim CLM-003C7AFB?"))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // Router timeout is 200 ms; a search started after it would end at 350 ms.
    assert!(elapsed < Duration::from_millis(300), "took {:?}", elapsed);
    assert!(answer.evidence_refs.contains(&"claims-faq.md#0".to_string()));
}

#[tokio::test]
async fn test_document_requirement_reports_missing_documents() {
    let gen = EchoGeneration::new(Tier::Echo, Tier::Fail);
    let agent = orchestrator(
        gen,
        StaticSearch::new(Vec::new()),
        Arc::new(MemoryConversationStore::new()),
    );

    let answer = agent
        .handle(Query::new("Which documents are still missing for CLM-003C7AFB?"))
        .await
        .unwrap();

    assert!(answer.text.contains("repair_estimate"));
    assert!(answer
        .evidence_refs
        .contains(&"document_rule:auto_collision".to_string()));
}

#[tokio::test]
async fn test_unknown_claim_is_reported_as_missing() {
    let gen = EchoGeneration::new(Tier::Echo, Tier::Fail);
    let agent = orchestrator(
        gen,
        StaticSearch::new(Vec::new()),
        Arc::new(MemoryConversationStore::new()),
    );

    let answer = agent
        .handle(Query::new("status of CLM-DEADBEEF please"))
        .await
        .unwrap();

    assert!(answer.text.contains("no record found"));
    assert!(answer.evidence_refs.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_primary_timeout_uses_fallback() {
    let gen = EchoGeneration::new(Tier::Hang, Tier::Echo);
    let agent = orchestrator(
        gen.clone(),
        StaticSearch::new(passages()),
        Arc::new(MemoryConversationStore::new()),
    );

    let answer = agent
        .handle(Query::new("What is the deductible on AUTO-10001?"))
        .await
        .unwrap();

    assert_eq!(answer.used_model, UsedModel::Fallback);
    assert!(answer.text.contains("$500"));
    assert_eq!(
        *gen.answer_calls.lock().unwrap(),
        vec![ModelSelector::Primary, ModelSelector::Fallback]
    );
}

#[tokio::test]
async fn test_all_tiers_fail_returns_default_answer() {
    let gen = EchoGeneration::new(Tier::Fail, Tier::Fail);
    let agent = orchestrator(
        gen,
        Arc::new(FailingSearch),
        Arc::new(MemoryConversationStore::new()),
    );

    let answer = agent
        .handle(Query::new("status of CLM-003C7AFB"))
        .await
        .unwrap();

    assert_eq!(answer.used_model, UsedModel::None);
    assert!(!answer.text.trim().is_empty());
    assert!(answer.text.contains("CLM-003C7AFB"));
}

#[tokio::test]
async fn test_general_question_without_evidence() {
    let gen = EchoGeneration::new(Tier::Fail, Tier::Fail);
    let agent = orchestrator(
        gen,
        StaticSearch::new(Vec::new()),
        Arc::new(MemoryConversationStore::new()),
    );

    let answer = agent.handle(Query::new("How does insurance work?")).await.unwrap();
    assert_eq!(answer.used_model, UsedModel::None);
    assert!(answer.text.contains("try again"));
}

// =============================================================================
// Sessions
// =============================================================================

#[tokio::test]
async fn test_turns_appended_in_order_across_queries() {
    let gen = EchoGeneration::new(Tier::Echo, Tier::Fail);
    let conversations = Arc::new(MemoryConversationStore::new());
    let agent = orchestrator(gen.clone(), StaticSearch::new(Vec::new()), conversations.clone());

    let first = agent.handle(Query::new("status of CLM-003C7AFB")).await.unwrap();
    let session_id = first.session_id.clone();
    assert!(!session_id.is_empty());

    agent
        .handle(Query::in_session("and the deductible on AUTO-10001?", &session_id))
        .await
        .unwrap();

    let history = agent.history(&session_id).await.unwrap();
    assert_eq!(history.len(), 4);
    let roles: Vec<Role> = history.iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
    assert!(history.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

    let prompt = gen.last_prompt.lock().unwrap().clone();
    assert!(prompt.contains("Customer: status of CLM-003C7AFB"));
}

#[tokio::test]
async fn test_persistence_failure_still_answers_and_stores_nothing() {
    let gen = EchoGeneration::new(Tier::Echo, Tier::Fail);
    let conversations = Arc::new(FlakyConversations {
        inner: MemoryConversationStore::new(),
        fail_puts: AtomicBool::new(true),
    });
    let agent = orchestrator(gen, StaticSearch::new(Vec::new()), conversations.clone());

    let answer = agent
        .handle(Query::in_session("status of CLM-003C7AFB", "s-flaky"))
        .await
        .unwrap();
    assert_eq!(answer.used_model, UsedModel::Primary);
    assert!(agent.history("s-flaky").await.unwrap().is_empty());

    conversations.fail_puts.store(false, Ordering::SeqCst);
    agent
        .handle(Query::in_session("status of CLM-003C7AFB", "s-flaky"))
        .await
        .unwrap();
    assert_eq!(agent.history("s-flaky").await.unwrap().len(), 2);
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_malformed_requests_touch_no_capability() {
    let gen = EchoGeneration::new(Tier::Echo, Tier::Echo);
    let search = StaticSearch::new(passages());
    let conversations = Arc::new(MemoryConversationStore::new());
    let agent = orchestrator(gen.clone(), search.clone(), conversations.clone());

    let too_long = "a".repeat(2001);
    let bad_session = "x".repeat(129);
    let cases = [
        Query::new(""),
        Query::new("   "),
        Query::new(too_long),
        Query::in_session("status of CLM-003C7AFB", bad_session),
    ];
    for query in cases {
        let err = agent.handle(query).await.unwrap_err();
        assert!(matches!(err, AgentError::MalformedRequest(_)));
    }

    assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    assert!(gen.answer_calls.lock().unwrap().is_empty());
    assert_eq!(conversations.session_count(), 0);
}
