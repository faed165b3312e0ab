//! Synthesis engine with validated state transitions.
//!
//! Idle -> Prompting -> AwaitingPrimary -> Success | AwaitingFallback
//! AwaitingFallback -> Success | DefaultAnswer
//! AwaitingPrimary -> DefaultAnswer (fallback disabled)
//! Success | DefaultAnswer -> Done

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use northstar_core::config::SynthesisConfig;
use northstar_core::error::GenerationError;
use northstar_core::types::{Answer, ContextBundle, GenerationRequest, ModelSelector, UsedModel};
use northstar_core::Generation;

use crate::prompt::{answer_prompt, default_answer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisState {
    Idle,
    Prompting,
    AwaitingPrimary,
    AwaitingFallback,
    Success,
    DefaultAnswer,
    Done,
}

impl fmt::Display for SynthesisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid synthesis transition: {0} -> {1}")]
pub struct InvalidTransition(pub SynthesisState, pub SynthesisState);

/// Validate that a state transition is allowed.
pub fn validate_transition(from: SynthesisState, to: SynthesisState) -> Result<(), InvalidTransition> {
    use SynthesisState::*;
    let valid = matches!(
        (from, to),
        (Idle, Prompting)
            | (Prompting, AwaitingPrimary)
            | (AwaitingPrimary, Success)
            | (AwaitingPrimary, AwaitingFallback)
            | (AwaitingPrimary, DefaultAnswer)
            | (AwaitingFallback, Success)
            | (AwaitingFallback, DefaultAnswer)
            | (Success, Done)
            | (DefaultAnswer, Done)
    );

    if valid {
        Ok(())
    } else {
        Err(InvalidTransition(from, to))
    }
}

/// The answer plus the states the run passed through.
#[derive(Debug, Clone)]
pub struct SynthesisRun {
    pub answer: Answer,
    pub states: Vec<SynthesisState>,
}

struct Trace {
    states: Vec<SynthesisState>,
}

impl Trace {
    fn new() -> Self {
        Self {
            states: vec![SynthesisState::Idle],
        }
    }

    fn current(&self) -> SynthesisState {
        self.states.last().copied().unwrap_or(SynthesisState::Idle)
    }

    fn advance(&mut self, to: SynthesisState) {
        match validate_transition(self.current(), to) {
            Ok(()) => self.states.push(to),
            Err(e) => error!(error = %e, "Synthesis state machine violation"),
        }
    }
}

pub struct SynthesisEngine {
    generation: Arc<dyn Generation>,
    config: SynthesisConfig,
}

impl SynthesisEngine {
    pub fn new(generation: Arc<dyn Generation>, config: SynthesisConfig) -> Self {
        Self { generation, config }
    }

    /// Produce an answer for the bundle. Never fails and never returns
    /// empty text.
    pub async fn synthesize(&self, bundle: &ContextBundle) -> Answer {
        self.run(bundle).await.answer
    }

    pub async fn run(&self, bundle: &ContextBundle) -> SynthesisRun {
        let started = Instant::now();
        let mut trace = Trace::new();

        trace.advance(SynthesisState::Prompting);
        let prompt = answer_prompt(bundle);

        trace.advance(SynthesisState::AwaitingPrimary);
        let mut outcome = self
            .attempt(&prompt, ModelSelector::Primary)
            .await
            .map(|t| (t, UsedModel::Primary));

        if let Err(e) = &outcome {
            warn!(
                session_id = %bundle.session_id,
                model = %self.config.primary_model_id,
                error = %e,
                "Primary generation failed"
            );
            if self.config.retry_count > 0 {
                trace.advance(SynthesisState::AwaitingFallback);
                outcome = self
                    .attempt(&prompt, ModelSelector::Fallback)
                    .await
                    .map(|t| (t, UsedModel::Fallback));
                if let Err(e) = &outcome {
                    warn!(
                        session_id = %bundle.session_id,
                        model = %self.config.fallback_model_id,
                        error = %e,
                        "Fallback generation failed"
                    );
                }
            }
        }

        let (text, used_model) = match outcome {
            Ok(result) => {
                trace.advance(SynthesisState::Success);
                result
            }
            Err(_) => {
                trace.advance(SynthesisState::DefaultAnswer);
                (default_answer(bundle), UsedModel::None)
            }
        };
        trace.advance(SynthesisState::Done);

        info!(
            session_id = %bundle.session_id,
            used_model = %used_model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Answer synthesized"
        );

        SynthesisRun {
            answer: Answer {
                text,
                session_id: bundle.session_id.clone(),
                used_model,
                evidence_refs: evidence_refs(bundle),
            },
            states: trace.states,
        }
    }

    /// One generation call under the timeout. Blank output counts as refused.
    async fn attempt(&self, prompt: &str, selector: ModelSelector) -> Result<String, GenerationError> {
        let request = GenerationRequest {
            prompt: prompt.to_string(),
            model_selector: selector,
        };
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let response = tokio::time::timeout(timeout, self.generation.generate(&request))
            .await
            .map_err(|_| GenerationError::Timeout(self.config.timeout_ms))??;

        let text = response.text.trim();
        if text.is_empty() {
            return Err(GenerationError::Refused("empty output".to_string()));
        }
        Ok(text.to_string())
    }
}

/// References for found records and passages, deduplicated, in bundle order.
pub fn evidence_refs(bundle: &ContextBundle) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    for reference in bundle.evidence.iter().filter_map(|e| e.reference()) {
        if !refs.contains(&reference) {
            refs.push(reference);
        }
    }
    refs
}
