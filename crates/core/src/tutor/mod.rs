//! Tutor Coordinator
//!
//! This module wraps the two external tutor capabilities behind one stable
//! interface:
//!
//! - **Speech**: the avatar that speaks questions, feedback and explanations.
//! - **Explanation**: a text-generation service that explains wrong answers
//!   and writes adaptive end-of-session feedback.
//!
//! Every provider failure or timeout is absorbed here. Speech calls report a
//! plain success flag and explanation calls always resolve to some text, so
//! the session orchestrator never handles provider failure as a branch of
//! its own.

pub mod explanation;
pub mod speech;

use crate::error::CapabilityError;
use crate::progression::{AnswerOutcome, MissRecord};
use crate::question::Question;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

pub use explanation::{LLMExplanationService, StaticExplanationService};
pub use speech::{AvatarProxySpeechService, RecordingSpeechService, SpokenLine};

pub const DEFAULT_CAPABILITY_TIMEOUT: Duration = Duration::from_secs(15);

pub const EXPLANATION_FALLBACK: &str = "Unable to generate explanation due to technical issues.";
pub const EXPLANATION_EMPTY_FALLBACK: &str = "Unable to generate explanation at this time.";
pub const FEEDBACK_FALLBACK: &str =
    "Continue your excellent progress! Focus on reviewing the concepts you found challenging.";
pub const FEEDBACK_EMPTY_FALLBACK: &str =
    "Keep practicing! Every mistake is a learning opportunity.";

/// What a spoken line is for. Providers may use it to pick a delivery style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechKind {
    Question,
    Feedback,
    Encouragement,
    Explanation,
}

impl SpeechKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeechKind::Question => "question",
            SpeechKind::Feedback => "feedback",
            SpeechKind::Encouragement => "encouragement",
            SpeechKind::Explanation => "explanation",
        }
    }
}

/// Defines the contract for any avatar speech provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Opens the avatar stream. Must succeed before `speak` is useful.
    async fn connect(&self) -> Result<()>;

    /// Asks the avatar to say `text`.
    async fn speak(&self, text: &str, kind: SpeechKind) -> Result<()>;

    /// Closes the avatar stream.
    async fn disconnect(&self) -> Result<()>;
}

/// The inputs for explaining one incorrect answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplanationRequest {
    pub question: String,
    pub user_answer: String,
    pub correct_answer: String,
    pub category: String,
}

impl ExplanationRequest {
    pub fn from_outcome(outcome: &AnswerOutcome) -> Self {
        Self {
            question: outcome.question.prompt.clone(),
            user_answer: outcome.selected.text.clone(),
            correct_answer: outcome
                .correct
                .as_ref()
                .or(outcome.question.correct_option())
                .map(|opt| opt.text.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            category: outcome.question.category.clone(),
        }
    }
}

/// Defines the contract for any explanation-generation provider.
///
/// Implementations may fail freely; the coordinator supplies fallbacks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExplanationService: Send + Sync {
    /// Explains why the correct answer is right and the learner's was not.
    async fn explain(&self, request: &ExplanationRequest) -> Result<String>;

    /// Writes personalised feedback from the learner's missed questions.
    async fn adaptive_feedback(&self, misses: &[MissRecord]) -> Result<String>;
}

/// The single entry point the orchestrator uses to reach the tutor.
///
/// Cloning is cheap; clones share the providers and the connection flag.
#[derive(Clone)]
pub struct TutorCoordinator {
    speech: Arc<dyn SpeechService>,
    explainer: Arc<dyn ExplanationService>,
    timeout: Duration,
    connected: Arc<AtomicBool>,
}

impl TutorCoordinator {
    pub fn new(speech: Arc<dyn SpeechService>, explainer: Arc<dyn ExplanationService>) -> Self {
        Self {
            speech,
            explainer,
            timeout: DEFAULT_CAPABILITY_TIMEOUT,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sets the per-call timeout applied to every provider call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn connect(&self) -> bool {
        match self.guarded("speech.connect", self.speech.connect()).await {
            Ok(()) => {
                self.connected.store(true, Ordering::SeqCst);
                info!("Tutor speech connected");
                true
            }
            Err(e) => {
                warn!(error = %e, "Tutor speech unavailable; continuing without it");
                false
            }
        }
    }

    /// Disconnects the speech provider if it is connected.
    pub async fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.guarded("speech.disconnect", self.speech.disconnect()).await {
            warn!(error = %e, "Tutor speech did not disconnect cleanly");
        } else {
            info!("Tutor speech disconnected");
        }
    }

    pub async fn speak(&self, text: &str, kind: SpeechKind) -> bool {
        match self.guarded("speech.speak", self.speech.speak(text, kind)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, kind = kind.as_str(), "Tutor failed to speak");
                false
            }
        }
    }

    /// Reads a question and its lettered options aloud.
    pub async fn speak_question(&self, question: &Question) -> bool {
        let text = question_script(&question.prompt, &question.option_texts());
        self.speak(&text, SpeechKind::Question).await
    }

    /// Speaks feedback on an answer. Correct answers are delivered as encouragement.
    pub async fn provide_feedback(&self, is_correct: bool, encouragement: &str) -> bool {
        let (text, kind) = if is_correct {
            (format!("Excellent! {encouragement}"), SpeechKind::Encouragement)
        } else {
            (format!("Not quite right. {encouragement}"), SpeechKind::Feedback)
        };
        self.speak(&text, kind).await
    }

    pub async fn give_explanation(&self, explanation: &str) -> bool {
        self.speak(&format!("Let me explain: {explanation}"), SpeechKind::Explanation)
            .await
    }

    /// Always resolves; failures and empty responses become fallback text.
    pub async fn generate_explanation(&self, request: &ExplanationRequest) -> String {
        match self.guarded("explanation.explain", self.explainer.explain(request)).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => EXPLANATION_EMPTY_FALLBACK.to_string(),
            Err(e) => {
                warn!(error = %e, "Using fallback explanation");
                EXPLANATION_FALLBACK.to_string()
            }
        }
    }

    /// Always resolves; failures and empty responses become fallback text.
    pub async fn generate_adaptive_feedback(&self, misses: &[MissRecord]) -> String {
        match self
            .guarded("explanation.adaptive_feedback", self.explainer.adaptive_feedback(misses))
            .await
        {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => FEEDBACK_EMPTY_FALLBACK.to_string(),
            Err(e) => {
                warn!(error = %e, "Using fallback adaptive feedback");
                FEEDBACK_FALLBACK.to_string()
            }
        }
    }

    async fn guarded<T>(
        &self,
        capability: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T, CapabilityError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CapabilityError::Unavailable {
                capability,
                message: format!("{e:#}"),
            }),
            Err(_) => Err(CapabilityError::TimedOut {
                capability,
                after: self.timeout,
            }),
        }
    }
}

/// `"<prompt> Your options are: Option A: <a>. Option B: <b>. Please select your answer."`
pub fn question_script(prompt: &str, options: &[&str]) -> String {
    let lettered = options
        .iter()
        .zip('A'..='Z')
        .map(|(text, letter)| format!("Option {letter}: {text}"))
        .collect::<Vec<_>>()
        .join(". ");
    format!("{prompt} Your options are: {lettered}. Please select your answer.")
}
