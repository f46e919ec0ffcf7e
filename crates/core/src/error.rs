//! Error types shared across the quiz engine.

use crate::session::QuestionPhase;
use std::time::Duration;

/// Errors surfaced to callers of the session API.
///
/// None of these change session state: a rejected action leaves the
/// session exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuizError {
    #[error("option '{0}' does not belong to the current question")]
    InvalidOption(String),
    #[error("question {0} has already been answered")]
    AlreadyAnswered(usize),
    #[error("no session is active")]
    NotActive,
    #[error("cannot {action} while the session is {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: QuestionPhase,
    },
    #[error("the question bank has no questions to draw from")]
    EmptyQuestionBank,
    #[error("there is no current question")]
    NoCurrentQuestion,
    #[error("the session orchestrator has shut down")]
    Closed,
}

impl QuizError {
    /// Stable machine-readable name for clients.
    pub fn code(&self) -> &'static str {
        match self {
            QuizError::InvalidOption(_) => "invalid_option",
            QuizError::AlreadyAnswered(_) => "already_answered",
            QuizError::NotActive => "not_active",
            QuizError::InvalidTransition { .. } => "invalid_transition",
            QuizError::EmptyQuestionBank => "empty_question_bank",
            QuizError::NoCurrentQuestion => "no_current_question",
            QuizError::Closed => "closed",
        }
    }
}

/// Validation failures when loading questions into a bank.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuestionError {
    #[error("question '{0}' has no options")]
    NoOptions(String),
    #[error("question '{id}' must have exactly one correct option, found {count}")]
    CorrectOptionCount { id: String, count: usize },
    #[error("question '{id}' repeats option id '{option}'")]
    DuplicateOption { id: String, option: String },
    #[error("question id '{0}' appears more than once in the bank")]
    DuplicateQuestion(String),
    #[error("a question bank needs at least one question")]
    EmptyBank,
}

/// A failed call to an external tutor capability.
///
/// These never leave the tutor coordinator; it logs them and substitutes
/// a fallback so the session keeps moving.
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("{capability} call failed: {message}")]
    Unavailable {
        capability: &'static str,
        message: String,
    },
    #[error("{capability} call timed out after {after:?}")]
    TimedOut {
        capability: &'static str,
        after: Duration,
    },
}
