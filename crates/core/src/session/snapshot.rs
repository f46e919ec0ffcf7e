//! Read-only views of the session published to the presentation layer.

use crate::progression::MissRecord;
use crate::question::QuestionView;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Active,
    Ended,
}

/// Where the current question is in its lifecycle. Only meaningful while
/// the session is `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionPhase {
    /// Started, but the speech connection has not reported back yet.
    AwaitingTutor,
    AwaitingAnswer,
    AnsweredCorrect,
    AnsweredIncorrectPendingExplanation,
    AwaitingAdvance,
}

impl fmt::Display for QuestionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            QuestionPhase::AwaitingTutor => "waiting for the tutor",
            QuestionPhase::AwaitingAnswer => "awaiting an answer",
            QuestionPhase::AnsweredCorrect => "showing answer feedback",
            QuestionPhase::AnsweredIncorrectPendingExplanation => "waiting for an explanation",
            QuestionPhase::AwaitingAdvance => "waiting to advance",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Requested,
    TimeExpired,
    QuestionsExhausted,
}

/// End-of-session report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub reason: EndReason,
    pub questions_answered: usize,
    pub correct_answers: usize,
    /// Rounded percentage.
    pub accuracy: u32,
    pub misses: Vec<MissRecord>,
    /// What the tutor said to close the session. `None` until it is decided,
    /// which can be after the session has ended if feedback is generated.
    pub closing_message: Option<String>,
}

/// How the most recent answer on the current question was scored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerFeedback {
    pub question_index: usize,
    pub selected_option_id: String,
    pub correct_option_id: Option<String>,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub phase: Option<QuestionPhase>,
    pub session_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub remaining_seconds: u64,
    pub questions_answered: usize,
    pub correct_answers: usize,
    pub current_question: Option<QuestionView>,
    pub current_question_index: usize,
    pub total_questions: usize,
    pub explanation_visible: bool,
    pub explanation_text: Option<String>,
    pub awaiting_advance: bool,
    pub last_answer: Option<AnswerFeedback>,
    pub tutor_online: bool,
    pub summary: Option<SessionSummary>,
}

impl SessionSnapshot {
    pub fn idle(remaining_seconds: u64) -> Self {
        Self {
            status: SessionStatus::Idle,
            phase: None,
            session_id: None,
            started_at: None,
            remaining_seconds,
            questions_answered: 0,
            correct_answers: 0,
            current_question: None,
            current_question_index: 0,
            total_questions: 0,
            explanation_visible: false,
            explanation_text: None,
            awaiting_advance: false,
            last_answer: None,
            tutor_online: false,
            summary: None,
        }
    }
}
