//! Defines the WebSocket message protocol between the browser client and the API server.

use medtutor_core::QuizError;
use medtutor_core::progression::AnswerOutcome;
use medtutor_core::session::{SessionSnapshot, SessionSummary};
use medtutor_core::tutor::SpeechKind;
use serde::{Deserialize, Serialize};

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Start,
    End,
    Reset,
    /// Answers the current question.
    Submit { option_id: String },
    /// Moves past an answered question.
    Advance,
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The full session state. Pushed on connect and after every change.
    Snapshot { snapshot: SessionSnapshot },
    /// How a submitted answer was scored.
    AnswerResult {
        question_index: usize,
        selected_option_id: String,
        correct_option_id: Option<String>,
        is_correct: bool,
    },
    /// A line the tutor is speaking, for captions.
    TutorSpeech { text: String, kind: SpeechKind },
    /// Sent when an end or final advance finishes the session.
    SessionSummary { summary: SessionSummary },
    /// A request the session refused. The session is unchanged.
    Rejected { reason: String, message: String },
    /// Reports a protocol error to the client.
    Error { message: String },
}

impl ServerMessage {
    pub fn answer_result(outcome: &AnswerOutcome) -> Self {
        ServerMessage::AnswerResult {
            question_index: outcome.question_index,
            selected_option_id: outcome.selected.id.clone(),
            correct_option_id: outcome.question.correct_option().map(|opt| opt.id.clone()),
            is_correct: outcome.is_correct,
        }
    }

    pub fn rejected(err: &QuizError) -> Self {
        ServerMessage::Rejected {
            reason: err.code().to_string(),
            message: err.to_string(),
        }
    }
}
