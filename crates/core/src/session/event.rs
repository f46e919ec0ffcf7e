//! Messages processed by the orchestrator's event loop.

use super::snapshot::SessionSummary;
use crate::error::QuizError;
use crate::progression::AnswerOutcome;
use crate::question::QuestionView;
use tokio::sync::oneshot;
use uuid::Uuid;

/// What `advance` led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceResult {
    Next { index: usize, question: QuestionView },
    Finished(SessionSummary),
}

/// Learner-initiated requests, each with a reply channel.
#[derive(Debug)]
pub(crate) enum Command {
    Start(oneshot::Sender<Result<Uuid, QuizError>>),
    End(oneshot::Sender<Result<SessionSummary, QuizError>>),
    Reset(oneshot::Sender<()>),
    Submit {
        option_id: String,
        reply: oneshot::Sender<Result<AnswerOutcome, QuizError>>,
    },
    Advance(oneshot::Sender<Result<AdvanceResult, QuizError>>),
    Shutdown,
}

/// Everything that can change session state.
///
/// All variants except `Command` are produced by the clock, the speech queue
/// or spawned tasks, and carry the id of the session that produced them.
#[derive(Debug)]
pub(crate) enum SessionEvent {
    Command(Command),
    ClockTick {
        session_id: Uuid,
    },
    TutorReady {
        session_id: Uuid,
        online: bool,
    },
    TutorHealth {
        session_id: Uuid,
        online: bool,
    },
    FeedbackSpoken {
        session_id: Uuid,
        question_index: usize,
    },
    AdvanceUnlocked {
        session_id: Uuid,
        question_index: usize,
    },
    CorrectionSpoken {
        session_id: Uuid,
        question_index: usize,
    },
    ExplanationReady {
        session_id: Uuid,
        question_index: usize,
        text: String,
    },
    ExplanationDue {
        session_id: Uuid,
        question_index: usize,
    },
    ExplanationSpoken {
        session_id: Uuid,
        question_index: usize,
    },
    AskQuestion {
        session_id: Uuid,
        question_index: usize,
    },
    ClosingFeedbackReady {
        session_id: Uuid,
        text: String,
    },
}

impl SessionEvent {
    /// The session this event belongs to, if it is tagged.
    pub(crate) fn session_id(&self) -> Option<Uuid> {
        match self {
            SessionEvent::Command(_) => None,
            SessionEvent::ClockTick { session_id }
            | SessionEvent::TutorReady { session_id, .. }
            | SessionEvent::TutorHealth { session_id, .. }
            | SessionEvent::FeedbackSpoken { session_id, .. }
            | SessionEvent::AdvanceUnlocked { session_id, .. }
            | SessionEvent::CorrectionSpoken { session_id, .. }
            | SessionEvent::ExplanationReady { session_id, .. }
            | SessionEvent::ExplanationDue { session_id, .. }
            | SessionEvent::ExplanationSpoken { session_id, .. }
            | SessionEvent::AskQuestion { session_id, .. }
            | SessionEvent::ClosingFeedbackReady { session_id, .. } => Some(*session_id),
        }
    }
}
