//! Session Orchestrator
//!
//! The quiz session state machine. A [`SessionOrchestrator`] runs as a single
//! task that exclusively owns the clock, the question progression and all
//! session fields. Learner actions, clock ticks and completions of tutor work
//! all arrive as events on one channel and are applied one at a time, so no
//! two transitions ever interleave.
//!
//! Asynchronous results are tagged with the id of the session that requested
//! them. When a result arrives for a session that has since been reset or
//! replaced it is dropped without touching state.
//!
//! Callers interact through a cloneable [`SessionHandle`] and observe state
//! through [`SessionSnapshot`]s published on every change.

mod event;
mod orchestrator;
mod settings;
mod snapshot;
mod speech_queue;

pub use event::AdvanceResult;
pub use orchestrator::{SessionHandle, SessionOrchestrator};
pub use settings::SessionSettings;
pub use snapshot::{
    AnswerFeedback, EndReason, QuestionPhase, SessionSnapshot, SessionStatus, SessionSummary,
};

/// Spoken after a correct answer, one chosen at random.
pub const ENCOURAGEMENTS: [&str; 4] = [
    "You're really getting the hang of this.",
    "That's correct! Great clinical thinking.",
    "Perfect! Your medical knowledge is showing.",
    "Outstanding work! Let's keep this momentum going.",
];

pub const CORRECTIVE_LINE: &str =
    "That's not quite right, but great attempt! Let me explain the correct answer.";

pub const CLOSING_ENCOURAGEMENT: &str = "Excellent session! You're making great progress in your medical studies. I enjoyed working with you today!";
