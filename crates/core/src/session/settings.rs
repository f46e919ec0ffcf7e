use crate::clock::DEFAULT_SESSION_DURATION;
use crate::progression::DEFAULT_QUESTION_COUNT;
use std::time::Duration;

/// Pacing and sizing of a quiz session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Total session length.
    pub duration: Duration,
    /// Questions drawn from the bank on start.
    pub questions_per_session: usize,
    /// Pause after a correct answer before advance is allowed.
    pub feedback_delay: Duration,
    /// Pause between the corrective line and the spoken explanation.
    pub explanation_delay: Duration,
    /// Pause between advancing and reading the next question aloud.
    pub question_delay: Duration,
    /// Misses needed before closing feedback is personalised.
    pub adaptive_feedback_threshold: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            duration: DEFAULT_SESSION_DURATION,
            questions_per_session: DEFAULT_QUESTION_COUNT,
            feedback_delay: Duration::from_secs(2),
            explanation_delay: Duration::from_secs(1),
            question_delay: Duration::from_secs(1),
            adaptive_feedback_threshold: 2,
        }
    }
}
