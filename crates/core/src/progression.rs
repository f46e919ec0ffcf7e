//! Question Progression
//!
//! Owns the ordered question sequence of one session, the current position,
//! the scoring tallies, and the log of missed questions. It knows nothing
//! about timing or the tutor: the session orchestrator decides when each
//! operation is allowed.

use crate::bank::QuestionBank;
use crate::error::QuizError;
use crate::question::{AnswerOption, Question};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Questions drawn per session when the bank is large enough.
pub const DEFAULT_QUESTION_COUNT: usize = 10;

/// One submitted answer. Appended once per answered question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: String,
    pub question_index: usize,
    pub option_id: String,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

/// An incorrectly answered question, kept for end-of-session feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissRecord {
    pub question: String,
    pub category: String,
    pub user_answer: String,
}

/// Post-answer presentation state of the current question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExplanationState {
    pub visible: bool,
    pub text: String,
    pub awaiting_advance: bool,
}

/// Everything a caller needs to drive tutor feedback after an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    pub question_index: usize,
    pub question: Question,
    pub selected: AnswerOption,
    /// Only present when the answer was incorrect.
    pub correct: Option<AnswerOption>,
}

/// Result of moving past the current question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Next(Question),
    Exhausted,
}

#[derive(Debug, Default)]
pub struct QuestionProgression {
    questions: Vec<Question>,
    index: usize,
    answers: Vec<AnswerRecord>,
    misses: Vec<MissRecord>,
    explanation: ExplanationState,
}

impl QuestionProgression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws a fresh question sequence and clears all tallies.
    ///
    /// Returns the number of questions drawn, which is `count` or the bank
    /// size if the bank is smaller.
    pub fn initialize(&mut self, bank: &dyn QuestionBank, count: usize) -> usize {
        self.reset();
        self.questions = bank.random(count);
        self.questions.len()
    }

    /// Scores `option_id` against the current question.
    ///
    /// Callers must not answer the same question twice; the orchestrator's
    /// phase gating guarantees this.
    pub fn record_answer(&mut self, option_id: &str) -> Result<AnswerOutcome, QuizError> {
        let question = self
            .questions
            .get(self.index)
            .ok_or(QuizError::NoCurrentQuestion)?;
        let selected = question
            .option(option_id)
            .ok_or_else(|| QuizError::InvalidOption(option_id.to_string()))?
            .clone();

        self.answers.push(AnswerRecord {
            question_id: question.id.clone(),
            question_index: self.index,
            option_id: selected.id.clone(),
            is_correct: selected.is_correct,
            answered_at: Utc::now(),
        });

        let correct = if selected.is_correct {
            None
        } else {
            self.misses.push(MissRecord {
                question: question.prompt.clone(),
                category: question.category.clone(),
                user_answer: selected.text.clone(),
            });
            question.correct_option().cloned()
        };

        Ok(AnswerOutcome {
            is_correct: selected.is_correct,
            question_index: self.index,
            question: question.clone(),
            selected,
            correct,
        })
    }

    pub fn show_explanation(&mut self, text: String) {
        self.explanation.visible = true;
        self.explanation.text = text;
    }

    pub fn set_awaiting_advance(&mut self, waiting: bool) {
        self.explanation.awaiting_advance = waiting;
    }

    pub fn clear_explanation(&mut self) {
        self.explanation = ExplanationState::default();
    }

    /// Moves to the next question.
    ///
    /// Past the last question the index stays put and `Advance::Exhausted`
    /// is returned; that is the normal end-of-questions signal.
    pub fn advance(&mut self) -> Advance {
        self.clear_explanation();
        let next = self.index + 1;
        match self.questions.get(next) {
            Some(question) => {
                self.index = next;
                Advance::Next(question.clone())
            }
            None => Advance::Exhausted,
        }
    }

    pub fn reset(&mut self) {
        self.questions.clear();
        self.index = 0;
        self.answers.clear();
        self.misses.clear();
        self.clear_explanation();
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.index)
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn questions_answered(&self) -> usize {
        self.answers.len()
    }

    pub fn correct_answers(&self) -> usize {
        self.answers.iter().filter(|a| a.is_correct).count()
    }

    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    pub fn misses(&self) -> &[MissRecord] {
        &self.misses
    }

    pub fn explanation(&self) -> &ExplanationState {
        &self.explanation
    }

    /// Whether an answer has already been recorded at the current index.
    pub fn is_current_answered(&self) -> bool {
        self.answers
            .last()
            .is_some_and(|record| record.question_index == self.index)
    }

    /// Percentage of answered questions that were correct, rounded.
    pub fn accuracy(&self) -> u32 {
        accuracy_percent(self.correct_answers(), self.questions_answered())
    }
}

/// Rounded percentage of `correct` over `answered`; zero when nothing was answered.
pub fn accuracy_percent(correct: usize, answered: usize) -> u32 {
    if answered == 0 {
        return 0;
    }
    ((correct as f64 / answered as f64) * 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::StaticQuestionBank;
    use crate::question::fixtures::question;
    use std::collections::HashSet;

    fn bank(size: usize) -> StaticQuestionBank {
        let questions = (0..size)
            .map(|i| question(&format!("q{i}"), "cardiology", "b"))
            .collect();
        StaticQuestionBank::with_seed(questions, 11).unwrap()
    }

    fn started(size: usize) -> QuestionProgression {
        let mut progression = QuestionProgression::new();
        progression.initialize(&bank(size), DEFAULT_QUESTION_COUNT);
        progression
    }

    #[test]
    fn test_initialize_draws_ten_unique_questions() {
        let progression = started(14);

        assert_eq!(progression.total_questions(), 10);
        let ids: HashSet<_> = progression.questions.iter().map(|q| q.id.clone()).collect();
        assert_eq!(ids.len(), 10);
        assert_eq!(progression.current_index(), 0);
    }

    #[test]
    fn test_initialize_on_small_bank_draws_whole_bank() {
        assert_eq!(started(3).total_questions(), 3);
    }

    #[test]
    fn test_correct_answer_is_tallied() {
        let mut progression = started(3);

        let outcome = progression.record_answer("b").unwrap();

        assert!(outcome.is_correct);
        assert!(outcome.correct.is_none());
        assert_eq!(progression.questions_answered(), 1);
        assert_eq!(progression.correct_answers(), 1);
        assert!(progression.misses().is_empty());
        assert!(progression.is_current_answered());
    }

    #[test]
    fn test_incorrect_answer_records_miss() {
        let mut progression = started(3);
        let prompt = progression.current_question().unwrap().prompt.clone();

        let outcome = progression.record_answer("d").unwrap();

        assert!(!outcome.is_correct);
        assert_eq!(outcome.selected.id, "d");
        assert_eq!(outcome.correct.map(|o| o.id), Some("b".to_string()));
        assert_eq!(progression.correct_answers(), 0);
        assert_eq!(progression.misses().len(), 1);
        assert_eq!(progression.misses()[0].question, prompt);
        assert!(progression.misses()[0].user_answer.ends_with("option d"));
    }

    #[test]
    fn test_unknown_option_is_rejected_without_state_change() {
        let mut progression = started(3);

        let err = progression.record_answer("z").unwrap_err();

        assert_eq!(err, QuizError::InvalidOption("z".to_string()));
        assert_eq!(progression.questions_answered(), 0);
        assert!(!progression.is_current_answered());
    }

    #[test]
    fn test_advance_clears_explanation_and_moves_on() {
        let mut progression = started(2);
        progression.record_answer("a").unwrap();
        progression.show_explanation("why".to_string());
        progression.set_awaiting_advance(true);

        let next = progression.advance();

        assert!(matches!(next, Advance::Next(_)));
        assert_eq!(progression.current_index(), 1);
        assert_eq!(progression.explanation(), &ExplanationState::default());
        assert!(!progression.is_current_answered());
    }

    #[test]
    fn test_advance_past_last_question_signals_exhaustion() {
        let mut progression = started(2);
        progression.advance();

        assert_eq!(progression.advance(), Advance::Exhausted);
        assert_eq!(progression.current_index(), 1);
        assert!(progression.current_question().is_some());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut progression = started(3);
        progression.record_answer("a").unwrap();
        progression.show_explanation("text".to_string());

        progression.reset();

        assert_eq!(progression.total_questions(), 0);
        assert_eq!(progression.questions_answered(), 0);
        assert!(progression.misses().is_empty());
        assert!(!progression.explanation().visible);
        assert_eq!(
            progression.record_answer("a").unwrap_err(),
            QuizError::NoCurrentQuestion
        );
    }

    #[test]
    fn test_accuracy_rounding() {
        assert_eq!(accuracy_percent(0, 0), 0);
        assert_eq!(accuracy_percent(7, 10), 70);
        assert_eq!(accuracy_percent(2, 3), 67);
        assert_eq!(accuracy_percent(1, 3), 33);
    }

    #[test]
    fn test_tallies_stay_bounded() {
        let mut progression = started(4);
        for option in ["b", "a", "b", "c"] {
            progression.record_answer(option).unwrap();
            assert!(progression.questions_answered() <= progression.total_questions());
            assert!(progression.correct_answers() <= progression.questions_answered());
            progression.advance();
        }
        assert_eq!(progression.accuracy(), 50);
    }
}
