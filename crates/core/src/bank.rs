//! Question Bank
//!
//! This module provides the source of multiple-choice questions for quiz
//! sessions. A bank is a read-only collection; sessions draw a randomized,
//! non-repeating subset from it when they start.

use crate::error::QuestionError;
use crate::question::Question;
use anyhow::{Context, Result};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Mutex;

const MEDICAL_QUESTIONS_JSON: &str = include_str!("../data/medical_questions.json");

/// Defines the contract for any source of quiz questions.
///
/// This abstraction lets sessions run against the built-in medical bank, a
/// bank loaded from disk, or a small fixed bank in tests without the
/// orchestration logic knowing the difference.
pub trait QuestionBank: Send + Sync {
    /// Returns every question in the bank, in bank order.
    fn all(&self) -> Vec<Question>;

    /// Draws up to `count` distinct questions in randomized order.
    ///
    /// If the bank holds fewer than `count` questions, every question is
    /// returned (shuffled).
    fn random(&self, count: usize) -> Vec<Question>;

    /// Returns the questions tagged with `category`.
    fn by_category(&self, category: &str) -> Vec<Question>;

    fn len(&self) -> usize {
        self.all().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An in-memory `QuestionBank` over a validated list of questions.
///
/// Random selection uses an owned RNG, so a bank built with
/// [`StaticQuestionBank::with_seed`] yields a reproducible draw sequence.
pub struct StaticQuestionBank {
    questions: Vec<Question>,
    rng: Mutex<StdRng>,
}

impl StaticQuestionBank {
    /// Creates a bank seeded from the operating system's entropy source.
    pub fn new(questions: Vec<Question>) -> Result<Self, QuestionError> {
        Self::with_rng(questions, StdRng::from_os_rng())
    }

    /// Creates a bank whose random draws are determined by `seed`.
    pub fn with_seed(questions: Vec<Question>, seed: u64) -> Result<Self, QuestionError> {
        Self::with_rng(questions, StdRng::seed_from_u64(seed))
    }

    fn with_rng(questions: Vec<Question>, rng: StdRng) -> Result<Self, QuestionError> {
        validate_all(&questions)?;
        Ok(Self {
            questions,
            rng: Mutex::new(rng),
        })
    }

    /// The built-in medical question bank.
    pub fn medical() -> Result<Self> {
        Self::from_json_str(MEDICAL_QUESTIONS_JSON).context("Built-in medical bank is invalid")
    }

    /// Parses and validates a JSON array of questions.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let questions: Vec<Question> =
            serde_json::from_str(json).context("Failed to parse question bank JSON")?;
        Ok(Self::new(questions)?)
    }

    /// Loads a bank from a JSON file on disk.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read question bank {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("Invalid question bank {}", path.display()))
    }

    /// Distinct categories present in the bank, sorted.
    pub fn categories(&self) -> Vec<String> {
        self.questions
            .iter()
            .map(|q| q.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl QuestionBank for StaticQuestionBank {
    fn all(&self) -> Vec<Question> {
        self.questions.clone()
    }

    fn random(&self, count: usize) -> Vec<Question> {
        let mut drawn = self.questions.clone();
        // A poisoned lock only means another draw panicked mid-shuffle; the RNG is still usable.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        drawn.shuffle(&mut *rng);
        drawn.truncate(count.min(self.questions.len()));
        drawn
    }

    fn by_category(&self, category: &str) -> Vec<Question> {
        self.questions
            .iter()
            .filter(|q| q.category == category)
            .cloned()
            .collect()
    }

    fn len(&self) -> usize {
        self.questions.len()
    }
}

fn validate_all(questions: &[Question]) -> Result<(), QuestionError> {
    if questions.is_empty() {
        return Err(QuestionError::EmptyBank);
    }
    let mut ids = HashSet::new();
    for question in questions {
        question.validate()?;
        if !ids.insert(question.id.as_str()) {
            return Err(QuestionError::DuplicateQuestion(question.id.clone()));
        }
    }
    Ok(())
}
