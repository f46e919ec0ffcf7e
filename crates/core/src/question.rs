use crate::error::QuestionError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How hard a question is pitched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

/// One selectable answer of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: String,
    pub text: String,
    pub is_correct: bool,
}

/// A multiple-choice question as loaded from a question bank.
///
/// Questions are immutable once a bank has validated them; every valid
/// question has exactly one correct option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub options: Vec<AnswerOption>,
    pub category: String,
    pub explanation: String,
    pub difficulty: Difficulty,
}

impl Question {
    /// Looks up one of this question's options by id.
    pub fn option(&self, option_id: &str) -> Option<&AnswerOption> {
        self.options.iter().find(|opt| opt.id == option_id)
    }

    pub fn correct_option(&self) -> Option<&AnswerOption> {
        self.options.iter().find(|opt| opt.is_correct)
    }

    /// Option texts in presentation order.
    pub fn option_texts(&self) -> Vec<&str> {
        self.options.iter().map(|opt| opt.text.as_str()).collect()
    }

    /// Checks the structural rules every bank question must satisfy.
    pub fn validate(&self) -> Result<(), QuestionError> {
        if self.options.is_empty() {
            return Err(QuestionError::NoOptions(self.id.clone()));
        }

        let correct = self.options.iter().filter(|opt| opt.is_correct).count();
        if correct != 1 {
            return Err(QuestionError::CorrectOptionCount {
                id: self.id.clone(),
                count: correct,
            });
        }

        let mut seen = HashSet::new();
        for opt in &self.options {
            if !seen.insert(opt.id.as_str()) {
                return Err(QuestionError::DuplicateOption {
                    id: self.id.clone(),
                    option: opt.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// The learner-facing view of this question, with the answer key removed.
    pub fn view(&self) -> QuestionView {
        QuestionView {
            id: self.id.clone(),
            prompt: self.prompt.clone(),
            options: self
                .options
                .iter()
                .map(|opt| OptionView {
                    id: opt.id.clone(),
                    text: opt.text.clone(),
                })
                .collect(),
            category: self.category.clone(),
            difficulty: self.difficulty,
        }
    }
}

/// A question stripped of correctness flags and the canonical explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: String,
    pub prompt: String,
    pub options: Vec<OptionView>,
    pub category: String,
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionView {
    pub id: String,
    pub text: String,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Builds a question whose option `correct` is the right answer.
    pub(crate) fn question(id: &str, category: &str, correct: &str) -> Question {
        let options = ["a", "b", "c", "d"]
            .iter()
            .map(|opt| AnswerOption {
                id: opt.to_string(),
                text: format!("{id} option {opt}"),
                is_correct: *opt == correct,
            })
            .collect();
        Question {
            id: id.to_string(),
            prompt: format!("Prompt for {id}?"),
            options,
            category: category.to_string(),
            explanation: format!("Because {correct} is right for {id}."),
            difficulty: Difficulty::Beginner,
        }
    }
}
