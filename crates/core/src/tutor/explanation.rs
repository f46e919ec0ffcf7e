//! Explanation Generation Services
//!
//! Providers that turn a missed question into a teaching explanation, and a
//! session's misses into adaptive study feedback.

use super::{ExplanationRequest, ExplanationService};
use crate::progression::MissRecord;
use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

const EXPLAIN_SYSTEM_PROMPT: &str = "You are an expert medical educator. Provide clear, educational explanations for medical questions. Focus on helping the student understand the concept, not just the correct answer. Keep explanations concise but comprehensive.";
const FEEDBACK_SYSTEM_PROMPT: &str = "You are an adaptive AI medical tutor. Analyze patterns in student errors and provide personalized learning suggestions. Be encouraging while identifying specific areas for improvement.";

/// An `ExplanationService` backed by any OpenAI-compatible chat API.
///
/// User prompts come from templates so they can be tuned without a rebuild.
/// The template map must contain `"explain_answer"` (placeholders
/// `{question}`, `{user_answer}`, `{correct_answer}`, `{category}`) and
/// `"adaptive_feedback"` (placeholder `{misses}`).
pub struct LLMExplanationService {
    client: Client<OpenAIConfig>,
    model: String,
    prompts: HashMap<String, String>,
}

impl LLMExplanationService {
    /// # Arguments
    ///
    /// * `config` - OpenAI API configuration (API key, base URL, etc.).
    /// * `model` - Model identifier to use for generation (e.g., "gpt-4o-mini").
    /// * `prompts` - Prompt templates keyed by file stem.
    pub fn new(config: OpenAIConfig, model: String, prompts: HashMap<String, String>) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            prompts,
        }
    }

    fn template(&self, key: &str) -> Result<&str> {
        self.prompts
            .get(key)
            .map(String::as_str)
            .with_context(|| format!("Missing prompt template: '{key}'"))
    }

    async fn complete(
        &self,
        system: &str,
        user: String,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user)
                    .build()?
                    .into(),
            ])
            .max_completion_tokens(max_tokens)
            .temperature(temperature)
            .build()?;

        let response = self.client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .context("No response choice from LLM")?
            .message
            .content
            .clone()
            .context("No content in LLM response")?;
        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl ExplanationService for LLMExplanationService {
    async fn explain(&self, request: &ExplanationRequest) -> Result<String> {
        let prompt = render_explain_prompt(self.template("explain_answer")?, request);
        self.complete(EXPLAIN_SYSTEM_PROMPT, prompt, 200, 0.3).await
    }

    async fn adaptive_feedback(&self, misses: &[MissRecord]) -> Result<String> {
        let prompt = self
            .template("adaptive_feedback")?
            .replace("{misses}", &format_misses(misses));
        self.complete(FEEDBACK_SYSTEM_PROMPT, prompt, 250, 0.5).await
    }
}

fn render_explain_prompt(template: &str, request: &ExplanationRequest) -> String {
    template
        .replace("{question}", &request.question)
        .replace("{user_answer}", &request.user_answer)
        .replace("{correct_answer}", &request.correct_answer)
        .replace("{category}", &request.category)
}

/// Numbered list of misses, one block per question.
pub fn format_misses(misses: &[MissRecord]) -> String {
    misses
        .iter()
        .enumerate()
        .map(|(i, miss)| {
            format!(
                "{}. Category: {}\nQuestion: {}\nStudent's Answer: {}",
                i + 1,
                miss.category,
                miss.question,
                miss.user_answer
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// A canned `ExplanationService` for development without an API key.
///
/// Produces predictable text; an optional latency simulates the network
/// round trip.
#[derive(Debug, Clone, Default)]
pub struct StaticExplanationService {
    latency: Duration,
}

impl StaticExplanationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl ExplanationService for StaticExplanationService {
    async fn explain(&self, request: &ExplanationRequest) -> Result<String> {
        self.simulate_latency().await;
        Ok(format!(
            "The correct answer is {}. This {} question tests an underlying principle that is essential for proper patient care and diagnosis.",
            request.correct_answer,
            request.category.replace('_', " ")
        ))
    }

    async fn adaptive_feedback(&self, misses: &[MissRecord]) -> Result<String> {
        self.simulate_latency().await;
        let categories: BTreeSet<&str> = misses.iter().map(|m| m.category.as_str()).collect();
        Ok(format!(
            "I notice you're working through questions in {}. Consider reviewing the fundamental concepts in these areas and practicing similar questions to strengthen your understanding.",
            categories.into_iter().collect::<Vec<_>>().join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn miss(category: &str, question: &str) -> MissRecord {
        MissRecord {
            question: question.to_string(),
            category: category.to_string(),
            user_answer: "Pneumonia".to_string(),
        }
    }

    #[test]
    fn test_format_misses_numbers_each_entry() {
        let text = format_misses(&[miss("cardiology", "Chest pain?"), miss("neurology", "Nerve?")]);

        assert!(text.starts_with("1. Category: cardiology\nQuestion: Chest pain?"));
        assert!(text.contains("\n\n2. Category: neurology"));
        assert!(text.contains("Student's Answer: Pneumonia"));
    }

    #[test]
    fn test_render_explain_prompt_fills_placeholders() {
        let request = ExplanationRequest {
            question: "Q".to_string(),
            user_answer: "U".to_string(),
            correct_answer: "C".to_string(),
            category: "K".to_string(),
        };

        let prompt = render_explain_prompt(
            "{question}|{user_answer}|{correct_answer}|{category}",
            &request,
        );

        assert_eq!(prompt, "Q|U|C|K");
    }

    #[tokio::test]
    async fn test_missing_template_is_an_error() {
        let service =
            LLMExplanationService::new(OpenAIConfig::new(), "gpt-4o-mini".to_string(), HashMap::new());

        let err = service.adaptive_feedback(&[]).await.unwrap_err();
        assert!(err.to_string().contains("adaptive_feedback"));
    }

    #[tokio::test]
    async fn test_static_feedback_lists_distinct_categories() {
        let service = StaticExplanationService::new();
        let text = service
            .adaptive_feedback(&[
                miss("neurology", "a"),
                miss("cardiology", "b"),
                miss("neurology", "c"),
            ])
            .await
            .unwrap();

        assert!(text.contains("cardiology, neurology"));
    }

    #[tokio::test]
    async fn test_static_explanation_mentions_correct_answer() {
        let request = ExplanationRequest {
            question: "Q".to_string(),
            user_answer: "Antihistamines".to_string(),
            correct_answer: "Epinephrine".to_string(),
            category: "emergency_medicine".to_string(),
        };

        let text = StaticExplanationService::new().explain(&request).await.unwrap();

        assert!(text.contains("Epinephrine"));
        assert!(text.contains("emergency medicine"));
    }
}
