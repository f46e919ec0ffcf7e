//! API Models
//!
//! Response and query types for the REST API, annotated with `utoipa` for
//! OpenAPI generation. Questions are always served without their answer key.

use medtutor_core::question::QuestionView;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct OptionResponse {
    #[schema(example = "b")]
    pub id: String,
    #[schema(example = "Myocardial infarction")]
    pub text: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct QuestionResponse {
    #[schema(example = "q1")]
    pub id: String,
    pub prompt: String,
    pub options: Vec<OptionResponse>,
    #[schema(example = "cardiology")]
    pub category: String,
    #[schema(example = "intermediate")]
    pub difficulty: String,
}

impl From<QuestionView> for QuestionResponse {
    fn from(view: QuestionView) -> Self {
        Self {
            id: view.id,
            prompt: view.prompt,
            options: view
                .options
                .into_iter()
                .map(|opt| OptionResponse {
                    id: opt.id,
                    text: opt.text,
                })
                .collect(),
            category: view.category,
            difficulty: view.difficulty.as_str().to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct CategoriesResponse {
    pub categories: Vec<String>,
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct QuestionQuery {
    /// Only return questions tagged with this category.
    pub category: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
