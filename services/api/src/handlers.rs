//! Axum Handlers for the REST API
//!
//! Read-only access to the question bank. Quiz sessions themselves run over
//! the WebSocket in [`crate::ws`].
//! It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use medtutor_core::bank::QuestionBank;
use std::sync::Arc;
use tracing::error;

use crate::{
    models::{CategoriesResponse, ErrorResponse, QuestionQuery, QuestionResponse},
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// List questions in the bank, optionally filtered by category.
#[utoipa::path(
    get,
    path = "/questions",
    params(QuestionQuery),
    responses(
        (status = 200, description = "Questions without their answer keys", body = [QuestionResponse]),
        (status = 400, description = "Bad request", body = ErrorResponse)
    )
)]
pub async fn list_questions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QuestionQuery>,
) -> Result<Json<Vec<QuestionResponse>>, ApiError> {
    let questions = match query.category.as_deref().map(str::trim) {
        Some("") => {
            return Err(ApiError::BadRequest(
                "category must not be empty".to_string(),
            ));
        }
        Some(category) => state.question_bank.by_category(category),
        None => state.question_bank.all(),
    };
    Ok(Json(
        questions
            .iter()
            .map(|q| QuestionResponse::from(q.view()))
            .collect(),
    ))
}

/// Get a single question by its ID.
#[utoipa::path(
    get,
    path = "/questions/{id}",
    responses(
        (status = 200, description = "Question details", body = QuestionResponse),
        (status = 404, description = "Question not found", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Question ID")
    )
)]
pub async fn get_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let question = state
        .question_bank
        .all()
        .into_iter()
        .find(|q| q.id == id)
        .ok_or_else(|| ApiError::NotFound(format!("Question with id '{}' not found", id)))?;

    Ok((StatusCode::OK, Json(QuestionResponse::from(question.view()))))
}

/// List the categories present in the question bank.
#[utoipa::path(
    get,
    path = "/categories",
    responses(
        (status = 200, description = "Sorted category tags", body = CategoriesResponse)
    )
)]
pub async fn list_categories(State(state): State<Arc<AppState>>) -> Json<CategoriesResponse> {
    Json(CategoriesResponse {
        categories: state.question_bank.categories(),
    })
}
