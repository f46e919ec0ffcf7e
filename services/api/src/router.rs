//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{CategoriesResponse, ErrorResponse, OptionResponse, QuestionResponse},
    state::AppState,
    ws::ws_handler,
};

use axum::{Router, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_questions,
        handlers::get_question,
        handlers::list_categories,
    ),
    components(
        schemas(QuestionResponse, OptionResponse, CategoriesResponse, ErrorResponse)
    ),
    tags(
        (name = "MedTutor API", description = "Question bank access for the medical quiz tutor. Quiz sessions run over the /ws WebSocket.")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/questions", get(handlers::list_questions))
        .route("/questions/{id}", get(handlers::get_question))
        .route("/categories", get(handlers::list_categories))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
