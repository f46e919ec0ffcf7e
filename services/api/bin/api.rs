//! Main Entrypoint for the MedTutor API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the question bank.
//! 3. Initializing the shared explanation provider.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use medtutor_api::{
    config::{Config, Provider},
    router::create_router,
    state::AppState,
};
use medtutor_core::{
    QuestionBank, StaticQuestionBank,
    tutor::{ExplanationService, LLMExplanationService, StaticExplanationService},
};
use std::{collections::HashMap, fs, net::SocketAddr, path::Path, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Loads every `*.md` file in a directory, keyed by file stem.
fn load_prompts(prompts_path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    let entries = fs::read_dir(prompts_path)
        .with_context(|| format!("Failed to read prompts directory {}", prompts_path.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

fn llm_explainer(
    config: &Config,
    api_key: Option<&String>,
    api_base: &str,
) -> anyhow::Result<Arc<dyn ExplanationService>> {
    let api_key = api_key.context("API key missing for the configured explanation provider")?;
    let prompts = load_prompts(&config.prompts_path)?;
    let openai_config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(api_base);
    Ok(Arc::new(LLMExplanationService::new(
        openai_config,
        config.chat_model.clone(),
        prompts,
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 2. Load Question Bank ---
    let question_bank = match &config.question_bank_path {
        Some(path) => StaticQuestionBank::from_json_file(path)?,
        None => StaticQuestionBank::medical()?,
    };
    info!(
        questions = question_bank.len(),
        categories = question_bank.categories().len(),
        "Question bank loaded."
    );

    // --- 3. Initialize Shared Services ---
    let explainer: Arc<dyn ExplanationService> = match &config.explanation_provider {
        Provider::OpenAI => {
            info!("Using OpenAI provider.");
            llm_explainer(
                &config,
                config.openai_api_key.as_ref(),
                "https://api.openai.com/v1/",
            )?
        }
        Provider::Gemini => {
            info!("Using Gemini provider.");
            llm_explainer(
                &config,
                config.gemini_api_key.as_ref(),
                "https://generativelanguage.googleapis.com/v1beta/openai",
            )?
        }
        Provider::Mock => {
            info!("Using canned explanations.");
            Arc::new(StaticExplanationService::new())
        }
    };

    let app_state = Arc::new(AppState {
        question_bank: Arc::new(question_bank),
        explainer,
        http: reqwest::Client::new(),
        config: Arc::new(config.clone()),
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        provider = ?config.explanation_provider,
        speech = ?config.speech_provider,
        model = %config.chat_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
