//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the question bank and provider clients.

use crate::config::{Config, SpeechProvider};
use medtutor_core::StaticQuestionBank;
use medtutor_core::tutor::{
    AvatarProxySpeechService, ExplanationService, RecordingSpeechService, SpeechService,
    TutorCoordinator,
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub question_bank: Arc<StaticQuestionBank>,
    pub explainer: Arc<dyn ExplanationService>,
    pub http: reqwest::Client,
    pub config: Arc<Config>,
}

impl AppState {
    /// A fresh speech provider for one learner connection.
    ///
    /// Avatar streams are per learner, so unlike the explainer this is never
    /// shared between connections.
    pub fn speech_service(&self) -> Arc<dyn SpeechService> {
        match (&self.config.speech_provider, &self.config.avatar_proxy_url) {
            (SpeechProvider::Avatar, Some(url)) => Arc::new(AvatarProxySpeechService::new(
                self.http.clone(),
                url.clone(),
                self.config.avatar_id.clone(),
                self.config.avatar_voice_id.clone(),
            )),
            _ => Arc::new(RecordingSpeechService::new()),
        }
    }

    pub fn tutor(&self, speech: Arc<dyn SpeechService>) -> TutorCoordinator {
        TutorCoordinator::new(speech, self.explainer.clone())
            .with_timeout(self.config.capability_timeout)
    }
}
