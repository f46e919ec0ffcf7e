//! Serial speech delivery.
//!
//! Every line the tutor speaks goes through one FIFO worker so speech calls
//! never overlap. Jobs tagged with a session id are skipped once that session
//! is no longer live.

use super::event::SessionEvent;
use crate::question::Question;
use crate::tutor::TutorCoordinator;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug)]
pub(crate) enum SpeechAction {
    Connect,
    Question(Question),
    Feedback { is_correct: bool, text: String },
    Explanation(String),
    Disconnect,
}

#[derive(Debug)]
pub(crate) struct SpeechJob {
    /// `None` for jobs that must run even after the session is gone.
    pub session_id: Option<Uuid>,
    pub action: SpeechAction,
    /// Posted back to the orchestrator once the action completes.
    pub then: Option<SessionEvent>,
}

pub(crate) fn spawn_worker(
    tutor: TutorCoordinator,
    mut jobs: mpsc::UnboundedReceiver<SpeechJob>,
    live_session: watch::Receiver<Option<Uuid>>,
    events: mpsc::Sender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            if let Some(session_id) = job.session_id {
                if *live_session.borrow() != Some(session_id) {
                    debug!(%session_id, action = ?job.action, "Skipping speech for a superseded session");
                    continue;
                }
            }

            let is_connect = matches!(job.action, SpeechAction::Connect);
            let online = match job.action {
                SpeechAction::Connect => tutor.connect().await,
                SpeechAction::Question(question) => tutor.speak_question(&question).await,
                SpeechAction::Feedback { is_correct, text } => {
                    tutor.provide_feedback(is_correct, &text).await
                }
                SpeechAction::Explanation(text) => tutor.give_explanation(&text).await,
                SpeechAction::Disconnect => {
                    tutor.disconnect().await;
                    continue;
                }
            };

            let Some(session_id) = job.session_id else {
                continue;
            };
            let health = if is_connect {
                SessionEvent::TutorReady { session_id, online }
            } else {
                SessionEvent::TutorHealth { session_id, online }
            };
            if events.send(health).await.is_err() {
                break;
            }
            if let Some(then) = job.then {
                if events.send(then).await.is_err() {
                    break;
                }
            }
        }
    })
}
