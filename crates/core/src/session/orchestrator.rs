use super::event::{AdvanceResult, Command, SessionEvent};
use super::settings::SessionSettings;
use super::snapshot::{
    AnswerFeedback, EndReason, QuestionPhase, SessionSnapshot, SessionStatus, SessionSummary,
};
use super::speech_queue::{self, SpeechAction, SpeechJob};
use super::{CLOSING_ENCOURAGEMENT, CORRECTIVE_LINE, ENCOURAGEMENTS};
use crate::bank::QuestionBank;
use crate::clock::SessionClock;
use crate::error::QuizError;
use crate::progression::{Advance, AnswerOutcome, QuestionProgression};
use crate::question::Question;
use crate::tutor::{ExplanationRequest, TutorCoordinator};
use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

const EVENT_BUFFER: usize = 128;

/// Progress of the two independent halves of an incorrect-answer response:
/// the spoken correction and the generated explanation.
#[derive(Debug)]
struct PendingExplanation {
    question_index: usize,
    correction_spoken: bool,
    text: Option<String>,
    scheduled: bool,
}

impl PendingExplanation {
    fn new(question_index: usize) -> Self {
        Self {
            question_index,
            correction_spoken: false,
            text: None,
            scheduled: false,
        }
    }
}

/// The session state machine. Owned by its own task; see [`SessionHandle`].
pub struct SessionOrchestrator {
    settings: SessionSettings,
    bank: Arc<dyn QuestionBank>,
    tutor: TutorCoordinator,
    clock: SessionClock,
    progression: QuestionProgression,
    status: SessionStatus,
    phase: Option<QuestionPhase>,
    session_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    pending: Option<PendingExplanation>,
    closing_deferred: bool,
    summary: Option<SessionSummary>,
    last_answer: Option<AnswerFeedback>,
    tutor_online: bool,
    events_tx: mpsc::Sender<SessionEvent>,
    speech_tx: mpsc::UnboundedSender<SpeechJob>,
    live_session: watch::Sender<Option<Uuid>>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl SessionOrchestrator {
    /// Spawns an orchestrator and its speech worker, returning the handle
    /// used to drive it.
    ///
    /// The orchestrator stops when `shutdown` is called or the last handle
    /// is dropped.
    pub fn spawn(
        settings: SessionSettings,
        bank: Arc<dyn QuestionBank>,
        tutor: TutorCoordinator,
    ) -> SessionHandle {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (speech_tx, speech_rx) = mpsc::unbounded_channel();
        let (live_session, live_rx) = watch::channel(None);
        let clock = SessionClock::new(settings.duration);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::idle(clock.remaining_secs()));

        speech_queue::spawn_worker(tutor.clone(), speech_rx, live_rx, events_tx.clone());

        let orchestrator = Self {
            settings,
            bank,
            tutor,
            clock,
            progression: QuestionProgression::new(),
            status: SessionStatus::Idle,
            phase: None,
            session_id: None,
            started_at: None,
            pending: None,
            closing_deferred: false,
            summary: None,
            last_answer: None,
            tutor_online: false,
            events_tx: events_tx.clone(),
            speech_tx,
            live_session,
            snapshot_tx,
        };
        tokio::spawn(orchestrator.run(events_rx));

        SessionHandle {
            events: events_tx.clone(),
            snapshots: snapshot_rx,
            _guard: Arc::new(HandleGuard(events_tx)),
        }
    }

    async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) {
        info!("Session orchestrator running");
        while let Some(event) = events.recv().await {
            if let Some(session_id) = event.session_id() {
                if self.session_id != Some(session_id) {
                    debug!(%session_id, ?event, "Discarding stale event");
                    continue;
                }
            }
            match event {
                SessionEvent::Command(command) => {
                    if !self.handle_command(command) {
                        break;
                    }
                }
                event => self.handle_event(event),
            }
            self.publish();
        }
        info!("Session orchestrator stopped");
    }

    /// Returns `false` once the orchestrator should stop.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Start(reply) => {
                let result = self.start();
                self.reply(reply, result);
            }
            Command::End(reply) => {
                let result = self.end();
                self.reply(reply, result);
            }
            Command::Reset(reply) => {
                self.reset();
                self.reply(reply, ());
            }
            Command::Submit { option_id, reply } => {
                let result = self.submit(&option_id);
                self.reply(reply, result);
            }
            Command::Advance(reply) => {
                let result = self.advance();
                self.reply(reply, result);
            }
            Command::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Command(_) => {}
            SessionEvent::ClockTick { .. } => {
                let remaining = self.clock.tick();
                if remaining == 0 && self.status == SessionStatus::Active {
                    info!("Session time expired");
                    self.finish(EndReason::TimeExpired);
                }
            }
            SessionEvent::TutorReady { session_id, online } => {
                self.tutor_online = online;
                if self.phase == Some(QuestionPhase::AwaitingTutor) {
                    self.phase = Some(QuestionPhase::AwaitingAnswer);
                    info!(%session_id, online, "Tutor ready, first question open");
                    self.ask_current_question(session_id);
                }
            }
            SessionEvent::TutorHealth { online, .. } => {
                if self.tutor_online != online {
                    info!(online, "Tutor availability changed");
                }
                self.tutor_online = online;
            }
            SessionEvent::FeedbackSpoken {
                session_id,
                question_index,
            } => {
                if self.is_current(QuestionPhase::AnsweredCorrect, question_index) {
                    self.schedule(
                        self.settings.feedback_delay,
                        SessionEvent::AdvanceUnlocked {
                            session_id,
                            question_index,
                        },
                    );
                }
            }
            SessionEvent::AdvanceUnlocked { question_index, .. } => {
                if self.is_current(QuestionPhase::AnsweredCorrect, question_index) {
                    self.phase = Some(QuestionPhase::AwaitingAdvance);
                    self.progression.set_awaiting_advance(true);
                }
            }
            SessionEvent::CorrectionSpoken {
                session_id,
                question_index,
            } => {
                if let Some(pending) = self.pending_for(question_index) {
                    pending.correction_spoken = true;
                    self.schedule_explanation_if_ready(session_id);
                }
            }
            SessionEvent::ExplanationReady {
                session_id,
                question_index,
                text,
            } => {
                let Some(pending) = self.pending_for(question_index) else {
                    debug!(question_index, "Explanation arrived for a settled question");
                    return;
                };
                pending.text = Some(text.clone());
                if self.status == SessionStatus::Active {
                    self.progression.show_explanation(text);
                }
                self.schedule_explanation_if_ready(session_id);
            }
            SessionEvent::ExplanationDue {
                session_id,
                question_index,
            } => {
                if let Some(text) = self.pending_for(question_index).and_then(|p| p.text.clone()) {
                    self.enqueue(
                        Some(session_id),
                        SpeechAction::Explanation(text),
                        Some(SessionEvent::ExplanationSpoken {
                            session_id,
                            question_index,
                        }),
                    );
                }
            }
            SessionEvent::ExplanationSpoken { question_index, .. } => {
                if self.pending_for(question_index).is_none() {
                    return;
                }
                self.pending = None;
                if self.is_current(
                    QuestionPhase::AnsweredIncorrectPendingExplanation,
                    question_index,
                ) {
                    self.phase = Some(QuestionPhase::AwaitingAdvance);
                    self.progression.set_awaiting_advance(true);
                } else if self.status == SessionStatus::Ended && self.closing_deferred {
                    self.closing_deferred = false;
                    self.deliver_closing();
                }
            }
            SessionEvent::AskQuestion {
                session_id,
                question_index,
            } => {
                if self.is_current(QuestionPhase::AwaitingAnswer, question_index) {
                    self.ask_current_question(session_id);
                }
            }
            SessionEvent::ClosingFeedbackReady { session_id, text } => {
                if self.status == SessionStatus::Ended {
                    self.speak_closing(session_id, false, format!("Session complete! {text}"));
                }
            }
        }
    }

    fn start(&mut self) -> Result<Uuid, QuizError> {
        if self.status == SessionStatus::Active {
            if let Some(session_id) = self.session_id {
                debug!(%session_id, "Start ignored, session already active");
                return Ok(session_id);
            }
        }
        if self.bank.is_empty() || self.settings.questions_per_session == 0 {
            return Err(QuizError::EmptyQuestionBank);
        }

        let replacing = self.status == SessionStatus::Ended;
        let drawn = self
            .progression
            .initialize(self.bank.as_ref(), self.settings.questions_per_session);

        let session_id = Uuid::new_v4();
        self.session_id = Some(session_id);
        self.live_session.send_replace(Some(session_id));
        self.status = SessionStatus::Active;
        self.phase = Some(QuestionPhase::AwaitingTutor);
        self.started_at = Some(Utc::now());
        self.pending = None;
        self.closing_deferred = false;
        self.summary = None;
        self.last_answer = None;

        self.clock
            .start(self.events_tx.clone(), move || SessionEvent::ClockTick { session_id });
        if replacing {
            self.enqueue(None, SpeechAction::Disconnect, None);
        }
        self.enqueue(Some(session_id), SpeechAction::Connect, None);

        info!(%session_id, questions = drawn, "Session started");
        Ok(session_id)
    }

    fn end(&mut self) -> Result<SessionSummary, QuizError> {
        self.ensure_active()?;
        info!("Session end requested");
        Ok(self.finish(EndReason::Requested))
    }

    fn reset(&mut self) {
        if self.status == SessionStatus::Idle {
            return;
        }
        let previous = self.session_id.take();
        self.clock.reset();
        self.progression.reset();
        self.live_session.send_replace(None);
        self.status = SessionStatus::Idle;
        self.phase = None;
        self.started_at = None;
        self.pending = None;
        self.closing_deferred = false;
        self.summary = None;
        self.last_answer = None;
        self.tutor_online = false;
        self.enqueue(None, SpeechAction::Disconnect, None);
        info!(session_id = ?previous, "Session reset");
    }

    fn submit(&mut self, option_id: &str) -> Result<AnswerOutcome, QuizError> {
        self.ensure_active()?;
        let session_id = self.session_id.ok_or(QuizError::NotActive)?;
        match self.phase {
            Some(QuestionPhase::AwaitingAnswer) => {}
            _ if self.progression.is_current_answered() => {
                return Err(QuizError::AlreadyAnswered(self.progression.current_index()));
            }
            Some(phase) => {
                return Err(QuizError::InvalidTransition {
                    action: "submit an answer",
                    phase,
                });
            }
            None => return Err(QuizError::NotActive),
        }

        let outcome = self.progression.record_answer(option_id)?;
        let question_index = outcome.question_index;
        info!(question_index, correct = outcome.is_correct, "Answer recorded");

        self.last_answer = Some(AnswerFeedback {
            question_index,
            selected_option_id: outcome.selected.id.clone(),
            correct_option_id: outcome.question.correct_option().map(|opt| opt.id.clone()),
            is_correct: outcome.is_correct,
        });

        if outcome.is_correct {
            self.phase = Some(QuestionPhase::AnsweredCorrect);
            let line = ENCOURAGEMENTS
                .choose(&mut rand::rng())
                .copied()
                .unwrap_or_default();
            self.enqueue(
                Some(session_id),
                SpeechAction::Feedback {
                    is_correct: true,
                    text: line.to_string(),
                },
                Some(SessionEvent::FeedbackSpoken {
                    session_id,
                    question_index,
                }),
            );
        } else {
            self.phase = Some(QuestionPhase::AnsweredIncorrectPendingExplanation);
            self.pending = Some(PendingExplanation::new(question_index));
            self.request_explanation(session_id, &outcome);
            self.enqueue(
                Some(session_id),
                SpeechAction::Feedback {
                    is_correct: false,
                    text: CORRECTIVE_LINE.to_string(),
                },
                Some(SessionEvent::CorrectionSpoken {
                    session_id,
                    question_index,
                }),
            );
        }
        Ok(outcome)
    }

    fn advance(&mut self) -> Result<AdvanceResult, QuizError> {
        self.ensure_active()?;
        let session_id = self.session_id.ok_or(QuizError::NotActive)?;
        match self.phase {
            Some(QuestionPhase::AwaitingAdvance) => {}
            Some(phase) => {
                return Err(QuizError::InvalidTransition {
                    action: "advance",
                    phase,
                });
            }
            None => return Err(QuizError::NotActive),
        }

        match self.progression.advance() {
            Advance::Next(question) => {
                let index = self.progression.current_index();
                self.phase = Some(QuestionPhase::AwaitingAnswer);
                self.last_answer = None;
                self.schedule(
                    self.settings.question_delay,
                    SessionEvent::AskQuestion {
                        session_id,
                        question_index: index,
                    },
                );
                info!(index, "Advanced to next question");
                Ok(AdvanceResult::Next {
                    index,
                    question: question.view(),
                })
            }
            Advance::Exhausted => {
                info!("Question sequence exhausted");
                Ok(AdvanceResult::Finished(self.finish(EndReason::QuestionsExhausted)))
            }
        }
    }

    fn shutdown(&mut self) {
        self.clock.stop();
        self.live_session.send_replace(None);
        self.enqueue(None, SpeechAction::Disconnect, None);
        info!("Session orchestrator shutting down");
    }

    /// Moves the session to `Ended` and starts the closing sequence.
    ///
    /// If an explanation is still on its way the closing words wait for it.
    fn finish(&mut self, reason: EndReason) -> SessionSummary {
        self.status = SessionStatus::Ended;
        self.phase = None;
        self.clock.stop();
        self.progression.clear_explanation();

        let summary = SessionSummary {
            reason,
            questions_answered: self.progression.questions_answered(),
            correct_answers: self.progression.correct_answers(),
            accuracy: self.progression.accuracy(),
            misses: self.progression.misses().to_vec(),
            closing_message: None,
        };
        info!(
            session_id = ?self.session_id,
            ?reason,
            answered = summary.questions_answered,
            correct = summary.correct_answers,
            accuracy = summary.accuracy,
            "Session ended"
        );
        self.summary = Some(summary.clone());

        if self.pending.is_some() {
            debug!("Closing deferred until the pending explanation is spoken");
            self.closing_deferred = true;
        } else {
            self.deliver_closing();
        }
        self.summary.clone().unwrap_or(summary)
    }

    fn deliver_closing(&mut self) {
        let Some(session_id) = self.session_id else {
            return;
        };
        let misses = self.progression.misses().to_vec();
        if misses.len() >= self.settings.adaptive_feedback_threshold {
            let tutor = self.tutor.clone();
            let events = self.events_tx.clone();
            tokio::spawn(async move {
                let text = tutor.generate_adaptive_feedback(&misses).await;
                let _ = events
                    .send(SessionEvent::ClosingFeedbackReady { session_id, text })
                    .await;
            });
        } else {
            self.speak_closing(session_id, true, CLOSING_ENCOURAGEMENT.to_string());
        }
    }

    fn speak_closing(&mut self, session_id: Uuid, is_correct: bool, text: String) {
        if let Some(summary) = self.summary.as_mut() {
            summary.closing_message = Some(text.clone());
        }
        self.enqueue(
            Some(session_id),
            SpeechAction::Feedback { is_correct, text },
            None,
        );
        self.enqueue(None, SpeechAction::Disconnect, None);
    }

    fn request_explanation(&self, session_id: Uuid, outcome: &AnswerOutcome) {
        let tutor = self.tutor.clone();
        let events = self.events_tx.clone();
        let request = ExplanationRequest::from_outcome(outcome);
        let question_index = outcome.question_index;
        tokio::spawn(async move {
            let text = tutor.generate_explanation(&request).await;
            let _ = events
                .send(SessionEvent::ExplanationReady {
                    session_id,
                    question_index,
                    text,
                })
                .await;
        });
    }

    fn schedule_explanation_if_ready(&mut self, session_id: Uuid) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        if pending.scheduled || !pending.correction_spoken || pending.text.is_none() {
            return;
        }
        pending.scheduled = true;
        let question_index = pending.question_index;
        self.schedule(
            self.settings.explanation_delay,
            SessionEvent::ExplanationDue {
                session_id,
                question_index,
            },
        );
    }

    fn ask_current_question(&self, session_id: Uuid) {
        if let Some(question) = self.progression.current_question().cloned() {
            self.enqueue(Some(session_id), SpeechAction::Question(question), None);
        }
    }

    fn pending_for(&mut self, question_index: usize) -> Option<&mut PendingExplanation> {
        self.pending
            .as_mut()
            .filter(|pending| pending.question_index == question_index)
    }

    fn is_current(&self, phase: QuestionPhase, question_index: usize) -> bool {
        self.phase == Some(phase) && self.progression.current_index() == question_index
    }

    fn ensure_active(&self) -> Result<(), QuizError> {
        if self.status == SessionStatus::Active {
            Ok(())
        } else {
            Err(QuizError::NotActive)
        }
    }

    fn enqueue(&self, session_id: Option<Uuid>, action: SpeechAction, then: Option<SessionEvent>) {
        let job = SpeechJob {
            session_id,
            action,
            then,
        };
        if self.speech_tx.send(job).is_err() {
            warn!("Speech queue has stopped; dropping speech job");
        }
    }

    fn schedule(&self, delay: Duration, event: SessionEvent) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(event).await;
        });
    }

    fn reply<T>(&self, reply: oneshot::Sender<T>, value: T) {
        self.publish();
        let _ = reply.send(value);
    }

    fn publish(&self) {
        let next = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn snapshot(&self) -> SessionSnapshot {
        let explanation = self.progression.explanation();
        let current_question = if self.status == SessionStatus::Active {
            self.progression.current_question().map(Question::view)
        } else {
            None
        };
        SessionSnapshot {
            status: self.status,
            phase: self.phase,
            session_id: self.session_id,
            started_at: self.started_at,
            remaining_seconds: self.clock.remaining_secs(),
            questions_answered: self.progression.questions_answered(),
            correct_answers: self.progression.correct_answers(),
            current_question,
            current_question_index: self.progression.current_index(),
            total_questions: self.progression.total_questions(),
            explanation_visible: explanation.visible,
            explanation_text: explanation.visible.then(|| explanation.text.clone()),
            awaiting_advance: explanation.awaiting_advance,
            last_answer: self.last_answer.clone(),
            tutor_online: self.tutor_online,
            summary: self.summary.clone(),
        }
    }
}

/// Stops the orchestrator when the last handle clone is dropped.
struct HandleGuard(mpsc::Sender<SessionEvent>);

impl Drop for HandleGuard {
    fn drop(&mut self) {
        let _ = self.0.try_send(SessionEvent::Command(Command::Shutdown));
    }
}

/// Cloneable access to a running [`SessionOrchestrator`].
///
/// Every write action is a request: the orchestrator applies it in order with
/// everything else and replies with the outcome. A rejected request leaves
/// the session unchanged.
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::Sender<SessionEvent>,
    snapshots: watch::Receiver<SessionSnapshot>,
    _guard: Arc<HandleGuard>,
}

impl SessionHandle {
    /// Starts a session, or returns the live session's id if one is active.
    pub async fn start(&self) -> Result<Uuid, QuizError> {
        self.request(Command::Start).await?
    }

    pub async fn end(&self) -> Result<SessionSummary, QuizError> {
        self.request(Command::End).await?
    }

    /// Clears all session state. Accepted in any state.
    pub async fn reset(&self) -> Result<(), QuizError> {
        self.request(Command::Reset).await
    }

    pub async fn submit(&self, option_id: impl Into<String>) -> Result<AnswerOutcome, QuizError> {
        let option_id = option_id.into();
        self.request(|reply| Command::Submit { option_id, reply })
            .await?
    }

    pub async fn advance(&self) -> Result<AdvanceResult, QuizError> {
        self.request(Command::Advance).await?
    }

    /// The latest published state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Stops the orchestrator and disconnects the tutor.
    pub async fn shutdown(&self) {
        let _ = self
            .events
            .send(SessionEvent::Command(Command::Shutdown))
            .await;
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, QuizError> {
        let (reply, response) = oneshot::channel();
        self.events
            .send(SessionEvent::Command(command(reply)))
            .await
            .map_err(|_| QuizError::Closed)?;
        response.await.map_err(|_| QuizError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::StaticQuestionBank;
    use crate::question::fixtures::question;
    use crate::tutor::{
        MockSpeechService, RecordingSpeechService, SpeechKind, SpokenLine, StaticExplanationService,
    };
    use anyhow::anyhow;

    const WAIT: Duration = Duration::from_secs(120);

    struct Harness {
        handle: SessionHandle,
        speech: Arc<RecordingSpeechService>,
    }

    fn two_question_bank() -> Arc<dyn QuestionBank> {
        Arc::new(
            StaticQuestionBank::with_seed(
                vec![
                    question("q1", "cardiology", "a"),
                    question("q2", "neurology", "a"),
                ],
                7,
            )
            .unwrap(),
        )
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            questions_per_session: 2,
            ..SessionSettings::default()
        }
    }

    fn harness_with(
        settings: SessionSettings,
        speech: RecordingSpeechService,
        explainer: StaticExplanationService,
    ) -> Harness {
        let speech = Arc::new(speech);
        let tutor = TutorCoordinator::new(speech.clone(), Arc::new(explainer));
        Harness {
            handle: SessionOrchestrator::spawn(settings, two_question_bank(), tutor),
            speech,
        }
    }

    fn harness() -> Harness {
        harness_with(
            settings(),
            RecordingSpeechService::new(),
            StaticExplanationService::new(),
        )
    }

    async fn wait_for(
        handle: &SessionHandle,
        pred: impl FnMut(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        let mut rx = handle.subscribe();
        let snapshot = tokio::time::timeout(WAIT, rx.wait_for(pred))
            .await
            .expect("timed out waiting for snapshot")
            .expect("orchestrator stopped")
            .clone();
        snapshot
    }

    async fn wait_for_phase(handle: &SessionHandle, phase: QuestionPhase) -> SessionSnapshot {
        wait_for(handle, |s| s.phase == Some(phase)).await
    }

    async fn wait_for_line(speech: &RecordingSpeechService, needle: &str) -> Vec<SpokenLine> {
        tokio::time::timeout(WAIT, async {
            loop {
                let lines = speech.lines();
                if lines.iter().any(|line| line.text.contains(needle)) {
                    return lines;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("timed out waiting for speech")
    }

    fn position(lines: &[SpokenLine], needle: &str) -> usize {
        lines
            .iter()
            .position(|line| line.text.contains(needle))
            .expect("line was not spoken")
    }

    fn assert_invariants(s: &SessionSnapshot) {
        assert!(s.questions_answered <= s.total_questions);
        assert!(s.correct_answers <= s.questions_answered);
        if s.status == SessionStatus::Active {
            assert!(s.current_question_index < s.total_questions);
        }
        if s.explanation_visible {
            assert_eq!(s.last_answer.as_ref().map(|a| a.is_correct), Some(false));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_question_session_runs_to_completion() {
        let Harness { handle, speech } = harness();

        handle.start().await.unwrap();
        let s = wait_for_phase(&handle, QuestionPhase::AwaitingAnswer).await;
        assert_eq!(s.total_questions, 2);
        assert!(s.tutor_online);
        assert!(s.current_question.is_some());

        let first = handle.submit("a").await.unwrap();
        assert!(first.is_correct);
        assert_eq!(handle.snapshot().phase, Some(QuestionPhase::AnsweredCorrect));

        let s = wait_for_phase(&handle, QuestionPhase::AwaitingAdvance).await;
        assert!(s.awaiting_advance);
        assert!(!s.explanation_visible);
        assert_invariants(&s);

        let next = handle.advance().await.unwrap();
        assert!(matches!(next, AdvanceResult::Next { index: 1, .. }));

        let second = handle.submit("b").await.unwrap();
        assert!(!second.is_correct);
        assert_eq!(
            handle.snapshot().phase,
            Some(QuestionPhase::AnsweredIncorrectPendingExplanation)
        );

        let s = wait_for_phase(&handle, QuestionPhase::AwaitingAdvance).await;
        assert!(s.explanation_visible);
        assert!(
            s.explanation_text
                .as_deref()
                .is_some_and(|text| text.contains("The correct answer is"))
        );
        assert_eq!(
            s.last_answer.as_ref().and_then(|a| a.correct_option_id.as_deref()),
            Some("a")
        );
        assert_invariants(&s);

        let AdvanceResult::Finished(summary) = handle.advance().await.unwrap() else {
            panic!("expected the session to finish");
        };
        assert_eq!(summary.reason, EndReason::QuestionsExhausted);
        assert_eq!(summary.questions_answered, 2);
        assert_eq!(summary.correct_answers, 1);
        assert_eq!(summary.accuracy, 50);
        assert_eq!(summary.misses.len(), 1);
        assert_eq!(summary.misses[0].question, second.question.prompt);
        assert_eq!(summary.closing_message.as_deref(), Some(CLOSING_ENCOURAGEMENT));

        let s = handle.snapshot();
        assert_eq!(s.status, SessionStatus::Ended);
        assert_eq!(s.phase, None);
        assert!(!s.explanation_visible);
        assert_invariants(&s);

        let lines = wait_for_line(&speech, "Excellent session!").await;
        assert_eq!(lines[0].kind, SpeechKind::Question);
        assert!(
            position(&lines, "Not quite right. That's not quite right")
                < position(&lines, "Let me explain:")
        );
        assert!(position(&lines, "Let me explain:") < position(&lines, "Excellent session!"));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!speech.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_expiry_ends_session_without_input() {
        let Harness { handle, speech } = harness_with(
            SessionSettings {
                duration: Duration::from_secs(5),
                ..settings()
            },
            RecordingSpeechService::new(),
            StaticExplanationService::new(),
        );

        let first_id = handle.start().await.unwrap();
        wait_for_phase(&handle, QuestionPhase::AwaitingAnswer).await;

        let s = wait_for(&handle, |s| s.status == SessionStatus::Ended).await;
        assert_eq!(s.remaining_seconds, 0);
        let summary = s.summary.expect("summary after expiry");
        assert_eq!(summary.reason, EndReason::TimeExpired);
        assert_eq!(summary.questions_answered, 0);
        assert_eq!(summary.accuracy, 0);
        wait_for_line(&speech, "Excellent session!").await;

        assert_eq!(handle.submit("a").await.unwrap_err(), QuizError::NotActive);

        let second_id = handle.start().await.unwrap();
        assert_ne!(first_id, second_id);
        let s = handle.snapshot();
        assert_eq!(s.status, SessionStatus::Active);
        assert_eq!(s.remaining_seconds, 5);
        assert!(s.summary.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_explanation_after_reset_is_discarded() {
        let Harness { handle, speech } = harness_with(
            settings(),
            RecordingSpeechService::new(),
            StaticExplanationService::new().with_latency(Duration::from_secs(5)),
        );

        let first_id = handle.start().await.unwrap();
        wait_for_phase(&handle, QuestionPhase::AwaitingAnswer).await;
        handle.submit("b").await.unwrap();

        handle.reset().await.unwrap();
        let s = handle.snapshot();
        assert_eq!(s.status, SessionStatus::Idle);
        assert_eq!(s.session_id, None);
        assert_eq!(s.total_questions, 0);
        assert_eq!(s.questions_answered, 0);

        let second_id = handle.start().await.unwrap();
        assert_ne!(first_id, second_id);
        wait_for_phase(&handle, QuestionPhase::AwaitingAnswer).await;

        tokio::time::sleep(Duration::from_secs(10)).await;

        let s = handle.snapshot();
        assert_eq!(s.session_id, Some(second_id));
        assert_eq!(s.phase, Some(QuestionPhase::AwaitingAnswer));
        assert!(!s.explanation_visible);
        assert_eq!(s.explanation_text, None);
        assert_eq!(s.questions_answered, 0);
        assert!(
            !speech
                .lines()
                .iter()
                .any(|line| line.kind == SpeechKind::Explanation)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_submit_for_same_question_is_rejected() {
        let Harness { handle, .. } = harness();
        handle.start().await.unwrap();
        wait_for_phase(&handle, QuestionPhase::AwaitingAnswer).await;

        handle.submit("a").await.unwrap();
        let before = handle.snapshot();

        assert_eq!(handle.submit("a").await.unwrap_err(), QuizError::AlreadyAnswered(0));
        assert_eq!(handle.submit("c").await.unwrap_err(), QuizError::AlreadyAnswered(0));
        assert_eq!(handle.snapshot(), before);

        wait_for_phase(&handle, QuestionPhase::AwaitingAdvance).await;
        assert_eq!(handle.submit("b").await.unwrap_err(), QuizError::AlreadyAnswered(0));
        assert_eq!(handle.snapshot().questions_answered, 1);
        assert_eq!(handle.snapshot().correct_answers, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_option_is_rejected_without_state_change() {
        let Harness { handle, .. } = harness();
        handle.start().await.unwrap();
        wait_for_phase(&handle, QuestionPhase::AwaitingAnswer).await;

        assert_eq!(
            handle.submit("z").await.unwrap_err(),
            QuizError::InvalidOption("z".to_string())
        );

        let s = handle.snapshot();
        assert_eq!(s.phase, Some(QuestionPhase::AwaitingAnswer));
        assert_eq!(s.questions_answered, 0);
        assert_eq!(s.last_answer, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_active_is_idempotent() {
        let Harness { handle, .. } = harness();

        let first = handle.start().await.unwrap();
        let second = handle.start().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(handle.snapshot().session_id, Some(first));
        assert_eq!(handle.snapshot().total_questions, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_are_gated_by_phase() {
        let Harness { handle, .. } = harness_with(
            settings(),
            RecordingSpeechService::new().with_connect_latency(Duration::from_secs(3)),
            StaticExplanationService::new(),
        );

        assert_eq!(handle.end().await.unwrap_err(), QuizError::NotActive);
        assert_eq!(handle.advance().await.unwrap_err(), QuizError::NotActive);

        handle.start().await.unwrap();
        assert!(matches!(
            handle.submit("a").await.unwrap_err(),
            QuizError::InvalidTransition {
                phase: QuestionPhase::AwaitingTutor,
                ..
            }
        ));

        wait_for_phase(&handle, QuestionPhase::AwaitingAnswer).await;
        assert!(matches!(
            handle.advance().await.unwrap_err(),
            QuizError::InvalidTransition {
                phase: QuestionPhase::AwaitingAnswer,
                ..
            }
        ));
        assert!(handle.submit("a").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_waits_for_pending_explanation_before_closing() {
        let Harness { handle, speech } = harness_with(
            settings(),
            RecordingSpeechService::new(),
            StaticExplanationService::new().with_latency(Duration::from_secs(3)),
        );
        handle.start().await.unwrap();
        wait_for_phase(&handle, QuestionPhase::AwaitingAnswer).await;
        handle.submit("b").await.unwrap();

        let summary = handle.end().await.unwrap();
        assert_eq!(summary.reason, EndReason::Requested);
        assert_eq!(summary.closing_message, None);
        assert_eq!(handle.snapshot().status, SessionStatus::Ended);

        let lines = wait_for_line(&speech, "Excellent session!").await;
        assert!(position(&lines, "Let me explain:") < position(&lines, "Excellent session!"));

        let s = wait_for(&handle, |s| {
            s.summary
                .as_ref()
                .is_some_and(|summary| summary.closing_message.is_some())
        })
        .await;
        assert_eq!(s.status, SessionStatus::Ended);
        assert!(!s.explanation_visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_progresses_with_tutor_offline() {
        let mut speech = MockSpeechService::new();
        speech
            .expect_connect()
            .returning(|| Err(anyhow!("avatar proxy unreachable")));
        speech
            .expect_speak()
            .returning(|_, _| Err(anyhow!("not connected")));
        speech.expect_disconnect().never();
        let tutor = TutorCoordinator::new(
            Arc::new(speech),
            Arc::new(StaticExplanationService::new()),
        );
        let handle = SessionOrchestrator::spawn(settings(), two_question_bank(), tutor);

        handle.start().await.unwrap();
        let s = wait_for_phase(&handle, QuestionPhase::AwaitingAnswer).await;
        assert!(!s.tutor_online);

        handle.submit("a").await.unwrap();
        wait_for_phase(&handle, QuestionPhase::AwaitingAdvance).await;
        assert!(matches!(
            handle.advance().await.unwrap(),
            AdvanceResult::Next { .. }
        ));

        handle.submit("b").await.unwrap();
        let s = wait_for_phase(&handle, QuestionPhase::AwaitingAdvance).await;
        assert!(s.explanation_visible);
        assert!(!s.tutor_online);

        let result = handle.advance().await.unwrap();
        assert!(matches!(result, AdvanceResult::Finished(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_misses_get_adaptive_closing_feedback() {
        let Harness { handle, speech } = harness();
        handle.start().await.unwrap();
        wait_for_phase(&handle, QuestionPhase::AwaitingAnswer).await;

        handle.submit("b").await.unwrap();
        wait_for_phase(&handle, QuestionPhase::AwaitingAdvance).await;
        handle.advance().await.unwrap();
        handle.submit("c").await.unwrap();
        wait_for_phase(&handle, QuestionPhase::AwaitingAdvance).await;

        let AdvanceResult::Finished(summary) = handle.advance().await.unwrap() else {
            panic!("expected the session to finish");
        };
        assert_eq!(summary.misses.len(), 2);
        assert_eq!(summary.accuracy, 0);

        let lines = wait_for_line(&speech, "Session complete!").await;
        let closing = &lines[position(&lines, "Session complete!")];
        assert_eq!(closing.kind, SpeechKind::Feedback);
        assert!(closing.text.contains("cardiology, neurology"));
        assert!(!lines.iter().any(|line| line.text.contains("Excellent session!")));

        let s = wait_for(&handle, |s| {
            s.summary
                .as_ref()
                .is_some_and(|summary| summary.closing_message.is_some())
        })
        .await;
        let closing_message = s.summary.and_then(|summary| summary.closing_message);
        assert!(closing_message.is_some_and(|text| text.starts_with("Session complete!")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_without_questions_fails() {
        let Harness { handle, .. } = harness_with(
            SessionSettings {
                questions_per_session: 0,
                ..settings()
            },
            RecordingSpeechService::new(),
            StaticExplanationService::new(),
        );

        assert_eq!(handle.start().await.unwrap_err(), QuizError::EmptyQuestionBank);
        assert_eq!(handle.snapshot().status, SessionStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_handle() {
        let Harness { handle, .. } = harness();
        handle.shutdown().await;

        assert_eq!(handle.start().await.unwrap_err(), QuizError::Closed);
    }
}
