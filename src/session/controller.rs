// src/session/controller.rs

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::{sync::watch, time::Instant};

use crate::{
    config::Config,
    models::{
        answer::AnswerValue,
        form::FormDefinition,
        identity::ResponderIdentity,
        submission::{SubmissionResult, SubmitRequest, SubmittedAnswer, display_time},
    },
    scoring,
    session::{
        client::{SubmitAck, SubmitClient, SubmitError},
        error::SessionError,
        identity::IdentityGate,
        proctor::{MonitorGuard, ProctorSurface, ProctoringMonitor, Violation, ViolationSink},
        timer::CountdownTimer,
    },
};

/// Where an attempt is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    AwaitingIdentity,
    ReadyToStart,
    Active,
    /// The countdown hit zero; submission follows automatically.
    Expired,
    Submitting,
    Completed,
    /// Submission failed twice. Answers are kept and `retry` is allowed.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    Manual,
    TimerExpired,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Completed(SubmissionResult),
    /// Another trigger already owns the submission.
    AlreadySubmitting,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fixed wait before the single automatic resubmission.
    pub retry_delay: Duration,
    /// Request timeout for HTTP submit clients built from this config.
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(1500),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry_delay: Duration::from_millis(config.submit_retry_delay_ms),
            request_timeout: Duration::from_secs(config.submit_timeout_secs),
        }
    }
}

/// Live state of one attempt. Created on start, replaced by the
/// `SubmissionResult` once submission completes.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub started_at: DateTime<Utc>,
    started: Instant,
    pub answers: BTreeMap<String, AnswerValue>,
    pub violations: Vec<Violation>,
    pub expired: bool,
    pub submitting: bool,
}

impl SessionState {
    fn begin() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            answers: BTreeMap::new(),
            violations: Vec::new(),
            expired: false,
            submitting: false,
        }
    }
}

/// Payload frozen at the first submission attempt and reused by retries.
#[derive(Debug, Clone)]
struct Pending {
    request: SubmitRequest,
    answers: BTreeMap<String, AnswerValue>,
    expired: bool,
    ended_at: DateTime<Utc>,
}

struct Inner {
    phase: SessionPhase,
    identity: ResponderIdentity,
    session: Option<SessionState>,
    pending: Option<Pending>,
    result: Option<SubmissionResult>,
    last_error: Option<String>,
    timer: Option<CountdownTimer>,
    monitor: Option<MonitorGuard>,
}

struct Shared {
    form: Arc<FormDefinition>,
    client: Arc<dyn SubmitClient>,
    surface: Option<Arc<dyn ProctorSurface>>,
    config: SessionConfig,
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drives one attempt from identity capture to scored results.
///
/// The only component allowed to submit. Manual submission and countdown
/// expiry share one path guarded by `SessionState::submitting`, so at most
/// one submit call is in flight per attempt. Must be started inside a Tokio
/// runtime.
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn new(
        form: Arc<FormDefinition>,
        client: Arc<dyn SubmitClient>,
        surface: Option<Arc<dyn ProctorSurface>>,
        config: SessionConfig,
    ) -> Self {
        let phase = if form.settings.identity.any() {
            SessionPhase::AwaitingIdentity
        } else {
            SessionPhase::ReadyToStart
        };

        Self {
            shared: Arc::new(Shared {
                form,
                client,
                surface,
                config,
                inner: Mutex::new(Inner {
                    phase,
                    identity: ResponderIdentity::anonymous(),
                    session: None,
                    pending: None,
                    result: None,
                    last_error: None,
                    timer: None,
                    monitor: None,
                }),
            }),
        }
    }

    pub fn form(&self) -> &FormDefinition {
        &self.shared.form
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.lock().phase
    }

    pub fn identity(&self) -> ResponderIdentity {
        self.shared.lock().identity.clone()
    }

    /// Validates and records the responder's identity.
    pub fn provide_identity(&self, identity: &ResponderIdentity) -> Result<(), SessionError> {
        let gate = IdentityGate::new(self.shared.form.settings.identity);
        let mut inner = self.shared.lock();
        if !matches!(inner.phase, SessionPhase::AwaitingIdentity | SessionPhase::ReadyToStart) {
            return Err(SessionError::InvalidTransition {
                phase: inner.phase,
                action: "change identity",
            });
        }
        inner.identity = gate.verify(identity)?;
        inner.phase = SessionPhase::ReadyToStart;
        Ok(())
    }

    /// Starts the attempt: records `started_at`, starts the locked countdown
    /// for timed forms, attaches proctoring for quizzes and asks for fullscreen.
    pub fn start(&self) -> Result<(), SessionError> {
        let form = Arc::clone(&self.shared.form);
        if !form.settings.is_open_at(Utc::now()) {
            return Err(SessionError::Unavailable);
        }

        {
            let mut inner = self.shared.lock();
            if inner.phase != SessionPhase::ReadyToStart {
                return Err(SessionError::InvalidTransition {
                    phase: inner.phase,
                    action: "start",
                });
            }
            inner.session = Some(SessionState::begin());
            inner.phase = SessionPhase::Active;
        }

        let timer = match form.settings.timer_minutes {
            Some(minutes) => {
                let weak = Arc::downgrade(&self.shared);
                let mut timer = CountdownTimer::new(minutes, Box::new(move || on_time_up(&weak)));
                timer.lock();
                timer.start()?;
                Some(timer)
            }
            None => None,
        };

        let monitor = match &self.shared.surface {
            Some(surface) if form.is_quiz() => Some(ProctoringMonitor::attach(
                Arc::clone(surface),
                form.settings.prevent_copy_paste,
                violation_sink(Arc::downgrade(&self.shared)),
            )),
            Some(surface) => {
                if let Err(e) = surface.request_fullscreen() {
                    tracing::debug!("Continuing without fullscreen: {}", e);
                }
                None
            }
            None => None,
        };

        let mut inner = self.shared.lock();
        if inner.phase == SessionPhase::Active {
            inner.timer = timer;
            inner.monitor = monitor;
        }
        tracing::info!(form_id = %form.id, timed = form.settings.timer_minutes.is_some(), "Session started");
        Ok(())
    }

    /// Records an answer. Only allowed while the session is active.
    pub fn answer(&self, field_id: &str, value: AnswerValue) -> Result<(), SessionError> {
        let field = self
            .shared
            .form
            .field(field_id)
            .ok_or_else(|| SessionError::UnknownField(field_id.to_string()))?;

        if !field.field_type.accepts(&value) {
            return Err(SessionError::AnswerShape {
                field_id: field_id.to_string(),
                source: crate::models::answer::AnswerShapeError {
                    expected: field.field_type,
                    detail: "value has the wrong shape".to_string(),
                },
            });
        }

        let labels: Vec<&String> = match &value {
            AnswerValue::Choice(label) => vec![label],
            AnswerValue::Choices(labels) => labels.iter().collect(),
            _ => Vec::new(),
        };
        if let Some(unknown) = labels.into_iter().find(|l| !field.options.contains(l)) {
            return Err(SessionError::UnknownOption {
                field_id: field_id.to_string(),
                option: unknown.clone(),
            });
        }

        let mut inner = self.shared.lock();
        match (inner.phase, inner.session.as_mut()) {
            (SessionPhase::Active, Some(session)) => {
                session.answers.insert(field_id.to_string(), value);
                Ok(())
            }
            (phase, _) => Err(SessionError::InvalidTransition {
                phase,
                action: "answer",
            }),
        }
    }

    /// Records an answer given in its untagged wire form.
    pub fn answer_wire(&self, field_id: &str, value: &Value) -> Result<(), SessionError> {
        let field = self
            .shared
            .form
            .field(field_id)
            .ok_or_else(|| SessionError::UnknownField(field_id.to_string()))?;
        let decoded = AnswerValue::from_wire(field.field_type, value).map_err(|source| {
            SessionError::AnswerShape {
                field_id: field_id.to_string(),
                source,
            }
        })?;
        self.answer(field_id, decoded)
    }

    pub fn answers(&self) -> BTreeMap<String, AnswerValue> {
        let inner = self.shared.lock();
        match (&inner.session, &inner.pending) {
            (Some(session), _) => session.answers.clone(),
            (None, Some(pending)) => pending.answers.clone(),
            (None, None) => inner
                .result
                .as_ref()
                .map(|r| r.answers.clone())
                .unwrap_or_default(),
        }
    }

    pub fn violations(&self) -> Vec<Violation> {
        let inner = self.shared.lock();
        match (&inner.session, &inner.result) {
            (Some(session), _) => session.violations.clone(),
            (None, Some(result)) => result.violations.clone(),
            (None, None) => Vec::new(),
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        let inner = self.shared.lock();
        inner
            .session
            .as_ref()
            .map(|s| s.started_at)
            .or(inner.result.as_ref().map(|r| r.started_at))
    }

    /// Remaining seconds for timed sessions that are running or expired.
    pub fn remaining_seconds(&self) -> Option<u64> {
        self.shared.lock().timer.as_ref().map(CountdownTimer::remaining_seconds)
    }

    /// Per-tick countdown updates, informational only.
    pub fn countdown(&self) -> Option<watch::Receiver<u64>> {
        self.shared.lock().timer.as_ref().map(CountdownTimer::subscribe)
    }

    /// Monitored sessions own the clock; pausing is refused.
    pub fn pause_timer(&self) -> Result<(), SessionError> {
        let inner = self.shared.lock();
        match &inner.timer {
            Some(timer) => Ok(timer.pause()?),
            None => Err(SessionError::InvalidTransition {
                phase: inner.phase,
                action: "pause the timer",
            }),
        }
    }

    pub fn result(&self) -> Option<SubmissionResult> {
        self.shared.lock().result.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    /// Manual submission. Required fields must be answered.
    pub async fn submit(&self) -> Result<SubmitOutcome, SessionError> {
        submit_attempt(&self.shared, SubmitTrigger::Manual).await
    }

    /// Resubmits the frozen payload after a failed submission.
    pub async fn retry(&self) -> Result<SubmitOutcome, SessionError> {
        let phase = self.phase();
        if phase != SessionPhase::Error {
            return Err(SessionError::InvalidTransition {
                phase,
                action: "retry",
            });
        }
        submit_attempt(&self.shared, SubmitTrigger::Manual).await
    }

    /// Tears the session view down: stops ticking and detaches listeners.
    /// A submission already in flight runs to completion.
    pub fn end(&self) {
        let (timer, monitor) = {
            let mut inner = self.shared.lock();
            (inner.timer.take(), inner.monitor.take())
        };
        drop(timer);
        drop(monitor);
        tracing::debug!("Session view torn down");
    }
}

fn violation_sink(shared: Weak<Shared>) -> ViolationSink {
    Arc::new(move |violation: Violation| {
        let Some(shared) = shared.upgrade() else { return };
        tracing::warn!(kind = ?violation.kind, "Proctoring violation: {}", violation.detail);
        let mut inner = shared.lock();
        if let Some(session) = inner.session.as_mut() {
            session.violations.push(violation);
        }
    })
}

fn on_time_up(shared: &Weak<Shared>) {
    let Some(shared) = shared.upgrade() else { return };
    {
        let mut inner = shared.lock();
        if let Some(session) = inner.session.as_mut() {
            session.expired = true;
        }
        if inner.phase != SessionPhase::Active {
            return;
        }
        inner.phase = SessionPhase::Expired;
    }

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(e) = submit_attempt(&shared, SubmitTrigger::TimerExpired).await {
                    tracing::error!("Submission after time-up failed: {}", e);
                }
            });
        }
        Err(e) => tracing::error!("No runtime to submit expired session: {}", e),
    }
}

async fn submit_attempt(shared: &Arc<Shared>, trigger: SubmitTrigger) -> Result<SubmitOutcome, SessionError> {
    let pending = match begin_submission(shared, trigger)? {
        Some(pending) => pending,
        None => return Ok(SubmitOutcome::AlreadySubmitting),
    };

    let client = Arc::clone(&shared.client);
    let outcome = match client.submit(&pending.request).await {
        Ok(ack) => Ok(ack),
        Err(e) => {
            tracing::warn!(
                "Submission failed, retrying once in {:?}: {}",
                shared.config.retry_delay,
                e
            );
            tokio::time::sleep(shared.config.retry_delay).await;
            client.submit(&pending.request).await
        }
    };

    finish_submission(shared, pending, outcome)
}

/// Check-then-set of the `submitting` guard, done in one critical section.
fn begin_submission(shared: &Shared, trigger: SubmitTrigger) -> Result<Option<Pending>, SessionError> {
    let mut guard = shared.lock();
    let inner = &mut *guard;
    let phase = inner.phase;

    let Some(session) = inner.session.as_mut() else {
        return Err(SessionError::InvalidTransition {
            phase,
            action: "submit",
        });
    };

    if session.submitting {
        return Ok(None);
    }

    let pending = match phase {
        SessionPhase::Active | SessionPhase::Expired => {
            let expired = session.expired || trigger == SubmitTrigger::TimerExpired;
            if !expired {
                let missing = missing_required(&shared.form, &session.answers);
                if !missing.is_empty() {
                    return Err(SessionError::MissingRequired(missing));
                }
            }
            build_pending(&shared.form, &inner.identity, session, expired)
        }
        SessionPhase::Error => match inner.pending.clone() {
            Some(pending) => pending,
            None => {
                return Err(SessionError::InvalidTransition {
                    phase,
                    action: "retry",
                });
            }
        },
        _ => {
            return Err(SessionError::InvalidTransition {
                phase,
                action: "submit",
            });
        }
    };

    session.submitting = true;
    inner.pending = Some(pending.clone());
    inner.phase = SessionPhase::Submitting;
    inner.last_error = None;
    Ok(Some(pending))
}

fn missing_required(form: &FormDefinition, answers: &BTreeMap<String, AnswerValue>) -> Vec<String> {
    form.fields
        .iter()
        .filter(|f| f.required)
        .filter(|f| answers.get(&f.id).is_none_or(AnswerValue::is_empty))
        .map(|f| f.id.clone())
        .collect()
}

/// Freezes the payload. Timer-triggered attempts report exactly the allowed
/// budget so server-side duration checks never see scheduling drift.
fn build_pending(
    form: &FormDefinition,
    identity: &ResponderIdentity,
    session: &SessionState,
    expired: bool,
) -> Pending {
    let measured = i64::try_from(session.started.elapsed().as_millis()).unwrap_or(i64::MAX);
    let duration_ms = match form.settings.budget_ms() {
        Some(budget) if expired => budget,
        _ => measured,
    };

    let answers = form
        .fields
        .iter()
        .filter_map(|field| {
            session.answers.get(&field.id).map(|value| SubmittedAnswer {
                field_id: field.id.clone(),
                question_code: field.question_code.clone(),
                value: value.to_wire(),
            })
        })
        .collect();

    Pending {
        request: SubmitRequest {
            form_id: form.id,
            responder: identity.clone(),
            started_at: session.started_at,
            duration_ms,
            answers,
        },
        answers: session.answers.clone(),
        expired,
        ended_at: Utc::now(),
    }
}

fn finish_submission(
    shared: &Shared,
    pending: Pending,
    outcome: Result<SubmitAck, SubmitError>,
) -> Result<SubmitOutcome, SessionError> {
    let mut guard = shared.lock();
    let inner = &mut *guard;
    if let Some(session) = inner.session.as_mut() {
        session.submitting = false;
    }

    let ack = match outcome {
        Ok(ack) => ack,
        Err(e) => {
            tracing::error!("Submission failed after retry: {}", e);
            inner.phase = SessionPhase::Error;
            inner.last_error = Some(e.to_string());
            return Err(SessionError::Submission(e));
        }
    };

    let report = scoring::score(&shared.form, &pending.answers);
    let (score, max_score) = match ack.summary {
        Some(summary) => {
            if summary.score != report.score || summary.max_score != report.max_score {
                tracing::warn!(
                    "Server score {}/{} differs from local score {}/{}",
                    summary.score,
                    summary.max_score,
                    report.score,
                    report.max_score
                );
            }
            (summary.score, summary.max_score)
        }
        None => (report.score, report.max_score),
    };

    let violations = inner
        .session
        .take()
        .map(|s| s.violations)
        .unwrap_or_default();
    let started_at = pending.request.started_at;

    let result = SubmissionResult {
        score,
        max_score,
        duration_ms: pending.request.duration_ms,
        answers: pending.answers,
        fields: report.fields,
        violations,
        expired: pending.expired,
        started_at,
        ended_at: pending.ended_at,
        start_time: display_time(started_at),
        end_time: display_time(pending.ended_at),
    };

    inner.phase = SessionPhase::Completed;
    inner.pending = None;
    inner.result = Some(result.clone());
    let timer = inner.timer.take();
    let monitor = inner.monitor.take();
    drop(guard);
    drop(timer);
    drop(monitor);

    tracing::info!(score, max_score, "Submission completed");
    Ok(SubmitOutcome::Completed(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            form::{Field, FieldType, FormKind, FormSettings, IdentityRequirements, QuizMeta},
            submission::ScoreSummary,
        },
        session::{
            proctor::{SimulatedSurface, SurfaceEvent, ViolationKind},
            timer::TimerError,
        },
    };
    use async_trait::async_trait;
    use std::{collections::VecDeque, sync::atomic::{AtomicUsize, Ordering}};

    /// Replays scripted replies and records every request.
    #[derive(Default)]
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<SubmitAck, SubmitError>>>,
        requests: Mutex<Vec<SubmitRequest>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedClient {
        fn with(replies: Vec<Result<SubmitAck, SubmitError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                ..Default::default()
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_request(&self) -> SubmitRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl SubmitClient for ScriptedClient {
        async fn submit(&self, request: &SubmitRequest) -> Result<SubmitAck, SubmitError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if self.delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.delay).await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(SubmitAck::default()))
        }
    }

    fn quiz(timer_minutes: Option<u32>) -> Arc<FormDefinition> {
        Arc::new(FormDefinition {
            id: uuid::Uuid::new_v4(),
            title: "Quiz".into(),
            kind: FormKind::Quiz,
            fields: vec![Field {
                id: "q1".into(),
                label: "Pick".into(),
                field_type: FieldType::SingleChoice,
                required: true,
                options: vec!["A".into(), "B".into()],
                question_code: Some("Q1".into()),
                quiz: Some(QuizMeta {
                    points: 10,
                    correct_options: [1].into_iter().collect(),
                    explanation: "B is right".into(),
                }),
            }],
            settings: FormSettings {
                timer_minutes,
                ..Default::default()
            },
        })
    }

    fn controller(form: Arc<FormDefinition>, client: Arc<ScriptedClient>) -> SessionController {
        SessionController::new(form, client, None, SessionConfig::default())
    }

    fn rejected() -> Result<SubmitAck, SubmitError> {
        Err(SubmitError::Rejected("try again".into()))
    }

    #[tokio::test]
    async fn test_single_choice_end_to_end() {
        let client = ScriptedClient::with(vec![]);
        let session = controller(quiz(None), client.clone());
        assert_eq!(session.phase(), SessionPhase::ReadyToStart);

        session.start().unwrap();
        session.answer("q1", AnswerValue::Choice("B".into())).unwrap();
        let SubmitOutcome::Completed(result) = session.submit().await.unwrap() else {
            panic!("expected completion");
        };

        assert_eq!((result.score, result.max_score), (10, 10));
        assert_eq!(session.phase(), SessionPhase::Completed);
        let request = client.last_request();
        assert_eq!(request.answers[0].question_code.as_deref(), Some("Q1"));
        assert_eq!(request.answers[0].value, serde_json::json!("B"));
    }

    #[tokio::test]
    async fn test_double_submit_makes_one_call() {
        let client = ScriptedClient::with(vec![]);
        let session = controller(quiz(None), client.clone());
        session.start().unwrap();
        session.answer("q1", AnswerValue::Choice("A".into())).unwrap();

        let (first, second) = tokio::join!(session.submit(), session.submit());
        let outcomes = [first.unwrap(), second.unwrap()];
        assert!(outcomes.contains(&SubmitOutcome::AlreadySubmitting));
        assert!(outcomes.iter().any(|o| matches!(o, SubmitOutcome::Completed(_))));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_then_retried_submission_completes() {
        let client = ScriptedClient::with(vec![
            rejected(),
            Ok(SubmitAck {
                summary: Some(ScoreSummary {
                    score: 10,
                    max_score: 10,
                }),
            }),
        ]);
        let session = controller(quiz(None), client.clone());
        session.start().unwrap();
        session.answer("q1", AnswerValue::Choice("B".into())).unwrap();

        let outcome = session.submit().await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Completed(ref r) if r.score == 10));
        assert_eq!(client.calls(), 2);
        assert_eq!(session.phase(), SessionPhase::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_keep_answers_for_manual_retry() {
        let client = ScriptedClient::with(vec![rejected(), rejected()]);
        let session = controller(quiz(None), client.clone());
        session.start().unwrap();
        session.answer("q1", AnswerValue::Choice("A".into())).unwrap();

        let err = session.submit().await.unwrap_err();
        assert!(matches!(err, SessionError::Submission(_)));
        assert_eq!(session.phase(), SessionPhase::Error);
        assert!(session.last_error().is_some());
        assert_eq!(session.answers().len(), 1);

        // The user retries; the queue is empty now so the server accepts.
        let outcome = session.retry().await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Completed(ref r) if r.score == 0));
        assert_eq!(client.calls(), 3);
        assert!(session.answer("q1", AnswerValue::Choice("B".into())).is_err());
    }

    #[tokio::test]
    async fn test_manual_submit_requires_required_fields() {
        let client = ScriptedClient::with(vec![]);
        let session = controller(quiz(None), client.clone());
        session.start().unwrap();
        let err = session.submit().await.unwrap_err();
        assert!(matches!(err, SessionError::MissingRequired(ref ids) if ids == &vec!["q1".to_string()]));
        assert_eq!(session.phase(), SessionPhase::Active);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_submits_with_exact_budget() {
        let client = ScriptedClient::with(vec![]);
        let session = controller(quiz(Some(1)), client.clone());
        session.start().unwrap();
        assert!(matches!(session.pause_timer(), Err(SessionError::Timer(TimerError::Locked))));

        tokio::time::sleep(Duration::from_secs(61)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(session.phase(), SessionPhase::Completed);
        assert_eq!(client.calls(), 1);
        assert_eq!(client.last_request().duration_ms, 60_000);
        let result = session.result().unwrap();
        assert!(result.expired);
        assert_eq!(result.score, 0);

        // A late manual click is refused and does not reach the network.
        assert!(session.submit().await.is_err());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_submit_in_flight_when_time_runs_out() {
        let client = ScriptedClient::slow(Duration::from_secs(2));
        let session = controller(quiz(Some(1)), client.clone());
        session.start().unwrap();
        session.answer("q1", AnswerValue::Choice("B".into())).unwrap();

        tokio::time::sleep(Duration::from_millis(59_900)).await;
        let clicked = tokio::spawn({
            let session = session.clone();
            async move { session.submit().await }
        });

        // The countdown crosses zero while the request is outstanding.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(session.phase(), SessionPhase::Submitting);

        let outcome = clicked.await.unwrap().unwrap();
        assert!(matches!(outcome, SubmitOutcome::Completed(_)));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(client.calls(), 1);
        assert_eq!(session.phase(), SessionPhase::Completed);
        assert!(client.last_request().duration_ms < 60_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_after_expiry_joins_timer_submission() {
        let client = ScriptedClient::slow(Duration::from_secs(2));
        let session = controller(quiz(Some(1)), client.clone());
        session.start().unwrap();

        tokio::time::sleep(Duration::from_millis(60_500)).await;
        assert_eq!(session.phase(), SessionPhase::Submitting);
        assert_eq!(session.submit().await.unwrap(), SubmitOutcome::AlreadySubmitting);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(client.calls(), 1);
        assert_eq!(session.phase(), SessionPhase::Completed);
        assert_eq!(client.last_request().duration_ms, 60_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_duration_is_measured() {
        let client = ScriptedClient::with(vec![]);
        let session = controller(quiz(Some(5)), client.clone());
        session.start().unwrap();
        session.answer("q1", AnswerValue::Choice("B".into())).unwrap();
        tokio::time::sleep(Duration::from_millis(12_345)).await;
        session.submit().await.unwrap();
        let measured = client.last_request().duration_ms;
        assert!((12_345..12_400).contains(&measured), "measured {measured}");
    }

    #[tokio::test]
    async fn test_identity_gate_blocks_start() {
        let mut form = (*quiz(None)).clone();
        form.settings.identity = IdentityRequirements {
            email: true,
            ..Default::default()
        };
        let session = controller(Arc::new(form), ScriptedClient::with(vec![]));
        assert_eq!(session.phase(), SessionPhase::AwaitingIdentity);
        assert!(session.start().is_err());

        let bad = ResponderIdentity {
            email: Some("nope".into()),
            ..Default::default()
        };
        assert!(matches!(session.provide_identity(&bad), Err(SessionError::Validation(_))));
        assert_eq!(session.phase(), SessionPhase::AwaitingIdentity);

        let good = ResponderIdentity {
            email: Some("student@example.com".into()),
            ..Default::default()
        };
        session.provide_identity(&good).unwrap();
        session.start().unwrap();
        assert_eq!(session.phase(), SessionPhase::Active);
        assert!(session.provide_identity(&good).is_err());
    }

    #[tokio::test]
    async fn test_rejects_unknown_fields_and_options() {
        let session = controller(quiz(None), ScriptedClient::with(vec![]));
        assert!(matches!(
            session.answer("q1", AnswerValue::Choice("B".into())),
            Err(SessionError::InvalidTransition { .. })
        ));
        session.start().unwrap();
        assert!(matches!(
            session.answer("zz", AnswerValue::Choice("B".into())),
            Err(SessionError::UnknownField(_))
        ));
        assert!(matches!(
            session.answer("q1", AnswerValue::Choice("C".into())),
            Err(SessionError::UnknownOption { .. })
        ));
        assert!(matches!(
            session.answer_wire("q1", &serde_json::json!(["A"])),
            Err(SessionError::AnswerShape { .. })
        ));
        session.answer_wire("q1", &serde_json::json!("A")).unwrap();
    }

    #[tokio::test]
    async fn test_non_finite_numbers_never_enter_the_payload() {
        let mut form = (*quiz(None)).clone();
        form.fields.push(Field {
            id: "n".into(),
            label: "How many?".into(),
            field_type: FieldType::Number,
            required: false,
            options: Vec::new(),
            question_code: None,
            quiz: None,
        });
        let client = ScriptedClient::with(vec![]);
        let session = controller(Arc::new(form), client.clone());
        session.start().unwrap();

        assert!(matches!(
            session.answer("n", AnswerValue::Number(f64::INFINITY)),
            Err(SessionError::AnswerShape { .. })
        ));
        for raw in ["inf", "NaN", "1e400"] {
            assert!(matches!(
                session.answer_wire("n", &serde_json::json!(raw)),
                Err(SessionError::AnswerShape { .. })
            ));
        }
        session.answer_wire("n", &serde_json::json!("12")).unwrap();
        session.answer("q1", AnswerValue::Choice("B".into())).unwrap();

        session.submit().await.unwrap();
        let request = client.last_request();
        let sent = request.answers.iter().find(|a| a.field_id == "n").unwrap();
        assert_eq!(sent.value, serde_json::json!(12.0));
    }

    #[tokio::test]
    async fn test_quiz_session_records_violations_and_detaches() {
        let surface = Arc::new(SimulatedSurface::new());
        let mut form = (*quiz(None)).clone();
        form.settings.prevent_copy_paste = true;
        let session = SessionController::new(
            Arc::new(form),
            ScriptedClient::with(vec![]),
            Some(surface.clone() as Arc<dyn ProctorSurface>),
            SessionConfig::default(),
        );
        session.start().unwrap();
        assert!(surface.fullscreen_state().is_fullscreen());

        surface.dispatch(SurfaceEvent::Blur);
        surface.dispatch(SurfaceEvent::Copy);
        surface.exit_fullscreen();
        let kinds: Vec<_> = session.violations().iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![ViolationKind::FocusLost, ViolationKind::Copy, ViolationKind::FullscreenExit]
        );

        session.answer("q1", AnswerValue::Choice("B".into())).unwrap();
        let SubmitOutcome::Completed(result) = session.submit().await.unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(result.violations.len(), 3);
        assert_eq!(surface.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_cancels_timer_and_listeners() {
        let surface = Arc::new(SimulatedSurface::new());
        let client = ScriptedClient::with(vec![]);
        let session = SessionController::new(
            quiz(Some(1)),
            client.clone(),
            Some(surface.clone() as Arc<dyn ProctorSurface>),
            SessionConfig::default(),
        );
        session.start().unwrap();
        assert!(surface.listener_count() > 0);

        session.end();
        assert_eq!(surface.listener_count(), 0);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(client.calls(), 0);
        assert_eq!(session.remaining_seconds(), None);
    }
}
