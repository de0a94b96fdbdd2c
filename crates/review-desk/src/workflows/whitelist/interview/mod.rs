//! Oral interview scoring.
//!
//! Each active session sits behind its own mutex so answers for one interview apply in the
//! order the engine receives them, while different interviews proceed in parallel. A slot is
//! emptied under its lock before it leaves the registry, which makes completion happen once.

mod questions;
mod session;

pub use questions::{QuestionSet, QuestionSource, StaticQuestions, MAX_QUESTIONS, PAGE_SIZE};
pub use session::{InterviewResult, PageStep, SessionView, PASS_THRESHOLD};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::domain::{ApplicantId, ReviewerId, SessionId, SubmissionRecord};
use super::error::ReviewError;
use super::ledger::{Ledger, LedgerStorage};
use crate::clock::Clock;
use session::InterviewSession;

/// Registry slot. `None` once the session has completed or was evicted.
#[derive(Debug, Default)]
struct SessionSlot {
    session: Option<InterviewSession>,
}

type SharedSlot = Arc<Mutex<SessionSlot>>;

/// Reported when a session finishes, automatically or on explicit submit.
#[derive(Debug, Clone, Serialize)]
pub struct InterviewCompletion {
    pub session_id: SessionId,
    pub target: ApplicantId,
    pub reviewer: ReviewerId,
    pub result: InterviewResult,
    /// Ledger record stamped `accepted_final`, present only on a pass.
    pub grant: Option<SubmissionRecord>,
}

/// Outcome of one answer event.
#[derive(Debug, Clone)]
pub enum AnswerOutcome {
    Recorded(SessionView),
    Completed(InterviewCompletion),
}

/// Owns every in-flight interview for the lifetime of the process.
pub struct InterviewEngine<S> {
    ledger: Arc<Ledger<S>>,
    questions: Arc<dyn QuestionSource>,
    clock: Arc<dyn Clock>,
    idle_timeout: Option<chrono::Duration>,
    sessions: Mutex<HashMap<SessionId, SharedSlot>>,
}

impl<S> InterviewEngine<S>
where
    S: LedgerStorage,
{
    pub fn new(
        ledger: Arc<Ledger<S>>,
        questions: Arc<dyn QuestionSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            questions,
            clock,
            idle_timeout: None,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Sessions untouched for longer than `timeout` become eligible for [`Self::evict_idle`].
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout.and_then(|timeout| chrono::Duration::from_std(timeout).ok());
        self
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<SessionId, SharedSlot>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, session_id: &SessionId) -> Result<SharedSlot, ReviewError> {
        self.registry()
            .get(session_id)
            .cloned()
            .ok_or_else(|| ReviewError::SessionNotFound(session_id.clone()))
    }

    fn release(&self, session_id: &SessionId, slot: &SharedSlot) {
        let mut registry = self.registry();
        if registry
            .get(session_id)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            registry.remove(session_id);
        }
    }

    /// Open a scoring session for `target`, owned by `reviewer`.
    pub fn create_session(
        &self,
        session_id: SessionId,
        target: ApplicantId,
        reviewer: ReviewerId,
    ) -> Result<SessionView, ReviewError> {
        if session_id.0.trim().is_empty() {
            return Err(ReviewError::invalid("session handle must not be empty"));
        }
        if target.0.trim().is_empty() || reviewer.0.trim().is_empty() {
            return Err(ReviewError::invalid(
                "interview needs both a target applicant and a reviewer",
            ));
        }

        let questions = QuestionSet::from_source(self.questions.as_ref());
        if questions.is_empty() {
            return Err(ReviewError::invalid("no interview questions are configured"));
        }

        let session = InterviewSession::new(
            session_id.clone(),
            target,
            reviewer,
            questions,
            self.clock.now(),
        );
        let view = session.view();

        let mut registry = self.registry();
        if registry.contains_key(&session_id) {
            return Err(ReviewError::invalid(format!(
                "session handle {session_id} is already in use"
            )));
        }
        registry.insert(
            session_id,
            Arc::new(Mutex::new(SessionSlot {
                session: Some(session),
            })),
        );
        drop(registry);

        info!(
            session = %view.session_id,
            target = %view.target,
            reviewer = %view.reviewer,
            total = view.total,
            "interview started"
        );
        Ok(view)
    }

    /// Record a pass/fail answer. Answering the last open question completes the session.
    pub fn answer(
        &self,
        session_id: &SessionId,
        actor: &ReviewerId,
        question: usize,
        passed: bool,
    ) -> Result<AnswerOutcome, ReviewError> {
        let slot = self.slot(session_id)?;
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let session = guard
            .session
            .as_mut()
            .ok_or_else(|| ReviewError::SessionNotFound(session_id.clone()))?;

        session.authorize(actor)?;
        session.record(question, passed, self.clock.now())?;
        if !session.is_complete() {
            return Ok(AnswerOutcome::Recorded(session.view()));
        }

        let completion = self.complete(&slot, &mut guard)?;
        Ok(AnswerOutcome::Completed(completion))
    }

    pub fn turn_page(
        &self,
        session_id: &SessionId,
        actor: &ReviewerId,
        step: PageStep,
    ) -> Result<SessionView, ReviewError> {
        let slot = self.slot(session_id)?;
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let session = guard
            .session
            .as_mut()
            .ok_or_else(|| ReviewError::SessionNotFound(session_id.clone()))?;

        session.authorize(actor)?;
        session.turn_page(step, self.clock.now());
        Ok(session.view())
    }

    /// Explicit submit with whatever has been answered so far.
    pub fn finalize(
        &self,
        session_id: &SessionId,
        actor: &ReviewerId,
    ) -> Result<InterviewCompletion, ReviewError> {
        let slot = self.slot(session_id)?;
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let session = guard
            .session
            .as_ref()
            .ok_or_else(|| ReviewError::SessionNotFound(session_id.clone()))?;

        session.authorize(actor)?;
        self.complete(&slot, &mut guard)
    }

    /// Score the session, persist a pass, then retire it. A failed ledger write leaves the
    /// session active so the caller can submit again.
    fn complete(
        &self,
        slot: &SharedSlot,
        guard: &mut SessionSlot,
    ) -> Result<InterviewCompletion, ReviewError> {
        let Some(session) = guard.session.as_ref() else {
            return Err(ReviewError::invalid("session already completed"));
        };

        let result = session.result();
        let grant = if result.pass {
            Some(self.ledger.mark_grant_final(&session.target, &session.reviewer)?)
        } else {
            None
        };

        let Some(session) = guard.session.take() else {
            return Err(ReviewError::invalid("session already completed"));
        };
        self.release(&session.id, slot);

        info!(
            session = %session.id,
            target = %session.target,
            reviewer = %session.reviewer,
            score = result.score,
            total = result.total,
            pass = result.pass,
            "interview completed"
        );

        Ok(InterviewCompletion {
            session_id: session.id,
            target: session.target,
            reviewer: session.reviewer,
            result,
            grant,
        })
    }

    pub fn view(&self, session_id: &SessionId) -> Result<SessionView, ReviewError> {
        let slot = self.slot(session_id)?;
        let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .session
            .as_ref()
            .map(InterviewSession::view)
            .ok_or_else(|| ReviewError::SessionNotFound(session_id.clone()))
    }

    pub fn active_sessions(&self) -> usize {
        self.registry().len()
    }

    /// Drop sessions idle for longer than the configured timeout. Returns the evicted handles.
    pub fn evict_idle(&self) -> Vec<SessionId> {
        let Some(timeout) = self.idle_timeout else {
            return Vec::new();
        };
        let cutoff = self.clock.now() - timeout;

        let candidates: Vec<(SessionId, SharedSlot)> = self
            .registry()
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect();

        let mut evicted = Vec::new();
        for (session_id, slot) in candidates {
            let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            let idle = guard
                .session
                .as_ref()
                .is_some_and(|session| session.last_activity < cutoff);
            if !idle {
                continue;
            }
            if let Some(session) = guard.session.take() {
                warn!(
                    session = %session_id,
                    target = %session.target,
                    answered = session.view().answered,
                    "evicting idle interview"
                );
            }
            self.release(&session_id, &slot);
            evicted.push(session_id);
        }

        if !evicted.is_empty() {
            info!(count = evicted.len(), "idle interview sweep finished");
        }
        evicted
    }
}
