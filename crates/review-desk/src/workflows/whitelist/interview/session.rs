use std::collections::BTreeMap;
use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::questions::QuestionSet;
use crate::workflows::whitelist::domain::{ApplicantId, ReviewerId, SessionId};
use crate::workflows::whitelist::error::ReviewError;

/// An interview passes with strictly more than this many validated answers.
pub const PASS_THRESHOLD: usize = 10;

/// Pagination move requested by the reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStep {
    Previous,
    Next,
}

/// Final score reported when a session completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InterviewResult {
    pub score: usize,
    pub total: usize,
    pub pass: bool,
}

impl InterviewResult {
    pub fn summary(&self) -> String {
        let verdict = if self.pass { "passed" } else { "failed" };
        format!("score {}/{} ({verdict})", self.score, self.total)
    }
}

/// Read-only projection handed to the presentation layer after each change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub target: ApplicantId,
    pub reviewer: ReviewerId,
    pub page: usize,
    pub max_page: usize,
    pub page_bounds: Range<usize>,
    pub responses: BTreeMap<usize, bool>,
    pub answered: usize,
    pub total: usize,
}

/// Ephemeral scoring state of one in-progress oral interview.
#[derive(Debug, Clone)]
pub(crate) struct InterviewSession {
    pub(crate) id: SessionId,
    pub(crate) target: ApplicantId,
    pub(crate) reviewer: ReviewerId,
    questions: QuestionSet,
    responses: BTreeMap<usize, bool>,
    page: usize,
    pub(crate) last_activity: DateTime<Utc>,
}

impl InterviewSession {
    pub(crate) fn new(
        id: SessionId,
        target: ApplicantId,
        reviewer: ReviewerId,
        questions: QuestionSet,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            target,
            reviewer,
            questions,
            responses: BTreeMap::new(),
            page: 0,
            last_activity: now,
        }
    }

    pub(crate) fn authorize(&self, actor: &ReviewerId) -> Result<(), ReviewError> {
        if actor == &self.reviewer {
            Ok(())
        } else {
            Err(ReviewError::Unauthorized {
                session: self.id.clone(),
                actor: actor.clone(),
                owner: self.reviewer.clone(),
            })
        }
    }

    /// Store an answer, overwriting any earlier one for the same question.
    pub(crate) fn record(
        &mut self,
        question: usize,
        passed: bool,
        now: DateTime<Utc>,
    ) -> Result<(), ReviewError> {
        if question >= self.total() {
            return Err(ReviewError::invalid(format!(
                "question {question} is outside 0..{}",
                self.total()
            )));
        }
        self.responses.insert(question, passed);
        self.last_activity = now;
        Ok(())
    }

    pub(crate) fn turn_page(&mut self, step: PageStep, now: DateTime<Utc>) {
        self.page = match step {
            PageStep::Previous => self.page.saturating_sub(1),
            PageStep::Next => (self.page + 1).min(self.questions.max_page()),
        };
        self.last_activity = now;
    }

    pub(crate) fn total(&self) -> usize {
        self.questions.len()
    }

    /// Every question has an answer.
    pub(crate) fn is_complete(&self) -> bool {
        self.responses.len() == self.total()
    }

    /// Score over whatever was answered; the denominator is always the full question count.
    pub(crate) fn result(&self) -> InterviewResult {
        let score = self.responses.values().filter(|passed| **passed).count();
        InterviewResult {
            score,
            total: self.total(),
            pass: score > PASS_THRESHOLD,
        }
    }

    pub(crate) fn view(&self) -> SessionView {
        SessionView {
            session_id: self.id.clone(),
            target: self.target.clone(),
            reviewer: self.reviewer.clone(),
            page: self.page,
            max_page: self.questions.max_page(),
            page_bounds: self.questions.page_bounds(self.page),
            responses: self.responses.clone(),
            answered: self.responses.len(),
            total: self.total(),
        }
    }
}
