//! Applicant review workflow: form submissions, reviewer verdicts, and oral interviews.
//!
//! The [`ledger`] is the only durable state. The [`interview`] engine keeps scoring sessions
//! in memory and writes to the ledger when an interview passes. The [`coordinator`] turns
//! inbound events into those calls and returns the side effects a host must carry out.

pub mod coordinator;
pub mod domain;
pub mod effects;
mod error;
pub mod interview;
pub mod ledger;

#[cfg(test)]
mod tests;

pub use coordinator::{FactionChoices, Outcome, ReviewCoordinator, ReviewEvent, ReviewOutcome};
pub use domain::{
    ApplicantId, Faction, ReviewStage, ReviewerId, SessionId, SubmissionEntry, SubmissionRecord,
    SubmissionRef, SubmissionStatus, Verdict,
};
pub use effects::{
    perform_grants, Announcement, GrantError, GrantReport, GrantRole, GrantSink, SideEffect,
};
pub use error::ReviewError;
pub use interview::{
    AnswerOutcome, InterviewCompletion, InterviewEngine, InterviewResult, PageStep, QuestionSet,
    QuestionSource, SessionView, StaticQuestions, MAX_QUESTIONS, PAGE_SIZE, PASS_THRESHOLD,
};
pub use ledger::{
    DailySummary, JsonFileStorage, Ledger, LedgerDocument, LedgerStorage, MemoryStorage,
    StorageError, WeeklySummary, WritePolicy,
};
