//! Durable submission ledger.
//!
//! Every mutation runs read-snapshot → mutate-copy → persist → swap under a single writer
//! lock, so concurrent callers never clobber each other's updates. Readers work from the
//! last persisted snapshot and never touch storage.

mod storage;
mod summary;

pub use storage::{JsonFileStorage, LedgerStorage, MemoryStorage, StorageError, WritePolicy};
pub use summary::{week_start, DailySummary, WeeklySummary, UNKNOWN_REVIEWER};

use std::io;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::domain::{
    ApplicantId, ReviewStage, ReviewerId, SubmissionEntry, SubmissionRecord, SubmissionRef,
    SubmissionStatus, Verdict,
};
use super::error::ReviewError;
use crate::clock::Clock;

/// Whole-store document as persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerDocument {
    #[serde(default)]
    pub submissions: Vec<SubmissionRecord>,
}

/// Append/mutate-only store of submission records.
pub struct Ledger<S> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    policy: WritePolicy,
    writer: Mutex<()>,
    snapshot: RwLock<Arc<LedgerDocument>>,
}

impl<S> Ledger<S>
where
    S: LedgerStorage,
{
    /// Load the ledger. A store that was never written opens empty; anything unreadable is an
    /// error.
    pub fn open(
        storage: Arc<S>,
        clock: Arc<dyn Clock>,
        policy: WritePolicy,
    ) -> Result<Self, ReviewError> {
        let document = match storage.load()? {
            Some(bytes) => serde_json::from_slice::<LedgerDocument>(&bytes)
                .map_err(|err| StorageError::Corrupt(err.to_string()))?,
            None => {
                info!(storage = storage.name(), "no ledger found, starting empty");
                LedgerDocument::default()
            }
        };
        info!(
            storage = storage.name(),
            records = document.submissions.len(),
            "ledger opened"
        );

        Ok(Self {
            storage,
            clock,
            policy,
            writer: Mutex::new(()),
            snapshot: RwLock::new(Arc::new(document)),
        })
    }

    fn current(&self) -> Arc<LedgerDocument> {
        // The snapshot is only replaced wholesale, so a poisoned lock still guards a
        // consistent document.
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn mutate<T>(
        &self,
        operation: &'static str,
        apply: impl FnOnce(&mut Vec<SubmissionRecord>) -> T,
    ) -> Result<T, ReviewError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let mut document = LedgerDocument::clone(&self.current());
        let outcome = apply(&mut document.submissions);

        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|err| StorageError::Encode(err.to_string()))?;
        self.policy
            .run(self.storage.name(), || self.storage.save(&bytes))?;

        let records = document.submissions.len();
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(document);
        debug!(operation, records, "ledger persisted");
        Ok(outcome)
    }

    /// Insert or merge the record keyed by `(applicant_id, submission_ref)`.
    pub fn upsert(&self, entry: SubmissionEntry) -> Result<SubmissionRecord, ReviewError> {
        require_applicant("upsert", &entry.applicant_id)?;
        require_submission("upsert", &entry.submission_ref)?;

        self.mutate("upsert", |records| {
            match records
                .iter_mut()
                .find(|record| record.matches(&entry.applicant_id, &entry.submission_ref))
            {
                Some(existing) => {
                    entry.merge_into(existing);
                    existing.clone()
                }
                None => {
                    let record = entry.into_record();
                    records.push(record.clone());
                    record
                }
            }
        })
    }

    /// Record a reviewer's verdict. An unknown key gets a minimal record so out-of-order
    /// events are not lost.
    pub fn mark_decision(
        &self,
        applicant_id: &ApplicantId,
        submission_ref: &SubmissionRef,
        verdict: Verdict,
        reviewer: &ReviewerId,
        stage: Option<ReviewStage>,
    ) -> Result<SubmissionRecord, ReviewError> {
        require_applicant("mark_decision", applicant_id)?;
        require_submission("mark_decision", submission_ref)?;
        let now = self.clock.now();
        let status = SubmissionStatus::from(verdict);

        self.mutate("mark_decision", |records| {
            match records
                .iter_mut()
                .find(|record| record.matches(applicant_id, submission_ref))
            {
                Some(record) => {
                    record.status = Some(status);
                    record.decided_at = Some(now);
                    record.reviewer_id = Some(reviewer.clone());
                    if stage.is_some() {
                        record.stage = stage;
                    }
                    record.clone()
                }
                None => {
                    warn!(
                        applicant = %applicant_id,
                        submission = %submission_ref,
                        "decision recorded for unknown submission, creating minimal record"
                    );
                    let record = SubmissionRecord {
                        applicant_id: applicant_id.clone(),
                        submission_ref: Some(submission_ref.clone()),
                        status: Some(status),
                        decided_at: Some(now),
                        reviewer_id: Some(reviewer.clone()),
                        stage,
                        ..SubmissionRecord::default()
                    };
                    records.push(record.clone());
                    record
                }
            }
        })
    }

    /// Stamp the applicant's latest record as finally granted, tagging it `vocal`.
    pub fn mark_grant_final(
        &self,
        applicant_id: &ApplicantId,
        reviewer: &ReviewerId,
    ) -> Result<SubmissionRecord, ReviewError> {
        require_applicant("mark_grant_final", applicant_id)?;
        let now = self.clock.now();

        self.mutate("mark_grant_final", |records| {
            let latest = records
                .iter()
                .enumerate()
                .filter(|(_, record)| &record.applicant_id == applicant_id)
                .max_by_key(|(index, record)| (record.recency(), *index))
                .map(|(index, _)| index);

            match latest.and_then(|index| records.get_mut(index)) {
                Some(record) => {
                    record.status = Some(SubmissionStatus::AcceptedFinal);
                    record.granted_at = Some(now);
                    record.granted_by = Some(reviewer.clone());
                    record.stage = Some(ReviewStage::Vocal);
                    record.clone()
                }
                None => {
                    warn!(applicant = %applicant_id, "final grant for applicant without records");
                    let record = SubmissionRecord {
                        applicant_id: applicant_id.clone(),
                        status: Some(SubmissionStatus::AcceptedFinal),
                        granted_at: Some(now),
                        granted_by: Some(reviewer.clone()),
                        stage: Some(ReviewStage::Vocal),
                        ..SubmissionRecord::default()
                    };
                    records.push(record.clone());
                    record
                }
            }
        })
    }

    /// Totals for submissions received on `reference` (UTC), today when omitted.
    pub fn summarize_daily_by_faction(&self, reference: Option<NaiveDate>) -> DailySummary {
        let day = reference.unwrap_or_else(|| self.clock.now().date_naive());
        DailySummary::collect(day, &self.current().submissions)
    }

    /// Decisions per reviewer since Monday 00:00 UTC of the current week.
    pub fn summarize_weekly_by_reviewer(&self) -> WeeklySummary {
        WeeklySummary::collect(self.clock.now(), &self.current().submissions)
    }

    pub fn count_accepted_today_by_reviewer(
        &self,
        reviewer: &ReviewerId,
        stage: Option<ReviewStage>,
    ) -> usize {
        summary::count_accepted_on(
            self.clock.now(),
            reviewer,
            stage,
            &self.current().submissions,
        )
    }

    pub fn find(
        &self,
        applicant_id: &ApplicantId,
        submission_ref: &SubmissionRef,
    ) -> Option<SubmissionRecord> {
        self.current()
            .submissions
            .iter()
            .find(|record| record.matches(applicant_id, submission_ref))
            .cloned()
    }

    pub fn records_for(&self, applicant_id: &ApplicantId) -> Vec<SubmissionRecord> {
        self.current()
            .submissions
            .iter()
            .filter(|record| &record.applicant_id == applicant_id)
            .cloned()
            .collect()
    }

    pub fn records(&self) -> Vec<SubmissionRecord> {
        self.current().submissions.clone()
    }

    pub fn len(&self) -> usize {
        self.current().submissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the full audit trail as CSV, one row per record. Returns the row count.
    pub fn export_csv<W: io::Write>(&self, writer: W) -> Result<usize, csv::Error> {
        let document = self.current();
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record([
            "applicant_id",
            "submission_ref",
            "submitted_at",
            "faction",
            "identity",
            "status",
            "stage",
            "decided_at",
            "reviewer_id",
            "granted_at",
            "granted_by",
        ])?;

        for record in &document.submissions {
            csv_writer.write_record([
                record.applicant_id.0.clone(),
                optional(record.submission_ref.as_ref().map(|r| r.0.clone())),
                optional(record.submitted_at.map(|at| at.to_rfc3339())),
                optional(record.faction.map(|f| f.label().to_string())),
                optional(record.identity.clone()),
                record.status_label().to_string(),
                optional(record.stage.map(|s| s.label().to_string())),
                optional(record.decided_at.map(|at| at.to_rfc3339())),
                optional(record.reviewer_id.as_ref().map(|r| r.0.clone())),
                optional(record.granted_at.map(|at| at.to_rfc3339())),
                optional(record.granted_by.as_ref().map(|r| r.0.clone())),
            ])?;
        }

        csv_writer.flush()?;
        Ok(document.submissions.len())
    }
}

fn optional(value: Option<String>) -> String {
    value.unwrap_or_default()
}

fn require_applicant(operation: &str, applicant_id: &ApplicantId) -> Result<(), ReviewError> {
    if applicant_id.0.trim().is_empty() {
        return Err(ReviewError::invalid(format!("{operation} requires an applicant id")));
    }
    Ok(())
}

fn require_submission(
    operation: &str,
    submission_ref: &SubmissionRef,
) -> Result<(), ReviewError> {
    if submission_ref.0.trim().is_empty() {
        return Err(ReviewError::invalid(format!(
            "{operation} requires a submission reference"
        )));
    }
    Ok(())
}
