use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::clock::ManualClock;
use crate::workflows::whitelist::{
    ApplicantId, FactionChoices, GrantError, GrantRole, GrantSink, InterviewEngine, Ledger,
    LedgerDocument, LedgerStorage, MemoryStorage, ReviewCoordinator, StaticQuestions,
    StorageError, SubmissionEntry, WritePolicy,
};

pub(super) fn at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
        .single()
        .expect("valid timestamp")
}

/// Wednesday 2024-01-10 12:00 UTC.
pub(super) fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(at(2024, 1, 10, 12, 0, 0)))
}

pub(super) fn fast_policy() -> WritePolicy {
    WritePolicy::new(3, Duration::from_secs(1)).with_backoff(Duration::ZERO)
}

pub(super) fn open_ledger<S: LedgerStorage>(
    storage: Arc<S>,
    clock: Arc<ManualClock>,
) -> Arc<Ledger<S>> {
    Arc::new(Ledger::open(storage, clock, fast_policy()).expect("ledger opens"))
}

pub(super) fn memory_ledger(
    clock: Arc<ManualClock>,
) -> (Arc<MemoryStorage>, Arc<Ledger<MemoryStorage>>) {
    let storage = Arc::new(MemoryStorage::default());
    let ledger = open_ledger(storage.clone(), clock);
    (storage, ledger)
}

pub(super) fn stored(storage: &MemoryStorage) -> LedgerDocument {
    let bytes = storage.snapshot().expect("ledger was persisted");
    serde_json::from_slice(&bytes).expect("persisted ledger is valid json")
}

pub(super) fn entry(
    applicant: &str,
    submission: &str,
    submitted_at: DateTime<Utc>,
) -> SubmissionEntry {
    SubmissionEntry {
        submitted_at: Some(submitted_at),
        ..SubmissionEntry::new(applicant, submission)
    }
}

pub(super) fn questions(count: usize) -> Arc<StaticQuestions> {
    Arc::new(StaticQuestions(
        (1..=count).map(|n| format!("prompt {n}")).collect(),
    ))
}

pub(super) fn engine<S: LedgerStorage>(
    ledger: Arc<Ledger<S>>,
    clock: Arc<ManualClock>,
    question_count: usize,
) -> Arc<InterviewEngine<S>> {
    Arc::new(InterviewEngine::new(ledger, questions(question_count), clock))
}

pub(super) fn coordinator(
    clock: Arc<ManualClock>,
) -> (
    Arc<MemoryStorage>,
    Arc<FactionChoices>,
    ReviewCoordinator<MemoryStorage>,
) {
    let (storage, ledger) = memory_ledger(clock.clone());
    let engine = engine(ledger.clone(), clock.clone(), 15);
    let factions = Arc::new(FactionChoices::default());
    let coordinator = ReviewCoordinator::new(ledger, engine, factions.clone(), clock);
    (storage, factions, coordinator)
}

/// In-memory storage whose saves can be made to fail on demand.
#[derive(Debug, Default)]
pub(super) struct FlakyStorage {
    inner: MemoryStorage,
    failing_saves: AtomicU32,
    save_calls: AtomicU32,
}

impl FlakyStorage {
    pub(super) fn fail_next_saves(&self, count: u32) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    pub(super) fn save_calls(&self) -> u32 {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub(super) fn document(&self) -> LedgerDocument {
        stored(&self.inner)
    }
}

impl LedgerStorage for FlakyStorage {
    fn name(&self) -> &str {
        "flaky"
    }

    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.load()
    }

    fn save(&self, bytes: &[u8]) -> Result<(), StorageError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_saves.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_saves.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::Unavailable("disk offline".to_string()));
        }
        self.inner.save(bytes)
    }
}

/// Grant sink that remembers every call and refuses configured applicants.
#[derive(Debug, Default)]
pub(super) struct RecordingGrantSink {
    granted: Mutex<Vec<(ApplicantId, GrantRole)>>,
    refused: Vec<ApplicantId>,
}

impl RecordingGrantSink {
    pub(super) fn refusing(applicant: &str) -> Self {
        Self {
            granted: Mutex::new(Vec::new()),
            refused: vec![ApplicantId::from(applicant)],
        }
    }

    pub(super) fn granted(&self) -> Vec<(ApplicantId, GrantRole)> {
        self.granted.lock().expect("sink mutex").clone()
    }
}

impl GrantSink for RecordingGrantSink {
    fn grant(&self, applicant: &ApplicantId, role: GrantRole) -> Result<(), GrantError> {
        if self.refused.contains(applicant) {
            return Err(GrantError::MemberNotFound(applicant.clone()));
        }
        self.granted
            .lock()
            .expect("sink mutex")
            .push((applicant.clone(), role));
        Ok(())
    }
}
