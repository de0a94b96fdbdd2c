use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use chrono::{Duration, NaiveDate};

use super::common::*;
use crate::clock::Clock;
use crate::workflows::whitelist::ledger::UNKNOWN_REVIEWER;
use crate::workflows::whitelist::{
    ApplicantId, Faction, JsonFileStorage, Ledger, LedgerStorage, MemoryStorage, ReviewError,
    ReviewStage, ReviewerId, StorageError, SubmissionEntry, SubmissionRecord, SubmissionRef,
    SubmissionStatus, Verdict,
};

fn applicant(raw: &str) -> ApplicantId {
    ApplicantId::from(raw)
}

fn submission(raw: &str) -> SubmissionRef {
    SubmissionRef::from(raw)
}

fn reviewer(raw: &str) -> ReviewerId {
    ReviewerId::from(raw)
}

fn decide<S: LedgerStorage>(
    ledger: &Ledger<S>,
    user: &str,
    form: &str,
    verdict: Verdict,
    by: &str,
    stage: Option<ReviewStage>,
) -> SubmissionRecord {
    ledger
        .mark_decision(&applicant(user), &submission(form), verdict, &reviewer(by), stage)
        .expect("decision recorded")
}

#[test]
fn upsert_is_idempotent_for_the_same_key() {
    let clock = clock();
    let (storage, ledger) = memory_ledger(clock.clone());
    let first = entry("u1", "m1", clock.now());

    let created = ledger.upsert(first.clone()).expect("first upsert");
    let repeated = ledger.upsert(first).expect("second upsert");

    assert_eq!(created, repeated);
    assert_eq!(ledger.len(), 1);
    assert_eq!(stored(&storage).submissions, vec![created]);
}

#[test]
fn upsert_merges_fields_and_keeps_first_submission_time() {
    let clock = clock();
    let (_, ledger) = memory_ledger(clock.clone());
    let first_seen = clock.now();

    let mut first = entry("u1", "m1", first_seen);
    first.identity = Some("Kaito Uzumaki".to_string());
    first.fields = BTreeMap::from([("age".to_string(), "19".to_string())]);
    ledger.upsert(first).expect("first upsert");

    let mut second = entry("u1", "m1", first_seen + Duration::hours(2));
    second.faction = Some(Faction::Suna);
    second.identity = Some("Kaito Hoshino".to_string());
    second.fields = BTreeMap::from([("background".to_string(), "merchant".to_string())]);
    let merged = ledger.upsert(second).expect("merge upsert");

    assert_eq!(merged.submitted_at, Some(first_seen));
    assert_eq!(merged.faction, Some(Faction::Suna));
    assert_eq!(merged.identity.as_deref(), Some("Kaito Hoshino"));
    assert_eq!(merged.fields.len(), 2);
    assert_eq!(ledger.len(), 1);
}

#[test]
fn upsert_rejects_missing_keys_without_writing() {
    let clock = clock();
    let (storage, ledger) = memory_ledger(clock.clone());

    let missing_ref = SubmissionEntry::new("u1", "  ");
    match ledger.upsert(missing_ref) {
        Err(ReviewError::InvalidInput(_)) => {}
        other => panic!("expected invalid input, got {other:?}"),
    }
    let missing_applicant = SubmissionEntry::new("", "m1");
    let err = ledger.upsert(missing_applicant).expect_err("empty applicant");
    assert_eq!(err.reason_code(), "invalid_input");

    assert!(ledger.is_empty());
    assert!(storage.snapshot().is_none(), "nothing should be persisted");
}

#[test]
fn decision_and_grant_reject_blank_keys_without_writing() {
    let clock = clock();
    let (storage, ledger) = memory_ledger(clock.clone());

    let decided = ledger.mark_decision(
        &applicant(""),
        &submission("m1"),
        Verdict::Accept,
        &reviewer("r1"),
        None,
    );
    assert_eq!(decided.expect_err("blank applicant").reason_code(), "invalid_input");

    let decided = ledger.mark_decision(
        &applicant("u1"),
        &submission("  "),
        Verdict::Reject,
        &reviewer("r1"),
        Some(ReviewStage::Form),
    );
    assert_eq!(decided.expect_err("blank reference").reason_code(), "invalid_input");

    let granted = ledger.mark_grant_final(&applicant(" "), &reviewer("r1"));
    assert_eq!(granted.expect_err("blank applicant").reason_code(), "invalid_input");

    assert!(ledger.is_empty());
    assert!(storage.snapshot().is_none(), "nothing should be persisted");
}

#[test]
fn decision_creates_minimal_record_when_absent() {
    let clock = clock();
    let (_, ledger) = memory_ledger(clock.clone());

    let record = ledger
        .mark_decision(
            &applicant("u9"),
            &submission("m9"),
            Verdict::Reject,
            &reviewer("r1"),
            Some(ReviewStage::Form),
        )
        .expect("decision recorded");

    assert_eq!(record.status, Some(SubmissionStatus::Rejected));
    assert_eq!(record.decided_at, Some(clock.now()));
    assert_eq!(record.reviewer_id, Some(reviewer("r1")));
    assert_eq!(record.stage, Some(ReviewStage::Form));
    assert!(record.submitted_at.is_none());
    assert_eq!(ledger.find(&applicant("u9"), &submission("m9")), Some(record));
}

#[test]
fn decision_updates_existing_record_in_place() {
    let clock = clock();
    let (_, ledger) = memory_ledger(clock.clone());
    ledger
        .upsert(entry("u1", "m1", clock.now()))
        .expect("submission");

    clock.advance(Duration::minutes(30));
    ledger
        .mark_decision(
            &applicant("u1"),
            &submission("m1"),
            Verdict::Accept,
            &reviewer("r1"),
            None,
        )
        .expect("decision");

    let records = ledger.records_for(&applicant("u1"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status_label(), "accepted");
    assert_eq!(records[0].decided_at, Some(clock.now()));
    assert!(records[0].stage.is_none());
}

#[test]
fn final_grant_targets_latest_submission() {
    let clock = clock();
    let (_, ledger) = memory_ledger(clock.clone());
    let morning = at(2024, 1, 9, 10, 0, 0);
    let noon = at(2024, 1, 9, 12, 0, 0);
    // Insertion order deliberately disagrees with submission time.
    ledger.upsert(entry("u1", "late", noon)).expect("late form");
    ledger.upsert(entry("u1", "early", morning)).expect("early form");
    ledger.upsert(entry("u2", "other", clock.now())).expect("other applicant");

    let granted = ledger
        .mark_grant_final(&applicant("u1"), &reviewer("r2"))
        .expect("grant recorded");

    assert_eq!(granted.submission_ref, Some(submission("late")));
    assert_eq!(granted.status, Some(SubmissionStatus::AcceptedFinal));
    assert_eq!(granted.stage, Some(ReviewStage::Vocal));
    assert_eq!(granted.granted_by, Some(reviewer("r2")));
    assert_eq!(granted.granted_at, Some(clock.now()));

    let early = ledger
        .find(&applicant("u1"), &submission("early"))
        .expect("early record present");
    assert!(early.is_pending());
}

#[test]
fn final_grant_breaks_submission_ties_on_latest_decision() {
    let clock = clock();
    let (_, ledger) = memory_ledger(clock.clone());
    let submitted = at(2024, 1, 9, 10, 0, 0);
    ledger.upsert(entry("u1", "a", submitted)).expect("form a");
    ledger.upsert(entry("u1", "b", submitted)).expect("form b");

    clock.set(at(2024, 1, 10, 9, 0, 0));
    decide(&ledger, "u1", "a", Verdict::Accept, "r1", None);
    clock.set(at(2024, 1, 10, 8, 0, 0));
    decide(&ledger, "u1", "b", Verdict::Accept, "r1", None);

    clock.set(at(2024, 1, 10, 12, 0, 0));
    let granted = ledger
        .mark_grant_final(&applicant("u1"), &reviewer("r1"))
        .expect("grant");
    assert_eq!(granted.submission_ref, Some(submission("a")));
}

#[test]
fn final_grant_without_records_creates_then_reuses_one() {
    let clock = clock();
    let (_, ledger) = memory_ledger(clock.clone());

    let created = ledger
        .mark_grant_final(&applicant("ghost"), &reviewer("r1"))
        .expect("grant");
    assert!(created.submission_ref.is_none());
    assert_eq!(created.status, Some(SubmissionStatus::AcceptedFinal));

    clock.advance(Duration::minutes(5));
    let regranted = ledger
        .mark_grant_final(&applicant("ghost"), &reviewer("r3"))
        .expect("second grant");
    assert_eq!(ledger.len(), 1);
    assert_eq!(regranted.granted_by, Some(reviewer("r3")));
}

#[test]
fn daily_summary_partitions_at_utc_midnight() {
    let clock = clock();
    let (_, ledger) = memory_ledger(clock.clone());

    let mut late = entry("u1", "m1", at(2024, 1, 10, 23, 59, 0));
    late.faction = Some(Faction::Konoha);
    ledger.upsert(late).expect("late submission");
    let mut early = entry("u2", "m2", at(2024, 1, 11, 0, 0, 1));
    early.faction = Some(Faction::Suna);
    ledger.upsert(early).expect("early submission");
    // Decision-only record has no submission time and never counts.
    decide(&ledger, "u3", "m3", Verdict::Accept, "r1", None);

    let tenth = ledger.summarize_daily_by_faction(NaiveDate::from_ymd_opt(2024, 1, 10));
    assert_eq!((tenth.total, tenth.pending, tenth.treated), (1, 1, 0));
    assert_eq!(tenth.count_for(Faction::Konoha), 1);
    assert_eq!(tenth.count_for(Faction::Suna), 0);
    assert_eq!(tenth.count_for(Faction::Other), 0);

    let eleventh = ledger.summarize_daily_by_faction(NaiveDate::from_ymd_opt(2024, 1, 11));
    assert_eq!(eleventh.total, 1);
    assert_eq!(eleventh.count_for(Faction::Suna), 1);
}

#[test]
fn daily_summary_defaults_to_today_and_splits_treated_from_pending() {
    let clock = clock();
    let (_, ledger) = memory_ledger(clock.clone());
    for (user, form) in [("u1", "m1"), ("u2", "m2"), ("u3", "m3")] {
        ledger.upsert(entry(user, form, clock.now())).expect("submission");
    }
    decide(&ledger, "u1", "m1", Verdict::Accept, "r1", None);
    decide(&ledger, "u2", "m2", Verdict::Reject, "r1", None);

    let today = ledger.summarize_daily_by_faction(None);
    assert_eq!(today.day, clock.now().date_naive());
    assert_eq!((today.total, today.treated, today.pending), (3, 2, 1));
    assert_eq!(today.count_for(Faction::Other), 3);
}

#[test]
fn weekly_summary_starts_monday_midnight() {
    let clock = clock();
    let (_, ledger) = memory_ledger(clock.clone());

    clock.set(at(2024, 1, 7, 23, 59, 59));
    decide(&ledger, "u1", "m1", Verdict::Accept, "r1", None);
    clock.set(at(2024, 1, 8, 0, 0, 0));
    decide(&ledger, "u2", "m2", Verdict::Accept, "r1", None);
    clock.set(at(2024, 1, 9, 14, 0, 0));
    decide(&ledger, "u3", "m3", Verdict::Reject, "r2", None);

    clock.set(at(2024, 1, 10, 12, 0, 0));
    let weekly = ledger.summarize_weekly_by_reviewer();
    assert_eq!(weekly.week_start, at(2024, 1, 8, 0, 0, 0));
    assert_eq!(weekly.per_reviewer.get("r1"), Some(&1));
    assert_eq!(weekly.per_reviewer.get("r2"), Some(&1));
    assert_eq!(weekly.total(), 2);
}

#[test]
fn weekly_summary_buckets_missing_reviewer_as_unknown() {
    let clock = clock();
    let document = br#"{"submissions":[
        {"applicant_id":"u1","submission_ref":"m1","status":"accepted",
         "decided_at":"2024-01-09T10:00:00Z"},
        {"applicant_id":"u2","submission_ref":"m2","status":"rejected",
         "decided_at":"2024-01-09T11:00:00Z","reviewer_id":"r1"}
    ]}"#;
    let storage = Arc::new(MemoryStorage::with_bytes(document.to_vec()));
    let ledger = open_ledger(storage, clock);

    let weekly = ledger.summarize_weekly_by_reviewer();
    assert_eq!(weekly.per_reviewer.get(UNKNOWN_REVIEWER), Some(&1));
    assert_eq!(weekly.per_reviewer.get("r1"), Some(&1));
}

#[test]
fn accepted_today_counts_by_stage() {
    let clock = clock();
    let (_, ledger) = memory_ledger(clock.clone());
    let r1 = reviewer("r1");

    clock.set(at(2024, 1, 9, 18, 0, 0));
    decide(&ledger, "u0", "m0", Verdict::Accept, "r1", Some(ReviewStage::Form));

    clock.set(at(2024, 1, 10, 9, 0, 0));
    decide(&ledger, "u1", "m1", Verdict::Accept, "r1", Some(ReviewStage::Form));
    decide(&ledger, "u2", "m2", Verdict::Reject, "r1", Some(ReviewStage::Form));
    decide(&ledger, "u3", "m3", Verdict::Accept, "r2", Some(ReviewStage::Form));

    assert_eq!(ledger.count_accepted_today_by_reviewer(&r1, None), 1);
    // Stage filtering matches the stage and day only, whatever the verdict.
    assert_eq!(
        ledger.count_accepted_today_by_reviewer(&r1, Some(ReviewStage::Form)),
        2
    );
    assert_eq!(
        ledger.count_accepted_today_by_reviewer(&r1, Some(ReviewStage::Vocal)),
        0
    );

    ledger
        .mark_grant_final(&applicant("u9"), &r1)
        .expect("grant only");
    // A grant-only record carries no reviewer id, so it is not attributed.
    assert_eq!(
        ledger.count_accepted_today_by_reviewer(&r1, Some(ReviewStage::Vocal)),
        0
    );
}

#[test]
fn concurrent_upserts_for_distinct_keys_all_persist() {
    let clock = clock();
    let (storage, ledger) = memory_ledger(clock.clone());
    let now = clock.now();

    thread::scope(|scope| {
        for worker in 0..8 {
            let ledger = &ledger;
            scope.spawn(move || {
                for form in 0..5 {
                    ledger
                        .upsert(entry(&format!("u{worker}"), &format!("m{form}"), now))
                        .expect("concurrent upsert");
                }
            });
        }
    });

    assert_eq!(ledger.len(), 40);
    assert_eq!(stored(&storage).submissions.len(), 40);
}

#[test]
fn file_ledger_survives_reopen() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("wl-log.json");
    let clock = clock();

    {
        let ledger = open_ledger(Arc::new(JsonFileStorage::new(&path)), clock.clone());
        ledger.upsert(entry("u1", "m1", clock.now())).expect("upsert");
        decide(&ledger, "u1", "m1", Verdict::Accept, "r1", Some(ReviewStage::Form));
    }

    let reopened = open_ledger(Arc::new(JsonFileStorage::new(&path)), clock.clone());
    let record = reopened
        .find(&applicant("u1"), &submission("m1"))
        .expect("record survives restart");
    assert_eq!(record.status, Some(SubmissionStatus::Accepted));
    assert_eq!(record.submitted_at, Some(clock.now()));

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).expect("file readable")).expect("json");
    assert!(raw["submissions"].is_array());
}

#[test]
fn corrupt_document_is_surfaced_on_open() {
    let storage = Arc::new(MemoryStorage::with_bytes(b"{\"submissions\": [".to_vec()));
    match Ledger::open(storage, clock(), fast_policy()) {
        Err(ReviewError::Storage(StorageError::Corrupt(_))) => {}
        Err(other) => panic!("expected corrupt document, got {other:?}"),
        Ok(_) => panic!("corrupt document must not open"),
    }
}

#[test]
fn failed_write_leaves_snapshot_untouched() {
    let clock = clock();
    let storage = Arc::new(FlakyStorage::default());
    let ledger = open_ledger(storage.clone(), clock.clone());
    ledger.upsert(entry("u1", "m1", clock.now())).expect("healthy write");

    storage.fail_next_saves(3);
    let err = ledger
        .upsert(entry("u2", "m2", clock.now()))
        .expect_err("all attempts fail");
    assert_eq!(err.reason_code(), "storage_failure");
    assert_eq!(storage.save_calls(), 4);
    assert_eq!(ledger.len(), 1);
    assert!(ledger.find(&applicant("u2"), &submission("m2")).is_none());
    assert_eq!(storage.document().submissions.len(), 1);
}

#[test]
fn transient_write_failure_is_retried() {
    let clock = clock();
    let storage = Arc::new(FlakyStorage::default());
    let ledger = open_ledger(storage.clone(), clock.clone());

    storage.fail_next_saves(2);
    ledger
        .upsert(entry("u1", "m1", clock.now()))
        .expect("third attempt succeeds");
    assert_eq!(storage.save_calls(), 3);
    assert_eq!(storage.document().submissions.len(), 1);
}

#[test]
fn csv_export_writes_one_row_per_record() {
    let clock = clock();
    let (_, ledger) = memory_ledger(clock.clone());
    ledger.upsert(entry("u1", "m1", clock.now())).expect("upsert");
    ledger
        .mark_grant_final(&applicant("u2"), &reviewer("r1"))
        .expect("grant");

    let mut buffer = Vec::new();
    let rows = ledger.export_csv(&mut buffer).expect("export");
    assert_eq!(rows, 2);

    let text = String::from_utf8(buffer).expect("utf8");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("applicant_id,submission_ref,submitted_at"));
    assert!(lines[1].contains("pending"));
    assert!(lines[2].contains("accepted_final"));
}
