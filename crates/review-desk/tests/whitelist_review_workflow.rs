use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{Duration, TimeZone, Utc};
use review_desk::clock::{Clock, ManualClock};
use review_desk::workflows::whitelist::{
    perform_grants, ApplicantId, FactionChoices, Faction, GrantError, GrantRole, GrantSink,
    InterviewEngine, JsonFileStorage, Ledger, Outcome, ReviewCoordinator, ReviewEvent,
    ReviewerId, SessionId, StaticQuestions, SubmissionRef, SubmissionStatus, Verdict,
    WritePolicy,
};

#[derive(Default)]
struct CollectingSink {
    granted: Mutex<Vec<(ApplicantId, GrantRole)>>,
}

impl GrantSink for CollectingSink {
    fn grant(&self, applicant: &ApplicantId, role: GrantRole) -> Result<(), GrantError> {
        self.granted
            .lock()
            .expect("sink mutex")
            .push((applicant.clone(), role));
        Ok(())
    }
}

fn open_desk(
    path: &Path,
    clock: Arc<ManualClock>,
) -> ReviewCoordinator<JsonFileStorage> {
    let ledger = Arc::new(
        Ledger::open(
            Arc::new(JsonFileStorage::new(path)),
            clock.clone(),
            WritePolicy::default(),
        )
        .expect("ledger opens"),
    );
    let engine = Arc::new(InterviewEngine::new(
        ledger.clone(),
        Arc::new(StaticQuestions::standard()),
        clock.clone(),
    ));
    ReviewCoordinator::new(ledger, engine, Arc::new(FactionChoices::default()), clock)
}

#[test]
fn applicant_moves_from_form_to_whitelist_across_restarts() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("data").join("wl-log.json");
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 6, 18, 0, 0).unwrap(),
    ));
    let sink = CollectingSink::default();
    let applicant = ApplicantId::from("314159");
    let reviewer = ReviewerId::from("staff-7");

    {
        let desk = open_desk(&path, clock.clone());
        desk.handle(ReviewEvent::ChooseFaction {
            applicant: applicant.clone(),
            faction: Faction::Konoha,
        })
        .expect("faction");
        desk.handle(ReviewEvent::SubmitForm {
            applicant: applicant.clone(),
            submission: SubmissionRef::from("form-1"),
            identity: Some("Sora Uchiha".to_string()),
            fields: Default::default(),
        })
        .expect("form");

        clock.advance(Duration::hours(1));
        let accepted = desk
            .handle(ReviewEvent::Decide {
                applicant: applicant.clone(),
                submission: SubmissionRef::from("form-1"),
                reviewer: reviewer.clone(),
                verdict: Verdict::Accept,
            })
            .expect("accept");
        assert!(perform_grants(&accepted.effects, &sink).all_granted());
    }

    // A restart loses in-memory sessions but not the ledger.
    clock.advance(Duration::days(1));
    let desk = open_desk(&path, clock.clone());
    let record = desk
        .ledger()
        .find(&applicant, &SubmissionRef::from("form-1"))
        .expect("submission survives restart");
    assert_eq!(record.status, Some(SubmissionStatus::Accepted));
    assert_eq!(record.faction, Some(Faction::Konoha));

    desk.handle(ReviewEvent::StartInterview {
        session: SessionId::from("oral-314159"),
        target: applicant.clone(),
        reviewer: reviewer.clone(),
    })
    .expect("interview");

    let mut completed = None;
    for question in 0..15 {
        let outcome = desk
            .handle(ReviewEvent::Answer {
                session: SessionId::from("oral-314159"),
                reviewer: reviewer.clone(),
                question,
                passed: question % 5 != 0,
            })
            .expect("answer");
        if let Outcome::InterviewCompleted { completion } = &outcome.outcome {
            assert!(perform_grants(&outcome.effects, &sink).all_granted());
            completed = Some(completion.result);
        }
    }

    let result = completed.expect("interview completed");
    assert_eq!((result.score, result.total, result.pass), (12, 15, true));
    assert_eq!(
        *sink.granted.lock().expect("sink mutex"),
        vec![
            (applicant.clone(), GrantRole::Interview),
            (applicant.clone(), GrantRole::Whitelist),
        ]
    );

    let reopened = open_desk(&path, clock.clone());
    let records = reopened.ledger().records_for(&applicant);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, Some(SubmissionStatus::AcceptedFinal));
    assert_eq!(records[0].granted_at, Some(clock.now()));
    assert_eq!(reopened.engine().active_sessions(), 0);
}
