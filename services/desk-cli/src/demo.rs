use crate::infra::{open_file_ledger, spawn_idle_sweeper, LoggingGrantSink};
use crate::recap::{render_daily, render_weekly};
use clap::Args;
use review_desk::clock::{Clock, SystemClock};
use review_desk::config::AppConfig;
use review_desk::error::AppError;
use review_desk::workflows::whitelist::{
    perform_grants, ApplicantId, Faction, FactionChoices, GrantRole, InterviewEngine,
    JsonFileStorage, Outcome, ReviewCoordinator, ReviewEvent, ReviewOutcome, ReviewerId,
    SessionId, SubmissionRef, Verdict,
};
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Directory for the scratch ledger. Defaults to a per-process temp directory.
    #[arg(long)]
    pub(crate) scratch_dir: Option<PathBuf>,
    /// Number of applicants submitting forms concurrently.
    #[arg(long, default_value_t = 6)]
    pub(crate) applicants: usize,
    /// Idle sweeper period in milliseconds.
    #[arg(long, default_value_t = 500)]
    pub(crate) sweep_ms: u64,
}

/// Tallies from one scripted run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DemoReport {
    pub(crate) ledger_path: PathBuf,
    pub(crate) submitted: usize,
    pub(crate) accepted: usize,
    pub(crate) rejected: usize,
    pub(crate) interviews_passed: usize,
    pub(crate) interviews_failed: usize,
    pub(crate) interview_grants: usize,
    pub(crate) whitelist_grants: usize,
    pub(crate) daily: String,
    pub(crate) weekly: String,
}

pub(crate) async fn run_demo(config: &AppConfig, args: DemoArgs) -> Result<(), AppError> {
    println!("Applicant review demo");
    let report = execute(config, args).await?;

    println!("Scratch ledger: {}", report.ledger_path.display());
    println!(
        "- {} form(s) submitted | {} accepted | {} rejected",
        report.submitted, report.accepted, report.rejected
    );
    println!(
        "- {} interview(s) passed | {} failed",
        report.interviews_passed, report.interviews_failed
    );
    println!(
        "- grants issued: {} interview | {} whitelist",
        report.interview_grants, report.whitelist_grants
    );
    print!("\n{}", report.daily);
    print!("\n{}", report.weekly);
    Ok(())
}

pub(crate) async fn execute(config: &AppConfig, args: DemoArgs) -> Result<DemoReport, AppError> {
    let scratch_dir = args.scratch_dir.unwrap_or_else(|| {
        std::env::temp_dir().join(format!("review-desk-demo-{}", std::process::id()))
    });
    let ledger_path = scratch_dir.join("wl-log.json");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ledger = open_file_ledger(&ledger_path, &config.ledger, clock.clone())?;
    let questions = Arc::new(config.interview.question_source()?);
    let engine = Arc::new(
        InterviewEngine::new(ledger.clone(), questions, clock.clone())
            .with_idle_timeout(config.interview.idle_timeout),
    );
    let coordinator = Arc::new(ReviewCoordinator::new(
        ledger,
        engine.clone(),
        Arc::new(FactionChoices::default()),
        clock,
    ));
    let sweeper = spawn_idle_sweeper(engine, Duration::from_millis(args.sweep_ms.max(1)));
    let sink = LoggingGrantSink::default();

    let result = script(&coordinator, &sink, args.applicants).await;
    sweeper.abort();
    let mut report = result?;

    report.ledger_path = ledger_path;
    report.interview_grants = sink.count(GrantRole::Interview);
    report.whitelist_grants = sink.count(GrantRole::Whitelist);
    report.daily = render_daily(&coordinator.daily_recap(None));
    report.weekly = render_weekly(&coordinator.weekly_recap());
    info!(
        submitted = report.submitted,
        passed = report.interviews_passed,
        "demo finished"
    );
    Ok(report)
}

type DemoCoordinator = ReviewCoordinator<JsonFileStorage>;

async fn script(
    coordinator: &Arc<DemoCoordinator>,
    sink: &LoggingGrantSink,
    applicants: usize,
) -> Result<DemoReport, AppError> {
    let reviewer = ReviewerId::from("demo-reviewer");
    let factions = Faction::ordered();

    // Forms arrive concurrently; each ledger write runs on the blocking pool.
    let mut submissions = Vec::with_capacity(applicants);
    for index in 0..applicants {
        let coordinator = Arc::clone(coordinator);
        let faction = factions[index % factions.len()];
        submissions.push(tokio::task::spawn_blocking(move || {
            let applicant = ApplicantId(format!("applicant-{index}"));
            coordinator.handle(ReviewEvent::ChooseFaction {
                applicant: applicant.clone(),
                faction,
            })?;
            coordinator.handle(ReviewEvent::SubmitForm {
                applicant,
                submission: SubmissionRef(format!("form-{index}")),
                identity: Some(format!("Demo Character {index}")),
                fields: BTreeMap::from([("age".to_string(), (18 + index).to_string())]),
            })
        }));
    }
    let mut submitted = 0;
    for handle in submissions {
        let outcome = handle.await.map_err(|err| AppError::Io(io::Error::other(err)))??;
        apply(&outcome, sink);
        submitted += 1;
    }

    let mut report = DemoReport {
        ledger_path: PathBuf::new(),
        submitted,
        accepted: 0,
        rejected: 0,
        interviews_passed: 0,
        interviews_failed: 0,
        interview_grants: 0,
        whitelist_grants: 0,
        daily: String::new(),
        weekly: String::new(),
    };

    let mut accepted = Vec::new();
    for index in 0..applicants {
        let applicant = ApplicantId(format!("applicant-{index}"));
        let verdict = if index % 2 == 0 {
            Verdict::Accept
        } else {
            Verdict::Reject
        };
        let outcome = coordinator.handle(ReviewEvent::Decide {
            applicant: applicant.clone(),
            submission: SubmissionRef(format!("form-{index}")),
            reviewer: reviewer.clone(),
            verdict,
        })?;
        apply(&outcome, sink);
        match verdict {
            Verdict::Accept => {
                report.accepted += 1;
                accepted.push(applicant);
            }
            Verdict::Reject => report.rejected += 1,
        }
    }

    // Alternate strong and weak candidates; weak ones are submitted early.
    for (position, applicant) in accepted.into_iter().enumerate() {
        let session = SessionId(format!("oral-{applicant}"));
        coordinator.handle(ReviewEvent::StartInterview {
            session: session.clone(),
            target: applicant,
            reviewer: reviewer.clone(),
        })?;

        let strong = position % 2 == 0;
        let answered = if strong { usize::MAX } else { 9 };
        let mut completion = None;
        let mut question = 0;
        while completion.is_none() && question < answered {
            let outcome = coordinator.handle(ReviewEvent::Answer {
                session: session.clone(),
                reviewer: reviewer.clone(),
                question,
                passed: question % 4 != 3,
            })?;
            if matches!(outcome.outcome, Outcome::InterviewCompleted { .. }) {
                completion = Some(outcome);
            }
            question += 1;
        }
        let outcome = match completion {
            Some(outcome) => outcome,
            None => coordinator.handle(ReviewEvent::Finalize {
                session,
                reviewer: reviewer.clone(),
            })?,
        };

        apply(&outcome, sink);
        if let Outcome::InterviewCompleted { completion } = &outcome.outcome {
            info!(
                applicant = %completion.target,
                result = %completion.result.summary(),
                "demo interview scored"
            );
            if completion.result.pass {
                report.interviews_passed += 1;
            } else {
                report.interviews_failed += 1;
            }
        }
    }

    Ok(report)
}

fn apply(outcome: &ReviewOutcome, sink: &LoggingGrantSink) {
    let grants = perform_grants(&outcome.effects, sink);
    if !grants.all_granted() {
        info!(failed = grants.failed.len(), "some grants were not applied");
    }
}
