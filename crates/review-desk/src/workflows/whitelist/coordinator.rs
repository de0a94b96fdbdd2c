use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{
    ApplicantId, Faction, ReviewStage, ReviewerId, SessionId, SubmissionEntry, SubmissionRecord,
    SubmissionRef, Verdict,
};
use super::effects::{Announcement, GrantRole, SideEffect};
use super::error::ReviewError;
use super::interview::{AnswerOutcome, InterviewCompletion, InterviewEngine, PageStep, SessionView};
use super::ledger::{DailySummary, Ledger, LedgerStorage, WeeklySummary};
use crate::clock::Clock;

/// Faction picks waiting for the applicant's form, keyed by applicant.
#[derive(Debug, Default)]
pub struct FactionChoices {
    pending: Mutex<HashMap<ApplicantId, Faction>>,
}

impl FactionChoices {
    pub fn choose(&self, applicant: ApplicantId, faction: Faction) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(applicant, faction);
    }

    pub fn peek(&self, applicant: &ApplicantId) -> Option<Faction> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(applicant)
            .copied()
    }

    fn clear(&self, applicant: &ApplicantId) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(applicant);
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Inbound event from the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReviewEvent {
    ChooseFaction {
        applicant: ApplicantId,
        faction: Faction,
    },
    SubmitForm {
        applicant: ApplicantId,
        submission: SubmissionRef,
        #[serde(default)]
        identity: Option<String>,
        #[serde(default)]
        fields: BTreeMap<String, String>,
    },
    Decide {
        applicant: ApplicantId,
        submission: SubmissionRef,
        reviewer: ReviewerId,
        verdict: Verdict,
    },
    StartInterview {
        session: SessionId,
        target: ApplicantId,
        reviewer: ReviewerId,
    },
    Answer {
        session: SessionId,
        reviewer: ReviewerId,
        question: usize,
        passed: bool,
    },
    TurnPage {
        session: SessionId,
        reviewer: ReviewerId,
        step: PageStep,
    },
    Finalize {
        session: SessionId,
        reviewer: ReviewerId,
    },
    ManualGrant {
        applicant: ApplicantId,
        reviewer: ReviewerId,
    },
}

impl ReviewEvent {
    pub const fn label(&self) -> &'static str {
        match self {
            ReviewEvent::ChooseFaction { .. } => "choose_faction",
            ReviewEvent::SubmitForm { .. } => "submit_form",
            ReviewEvent::Decide { .. } => "decide",
            ReviewEvent::StartInterview { .. } => "start_interview",
            ReviewEvent::Answer { .. } => "answer",
            ReviewEvent::TurnPage { .. } => "turn_page",
            ReviewEvent::Finalize { .. } => "finalize",
            ReviewEvent::ManualGrant { .. } => "manual_grant",
        }
    }
}

/// What the core recorded for an event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    FactionNoted {
        applicant: ApplicantId,
        faction: Faction,
    },
    Submitted {
        record: SubmissionRecord,
    },
    Decided {
        record: SubmissionRecord,
    },
    Session {
        view: SessionView,
    },
    InterviewCompleted {
        completion: InterviewCompletion,
    },
    GrantIssued {
        applicant: ApplicantId,
    },
}

/// Recorded outcome plus the side effects the host must perform.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub outcome: Outcome,
    pub effects: Vec<SideEffect>,
}

impl ReviewOutcome {
    fn quiet(outcome: Outcome) -> Self {
        Self {
            outcome,
            effects: Vec::new(),
        }
    }

    pub fn grants(&self) -> impl Iterator<Item = (&ApplicantId, GrantRole)> {
        self.effects.iter().filter_map(|effect| match effect {
            SideEffect::Grant { applicant, role } => Some((applicant, *role)),
            SideEffect::Announce { .. } => None,
        })
    }
}

/// Translates review events into ledger and engine calls.
pub struct ReviewCoordinator<S> {
    ledger: Arc<Ledger<S>>,
    engine: Arc<InterviewEngine<S>>,
    factions: Arc<FactionChoices>,
    clock: Arc<dyn Clock>,
}

impl<S> ReviewCoordinator<S>
where
    S: LedgerStorage,
{
    pub fn new(
        ledger: Arc<Ledger<S>>,
        engine: Arc<InterviewEngine<S>>,
        factions: Arc<FactionChoices>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            engine,
            factions,
            clock,
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger<S>> {
        &self.ledger
    }

    pub fn engine(&self) -> &Arc<InterviewEngine<S>> {
        &self.engine
    }

    /// Dispatch one event. Errors carry a stable `reason_code()` for rendering.
    pub fn handle(&self, event: ReviewEvent) -> Result<ReviewOutcome, ReviewError> {
        let label = event.label();
        let result = self.dispatch(event);
        match &result {
            Ok(outcome) => info!(
                event = label,
                effects = outcome.effects.len(),
                "review event handled"
            ),
            Err(err) => warn!(
                event = label,
                reason = err.reason_code(),
                error = %err,
                "review event failed"
            ),
        }
        result
    }

    fn dispatch(&self, event: ReviewEvent) -> Result<ReviewOutcome, ReviewError> {
        match event {
            ReviewEvent::ChooseFaction { applicant, faction } => {
                self.factions.choose(applicant.clone(), faction);
                Ok(ReviewOutcome::quiet(Outcome::FactionNoted { applicant, faction }))
            }
            ReviewEvent::SubmitForm {
                applicant,
                submission,
                identity,
                fields,
            } => self.submit_form(applicant, submission, identity, fields),
            ReviewEvent::Decide {
                applicant,
                submission,
                reviewer,
                verdict,
            } => self.decide(&applicant, &submission, &reviewer, verdict),
            ReviewEvent::StartInterview {
                session,
                target,
                reviewer,
            } => {
                let view = self.engine.create_session(session, target, reviewer)?;
                Ok(ReviewOutcome::quiet(Outcome::Session { view }))
            }
            ReviewEvent::Answer {
                session,
                reviewer,
                question,
                passed,
            } => match self.engine.answer(&session, &reviewer, question, passed)? {
                AnswerOutcome::Recorded(view) => {
                    Ok(ReviewOutcome::quiet(Outcome::Session { view }))
                }
                AnswerOutcome::Completed(completion) => Ok(Self::completed(completion)),
            },
            ReviewEvent::TurnPage {
                session,
                reviewer,
                step,
            } => {
                let view = self.engine.turn_page(&session, &reviewer, step)?;
                Ok(ReviewOutcome::quiet(Outcome::Session { view }))
            }
            ReviewEvent::Finalize { session, reviewer } => {
                let completion = self.engine.finalize(&session, &reviewer)?;
                Ok(Self::completed(completion))
            }
            ReviewEvent::ManualGrant { applicant, .. } if applicant.0.trim().is_empty() => Err(
                ReviewError::invalid("manual grant requires an applicant id"),
            ),
            ReviewEvent::ManualGrant {
                applicant,
                reviewer,
            } => Ok(ReviewOutcome {
                outcome: Outcome::GrantIssued {
                    applicant: applicant.clone(),
                },
                effects: vec![
                    SideEffect::Grant {
                        applicant: applicant.clone(),
                        role: GrantRole::Whitelist,
                    },
                    SideEffect::Announce {
                        announcement: Announcement::ManualGrant {
                            applicant,
                            reviewer,
                        },
                    },
                ],
            }),
        }
    }

    fn submit_form(
        &self,
        applicant: ApplicantId,
        submission: SubmissionRef,
        identity: Option<String>,
        fields: BTreeMap<String, String>,
    ) -> Result<ReviewOutcome, ReviewError> {
        let faction = self.factions.peek(&applicant).unwrap_or(Faction::Other);
        let entry = SubmissionEntry {
            applicant_id: applicant.clone(),
            submission_ref: submission.clone(),
            submitted_at: Some(self.clock.now()),
            faction: Some(faction),
            identity,
            fields,
        };

        let record = self.ledger.upsert(entry)?;
        self.factions.clear(&applicant);

        Ok(ReviewOutcome {
            outcome: Outcome::Submitted { record },
            effects: vec![SideEffect::Announce {
                announcement: Announcement::FormSubmitted {
                    applicant,
                    submission,
                    faction,
                },
            }],
        })
    }

    fn decide(
        &self,
        applicant: &ApplicantId,
        submission: &SubmissionRef,
        reviewer: &ReviewerId,
        verdict: Verdict,
    ) -> Result<ReviewOutcome, ReviewError> {
        let record = self.ledger.mark_decision(
            applicant,
            submission,
            verdict,
            reviewer,
            Some(ReviewStage::Form),
        )?;

        let effects = match verdict {
            Verdict::Accept => {
                let accepted_today = self
                    .ledger
                    .count_accepted_today_by_reviewer(reviewer, Some(ReviewStage::Form));
                vec![
                    SideEffect::Grant {
                        applicant: applicant.clone(),
                        role: GrantRole::Interview,
                    },
                    SideEffect::Announce {
                        announcement: Announcement::FormAccepted {
                            applicant: applicant.clone(),
                            reviewer: reviewer.clone(),
                            accepted_today,
                        },
                    },
                ]
            }
            Verdict::Reject => vec![SideEffect::Announce {
                announcement: Announcement::FormRejected {
                    applicant: applicant.clone(),
                    reviewer: reviewer.clone(),
                },
            }],
        };

        Ok(ReviewOutcome {
            outcome: Outcome::Decided { record },
            effects,
        })
    }

    fn completed(completion: InterviewCompletion) -> ReviewOutcome {
        let mut effects = Vec::with_capacity(2);
        if completion.result.pass {
            effects.push(SideEffect::Grant {
                applicant: completion.target.clone(),
                role: GrantRole::Whitelist,
            });
        }
        effects.push(SideEffect::Announce {
            announcement: Announcement::InterviewFinished {
                applicant: completion.target.clone(),
                reviewer: completion.reviewer.clone(),
                result: completion.result,
            },
        });

        ReviewOutcome {
            outcome: Outcome::InterviewCompleted { completion },
            effects,
        }
    }

    pub fn daily_recap(&self, day: Option<NaiveDate>) -> DailySummary {
        self.ledger.summarize_daily_by_faction(day)
    }

    pub fn weekly_recap(&self) -> WeeklySummary {
        self.ledger.summarize_weekly_by_reviewer()
    }
}
