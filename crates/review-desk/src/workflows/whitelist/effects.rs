use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{ApplicantId, Faction, ReviewerId, SubmissionRef};
use super::interview::InterviewResult;

/// Permission conferred on an applicant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantRole {
    /// Form accepted; the applicant may book the oral interview.
    Interview,
    /// Oral passed; final access.
    Whitelist,
}

impl GrantRole {
    pub const fn label(self) -> &'static str {
        match self {
            GrantRole::Interview => "interview",
            GrantRole::Whitelist => "whitelist",
        }
    }
}

/// Something the host must do after the core has recorded an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SideEffect {
    Grant {
        applicant: ApplicantId,
        role: GrantRole,
    },
    Announce {
        announcement: Announcement,
    },
}

/// Message-worthy events for review logs and result channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Announcement {
    FormSubmitted {
        applicant: ApplicantId,
        submission: SubmissionRef,
        faction: Faction,
    },
    FormAccepted {
        applicant: ApplicantId,
        reviewer: ReviewerId,
        accepted_today: usize,
    },
    FormRejected {
        applicant: ApplicantId,
        reviewer: ReviewerId,
    },
    InterviewFinished {
        applicant: ApplicantId,
        reviewer: ReviewerId,
        result: InterviewResult,
    },
    ManualGrant {
        applicant: ApplicantId,
        reviewer: ReviewerId,
    },
}

/// Outbound hook that confers roles on the chat platform.
pub trait GrantSink: Send + Sync {
    fn grant(&self, applicant: &ApplicantId, role: GrantRole) -> Result<(), GrantError>;
}

/// Grant dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum GrantError {
    #[error("applicant {0} is not a member")]
    MemberNotFound(ApplicantId),
    #[error("grant rejected by platform: {0}")]
    Rejected(String),
}

/// Which grants went through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantReport {
    pub granted: Vec<(ApplicantId, GrantRole)>,
    pub failed: Vec<(ApplicantId, GrantRole, String)>,
}

impl GrantReport {
    pub fn all_granted(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Push every grant effect through `sink`. Failures are logged and reported, never retried.
pub fn perform_grants(effects: &[SideEffect], sink: &dyn GrantSink) -> GrantReport {
    let mut report = GrantReport::default();
    for effect in effects {
        let SideEffect::Grant { applicant, role } = effect else {
            continue;
        };
        match sink.grant(applicant, *role) {
            Ok(()) => {
                info!(applicant = %applicant, role = role.label(), "role granted");
                report.granted.push((applicant.clone(), *role));
            }
            Err(err) => {
                warn!(
                    applicant = %applicant,
                    role = role.label(),
                    error = %err,
                    "role grant failed"
                );
                report
                    .failed
                    .push((applicant.clone(), *role, err.to_string()));
            }
        }
    }
    report
}
