use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier of a candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicantId(pub String);

/// Opaque handle of one posted form instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionRef(pub String);

/// Identifier of a human reviewer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewerId(pub String);

/// Opaque handle of a rendered interview form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

macro_rules! display_newtype {
    ($($name:ident),*) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $name {
                fn from(value: &str) -> Self {
                    Self(value.to_string())
                }
            }
        )*
    };
}

display_newtype!(ApplicantId, SubmissionRef, ReviewerId, SessionId);

/// Faction picked by the applicant before the form opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Faction {
    Konoha,
    Suna,
    #[serde(other)]
    Other,
}

impl Faction {
    pub const fn ordered() -> [Self; 3] {
        [Self::Konoha, Self::Suna, Self::Other]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Faction::Konoha => "Konoha",
            Faction::Suna => "Suna",
            Faction::Other => "Other",
        }
    }
}

/// Recorded verdict. Absence of a status means the submission is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Accepted,
    Rejected,
    AcceptedFinal,
}

impl SubmissionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            SubmissionStatus::Accepted => "accepted",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::AcceptedFinal => "accepted_final",
        }
    }
}

/// Verdict a reviewer may record on a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accept,
    Reject,
}

impl From<Verdict> for SubmissionStatus {
    fn from(value: Verdict) -> Self {
        match value {
            Verdict::Accept => SubmissionStatus::Accepted,
            Verdict::Reject => SubmissionStatus::Rejected,
        }
    }
}

/// Review phase that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStage {
    Form,
    Vocal,
}

impl ReviewStage {
    pub const fn label(self) -> &'static str {
        match self {
            ReviewStage::Form => "form",
            ReviewStage::Vocal => "vocal",
        }
    }
}

/// One application event as stored in the ledger.
///
/// Records are keyed by `(applicant_id, submission_ref)`. Grant-only records created for an
/// applicant with no prior submission carry no `submission_ref`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub applicant_id: ApplicantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_ref: Option<SubmissionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faction: Option<Faction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SubmissionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<ReviewerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<ReviewStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granted_by: Option<ReviewerId>,
}

impl SubmissionRecord {
    pub fn status_label(&self) -> &'static str {
        self.status.map(SubmissionStatus::label).unwrap_or("pending")
    }

    pub fn is_pending(&self) -> bool {
        self.status.is_none()
    }

    pub fn matches(&self, applicant_id: &ApplicantId, submission_ref: &SubmissionRef) -> bool {
        &self.applicant_id == applicant_id && self.submission_ref.as_ref() == Some(submission_ref)
    }

    /// Ordering key used when an operation only knows the applicant.
    ///
    /// Primary: submission time, falling back to decision time. Secondary: the latest of
    /// decision and grant time. Records with no timestamps rank lowest.
    pub(crate) fn recency(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let primary = self.submitted_at.or(self.decided_at);
        let secondary = match (self.decided_at, self.granted_at) {
            (Some(decided), Some(granted)) => Some(decided.max(granted)),
            (decided, granted) => decided.or(granted),
        };
        (primary, secondary)
    }
}

/// Upsert payload. The key fields are mandatory; every other field is merged when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionEntry {
    pub applicant_id: ApplicantId,
    pub submission_ref: SubmissionRef,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub faction: Option<Faction>,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl SubmissionEntry {
    pub fn new(applicant_id: impl Into<String>, submission_ref: impl Into<String>) -> Self {
        Self {
            applicant_id: ApplicantId(applicant_id.into()),
            submission_ref: SubmissionRef(submission_ref.into()),
            ..Self::default()
        }
    }

    pub(crate) fn into_record(self) -> SubmissionRecord {
        SubmissionRecord {
            applicant_id: self.applicant_id,
            submission_ref: Some(self.submission_ref),
            submitted_at: self.submitted_at,
            faction: self.faction,
            identity: self.identity,
            fields: self.fields,
            ..SubmissionRecord::default()
        }
    }

    /// Merge into an existing record; the entry wins on every field it carries except the
    /// submission time, which is write-once.
    pub(crate) fn merge_into(self, record: &mut SubmissionRecord) {
        if record.submitted_at.is_none() {
            record.submitted_at = self.submitted_at;
        }
        if let Some(faction) = self.faction {
            record.faction = Some(faction);
        }
        if let Some(identity) = self.identity {
            record.identity = Some(identity);
        }
        record.fields.extend(self.fields);
    }
}
