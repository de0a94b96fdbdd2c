use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;

use super::super::domain::{Faction, ReviewStage, ReviewerId, SubmissionRecord, SubmissionStatus};

/// Reviewer bucket for decisions recorded without a reviewer.
pub const UNKNOWN_REVIEWER: &str = "unknown";

/// Submissions received on one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailySummary {
    pub day: NaiveDate,
    pub total: usize,
    pub treated: usize,
    pub pending: usize,
    pub by_faction: BTreeMap<Faction, usize>,
}

impl DailySummary {
    pub(crate) fn collect<'a>(
        day: NaiveDate,
        records: impl IntoIterator<Item = &'a SubmissionRecord>,
    ) -> Self {
        let mut by_faction: BTreeMap<Faction, usize> =
            Faction::ordered().into_iter().map(|f| (f, 0)).collect();
        let mut total = 0;
        let mut treated = 0;
        let mut pending = 0;

        let todays = records.into_iter().filter(|record| {
            record
                .submitted_at
                .is_some_and(|submitted| submitted.date_naive() == day)
        });
        for record in todays {
            total += 1;
            match record.status {
                Some(SubmissionStatus::Accepted | SubmissionStatus::Rejected) => treated += 1,
                None => pending += 1,
                Some(SubmissionStatus::AcceptedFinal) => {}
            }
            *by_faction
                .entry(record.faction.unwrap_or(Faction::Other))
                .or_insert(0) += 1;
        }

        Self {
            day,
            total,
            treated,
            pending,
            by_faction,
        }
    }

    pub fn count_for(&self, faction: Faction) -> usize {
        self.by_faction.get(&faction).copied().unwrap_or(0)
    }
}

/// Decisions per reviewer since the start of the current UTC week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeeklySummary {
    pub week_start: DateTime<Utc>,
    pub per_reviewer: BTreeMap<String, usize>,
}

impl WeeklySummary {
    pub(crate) fn collect<'a>(
        now: DateTime<Utc>,
        records: impl IntoIterator<Item = &'a SubmissionRecord>,
    ) -> Self {
        let week_start = week_start(now);
        let mut per_reviewer = BTreeMap::new();
        for record in records {
            let Some(decided_at) = record.decided_at else {
                continue;
            };
            if decided_at < week_start {
                continue;
            }
            let reviewer = record
                .reviewer_id
                .as_ref()
                .map(|id| id.0.clone())
                .unwrap_or_else(|| UNKNOWN_REVIEWER.to_string());
            *per_reviewer.entry(reviewer).or_insert(0) += 1;
        }

        Self {
            week_start,
            per_reviewer,
        }
    }

    pub fn total(&self) -> usize {
        self.per_reviewer.values().sum()
    }
}

/// Monday 00:00 UTC of the week containing `now`; Sunday belongs to the week that began six
/// days earlier.
pub fn week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let days_since_monday = i64::from(today.weekday().num_days_from_monday());
    let monday = today - Duration::days(days_since_monday);
    monday.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Acceptances a reviewer recorded on the UTC day of `now`.
///
/// Without a stage this counts `accepted` decisions. With a stage it counts every record of
/// that stage attributed to the reviewer whose decision time (or grant time, when no decision
/// was recorded) falls on the day.
pub(crate) fn count_accepted_on<'a>(
    now: DateTime<Utc>,
    reviewer: &ReviewerId,
    stage: Option<ReviewStage>,
    records: impl IntoIterator<Item = &'a SubmissionRecord>,
) -> usize {
    let today = now.date_naive();
    records
        .into_iter()
        .filter(|record| record.reviewer_id.as_ref() == Some(reviewer))
        .filter(|record| match stage {
            None => {
                record.status == Some(SubmissionStatus::Accepted)
                    && record.decided_at.is_some_and(|at| at.date_naive() == today)
            }
            Some(stage) => {
                record.stage == Some(stage)
                    && record
                        .decided_at
                        .or(record.granted_at)
                        .is_some_and(|at| at.date_naive() == today)
            }
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn week_starts_on_monday_midnight() {
        // 2024-01-10 is a Wednesday.
        let wednesday = Utc.with_ymd_and_hms(2024, 1, 10, 15, 30, 0).unwrap();
        assert_eq!(
            week_start(wednesday),
            Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap()
        );

        let monday = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        assert_eq!(week_start(monday), monday);
    }

    #[test]
    fn sunday_maps_to_previous_monday() {
        let sunday = Utc.with_ymd_and_hms(2024, 1, 14, 23, 59, 59).unwrap();
        assert_eq!(
            week_start(sunday),
            Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap()
        );
    }
}
