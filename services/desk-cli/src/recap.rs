use crate::infra::{open_file_ledger, parse_date};
use chrono::NaiveDate;
use clap::Args;
use review_desk::clock::SystemClock;
use review_desk::config::AppConfig;
use review_desk::error::AppError;
use review_desk::workflows::whitelist::{DailySummary, Faction, WeeklySummary};
use std::fmt::Write as _;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Args, Debug, Default)]
pub(crate) struct DailyArgs {
    /// UTC day to summarize (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) date: Option<NaiveDate>,
    /// Print the summary as JSON instead of text.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct WeeklyArgs {
    /// Print the summary as JSON instead of text.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ExportArgs {
    /// Destination CSV file. Defaults to stdout.
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

pub(crate) fn run_daily(config: &AppConfig, args: DailyArgs) -> Result<(), AppError> {
    let ledger = open_file_ledger(&config.ledger.path, &config.ledger, Arc::new(SystemClock))?;
    let summary = ledger.summarize_daily_by_faction(args.date);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render_daily(&summary));
    }
    Ok(())
}

pub(crate) fn run_weekly(config: &AppConfig, args: WeeklyArgs) -> Result<(), AppError> {
    let ledger = open_file_ledger(&config.ledger.path, &config.ledger, Arc::new(SystemClock))?;
    let summary = ledger.summarize_weekly_by_reviewer();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render_weekly(&summary));
    }
    Ok(())
}

pub(crate) fn run_export(config: &AppConfig, args: ExportArgs) -> Result<(), AppError> {
    let ledger = open_file_ledger(&config.ledger.path, &config.ledger, Arc::new(SystemClock))?;
    let rows = match &args.output {
        Some(path) => ledger.export_csv(File::create(path)?)?,
        None => ledger.export_csv(io::stdout().lock())?,
    };
    info!(rows, destination = ?args.output, "ledger exported");
    Ok(())
}

pub(crate) fn render_daily(summary: &DailySummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Daily recap for {}", summary.day.format("%Y-%m-%d"));
    let _ = writeln!(
        out,
        "- {} submission(s) | {} treated | {} pending",
        summary.total, summary.treated, summary.pending
    );
    for faction in Faction::ordered() {
        let _ = writeln!(out, "  - {}: {}", faction.label(), summary.count_for(faction));
    }
    out
}

pub(crate) fn render_weekly(summary: &WeeklySummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Weekly recap since {}",
        summary.week_start.format("%Y-%m-%d %H:%M UTC")
    );
    if summary.per_reviewer.is_empty() {
        let _ = writeln!(out, "- no decisions recorded this week");
        return out;
    }

    let mut ranked: Vec<(&String, &usize)> = summary.per_reviewer.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (reviewer, count) in ranked {
        let _ = writeln!(out, "- {reviewer}: {count} decision(s)");
    }
    let _ = writeln!(out, "Total: {}", summary.total());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    #[test]
    fn daily_render_lists_every_faction() {
        let summary = DailySummary {
            day: NaiveDate::from_ymd_opt(2024, 1, 10).expect("valid date"),
            total: 3,
            treated: 2,
            pending: 1,
            by_faction: BTreeMap::from([(Faction::Konoha, 2), (Faction::Suna, 1)]),
        };
        let text = render_daily(&summary);
        assert!(text.starts_with("Daily recap for 2024-01-10"));
        assert!(text.contains("3 submission(s) | 2 treated | 1 pending"));
        assert!(text.contains("Konoha: 2"));
        assert!(text.contains("Other: 0"));
    }

    #[test]
    fn weekly_render_ranks_reviewers() {
        let summary = WeeklySummary {
            week_start: Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap(),
            per_reviewer: BTreeMap::from([
                ("alice".to_string(), 2),
                ("bob".to_string(), 5),
                ("unknown".to_string(), 1),
            ]),
        };
        let text = render_weekly(&summary);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Weekly recap since 2024-01-08 00:00 UTC");
        assert_eq!(lines[1], "- bob: 5 decision(s)");
        assert_eq!(lines[2], "- alice: 2 decision(s)");
        assert_eq!(lines.last(), Some(&"Total: 8"));
    }

    #[test]
    fn weekly_render_handles_quiet_weeks() {
        let summary = WeeklySummary {
            week_start: Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap(),
            per_reviewer: BTreeMap::new(),
        };
        assert!(render_weekly(&summary).contains("no decisions recorded"));
    }
}
