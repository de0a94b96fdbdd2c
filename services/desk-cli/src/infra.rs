use chrono::NaiveDate;
use review_desk::clock::Clock;
use review_desk::config::LedgerConfig;
use review_desk::error::AppError;
use review_desk::workflows::whitelist::{
    ApplicantId, GrantError, GrantRole, GrantSink, InterviewEngine, JsonFileStorage, Ledger,
    LedgerStorage,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub(crate) fn open_file_ledger(
    path: &Path,
    config: &LedgerConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<Ledger<JsonFileStorage>>, AppError> {
    let storage = Arc::new(JsonFileStorage::new(path));
    let ledger = Ledger::open(storage, clock, config.write_policy())?;
    Ok(Arc::new(ledger))
}

/// Grant sink for hosts without a chat platform: logs each grant and keeps a tally.
#[derive(Default, Clone)]
pub(crate) struct LoggingGrantSink {
    granted: Arc<Mutex<Vec<(ApplicantId, GrantRole)>>>,
}

impl LoggingGrantSink {
    pub(crate) fn granted(&self) -> Vec<(ApplicantId, GrantRole)> {
        self.granted
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, role: GrantRole) -> usize {
        self.granted()
            .iter()
            .filter(|(_, granted)| *granted == role)
            .count()
    }
}

impl GrantSink for LoggingGrantSink {
    fn grant(&self, applicant: &ApplicantId, role: GrantRole) -> Result<(), GrantError> {
        let mut guard = self
            .granted
            .lock()
            .map_err(|_| GrantError::Rejected("grant log unavailable".to_string()))?;
        guard.push((applicant.clone(), role));
        info!(applicant = %applicant, role = role.label(), "dry-run grant");
        Ok(())
    }
}

/// Periodically evict abandoned interviews until the returned handle is aborted.
pub(crate) fn spawn_idle_sweeper<S>(
    engine: Arc<InterviewEngine<S>>,
    period: Duration,
) -> JoinHandle<()>
where
    S: LedgerStorage + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let evicted = engine.evict_idle();
            if !evicted.is_empty() {
                debug!(count = evicted.len(), "idle sweeper evicted sessions");
            }
        }
    })
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
