//! Durable byte storage behind the submission ledger.
//!
//! The ledger serializes its whole collection on every write, so storage only needs a
//! load/save pair under one logical name.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

/// Byte-oriented load/save pair keyed by a fixed logical name.
pub trait LedgerStorage: Send + Sync {
    /// Logical name used in logs.
    fn name(&self) -> &str;

    /// Latest successfully saved bytes, or `None` when nothing was ever written.
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError>;

    fn save(&self, bytes: &[u8]) -> Result<(), StorageError>;
}

/// Storage failure surfaced to ledger callers.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{operation} failed for {target}: {source}")]
    Io {
        operation: &'static str,
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("ledger document is unreadable: {0}")]
    Corrupt(String),
    #[error("ledger document could not be encoded: {0}")]
    Encode(String),
    #[error("ledger write gave up after {attempts} attempt(s) in {elapsed_ms}ms: {last}")]
    Timeout {
        attempts: u32,
        elapsed_ms: u128,
        last: String,
    },
    #[error("ledger lock poisoned by a panicking writer")]
    Poisoned,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Bounded retry applied to every durable write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    attempts: u32,
    deadline: Duration,
    backoff: Duration,
}

const DEFAULT_BACKOFF: Duration = Duration::from_millis(25);

impl WritePolicy {
    pub fn new(attempts: u32, deadline: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            deadline,
            backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Run `write` until it succeeds, attempts run out, or the deadline passes.
    pub(crate) fn run<F>(&self, target: &str, mut write: F) -> Result<(), StorageError>
    where
        F: FnMut() -> Result<(), StorageError>,
    {
        let started = Instant::now();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match write() {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            let elapsed = started.elapsed();
            if attempt >= self.attempts {
                warn!(
                    target_name = target,
                    attempt,
                    error = %err,
                    "ledger write failed, no attempts left"
                );
                return Err(err);
            }
            if elapsed + self.backoff >= self.deadline {
                warn!(target_name = target, attempt, error = %err, "ledger write deadline reached");
                return Err(StorageError::Timeout {
                    attempts: attempt,
                    elapsed_ms: elapsed.as_millis(),
                    last: err.to_string(),
                });
            }

            warn!(target_name = target, attempt, error = %err, "ledger write failed, retrying");
            thread::sleep(self.backoff);
        }
    }
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// JSON document on the local filesystem, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
    label: String,
}

impl JsonFileStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let label = path.display().to_string();
        Self { path, label }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, operation: &'static str, source: io::Error) -> StorageError {
        StorageError::Io {
            operation,
            target: self.label.clone(),
            source,
        }
    }
}

impl LedgerStorage for JsonFileStorage {
    fn name(&self) -> &str {
        &self.label
    }

    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(self.io_error("read", err)),
        }
    }

    /// Write to a sibling temp file, flush it, then rename over the target.
    fn save(&self, bytes: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.io_error("create dir", err))?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let mut file =
            fs::File::create(&temp_path).map_err(|err| self.io_error("create temp file", err))?;
        file.write_all(bytes)
            .map_err(|err| self.io_error("write temp file", err))?;
        file.sync_all()
            .map_err(|err| self.io_error("sync temp file", err))?;
        drop(file);

        fs::rename(&temp_path, &self.path).map_err(|err| self.io_error("rename", err))
    }
}

/// Process-local storage for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    bytes: Mutex<Option<Vec<u8>>>,
}

impl MemoryStorage {
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Mutex::new(Some(bytes)),
        }
    }

    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.bytes.lock().ok().and_then(|guard| guard.clone())
    }
}

impl LedgerStorage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        let guard = self.bytes.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(guard.clone())
    }

    fn save(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let mut guard = self.bytes.lock().map_err(|_| StorageError::Poisoned)?;
        *guard = Some(bytes.to_vec());
        Ok(())
    }
}
