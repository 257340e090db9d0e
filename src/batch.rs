//! Batch numbering: the persisted `{prefix, index}` pair that mints product IDs.
//!
//! All allocation goes through one [`BatchCounter`], which holds the state behind a
//! mutex and only advances the index after the caller's store step succeeded.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_PREFIX: &str = "A";
pub const DEFAULT_INDEX: u64 = 1;
/// Largest index the counter will hold; also the largest `set_batch` accepts.
pub const MAX_INDEX: u64 = i64::MAX as u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub prefix: String,
    pub index: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            prefix: DEFAULT_PREFIX.to_string(),
            index: DEFAULT_INDEX,
        }
    }
}

impl BatchConfig {
    pub fn product_id(&self) -> String {
        format!("{}{}", self.prefix, self.index)
    }
}

/// What to do when the batch file exists but cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CorruptStatePolicy {
    #[default]
    UseDefault,
    Fail,
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("batch prefix {0:?} may not contain path separators or whitespace")]
    InvalidPrefix(String),

    #[error("batch index must be between 1 and {max}, got {0}", max = MAX_INDEX)]
    InvalidIndex(u64),

    #[error("batch {0:?} has no IDs left; set a new batch")]
    Exhausted(String),

    #[error("batch file is corrupt: {0}")]
    Corrupt(String),

    #[error("batch file I/O: {0}")]
    Io(#[from] io::Error),
}

pub struct BatchCounter {
    path: PathBuf,
    state: Mutex<BatchConfig>,
}

impl BatchCounter {
    pub fn open(path: impl Into<PathBuf>, policy: CorruptStatePolicy) -> Result<Self, BatchError> {
        let path = path.into();
        let state = load(&path, policy)?;
        info!(path = %path.display(), next_id = %state.product_id(), "batch counter loaded");
        Ok(BatchCounter {
            path,
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BatchConfig> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> BatchConfig {
        self.lock().clone()
    }

    /// The ID the next successful allocation will hand out.
    pub fn next_id(&self) -> String {
        self.lock().product_id()
    }

    /// Runs `store` with the next ID while holding the counter. The index only
    /// advances when `store` returns `Ok`, so a failed insert never burns an ID
    /// and two callers can never observe the same one.
    pub fn allocate<T, E, F>(&self, store: F) -> Result<T, E>
    where
        F: FnOnce(&str) -> Result<T, E>,
        E: From<BatchError>,
    {
        let mut state = self.lock();
        let next_index = match state.index.checked_add(1).filter(|&i| i <= MAX_INDEX) {
            Some(next) => next,
            None => return Err(BatchError::Exhausted(state.prefix.clone()).into()),
        };
        let id = state.product_id();
        let stored = store(&id)?;

        state.index = next_index;
        if let Err(e) = save(&self.path, &state) {
            warn!(error = %e, id = %id, "failed to persist batch counter; continuing from memory");
        }
        Ok(stored)
    }

    pub fn set(&self, prefix: &str, index: u64) -> Result<BatchConfig, BatchError> {
        let prefix = prefix.trim();
        if prefix.chars().any(|c| c == '/' || c == '\\' || c.is_whitespace()) {
            return Err(BatchError::InvalidPrefix(prefix.to_string()));
        }
        if !(1..=MAX_INDEX).contains(&index) {
            return Err(BatchError::InvalidIndex(index));
        }
        self.replace(BatchConfig {
            prefix: prefix.to_string(),
            index,
        })
    }

    pub fn reset(&self) -> Result<BatchConfig, BatchError> {
        self.replace(BatchConfig::default())
    }

    fn replace(&self, next: BatchConfig) -> Result<BatchConfig, BatchError> {
        let mut state = self.lock();
        save(&self.path, &next)?;
        *state = next.clone();
        Ok(next)
    }
}

fn load(path: &Path, policy: CorruptStatePolicy) -> Result<BatchConfig, BatchError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BatchConfig::default()),
        Err(e) => return Err(e.into()),
    };

    let parsed = serde_json::from_str::<BatchConfig>(&raw)
        .map_err(|e| e.to_string())
        .and_then(|config| {
            if !(1..=MAX_INDEX).contains(&config.index) {
                Err(format!("index {} is outside 1..={}", config.index, MAX_INDEX))
            } else {
                Ok(config)
            }
        });

    match (parsed, policy) {
        (Ok(config), _) => Ok(config),
        (Err(reason), CorruptStatePolicy::UseDefault) => {
            warn!(path = %path.display(), %reason, "ignoring unreadable batch file");
            Ok(BatchConfig::default())
        }
        (Err(reason), CorruptStatePolicy::Fail) => Err(BatchError::Corrupt(reason)),
    }
}

fn save(path: &Path, config: &BatchConfig) -> Result<(), BatchError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(config).map_err(|e| BatchError::Corrupt(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
