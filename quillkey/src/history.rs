use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ConfigError, app_data_dir};

pub const MAX_ENTRIES: usize = 50;
const HISTORY_FILE_NAME: &str = "history.jsonl";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to access history file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize history entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HistoryEntry {
    pub timestamp: DateTime<Local>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub original: String,
    #[serde(default)]
    pub refined: String,
}

#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl HistoryLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn in_app_data_dir() -> Result<Self, ConfigError> {
        Ok(Self::new(app_data_dir()?.join(HISTORY_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, original: &str, refined: &str, model: &str) {
        let entry = HistoryEntry {
            timestamp: Local::now(),
            model: model.to_string(),
            original: original.to_string(),
            refined: refined.to_string(),
        };
        if let Err(err) = self.try_append(&entry) {
            warn!("failed to append history entry: {err}");
        }
    }

    fn try_append(&self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        let line = serde_json::to_string(entry)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))?;
        writeln!(file, "{line}").map_err(|source| self.io_error(source))?;
        drop(file);

        self.trim()
    }

    fn trim(&self) -> Result<(), HistoryError> {
        let entries = self.read_all();
        if entries.len() <= MAX_ENTRIES {
            return Ok(());
        }

        let keep = &entries[entries.len() - MAX_ENTRIES..];
        let mut contents = String::new();
        for entry in keep {
            contents.push_str(&serde_json::to_string(entry)?);
            contents.push('\n');
        }
        fs::write(&self.path, contents).map_err(|source| self.io_error(source))?;
        debug!(dropped = entries.len() - MAX_ENTRIES, "trimmed history");
        Ok(())
    }

    /// All readable entries, oldest first. Malformed lines are skipped and a
    /// missing file reads as empty.
    pub fn read_all(&self) -> Vec<HistoryEntry> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(path = %self.path.display(), "failed to read history: {err}");
                return Vec::new();
            }
        };

        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<HistoryEntry>(line) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    debug!("skipping malformed history line: {err}");
                    None
                }
            })
            .collect()
    }

    fn io_error(&self, source: std::io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
