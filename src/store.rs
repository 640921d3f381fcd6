//! Flat-file store for completion records.
//!
//! Each record is one pretty-printed JSON file in the completions directory,
//! named `completion_<YYYYMMDD_HHMMSS>.json` when saved. Saved records are
//! never rewritten: the only mutations are renaming (which changes the name
//! segment and keeps the timestamp segment) and deleting.
//!
//! Every failure is returned as a [`StoreError`] whose `Display` text is the
//! message shown to the user.

use chrono::{Local, NaiveDateTime, TimeDelta};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::CompletionRecord;
use crate::naming::{self, DEFAULT_RECORD_PREFIX, TIMESTAMP_FORMAT};

/// Seconds to step forward when a save collides with an existing record.
const MAX_SAVE_ATTEMPTS: i64 = 60;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("A file with name '{0}' already exists.")]
    Collision(String),
    #[error("Invalid completion name '{0}'")]
    InvalidName(String),
    #[error("Error renaming file: {0}")]
    Rename(std::io::Error),
    #[error("Error deleting file: {0}")]
    Delete(std::io::Error),
    #[error("Error saving completion: {0}")]
    Write(std::io::Error),
    #[error("Error reading completion '{name}': {source}")]
    Read {
        name: String,
        source: std::io::Error,
    },
    #[error("Completion '{name}' is not valid JSON: {source}")]
    Parse {
        name: String,
        source: serde_json::Error,
    },
}

pub struct CompletionStore {
    dir: PathBuf,
}

impl CompletionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every parseable record, keyed by file name. Files that are not valid
    /// record JSON are skipped with a warning.
    pub fn list(&self) -> BTreeMap<String, CompletionRecord> {
        let mut records = BTreeMap::new();

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return records,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), "cannot list completions: {}", e);
                return records;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            match self.load(&name) {
                Ok(record) => {
                    records.insert(name, record);
                }
                Err(e) => tracing::warn!("skipping completion: {}", e),
            }
        }

        records
    }

    /// Records sorted by their `timestamp` field, newest first.
    pub fn list_newest_first(&self) -> Vec<(String, CompletionRecord)> {
        let mut records: Vec<_> = self.list().into_iter().collect();
        records.sort_by(|(_, a), (_, b)| {
            let a = a.timestamp.as_deref().unwrap_or("");
            let b = b.timestamp.as_deref().unwrap_or("");
            b.cmp(a)
        });
        records
    }

    pub fn load(&self, filename: &str) -> Result<CompletionRecord, StoreError> {
        let path = self.path_for(filename)?;
        let content = std::fs::read_to_string(&path).map_err(|source| StoreError::Read {
            name: filename.to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            name: filename.to_string(),
            source,
        })
    }

    /// Saves `record` stamped with the current local time.
    pub fn save(&self, record: &mut CompletionRecord) -> Result<String, StoreError> {
        self.save_at(record, Local::now().naive_local())
    }

    /// Saves `record` as `completion_<timestamp>.json` and sets its
    /// `timestamp` field. An existing record is never overwritten: if the
    /// name is taken the timestamp steps forward one second at a time.
    pub fn save_at(
        &self,
        record: &mut CompletionRecord,
        at: NaiveDateTime,
    ) -> Result<String, StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(StoreError::Write)?;

        for offset in 0..MAX_SAVE_ATTEMPTS {
            let stamp = (at + TimeDelta::seconds(offset))
                .format(TIMESTAMP_FORMAT)
                .to_string();
            let filename = format!("{}_{}.json", DEFAULT_RECORD_PREFIX, stamp);

            let mut file = match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.dir.join(&filename))
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StoreError::Write(e)),
            };

            record.timestamp = Some(stamp);
            file.write_all(&to_pretty_json(record)?)
                .map_err(StoreError::Write)?;
            tracing::info!(file = %filename, "saved completion");
            return Ok(filename);
        }

        Err(StoreError::Collision(format!(
            "{}_{}.json",
            DEFAULT_RECORD_PREFIX,
            at.format(TIMESTAMP_FORMAT)
        )))
    }

    /// Renames a record, keeping its timestamp segment.
    ///
    /// The timestamp comes from the old file name's trailing
    /// `YYYYMMDD_HHMMSS` segment, or from the record's `timestamp` field when
    /// the file name has none. A trailing timestamp typed as part of the new
    /// name is replaced by the preserved one, so renaming can never change a
    /// record's timestamp. Without any timestamp the new name is used as-is.
    pub fn rename(&self, old_filename: &str, new_name: &str) -> Result<String, StoreError> {
        let old_path = self.path_for(old_filename)?;

        let display = new_name.trim();
        let display = display.strip_suffix(".json").unwrap_or(display);
        if display.is_empty() {
            return Err(StoreError::InvalidName(new_name.to_string()));
        }
        check_plain_name(display)?;

        let target = match self.preserved_timestamp(old_filename) {
            Some(stamp) => {
                let base = match naming::split_timestamp(display) {
                    Some((prefix, segment)) if naming::parse_timestamp(segment).is_some() => prefix,
                    _ => display,
                };
                let base = if base.is_empty() { DEFAULT_RECORD_PREFIX } else { base };
                format!("{}_{}.json", base, stamp)
            }
            None => format!("{}.json", display),
        };

        let new_path = self.dir.join(&target);
        if new_path.exists() {
            return Err(StoreError::Collision(target));
        }

        std::fs::rename(&old_path, &new_path).map_err(StoreError::Rename)?;
        tracing::info!(from = old_filename, to = %target, "renamed completion");
        Ok(format!("Renamed completion to '{}'", target))
    }

    fn preserved_timestamp(&self, filename: &str) -> Option<String> {
        let stem = filename.strip_suffix(".json").unwrap_or(filename);
        if let Some((_, segment)) = naming::split_timestamp(stem) {
            if naming::parse_timestamp(segment).is_some() {
                return Some(segment.to_string());
            }
        }
        self.load(filename)
            .ok()
            .and_then(|r| r.timestamp)
            .filter(|t| naming::parse_timestamp(t).is_some())
    }

    pub fn delete(&self, filename: &str) -> Result<String, StoreError> {
        let path = self.path_for(filename)?;
        std::fs::remove_file(&path).map_err(StoreError::Delete)?;
        tracing::info!(file = filename, "deleted completion");
        Ok(format!("Deleted completion '{}'", filename))
    }

    fn path_for(&self, filename: &str) -> Result<PathBuf, StoreError> {
        check_plain_name(filename)?;
        if filename.is_empty() {
            return Err(StoreError::InvalidName(filename.to_string()));
        }
        Ok(self.dir.join(filename))
    }
}

/// Record names live in one flat directory.
fn check_plain_name(name: &str) -> Result<(), StoreError> {
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// JSON with four-space indentation, the on-disk record format.
fn to_pretty_json(record: &CompletionRecord) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    record
        .serialize(&mut ser)
        .map_err(|e| StoreError::Write(std::io::Error::other(e)))?;
    Ok(buf)
}
