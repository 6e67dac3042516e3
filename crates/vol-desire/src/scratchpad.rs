// scratchpad.rs — Append-only reasoning trail for one desire.
//
// Every stage of the lifecycle appends an entry here: detection,
// reinforcement, plan adoption, review scores, approval decisions, step
// outcomes. Entries are JSONL, one object per line, and each entry carries
// the SHA-256 of the previous line. Inserting, deleting, or editing any
// line breaks the chain and is detectable with `verify_chain`.
//
// Nothing ever rewrites this file. Discarding a desire appends a final
// entry; it does not truncate.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DesireError;

/// What kind of lifecycle event an entry records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Detected,
    Reinforced,
    StageStarted,
    StageCompleted,
    StageFailed,
    PlanAdopted,
    ReviewRecorded,
    Queued,
    Approved,
    ExecutionStarted,
    StepCompleted,
    ExecutionFinished,
    OutcomeRecorded,
    Discarded,
    Note,
}

/// One line of the scratchpad.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScratchpadEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
    /// Human-readable one-liner.
    pub description: String,
    /// Who produced the entry: a node kind, "system", or a person's id.
    pub actor: String,
    /// Structured payload — review scores, step results, etc.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    /// SHA-256 of the previous line, hex. None only on the first entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
}

impl ScratchpadEntry {
    pub fn new(kind: EntryKind, actor: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            description: description.into(),
            actor: actor.into(),
            data: serde_json::Value::Null,
            previous_hash: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

fn sha256_hex(line: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(line.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// An open scratchpad file, ready to append.
///
/// Reopening an existing file recovers the chain tail first so new entries
/// link correctly across process restarts.
pub struct Scratchpad {
    writer: BufWriter<File>,
    path: PathBuf,
    last_hash: Option<String>,
}

impl Scratchpad {
    /// Open (or create) the scratchpad at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DesireError> {
        let path = path.as_ref().to_path_buf();

        let last_hash = if path.exists() {
            Self::read_last_hash(&path)?
        } else {
            None
        };

        // Append mode only. Existing lines are never overwritten.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| DesireError::Io {
                path: path.display().to_string(),
                source,
            })?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            last_hash,
        })
    }

    /// Append an entry, linking it to the previous line, and flush.
    pub fn append(&mut self, mut entry: ScratchpadEntry) -> Result<(), DesireError> {
        entry.previous_hash = self.last_hash.clone();

        let json = serde_json::to_string(&entry)?;
        self.last_hash = Some(sha256_hex(&json));

        writeln!(self.writer, "{}", json).map_err(|source| DesireError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        self.writer.flush().map_err(|source| DesireError::Io {
            path: self.path.display().to_string(),
            source,
        })?;

        Ok(())
    }

    /// Read every entry, oldest first. Blank lines are skipped.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<ScratchpadEntry>, DesireError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DesireError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for line in reader.lines() {
            let line = line.map_err(|source| DesireError::Io {
                path: path.display().to_string(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }

        Ok(entries)
    }

    /// Verify the hash chain of a scratchpad file.
    ///
    /// Hashes the raw stored lines, not re-serialized entries, so field
    /// ordering in old files can never cause a false alarm.
    pub fn verify_chain(path: impl AsRef<Path>) -> Result<(), DesireError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DesireError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let reader = BufReader::new(file);
        let mut previous_hash: Option<String> = None;

        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| DesireError::Io {
                path: path.display().to_string(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let entry: ScratchpadEntry = serde_json::from_str(&line)?;
            if entry.previous_hash != previous_hash {
                return Err(DesireError::ScratchpadIntegrity { line: idx + 1 });
            }

            previous_hash = Some(sha256_hex(&line));
        }

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_last_hash(path: &Path) -> Result<Option<String>, DesireError> {
        let file = File::open(path).map_err(|source| DesireError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let reader = BufReader::new(file);
        let mut last_line: Option<String> = None;

        for line in reader.lines() {
            let line = line.map_err(|source| DesireError::Io {
                path: path.display().to_string(),
                source,
            })?;
            if !line.trim().is_empty() {
                last_line = Some(line);
            }
        }

        Ok(last_line.map(|line| sha256_hex(&line)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scratchpad.jsonl");

        {
            let mut pad = Scratchpad::open(&path).unwrap();
            pad.append(ScratchpadEntry::new(
                EntryKind::Detected,
                "detector",
                "classified input as a goal",
            ))
            .unwrap();
            pad.append(
                ScratchpadEntry::new(EntryKind::PlanAdopted, "planner", "plan v1 adopted")
                    .with_data(serde_json::json!({"version": 1, "steps": 3})),
            )
            .unwrap();
        }

        let entries = Scratchpad::read_all(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::Detected);
        assert_eq!(entries[1].data["steps"], 3);
    }

    #[test]
    fn first_entry_has_no_previous_hash() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scratchpad.jsonl");

        {
            let mut pad = Scratchpad::open(&path).unwrap();
            pad.append(ScratchpadEntry::new(EntryKind::Note, "system", "hello"))
                .unwrap();
        }

        let entries = Scratchpad::read_all(&path).unwrap();
        assert!(entries[0].previous_hash.is_none());
    }

    #[test]
    fn chain_verifies_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scratchpad.jsonl");

        {
            let mut pad = Scratchpad::open(&path).unwrap();
            pad.append(ScratchpadEntry::new(EntryKind::Detected, "detector", "one"))
                .unwrap();
        }
        {
            let mut pad = Scratchpad::open(&path).unwrap();
            pad.append(ScratchpadEntry::new(EntryKind::Reinforced, "detector", "two"))
                .unwrap();
        }

        Scratchpad::verify_chain(&path).unwrap();
        let entries = Scratchpad::read_all(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[1].previous_hash.is_some());
    }

    #[test]
    fn tampering_is_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scratchpad.jsonl");

        {
            let mut pad = Scratchpad::open(&path).unwrap();
            for i in 0..3 {
                pad.append(ScratchpadEntry::new(
                    EntryKind::Note,
                    "system",
                    format!("entry {i}"),
                ))
                .unwrap();
            }
        }

        // Drop the middle line.
        let contents = std::fs::read_to_string(&path).unwrap();
        let kept: Vec<&str> = contents
            .lines()
            .enumerate()
            .filter(|(i, _)| *i != 1)
            .map(|(_, l)| l)
            .collect();
        std::fs::write(&path, kept.join("\n")).unwrap();

        let result = Scratchpad::verify_chain(&path);
        assert!(matches!(
            result,
            Err(DesireError::ScratchpadIntegrity { line: 2 })
        ));
    }
}
