// store.rs — Folder-per-desire persistence.
//
// Layout under the store root:
//
//   <root>/<desire-id>/manifest.json          current Desire state
//   <root>/<desire-id>/scratchpad.jsonl       append-only reasoning trail
//   <root>/<desire-id>/executions/attempt-NNN.json
//   <root>/<desire-id>/lock.json              writer lease, when held
//   <root>/approvals/<desire-id>.json         pending approval requests
//
// The manifest is written atomically (temp file + rename) so a crash never
// leaves a half-written manifest. Discarding a desire flips its status and
// keeps the folder; the store has no delete operation.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vol_policy::{RiskLevel, TrustLevel};

use crate::desire::Desire;
use crate::error::DesireError;
use crate::execution::DesireExecution;
use crate::scratchpad::{Scratchpad, ScratchpadEntry};
use crate::similarity::desire_similarity;

/// A single-writer lease over one desire's folder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockLease {
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LockLease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A request sitting in the human approval queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalRequest {
    pub desire_id: Uuid,
    pub title: String,
    pub goal: String,
    pub plan_version: u32,
    pub estimated_risk: RiskLevel,
    pub required_trust: TrustLevel,
    pub queued_at: DateTime<Utc>,
}

/// Filesystem-backed desire store.
pub struct DesireStore {
    root: PathBuf,
}

impl DesireStore {
    /// Open a store rooted at `root`, creating the directory tree if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, DesireError> {
        let root = root.into();
        fs::create_dir_all(root.join("approvals")).map_err(|source| DesireError::Io {
            path: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn desire_dir(&self, id: Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn manifest_path(&self, id: Uuid) -> PathBuf {
        self.desire_dir(id).join("manifest.json")
    }

    fn scratchpad_path(&self, id: Uuid) -> PathBuf {
        self.desire_dir(id).join("scratchpad.jsonl")
    }

    fn lock_path(&self, id: Uuid) -> PathBuf {
        self.desire_dir(id).join("lock.json")
    }

    fn approval_path(&self, id: Uuid) -> PathBuf {
        self.root.join("approvals").join(format!("{id}.json"))
    }

    // ── Manifest ──

    /// Persist a brand-new desire. Creates its folder.
    pub fn create(&self, desire: &Desire) -> Result<(), DesireError> {
        let dir = self.desire_dir(desire.id);
        fs::create_dir_all(dir.join("executions")).map_err(|source| DesireError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        self.save(desire)
    }

    /// Write the manifest atomically: temp file in the same directory, then
    /// rename over the old manifest.
    pub fn save(&self, desire: &Desire) -> Result<(), DesireError> {
        let path = self.manifest_path(desire.id);
        if !self.desire_dir(desire.id).exists() {
            return Err(DesireError::NotFound(desire.id));
        }

        let json = serde_json::to_string_pretty(desire)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| DesireError::Io {
            path: tmp.display().to_string(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| DesireError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    pub fn load(&self, id: Uuid) -> Result<Desire, DesireError> {
        let path = self.manifest_path(id);
        if !path.exists() {
            return Err(DesireError::NotFound(id));
        }
        let json = fs::read_to_string(&path).map_err(|source| DesireError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Load every desire in the store, in no particular order.
    ///
    /// Folders with an unreadable manifest are skipped with a warning
    /// rather than failing the whole listing.
    pub fn list(&self) -> Result<Vec<Desire>, DesireError> {
        let mut desires = Vec::new();
        let entries = fs::read_dir(&self.root).map_err(|source| DesireError::Io {
            path: self.root.display().to_string(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| DesireError::Io {
                path: self.root.display().to_string(),
                source,
            })?;
            let Ok(id) = entry.file_name().to_string_lossy().parse::<Uuid>() else {
                continue; // approvals/ and anything else non-desire
            };
            match self.load(id) {
                Ok(desire) => desires.push(desire),
                Err(err) => {
                    tracing::warn!(desire_id = %id, error = %err, "skipping unreadable desire");
                }
            }
        }

        Ok(desires)
    }

    /// Find the most similar existing desire at or above `threshold`.
    ///
    /// Terminal desires are excluded: a completed or discarded desire is
    /// never reinforced back to life.
    pub fn find_similar(
        &self,
        title: &str,
        description: &str,
        threshold: f64,
    ) -> Result<Option<(Desire, f64)>, DesireError> {
        let mut best: Option<(Desire, f64)> = None;

        for candidate in self.list()? {
            if candidate.status.is_terminal() {
                continue;
            }
            let score =
                desire_similarity(title, description, &candidate.title, &candidate.description);
            if score < threshold {
                continue;
            }
            if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
                best = Some((candidate, score));
            }
        }

        Ok(best)
    }

    // ── Scratchpad ──

    /// Append one entry to the desire's scratchpad.
    pub fn append_scratchpad(&self, id: Uuid, entry: ScratchpadEntry) -> Result<(), DesireError> {
        if !self.desire_dir(id).exists() {
            return Err(DesireError::NotFound(id));
        }
        let mut pad = Scratchpad::open(self.scratchpad_path(id))?;
        pad.append(entry)
    }

    pub fn read_scratchpad(&self, id: Uuid) -> Result<Vec<ScratchpadEntry>, DesireError> {
        Scratchpad::read_all(self.scratchpad_path(id))
    }

    pub fn verify_scratchpad(&self, id: Uuid) -> Result<(), DesireError> {
        Scratchpad::verify_chain(self.scratchpad_path(id))
    }

    // ── Execution attempts ──

    /// Persist one execution attempt under executions/attempt-NNN.json.
    /// Attempt numbers are 1-based and assigned by the caller.
    pub fn save_execution(
        &self,
        id: Uuid,
        attempt: u32,
        execution: &DesireExecution,
    ) -> Result<(), DesireError> {
        let dir = self.desire_dir(id).join("executions");
        fs::create_dir_all(&dir).map_err(|source| DesireError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let path = dir.join(format!("attempt-{attempt:03}.json"));
        let json = serde_json::to_string_pretty(execution)?;
        fs::write(&path, json).map_err(|source| DesireError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    /// Load all recorded attempts, oldest first.
    pub fn load_executions(&self, id: Uuid) -> Result<Vec<DesireExecution>, DesireError> {
        let dir = self.desire_dir(id).join("executions");
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(|source| DesireError::Io {
                path: dir.display().to_string(),
                source,
            })?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut attempts = Vec::new();
        for path in paths {
            let json = fs::read_to_string(&path).map_err(|source| DesireError::Io {
                path: path.display().to_string(),
                source,
            })?;
            attempts.push(serde_json::from_str(&json)?);
        }
        Ok(attempts)
    }

    /// The attempt number the next execution should use.
    pub fn next_attempt_number(&self, id: Uuid) -> Result<u32, DesireError> {
        Ok(self.load_executions(id)?.len() as u32 + 1)
    }

    // ── Lock lease ──

    /// Acquire the writer lease for a desire.
    ///
    /// Fails with `Locked` while another owner holds an unexpired lease.
    /// An expired lease is taken over; re-acquiring by the same owner
    /// simply renews the lease.
    pub fn acquire_lock(
        &self,
        id: Uuid,
        owner: &str,
        ttl: Duration,
    ) -> Result<LockLease, DesireError> {
        if !self.desire_dir(id).exists() {
            return Err(DesireError::NotFound(id));
        }
        let path = self.lock_path(id);
        let now = Utc::now();

        if path.exists() {
            let json = fs::read_to_string(&path).map_err(|source| DesireError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let existing: LockLease = serde_json::from_str(&json)?;
            if existing.owner != owner && !existing.is_expired(now) {
                return Err(DesireError::Locked {
                    desire_id: id,
                    owner: existing.owner,
                    expires_at: existing.expires_at.to_rfc3339(),
                });
            }
        }

        let lease = LockLease {
            owner: owner.to_string(),
            acquired_at: now,
            expires_at: now + ttl,
        };
        let json = serde_json::to_string_pretty(&lease)?;
        fs::write(&path, json).map_err(|source| DesireError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(lease)
    }

    /// Release the lease if `owner` holds it. Releasing a lock you don't
    /// hold is a no-op, not an error.
    pub fn release_lock(&self, id: Uuid, owner: &str) -> Result<(), DesireError> {
        let path = self.lock_path(id);
        if !path.exists() {
            return Ok(());
        }
        let json = fs::read_to_string(&path).map_err(|source| DesireError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let existing: LockLease = serde_json::from_str(&json)?;
        if existing.owner == owner {
            fs::remove_file(&path).map_err(|source| DesireError::Io {
                path: path.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    // ── Approval queue ──

    /// Queue a desire for human approval. Same temp-file-then-rename
    /// discipline as the manifest: a crash never leaves a torn entry
    /// under `approvals/`.
    pub fn enqueue_approval(&self, request: &ApprovalRequest) -> Result<(), DesireError> {
        let path = self.approval_path(request.desire_id);
        let json = serde_json::to_string_pretty(request)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| DesireError::Io {
            path: tmp.display().to_string(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| DesireError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    /// All requests currently awaiting a decision, oldest first.
    pub fn pending_approvals(&self) -> Result<Vec<ApprovalRequest>, DesireError> {
        let dir = self.root.join("approvals");
        let mut requests = Vec::new();

        for entry in fs::read_dir(&dir).map_err(|source| DesireError::Io {
            path: dir.display().to_string(),
            source,
        })? {
            let entry = entry.map_err(|source| DesireError::Io {
                path: dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let json = fs::read_to_string(&path).map_err(|source| DesireError::Io {
                path: path.display().to_string(),
                source,
            })?;
            // One unreadable entry must not make the whole queue
            // unreadable. Skip it and keep listing.
            match serde_json::from_str::<ApprovalRequest>(&json) {
                Ok(request) => requests.push(request),
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        %err,
                        "skipping unreadable approval entry"
                    );
                }
            }
        }

        requests.sort_by_key(|r| r.queued_at);
        Ok(requests)
    }

    /// Remove a request from the queue once decided.
    pub fn remove_approval(&self, id: Uuid) -> Result<Option<ApprovalRequest>, DesireError> {
        let path = self.approval_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).map_err(|source| DesireError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let request: ApprovalRequest = serde_json::from_str(&json)?;
        fs::remove_file(&path).map_err(|source| DesireError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Some(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desire::{DesireSource, DesireStatus};
    use crate::execution::{ExecutionStatus, StepResult};
    use crate::scratchpad::EntryKind;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, DesireStore) {
        let dir = tempdir().unwrap();
        let store = DesireStore::new(dir.path().join("desires")).unwrap();
        (dir, store)
    }

    fn sample(title: &str, description: &str) -> Desire {
        Desire::new(
            title,
            description,
            "test",
            DesireSource::Detected,
            RiskLevel::Low,
        )
    }

    #[test]
    fn create_load_round_trip() {
        let (_dir, store) = store();
        let desire = sample("Learn Italian", "conversational italian");
        store.create(&desire).unwrap();

        let loaded = store.load(desire.id).unwrap();
        assert_eq!(loaded, desire);
    }

    #[test]
    fn load_missing_is_not_found() {
        let (_dir, store) = store();
        let result = store.load(Uuid::new_v4());
        assert!(matches!(result, Err(DesireError::NotFound(_))));
    }

    #[test]
    fn save_is_atomic_no_tmp_left_behind() {
        let (_dir, store) = store();
        let mut desire = sample("Learn Italian", "conversational italian");
        store.create(&desire).unwrap();

        desire.transition(DesireStatus::Planning).unwrap();
        store.save(&desire).unwrap();

        let dir = store.root().join(desire.id.to_string());
        let names: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains(&"manifest.json".to_string()));
        assert!(!names.iter().any(|n| n.ends_with(".tmp")));

        assert_eq!(store.load(desire.id).unwrap().status, DesireStatus::Planning);
    }

    #[test]
    fn list_skips_non_desire_entries() {
        let (_dir, store) = store();
        store.create(&sample("a", "a")).unwrap();
        store.create(&sample("b", "b")).unwrap();

        // approvals/ lives under the root but is not a desire.
        let desires = store.list().unwrap();
        assert_eq!(desires.len(), 2);
    }

    #[test]
    fn find_similar_matches_paraphrase() {
        let (_dir, store) = store();
        let existing = sample("Learn Italian", "I want to learn conversational Italian");
        store.create(&existing).unwrap();

        let hit = store
            .find_similar(
                "Start learning the Italian language",
                "Work toward speaking Italian in conversation",
                0.4,
            )
            .unwrap();
        let (found, score) = hit.expect("expected a similar desire");
        assert_eq!(found.id, existing.id);
        assert!(score >= 0.4);
    }

    #[test]
    fn find_similar_ignores_terminal_desires() {
        let (_dir, store) = store();
        let mut existing = sample("Learn Italian", "conversational italian");
        existing.transition(DesireStatus::Discarded).unwrap();
        store.create(&existing).unwrap();

        let hit = store
            .find_similar("Learn Italian", "conversational italian", 0.4)
            .unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn scratchpad_appends_and_verifies() {
        let (_dir, store) = store();
        let desire = sample("a", "a");
        store.create(&desire).unwrap();

        store
            .append_scratchpad(
                desire.id,
                ScratchpadEntry::new(EntryKind::Detected, "detector", "found it"),
            )
            .unwrap();
        store
            .append_scratchpad(
                desire.id,
                ScratchpadEntry::new(EntryKind::StageStarted, "planner", "planning"),
            )
            .unwrap();

        store.verify_scratchpad(desire.id).unwrap();
        assert_eq!(store.read_scratchpad(desire.id).unwrap().len(), 2);
    }

    #[test]
    fn execution_attempts_are_numbered() {
        let (_dir, store) = store();
        let desire = sample("a", "a");
        store.create(&desire).unwrap();

        assert_eq!(store.next_attempt_number(desire.id).unwrap(), 1);

        let mut exec = DesireExecution::start(2);
        exec.record(StepResult::success(1, serde_json::json!("ok")));
        exec.finish(ExecutionStatus::Failed);
        store.save_execution(desire.id, 1, &exec).unwrap();

        assert_eq!(store.next_attempt_number(desire.id).unwrap(), 2);
        let attempts = store.load_executions(desire.id).unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, ExecutionStatus::Failed);
    }

    #[test]
    fn lock_blocks_second_owner() {
        let (_dir, store) = store();
        let desire = sample("a", "a");
        store.create(&desire).unwrap();

        store
            .acquire_lock(desire.id, "session-1", Duration::seconds(60))
            .unwrap();
        let result = store.acquire_lock(desire.id, "session-2", Duration::seconds(60));
        assert!(matches!(result, Err(DesireError::Locked { .. })));

        // Same owner renews freely.
        store
            .acquire_lock(desire.id, "session-1", Duration::seconds(60))
            .unwrap();
    }

    #[test]
    fn expired_lock_is_taken_over() {
        let (_dir, store) = store();
        let desire = sample("a", "a");
        store.create(&desire).unwrap();

        store
            .acquire_lock(desire.id, "session-1", Duration::seconds(-1))
            .unwrap();
        let lease = store
            .acquire_lock(desire.id, "session-2", Duration::seconds(60))
            .unwrap();
        assert_eq!(lease.owner, "session-2");
    }

    #[test]
    fn release_then_reacquire() {
        let (_dir, store) = store();
        let desire = sample("a", "a");
        store.create(&desire).unwrap();

        store
            .acquire_lock(desire.id, "session-1", Duration::seconds(60))
            .unwrap();
        // Releasing someone else's lock is a no-op.
        store.release_lock(desire.id, "session-2").unwrap();
        assert!(matches!(
            store.acquire_lock(desire.id, "session-2", Duration::seconds(60)),
            Err(DesireError::Locked { .. })
        ));

        store.release_lock(desire.id, "session-1").unwrap();
        store
            .acquire_lock(desire.id, "session-2", Duration::seconds(60))
            .unwrap();
    }

    #[test]
    fn approval_queue_round_trip() {
        let (_dir, store) = store();
        let desire = sample("a", "a");
        store.create(&desire).unwrap();

        let request = ApprovalRequest {
            desire_id: desire.id,
            title: desire.title.clone(),
            goal: "do the thing".to_string(),
            plan_version: 1,
            estimated_risk: RiskLevel::Medium,
            required_trust: TrustLevel::Supervised,
            queued_at: Utc::now(),
        };
        store.enqueue_approval(&request).unwrap();

        let pending = store.pending_approvals().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].desire_id, desire.id);

        let removed = store.remove_approval(desire.id).unwrap();
        assert_eq!(removed, Some(request));
        assert!(store.pending_approvals().unwrap().is_empty());
        assert!(store.remove_approval(desire.id).unwrap().is_none());
    }

    #[test]
    fn enqueue_approval_is_atomic_no_tmp_left_behind() {
        let (_dir, store) = store();
        let desire = sample("a", "a");
        store.create(&desire).unwrap();

        store
            .enqueue_approval(&ApprovalRequest {
                desire_id: desire.id,
                title: desire.title.clone(),
                goal: "do the thing".to_string(),
                plan_version: 1,
                estimated_risk: RiskLevel::Low,
                required_trust: TrustLevel::Observed,
                queued_at: Utc::now(),
            })
            .unwrap();

        let names: Vec<String> = std::fs::read_dir(store.root().join("approvals"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{}.json", desire.id)]);
    }

    #[test]
    fn torn_approval_entry_is_skipped_not_fatal() {
        let (_dir, store) = store();
        let desire = sample("a", "a");
        store.create(&desire).unwrap();

        store
            .enqueue_approval(&ApprovalRequest {
                desire_id: desire.id,
                title: desire.title.clone(),
                goal: "do the thing".to_string(),
                plan_version: 1,
                estimated_risk: RiskLevel::Low,
                required_trust: TrustLevel::Observed,
                queued_at: Utc::now(),
            })
            .unwrap();

        // A half-written entry, as a crash mid-write would leave it.
        std::fs::write(
            store
                .root()
                .join("approvals")
                .join(format!("{}.json", Uuid::new_v4())),
            "{\"desire_id\": \"trunc",
        )
        .unwrap();

        let pending = store.pending_approvals().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].desire_id, desire.id);
    }

    #[test]
    fn discarded_desires_keep_their_folder() {
        let (_dir, store) = store();
        let mut desire = sample("a", "a");
        store.create(&desire).unwrap();
        desire.transition(DesireStatus::Discarded).unwrap();
        store.save(&desire).unwrap();

        assert!(store.root().join(desire.id.to_string()).exists());
        assert_eq!(
            store.load(desire.id).unwrap().status,
            DesireStatus::Discarded
        );
    }
}
