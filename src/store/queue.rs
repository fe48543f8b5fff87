//! Directory-backed approval queue.
//!
//! Each request id owns two sibling files in the queue directory:
//!
//! ```text
//! <id>.request.json    written by the hook before we ever see it
//! <id>.response.json   written here, exactly once, when a human decides
//! ```
//!
//! "Request exists and response doesn't" is the pending predicate. It is
//! evaluated fresh on every scan because the hook and this server share
//! nothing but the directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use super::{is_valid_id, write_atomic};
use crate::liveness::LivenessCheck;
use crate::models::approval::{record_owner_pid, ApprovalRequest, ApprovalResponse, Decision};

const REQUEST_SUFFIX: &str = ".request.json";
const RESPONSE_SUFFIX: &str = ".response.json";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("request '{0}' not found")]
    NotFound(String),

    #[error("request '{0}' already has a decision")]
    AlreadyResolved(String),

    #[error("malformed record {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl QueueError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        QueueError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Outcome of one reconciliation pass over the directory.
#[derive(Debug, Default)]
pub struct Scan {
    pub pending: Vec<ApprovalRequest>,
    pub pruned: usize,
}

pub struct QueueStore {
    root: PathBuf,
    liveness: Arc<dyn LivenessCheck>,
    // Serializes the exists-check and the write in `commit`.
    commit_lock: Mutex<()>,
}

impl QueueStore {
    pub fn new(root: impl Into<PathBuf>, liveness: Arc<dyn LivenessCheck>) -> Self {
        Self {
            root: root.into(),
            liveness,
            commit_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn request_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}{REQUEST_SUFFIX}"))
    }

    pub fn response_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}{RESPONSE_SUFFIX}"))
    }

    /// Create the queue directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<(), QueueError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| QueueError::io(&self.root, e))
    }

    /// Pending requests in file-name order. Dead requesters' records are
    /// deleted as a side effect.
    pub async fn list_pending(&self) -> Result<Vec<ApprovalRequest>, QueueError> {
        Ok(self.scan().await?.pending)
    }

    /// Run a reconciliation pass and report how many records were pruned.
    pub async fn prune_orphans(&self) -> Result<usize, QueueError> {
        Ok(self.scan().await?.pruned)
    }

    /// Walk every request record once. Unreadable, half-written or corrupt
    /// records are skipped and left in place; the hook may still be
    /// writing them.
    pub async fn scan(&self) -> Result<Scan, QueueError> {
        let mut scan = Scan::default();

        for id in self.request_ids().await? {
            if self.response_exists(&id).await.unwrap_or(false) {
                continue;
            }

            let path = self.request_path(&id);
            let record = match self.read_record(&path).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(id = %id, error = %e, "skipping unreadable request record");
                    continue;
                }
            };

            // Liveness is decided from the raw record so that display
            // fields of an unexpected shape never block pruning.
            if let Some(pid) = record_owner_pid(&record) {
                if !self.liveness.is_alive(pid) {
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => {
                            tracing::info!(id = %id, pid, "pruned request from dead requester");
                            scan.pruned += 1;
                        }
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => {
                            tracing::warn!(id = %id, pid, error = %e, "failed to prune request record");
                        }
                    }
                    continue;
                }
            }

            let mut request: ApprovalRequest = match serde_json::from_value(record) {
                Ok(request) => request,
                Err(e) => {
                    tracing::debug!(id = %id, error = %e, "skipping request record with unexpected shape");
                    continue;
                }
            };
            request.id = id;
            scan.pending.push(request);
        }

        Ok(scan)
    }

    /// Read the request record for `id`. `Ok(None)` if it does not exist.
    pub async fn load(&self, id: &str) -> Result<Option<ApprovalRequest>, QueueError> {
        if !is_valid_id(id) {
            return Ok(None);
        }
        let mut request = self.read_request(&self.request_path(id)).await?;
        if let Some(request) = request.as_mut() {
            request.id = id.to_string();
        }
        Ok(request)
    }

    pub async fn request_exists(&self, id: &str) -> Result<bool, QueueError> {
        if !is_valid_id(id) {
            return Ok(false);
        }
        let path = self.request_path(id);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| QueueError::io(&path, e))
    }

    pub async fn response_exists(&self, id: &str) -> Result<bool, QueueError> {
        if !is_valid_id(id) {
            return Ok(false);
        }
        let path = self.response_path(id);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| QueueError::io(&path, e))
    }

    /// Write the response record for `id`.
    ///
    /// Fails with `NotFound` when no request record exists (nothing is
    /// written) and with `AlreadyResolved` when a decision was already
    /// committed (the existing record is left alone).
    pub async fn commit(&self, id: &str, decision: Decision) -> Result<(), QueueError> {
        if !is_valid_id(id) {
            return Err(QueueError::NotFound(id.to_string()));
        }

        let _guard = self.commit_lock.lock().await;

        if !self.request_exists(id).await? {
            return Err(QueueError::NotFound(id.to_string()));
        }
        if self.response_exists(id).await? {
            return Err(QueueError::AlreadyResolved(id.to_string()));
        }

        let path = self.response_path(id);
        let body = serde_json::to_vec(&ApprovalResponse { decision })
            .map_err(|e| QueueError::io(&path, e.into()))?;
        write_atomic(&path, &body)
            .await
            .map_err(|e| QueueError::io(&path, e))?;

        tracing::info!(id = %id, decision = %decision, "committed response");
        Ok(())
    }

    /// Read back a committed response record.
    pub async fn read_response(&self, id: &str) -> Result<Option<ApprovalResponse>, QueueError> {
        if !is_valid_id(id) {
            return Ok(None);
        }
        let path = self.response_path(id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(QueueError::io(&path, e)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| QueueError::Malformed { path, source })
    }

    async fn read_request(&self, path: &Path) -> Result<Option<ApprovalRequest>, QueueError> {
        let Some(record) = self.read_record(path).await? else {
            return Ok(None);
        };
        serde_json::from_value(record)
            .map(Some)
            .map_err(|source| QueueError::Malformed {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Any syntactically complete JSON document; shape is checked later.
    async fn read_record(&self, path: &Path) -> Result<Option<serde_json::Value>, QueueError> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(QueueError::io(path, e)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| QueueError::Malformed {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Ids of every `*.request.json` entry, sorted. A missing directory
    /// reads as empty.
    async fn request_ids(&self) -> Result<Vec<String>, QueueError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(QueueError::io(&self.root, e)),
        };

        let mut ids = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(QueueError::io(&self.root, e)),
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(id) = name.strip_suffix(REQUEST_SUFFIX) else {
                continue;
            };
            if is_valid_id(id) {
                ids.push(id.to_string());
            } else {
                tracing::debug!(file = %name, "ignoring request record with unusable id");
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    struct FakeLiveness {
        dead: HashSet<u32>,
    }

    impl LivenessCheck for FakeLiveness {
        fn is_alive(&self, pid: u32) -> bool {
            !self.dead.contains(&pid)
        }
    }

    fn store(dir: &Path, dead: &[u32]) -> QueueStore {
        QueueStore::new(
            dir,
            Arc::new(FakeLiveness {
                dead: dead.iter().copied().collect(),
            }),
        )
    }

    fn write_request(dir: &Path, id: &str, pid: u32) {
        let body = serde_json::json!({
            "id": id,
            "tool_name": "Bash",
            "detail": "ls -la",
            "timestamp": 1_718_000_000.5,
            "pid": pid,
            "allow_pattern": "Bash(ls:*)",
            "settings_file": "",
        });
        std::fs::write(
            dir.join(format!("{id}.request.json")),
            serde_json::to_vec(&body).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_listing_is_sorted_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        for id in ["300", "100", "200"] {
            write_request(dir.path(), id, 1);
        }
        let ids: Vec<_> = store(dir.path(), &[])
            .list_pending()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, ["100", "200", "300"]);
    }

    #[tokio::test]
    async fn test_dead_requester_is_pruned_once() {
        let dir = tempfile::tempdir().unwrap();
        write_request(dir.path(), "r1", 99_999);
        let queue = store(dir.path(), &[99_999]);

        let scan = queue.scan().await.unwrap();
        assert!(scan.pending.is_empty());
        assert_eq!(scan.pruned, 1);
        assert!(!dir.path().join("r1.request.json").exists());

        let again = queue.scan().await.unwrap();
        assert!(again.pending.is_empty());
        assert_eq!(again.pruned, 0);
    }

    #[tokio::test]
    async fn test_answered_request_is_hidden_but_kept() {
        let dir = tempfile::tempdir().unwrap();
        write_request(dir.path(), "r1", 99_999);
        std::fs::write(dir.path().join("r1.response.json"), r#"{"decision":"allow"}"#).unwrap();

        let queue = store(dir.path(), &[99_999]);
        assert!(queue.list_pending().await.unwrap().is_empty());
        // The hook owns cleanup of answered requests.
        assert!(dir.path().join("r1.request.json").exists());
    }

    #[tokio::test]
    async fn test_partial_and_corrupt_records_are_skipped_not_deleted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.request.json"), r#"{"id":"a","tool_na"#).unwrap();
        std::fs::write(dir.path().join("b.request.json"), "").unwrap();
        write_request(dir.path(), "c", 1);

        let pending = store(dir.path(), &[]).list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "c");
        assert!(dir.path().join("a.request.json").exists());
        assert!(dir.path().join("b.request.json").exists());
    }

    #[tokio::test]
    async fn test_null_fields_neither_hide_nor_protect_requests() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("r3.request.json"),
            r#"{"tool_name":"Bash","detail":"ls","allow_pattern":null,"settings_file":null,"pid":1}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("r4.request.json"),
            r#"{"detail":null,"pid":99999}"#,
        )
        .unwrap();

        let scan = store(dir.path(), &[99_999]).scan().await.unwrap();

        assert_eq!(scan.pending.len(), 1);
        assert_eq!(scan.pending[0].id, "r3");
        assert_eq!(scan.pending[0].allow_pattern, "");
        assert_eq!(scan.pruned, 1);
        assert!(!dir.path().join("r4.request.json").exists());
    }

    #[tokio::test]
    async fn test_dead_requester_with_odd_shaped_record_is_pruned() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("r5.request.json"),
            r#"{"detail":{"nested":true},"pid":99999}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("r6.request.json"),
            r#"{"detail":{"nested":true},"pid":1}"#,
        )
        .unwrap();

        let scan = store(dir.path(), &[99_999]).scan().await.unwrap();

        assert_eq!(scan.pruned, 1);
        assert!(!dir.path().join("r5.request.json").exists());
        // A live owner's unreadable record stays for the hook to fix or remove.
        assert!(scan.pending.is_empty());
        assert!(dir.path().join("r6.request.json").exists());
    }

    #[tokio::test]
    async fn test_file_name_is_the_identity() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("real.request.json"),
            r#"{"id":"spoofed","tool_name":"Edit"}"#,
        )
        .unwrap();
        let pending = store(dir.path(), &[]).list_pending().await.unwrap();
        assert_eq!(pending[0].id, "real");
    }

    #[tokio::test]
    async fn test_missing_directory_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let queue = store(&dir.path().join("nope"), &[]);
        assert!(queue.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_dir_creates_nested_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a").join("b");
        store(&root, &[]).ensure_dir().await.unwrap();
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_other_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        std::fs::write(dir.path().join("x.response.json"), r#"{"decision":"deny"}"#).unwrap();
        assert!(store(dir.path(), &[]).list_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_requires_request() {
        let dir = tempfile::tempdir().unwrap();
        let queue = store(dir.path(), &[]);
        let err = queue.commit("missing-id", Decision::Deny).await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_commit_is_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        write_request(dir.path(), "r1", 1);
        let queue = store(dir.path(), &[]);

        queue.commit("r1", Decision::Deny).await.unwrap();
        let err = queue.commit("r1", Decision::Allow).await.unwrap_err();
        assert!(matches!(err, QueueError::AlreadyResolved(_)));

        let raw = std::fs::read_to_string(dir.path().join("r1.response.json")).unwrap();
        assert_eq!(raw, r#"{"decision":"deny"}"#);
    }

    #[tokio::test]
    async fn test_concurrent_commits_pick_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        write_request(dir.path(), "r1", 1);
        let queue = Arc::new(store(dir.path(), &[]));

        let a = tokio::spawn({
            let queue = queue.clone();
            async move { queue.commit("r1", Decision::Allow).await }
        });
        let b = tokio::spawn({
            let queue = queue.clone();
            async move { queue.commit("r1", Decision::Deny).await }
        });
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let stored = queue.read_response("r1").await.unwrap().unwrap();
        let winner = if results[0].is_ok() {
            Decision::Allow
        } else {
            Decision::Deny
        };
        assert_eq!(stored.decision, winner);
    }

    #[tokio::test]
    async fn test_invalid_ids_never_touch_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let queue = store(&dir.path().join("q"), &[]);
        std::fs::create_dir(dir.path().join("q")).unwrap();
        std::fs::write(dir.path().join("x.request.json"), "{}").unwrap();

        assert!(queue.load("../x").await.unwrap().is_none());
        assert!(matches!(
            queue.commit("../x", Decision::Allow).await,
            Err(QueueError::NotFound(_))
        ));
        assert!(!dir.path().join("x.response.json").exists());
    }

    #[tokio::test]
    async fn test_load_reports_malformed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.request.json"), "not json").unwrap();
        let queue = store(dir.path(), &[]);
        assert!(matches!(
            queue.load("bad").await,
            Err(QueueError::Malformed { .. })
        ));
        assert!(queue.load("absent").await.unwrap().is_none());
    }
}
