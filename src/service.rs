//! Approval orchestration: listing the queue and committing decisions.

use std::path::Path;
use std::sync::Arc;

use crate::liveness::LivenessCheck;
use crate::models::approval::{ApprovalRequest, Decision};
use crate::store::policy::{PolicyStore, PolicyUpdate};
use crate::store::queue::{QueueError, QueueStore};

pub struct ApprovalService {
    queue: QueueStore,
    policy: PolicyStore,
}

impl ApprovalService {
    pub fn new(queue: QueueStore, policy: PolicyStore) -> Self {
        Self { queue, policy }
    }

    /// Service over the queue directory at `root` with the given liveness check.
    pub fn open(root: impl Into<std::path::PathBuf>, liveness: Arc<dyn LivenessCheck>) -> Self {
        Self::new(QueueStore::new(root, liveness), PolicyStore::new())
    }

    pub fn queue(&self) -> &QueueStore {
        &self.queue
    }

    pub fn policy(&self) -> &PolicyStore {
        &self.policy
    }

    pub async fn list_pending(&self) -> Result<Vec<ApprovalRequest>, QueueError> {
        self.queue.list_pending().await
    }

    /// Record `decision` for request `id`.
    ///
    /// The request record is read once and is the only source for the
    /// allow rule. For `always`, the allow pattern is persisted first on a
    /// best-effort basis; the response record is then written and its
    /// failure is the only one reported.
    pub async fn resolve(&self, id: &str, decision: Decision) -> Result<(), QueueError> {
        let request = match self.queue.load(id).await {
            Ok(Some(request)) => Some(request),
            Ok(None) => return Err(QueueError::NotFound(id.to_string())),
            Err(QueueError::Malformed { path, source }) => {
                tracing::warn!(
                    id = %id,
                    path = %path.display(),
                    error = %source,
                    "request record is unreadable, committing decision without allow rule"
                );
                None
            }
            Err(e) => return Err(e),
        };

        if self.queue.response_exists(id).await? {
            return Err(QueueError::AlreadyResolved(id.to_string()));
        }

        if decision == Decision::Always {
            match request.as_ref().filter(|r| r.has_allow_rule()) {
                Some(request) => self.persist_allow_rule(request).await,
                None => tracing::debug!(id = %id, "no allow rule to persist"),
            }
        }

        self.queue.commit(id, decision).await
    }

    async fn persist_allow_rule(&self, request: &ApprovalRequest) {
        let settings_file = Path::new(&request.settings_file);
        match self
            .policy
            .add_allow_pattern(settings_file, &request.allow_pattern)
            .await
        {
            Ok(PolicyUpdate::Added) => {}
            Ok(PolicyUpdate::AlreadyPresent) => {
                tracing::debug!(
                    id = %request.id,
                    pattern = %request.allow_pattern,
                    "allow pattern already present"
                );
            }
            Err(e) => {
                tracing::warn!(id = %request.id, error = %e, "failed to update allow list");
            }
        }
    }
}
