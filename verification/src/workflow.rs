//! Audit record of a single orchestrator evaluation.

use serde::{Deserialize, Serialize};
use warden_types::{AccountId, Fingerprint, RequestId, Timestamp, WorkflowId};

use crate::backend::BackendKind;
use crate::error::VerificationError;
use crate::mode::VerificationMode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowState {
    Running,
    Verified,
    Failed,
    Pending,
}

impl WorkflowState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, WorkflowState::Running)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    Verified { result_fingerprint: Fingerprint },
    Rejected { reason: String },
    Pending { request_id: RequestId },
    /// The backend raised an error instead of answering.
    Errored { reason: String, aborted: bool },
}

impl AttemptOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            AttemptOutcome::Rejected { .. } | AttemptOutcome::Errored { .. }
        )
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            AttemptOutcome::Rejected { reason } | AttemptOutcome::Errored { reason, .. } => {
                Some(reason.as_str())
            }
            AttemptOutcome::Verified { .. } | AttemptOutcome::Pending { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub backend: BackendKind,
    pub outcome: AttemptOutcome,
    pub at: Timestamp,
}

/// One evaluation: which backends were tried, in order, and how it ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_id: WorkflowId,
    pub subject: AccountId,
    pub proof_fingerprint: Fingerprint,
    pub mode: VerificationMode,
    pub fallback_enabled: bool,
    pub attempts: Vec<AttemptRecord>,
    pub state: WorkflowState,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    /// Set when the workflow ends without consulting every backend it could.
    pub note: Option<String>,
}

impl Workflow {
    pub(crate) fn start(
        workflow_id: WorkflowId,
        subject: AccountId,
        proof_fingerprint: Fingerprint,
        mode: VerificationMode,
        fallback_enabled: bool,
        now: Timestamp,
    ) -> Self {
        Self {
            workflow_id,
            subject,
            proof_fingerprint,
            mode,
            fallback_enabled,
            attempts: Vec::new(),
            state: WorkflowState::Running,
            started_at: now,
            finished_at: None,
            note: None,
        }
    }

    pub(crate) fn record(&mut self, backend: BackendKind, outcome: AttemptOutcome, at: Timestamp) {
        self.attempts.push(AttemptRecord {
            backend,
            outcome,
            at,
        });
    }

    pub(crate) fn finish(&mut self, state: WorkflowState, at: Timestamp, note: Option<String>) {
        self.state = state;
        self.finished_at = Some(at);
        self.note = note;
    }

    /// Backends in the order they were attempted.
    pub fn attempted(&self) -> Vec<BackendKind> {
        self.attempts.iter().map(|a| a.backend).collect()
    }

    pub fn last_attempt(&self) -> Option<&AttemptRecord> {
        self.attempts.last()
    }

    pub fn to_json(&self) -> Result<String, VerificationError> {
        serde_json::to_string(self).map_err(|e| VerificationError::Snapshot(e.to_string()))
    }
}
