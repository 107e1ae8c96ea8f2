//! Job model and status machine.
//!
//! A [`Job`] is created once at submission in [`JobStatus::Queued`] and only
//! ever moves forward: `Queued -> Running -> Completed | Failed`. Gaps are
//! allowed (a job may go straight from `Queued` to `Completed`), regressions
//! are not.

use serde::{Deserialize, Serialize};

use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a relayed job.
///
/// Serialized with the wire names callers poll for (`IN_QUEUE`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "IN_QUEUE")]
    Queued,
    #[serde(rename = "IN_PROGRESS")]
    Running,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl JobStatus {
    /// Position in the forward-only ordering. Both terminal states share
    /// the highest rank.
    pub fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// `Completed` and `Failed` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Queued or running; counted as queue depth by the health endpoint.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Whether moving from `self` to `next` keeps the ordering monotonic.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    /// Wire name, identical to the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "IN_QUEUE",
            Self::Running => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One submitted generation request, as tracked by the relay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Base64-encoded artifacts in engine order. `None` until completion.
    pub output: Option<Vec<String>>,
    /// Failure reason. `None` unless the job failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Reconciliation attempts that ended in a transport or engine error.
    #[serde(skip)]
    pub reconcile_failures: u32,
}

impl Job {
    /// A freshly submitted job.
    pub fn new(id: impl Into<JobId>, now: Timestamp) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            output: None,
            error: None,
            created_at: now,
            updated_at: now,
            reconcile_failures: 0,
        }
    }
}
