use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a node execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Placeholder before the first real transition
    #[default]
    NoOp,
    Running,
    InterventionWaiting,
    TimedWaiting,
    AsyncWaiting,
    /// Waiting on an external task registered with the wait/notify engine
    TaskWaiting,
    Discontinuing,
    Pausing,
    Queued,
    Skipped,
    Paused,
    Aborted,
    Errored,
    Failed,
    Expired,
    Suspended,
    Succeeded,
    IgnoreFailed,
    ApprovalWaiting,
    ResourceWaiting,
    ApprovalRejected,
    InputWaiting,
    WaitStepRunning,
    QueuedLicenseLimitReached,
    QueuedExecutionConcurrencyReached,
    UploadWaiting,
}

impl Status {
    pub const ALL: [Status; 26] = [
        Self::NoOp,
        Self::Running,
        Self::InterventionWaiting,
        Self::TimedWaiting,
        Self::AsyncWaiting,
        Self::TaskWaiting,
        Self::Discontinuing,
        Self::Pausing,
        Self::Queued,
        Self::Skipped,
        Self::Paused,
        Self::Aborted,
        Self::Errored,
        Self::Failed,
        Self::Expired,
        Self::Suspended,
        Self::Succeeded,
        Self::IgnoreFailed,
        Self::ApprovalWaiting,
        Self::ResourceWaiting,
        Self::ApprovalRejected,
        Self::InputWaiting,
        Self::WaitStepRunning,
        Self::QueuedLicenseLimitReached,
        Self::QueuedExecutionConcurrencyReached,
        Self::UploadWaiting,
    ];

    /// No further transitions happen from a final status
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Skipped
                | Self::IgnoreFailed
                | Self::Aborted
                | Self::Errored
                | Self::Failed
                | Self::Expired
                | Self::Suspended
                | Self::Succeeded
                | Self::ApprovalRejected
        )
    }

    pub fn is_broke(&self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Errored | Self::Expired | Self::ApprovalRejected
        )
    }

    pub fn is_positive(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Skipped | Self::Suspended | Self::IgnoreFailed
        )
    }

    /// Node is making progress or waiting on something external
    pub fn is_flowing(&self) -> bool {
        matches!(
            self,
            Self::NoOp
                | Self::Running
                | Self::InterventionWaiting
                | Self::TimedWaiting
                | Self::AsyncWaiting
                | Self::TaskWaiting
                | Self::Discontinuing
                | Self::ApprovalWaiting
                | Self::ResourceWaiting
                | Self::InputWaiting
                | Self::WaitStepRunning
                | Self::QueuedLicenseLimitReached
                | Self::QueuedExecutionConcurrencyReached
                | Self::UploadWaiting
        )
    }

    /// Statuses a retry adviser may act on
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InterventionWaiting
                | Self::Failed
                | Self::Errored
                | Self::Expired
                | Self::ApprovalRejected
        )
    }

    /// Statuses that an abort or expiry can interrupt
    pub fn is_abort_and_expire(&self) -> bool {
        (self.is_flowing() && *self != Self::NoOp)
            || matches!(self, Self::Queued | Self::Pausing | Self::Paused)
    }

    pub fn is_active(&self) -> bool {
        self.is_abort_and_expire()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoOp => "NO_OP",
            Self::Running => "RUNNING",
            Self::InterventionWaiting => "INTERVENTION_WAITING",
            Self::TimedWaiting => "TIMED_WAITING",
            Self::AsyncWaiting => "ASYNC_WAITING",
            Self::TaskWaiting => "TASK_WAITING",
            Self::Discontinuing => "DISCONTINUING",
            Self::Pausing => "PAUSING",
            Self::Queued => "QUEUED",
            Self::Skipped => "SKIPPED",
            Self::Paused => "PAUSED",
            Self::Aborted => "ABORTED",
            Self::Errored => "ERRORED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
            Self::Suspended => "SUSPENDED",
            Self::Succeeded => "SUCCEEDED",
            Self::IgnoreFailed => "IGNORE_FAILED",
            Self::ApprovalWaiting => "APPROVAL_WAITING",
            Self::ResourceWaiting => "RESOURCE_WAITING",
            Self::ApprovalRejected => "APPROVAL_REJECTED",
            Self::InputWaiting => "INPUT_WAITING",
            Self::WaitStepRunning => "WAIT_STEP_RUNNING",
            Self::QueuedLicenseLimitReached => "QUEUED_LICENSE_LIMIT_REACHED",
            Self::QueuedExecutionConcurrencyReached => "QUEUED_EXECUTION_CONCURRENCY_REACHED",
            Self::UploadWaiting => "UPLOAD_WAITING",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Invalid node status: {s}"))
    }
}

/// Named status groups, matching the sets operators filter by
pub mod groups {
    use super::Status;

    pub fn final_statuses() -> Vec<Status> {
        Status::ALL.into_iter().filter(Status::is_final).collect()
    }

    pub fn broke_statuses() -> Vec<Status> {
        Status::ALL.into_iter().filter(Status::is_broke).collect()
    }

    pub fn positive_statuses() -> Vec<Status> {
        Status::ALL.into_iter().filter(Status::is_positive).collect()
    }

    pub fn flowing_statuses() -> Vec<Status> {
        Status::ALL.into_iter().filter(Status::is_flowing).collect()
    }

    pub fn retryable_statuses() -> Vec<Status> {
        Status::ALL.into_iter().filter(Status::is_retryable).collect()
    }

    pub fn abort_and_expire_statuses() -> Vec<Status> {
        Status::ALL
            .into_iter()
            .filter(Status::is_abort_and_expire)
            .collect()
    }

    pub fn active_statuses() -> Vec<Status> {
        Status::ALL.into_iter().filter(Status::is_active).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_and_active_are_disjoint() {
        for status in Status::ALL {
            assert!(
                !(status.is_final() && status.is_active()),
                "{status} is both final and active"
            );
        }
    }

    #[test]
    fn test_group_membership() {
        assert!(Status::Failed.is_broke());
        assert!(Status::Failed.is_retryable());
        assert!(Status::InterventionWaiting.is_retryable());
        assert!(!Status::Succeeded.is_retryable());
        assert!(Status::IgnoreFailed.is_positive());
        assert!(Status::TaskWaiting.is_flowing());
        assert!(Status::Queued.is_active());
        assert!(!Status::Queued.is_flowing());
        assert_eq!(groups::final_statuses().len(), 9);
        assert_eq!(groups::broke_statuses().len(), 4);
    }

    #[test]
    fn test_status_string_conversion() {
        assert_eq!(Status::TaskWaiting.to_string(), "TASK_WAITING");
        for status in Status::ALL {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
        assert!("bogus".parse::<Status>().is_err());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&Status::IgnoreFailed).unwrap();
        assert_eq!(json, "\"IGNORE_FAILED\"");
        let parsed: Status = serde_json::from_str("\"QUEUED_LICENSE_LIMIT_REACHED\"").unwrap();
        assert_eq!(parsed, Status::QueuedLicenseLimitReached);
    }
}
