//! Legal status transitions.
//!
//! A target status is never part of its own allowed-from set, so applying the same
//! conditional update twice leaves the record untouched the second time.

use super::states::Status;

/// Statuses a node may currently hold for a transition into `target` to apply
pub fn allowed_start_statuses(target: Status) -> Vec<Status> {
    let candidates: Vec<Status> = match target {
        Status::NoOp => Vec::new(),
        Status::Running => Status::ALL
            .into_iter()
            .filter(|s| {
                (s.is_flowing() && !matches!(s, Status::Discontinuing))
                    || matches!(s, Status::Queued | Status::Paused | Status::Pausing)
            })
            .collect(),
        Status::InterventionWaiting => Status::ALL
            .into_iter()
            .filter(|s| s.is_broke() || *s == Status::Running)
            .collect(),
        Status::TimedWaiting
        | Status::AsyncWaiting
        | Status::TaskWaiting
        | Status::ApprovalWaiting
        | Status::ResourceWaiting
        | Status::InputWaiting
        | Status::WaitStepRunning
        | Status::UploadWaiting => vec![Status::Running, Status::Queued],
        Status::Pausing => Status::ALL
            .into_iter()
            .filter(|s| s.is_flowing() || *s == Status::Queued)
            .collect(),
        Status::Paused => Status::ALL
            .into_iter()
            .filter(|s| s.is_flowing() || matches!(s, Status::Queued | Status::Pausing))
            .collect(),
        Status::Queued | Status::QueuedLicenseLimitReached | Status::QueuedExecutionConcurrencyReached => vec![
            Status::NoOp,
            Status::Paused,
            Status::Pausing,
            Status::QueuedLicenseLimitReached,
            Status::QueuedExecutionConcurrencyReached,
        ],
        Status::Discontinuing | Status::Aborted | Status::Expired => {
            Status::ALL.into_iter().filter(Status::is_abort_and_expire).collect()
        }
        Status::Succeeded | Status::IgnoreFailed => Status::ALL
            .into_iter()
            .filter(|s| s.is_flowing() || s.is_broke() || matches!(s, Status::Queued))
            .collect(),
        Status::Failed | Status::Errored | Status::ApprovalRejected => Status::ALL
            .into_iter()
            .filter(|s| {
                s.is_flowing()
                    || s.is_broke()
                    || matches!(s, Status::Queued | Status::Paused | Status::Pausing)
            })
            .collect(),
        Status::Skipped | Status::Suspended => Status::ALL
            .into_iter()
            .filter(|s| s.is_flowing() || matches!(s, Status::Queued))
            .collect(),
    };

    candidates.into_iter().filter(|s| *s != target).collect()
}

pub fn can_transition(from: Status, to: Status) -> bool {
    allowed_start_statuses(to).contains(&from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_never_in_own_allowed_set() {
        for status in Status::ALL {
            assert!(
                !allowed_start_statuses(status).contains(&status),
                "{status} allows itself"
            );
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(can_transition(Status::Queued, Status::Running));
        assert!(can_transition(Status::Running, Status::TaskWaiting));
        assert!(can_transition(Status::TaskWaiting, Status::Running));
        assert!(can_transition(Status::Running, Status::Succeeded));
        assert!(can_transition(Status::Running, Status::Failed));
    }

    #[test]
    fn test_advise_transitions() {
        assert!(can_transition(Status::Failed, Status::IgnoreFailed));
        assert!(can_transition(Status::Failed, Status::Succeeded));
        assert!(can_transition(Status::Failed, Status::InterventionWaiting));
        assert!(can_transition(Status::Errored, Status::Failed));
        assert!(!can_transition(Status::Succeeded, Status::Failed));
    }

    #[test]
    fn test_final_statuses_are_sticky_for_abort() {
        assert!(can_transition(Status::Running, Status::Aborted));
        assert!(can_transition(Status::Discontinuing, Status::Aborted));
        assert!(!can_transition(Status::Succeeded, Status::Aborted));
        assert!(!can_transition(Status::Failed, Status::Discontinuing));
    }
}
