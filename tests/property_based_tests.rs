mod common;

use common::strategies::*;
use pipeline_engine::advisers::{
    Adviser, AdviserResponse, AdvisingEvent, RepairActionCode, RetryAdviser, RetryAdviserParameters,
};
use pipeline_engine::enforcement::{format_limit_seconds, parse_timeout};
use pipeline_engine::models::{Ambiance, FailureInfo, FailureType, NodeExecution};
use pipeline_engine::state_machine::{allowed_start_statuses, can_transition, Status};
use proptest::prelude::*;
use std::time::Duration;

fn failed_attempt(failure: FailureType, previous_attempts: usize) -> NodeExecution {
    NodeExecution::queued("ne-1", Ambiance::new("pe-1", "plan-1"), "node-1")
        .with_status(Status::Failed)
        .with_failure_info(FailureInfo::new("boom", vec![failure]))
        .with_retry_ids((0..previous_attempts).map(|i| format!("attempt-{i}")).collect())
}

proptest! {
    /// Property: the retry adviser only takes failures listed as applicable
    #[test]
    fn retry_adviser_takes_only_applicable_failures(
        params in retry_parameters_strategy(),
        failure in failure_type_strategy(),
    ) {
        let event = AdvisingEvent::new(
            failed_attempt(failure, 0),
            Status::Running,
            Status::Failed,
            serde_json::to_vec(&params).unwrap(),
        );
        let can_advise = tokio_test::block_on(RetryAdviser.can_advise(&event)).unwrap();
        prop_assert_eq!(can_advise, params.applicable_failure_types.contains(&failure));
    }

    /// Property: retries follow the wait schedule until exhausted, then the repair action applies
    #[test]
    fn retry_adviser_follows_schedule_then_repairs(
        params in retry_parameters_strategy(),
        failure in failure_type_strategy(),
        previous_attempts in 0usize..8,
    ) {
        let event = AdvisingEvent::new(
            failed_attempt(failure, previous_attempts),
            Status::Running,
            Status::Failed,
            serde_json::to_vec(&params).unwrap(),
        );
        let response = tokio_test::block_on(RetryAdviser.on_advise_event(&event)).unwrap();

        if previous_attempts < params.retry_count as usize {
            match response {
                AdviserResponse::Retry { wait_interval, retry_node_execution_id } => {
                    prop_assert_eq!(wait_interval, params.wait_interval(previous_attempts));
                    prop_assert_eq!(retry_node_execution_id, "ne-1");
                }
                other => prop_assert!(false, "expected retry, got {:?}", other),
            }
        } else {
            prop_assert_eq!(response, params.repair_action());
        }
    }

    /// Property: the last wait interval repeats for attempts beyond the schedule
    #[test]
    fn wait_schedule_repeats_last_entry(
        waits in wait_interval_list_strategy(),
        attempt in 0usize..20,
    ) {
        let params = RetryAdviserParameters {
            retry_count: 20,
            wait_interval_list: waits.clone(),
            repair_action_code_after_retry: RepairActionCode::Ignore,
            applicable_failure_types: Default::default(),
            next_node_id: None,
        };
        let expected = match waits.last() {
            None => 0,
            Some(last) => waits.get(attempt).copied().unwrap_or(*last),
        };
        prop_assert_eq!(params.wait_interval(attempt), expected);
    }

    /// Property: a status is never allowed to transition into itself
    #[test]
    fn conditional_updates_are_idempotent(status in status_strategy()) {
        prop_assert!(!allowed_start_statuses(status).contains(&status));
        prop_assert!(!can_transition(status, status));
    }

    /// Property: nothing final goes back to RUNNING
    #[test]
    fn final_statuses_never_resume(from in status_strategy()) {
        if from.is_final() {
            prop_assert!(!can_transition(from, Status::Running));
        }
    }

    /// Property: timeout strings parse to the sum of their components
    #[test]
    fn timeout_strings_parse_to_component_sum((text, millis) in timeout_string_strategy()) {
        prop_assert_eq!(parse_timeout(&text).unwrap(), Duration::from_millis(millis));
    }

    /// Property: limits render in the largest whole unit among days, hours and seconds
    #[test]
    fn limits_render_in_largest_unit(seconds in 1u64..10_000_000) {
        let rendered = format_limit_seconds(seconds);
        if seconds >= 86_400 {
            prop_assert!(rendered.ends_with("day") || rendered.ends_with("days"));
        } else if seconds >= 3_600 {
            prop_assert!(rendered.ends_with("hour") || rendered.ends_with("hours"));
        } else {
            prop_assert!(rendered.ends_with("second") || rendered.ends_with("seconds"));
        }
    }
}
