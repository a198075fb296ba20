#![allow(dead_code)]

use pipeline_engine::advisers::{RepairActionCode, RetryAdviserParameters};
use pipeline_engine::models::FailureType;
use pipeline_engine::state_machine::Status;
use proptest::prelude::*;
use proptest::sample::select;
use std::collections::HashSet;

pub const FAILURE_TYPES: [FailureType; 6] = [
    FailureType::ApplicationFailure,
    FailureType::ConnectivityFailure,
    FailureType::AuthenticationFailure,
    FailureType::TimeoutFailure,
    FailureType::DelegateProvisioningFailure,
    FailureType::UnknownFailure,
];

pub const REPAIR_ACTIONS: [RepairActionCode; 6] = [
    RepairActionCode::Ignore,
    RepairActionCode::MarkAsSuccess,
    RepairActionCode::EndExecution,
    RepairActionCode::OnFail,
    RepairActionCode::ManualIntervention,
    RepairActionCode::MarkAsFailure,
];

pub fn status_strategy() -> impl Strategy<Value = Status> {
    select(Status::ALL.to_vec())
}

pub fn failure_type_strategy() -> impl Strategy<Value = FailureType> {
    select(FAILURE_TYPES.to_vec())
}

/// Possibly empty set of failure types
pub fn failure_types_strategy() -> impl Strategy<Value = HashSet<FailureType>> {
    prop::collection::hash_set(failure_type_strategy(), 0..4)
}

/// Wait schedules of up to five entries, seconds
pub fn wait_interval_list_strategy() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(0u64..600, 0..5)
}

pub fn retry_parameters_strategy() -> impl Strategy<Value = RetryAdviserParameters> {
    (
        0u32..6,
        wait_interval_list_strategy(),
        select(REPAIR_ACTIONS.to_vec()),
        failure_types_strategy(),
        prop::option::of("[a-z][a-z0-9-]{0,15}"),
    )
        .prop_map(
            |(retry_count, wait_interval_list, repair, applicable_failure_types, next_node_id)| {
                RetryAdviserParameters {
                    retry_count,
                    wait_interval_list,
                    repair_action_code_after_retry: repair,
                    applicable_failure_types,
                    next_node_id,
                }
            },
        )
}

/// Timeout strings such as `1d 2h 30m`, paired with their length in milliseconds
pub fn timeout_string_strategy() -> impl Strategy<Value = (String, u64)> {
    let unit = select(vec![
        ("w", 604_800_000u64),
        ("d", 86_400_000),
        ("h", 3_600_000),
        ("m", 60_000),
        ("s", 1_000),
        ("ms", 1),
    ]);
    prop::collection::vec((1u64..100, unit), 1..5).prop_map(|parts| {
        let text = parts
            .iter()
            .map(|(amount, (unit, _))| format!("{amount}{unit}"))
            .collect::<Vec<_>>()
            .join(" ");
        let millis = parts.iter().map(|(amount, (_, ms))| amount * ms).sum();
        (text, millis)
    })
}
