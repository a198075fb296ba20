//! # Ambiance
//!
//! The execution context threaded through every orchestration event. An [`Ambiance`]
//! identifies *where* in the execution tree something happened through an ordered
//! stack of [`Level`]s (pipeline → stage → step group → step, with strategy levels in
//! between), plus tenant setup abstractions and execution metadata.
//!
//! Ambiances are immutable values: descending into a child node produces a new
//! ambiance with one more level via [`Ambiance::clone_for_child`].

use crate::constants::{settings, setup_abstractions, yaml, MATRIX_IDENTIFIER_POSTFIX_FOR_DUPLICATES};
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::Span;

/// Category of a plan node, used for level filtering and tree traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepCategory {
    #[default]
    Unknown,
    Pipeline,
    Stages,
    Stage,
    StepGroup,
    Fork,
    Strategy,
    Step,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StepType {
    #[serde(rename = "type")]
    pub step_type: String,
    pub step_category: StepCategory,
}

impl StepType {
    pub fn new(step_type: impl Into<String>, step_category: StepCategory) -> Self {
        Self {
            step_type: step_type.into(),
            step_category,
        }
    }
}

/// Matrix iteration details for a strategy child
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatrixMetadata {
    /// Axis name to value; ordered so postfixes are deterministic
    pub matrix_values: BTreeMap<String, String>,
    pub matrix_combination: Vec<i32>,
    pub node_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ForMetadata {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StrategyMetadata {
    pub current_iteration: i32,
    pub total_iterations: i32,
    pub matrix_metadata: Option<MatrixMetadata>,
    pub for_metadata: Option<ForMetadata>,
}

impl StrategyMetadata {
    pub fn matrix(matrix_metadata: MatrixMetadata) -> Self {
        Self {
            matrix_metadata: Some(matrix_metadata),
            ..Default::default()
        }
    }

    pub fn iteration(current_iteration: i32, total_iterations: i32) -> Self {
        Self {
            current_iteration,
            total_iterations,
            ..Default::default()
        }
    }
}

/// One frame of the execution path
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Level {
    pub runtime_id: String,
    pub setup_id: String,
    pub identifier: String,
    pub step_type: StepType,
    pub group: String,
    pub start_ts: i64,
    pub skip_expression_chain: bool,
    pub strategy_metadata: Option<StrategyMetadata>,
    pub retry_index: u32,
    pub node_type: String,
}

impl Level {
    pub fn new(
        runtime_id: impl Into<String>,
        setup_id: impl Into<String>,
        identifier: impl Into<String>,
        step_type: StepType,
    ) -> Self {
        Self {
            runtime_id: runtime_id.into(),
            setup_id: setup_id.into(),
            identifier: identifier.into(),
            step_type,
            ..Default::default()
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_start_ts(mut self, start_ts: i64) -> Self {
        self.start_ts = start_ts;
        self
    }

    pub fn with_skip_expression_chain(mut self, skip: bool) -> Self {
        self.skip_expression_chain = skip;
        self
    }

    pub fn with_strategy_metadata(mut self, metadata: StrategyMetadata) -> Self {
        self.strategy_metadata = Some(metadata);
        self
    }

    pub fn with_retry_index(mut self, retry_index: u32) -> Self {
        self.retry_index = retry_index;
        self
    }

    pub fn with_node_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = node_type.into();
        self
    }

    pub fn category(&self) -> StepCategory {
        self.step_type.step_category
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    #[default]
    Normal,
    PipelineRollback,
    PostExecutionRollback,
}

impl ExecutionMode {
    pub fn is_rollback_mode(&self) -> bool {
        matches!(self, Self::PipelineRollback | Self::PostExecutionRollback)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    #[default]
    NotAvailable,
    Manual,
    Webhook,
    WebhookCustom,
    Scheduler,
    Artifact,
    Manifest,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggeredBy {
    pub uuid: String,
    pub identifier: String,
    pub trigger_identifier: String,
    pub trigger_name: String,
    pub extra_info: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub trigger_type: TriggerType,
    pub triggered_by: TriggeredBy,
}

/// YAML schema version of the running pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineVersion {
    V0,
    V1,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub execution_uuid: String,
    pub run_sequence: i32,
    pub pipeline_identifier: String,
    pub execution_mode: ExecutionMode,
    pub trigger_info: Option<TriggerInfo>,
    pub harness_version: String,
    pub setting_to_value_map: HashMap<String, String>,
    pub feature_flag_to_value_map: HashMap<String, bool>,
    pub original_plan_execution_id_for_rollback_mode: String,
}

/// Immutable execution context identifying a position in the execution tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Ambiance {
    pub plan_execution_id: String,
    pub plan_id: String,
    pub stage_execution_id: String,
    pub original_stage_execution_id_for_rollback_mode: String,
    pub setup_abstractions: HashMap<String, String>,
    pub levels: Vec<Level>,
    pub metadata: ExecutionMetadata,
    pub expression_functor_token: i64,
}

impl Ambiance {
    pub fn new(plan_execution_id: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self {
            plan_execution_id: plan_execution_id.into(),
            plan_id: plan_id.into(),
            ..Default::default()
        }
    }

    pub fn with_setup_abstraction(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.setup_abstractions.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, metadata: ExecutionMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_levels(mut self, levels: Vec<Level>) -> Self {
        self.levels = levels;
        self
    }

    /// Descend into a child node
    pub fn clone_for_child(&self, level: Level) -> Self {
        let mut cloned = self.clone();
        if level.step_type.step_category == StepCategory::Stage {
            cloned.stage_execution_id = level.runtime_id.clone();
        }
        cloned.levels.push(level);
        cloned
    }

    /// Ambiance of the parent, used when a node finishes and control returns upward
    pub fn clone_for_finish(&self) -> Self {
        let depth = self.levels.len().saturating_sub(1);
        self.clone_to_depth(depth)
    }

    /// Keep only the first `depth` levels
    pub fn clone_to_depth(&self, depth: usize) -> Self {
        let mut cloned = self.clone();
        cloned.levels.truncate(depth);
        cloned
    }

    pub fn obtain_current_level(&self) -> Option<&Level> {
        self.levels.last()
    }

    pub fn obtain_parent_level(&self) -> Option<&Level> {
        if self.levels.len() < 2 {
            return None;
        }
        self.levels.get(self.levels.len() - 2)
    }

    pub fn obtain_current_runtime_id(&self) -> Option<&str> {
        self.obtain_current_level().map(|l| l.runtime_id.as_str())
    }

    pub fn obtain_current_setup_id(&self) -> Option<&str> {
        self.obtain_current_level().map(|l| l.setup_id.as_str())
    }

    pub fn obtain_step_identifier(&self) -> Option<&str> {
        self.obtain_current_level().map(|l| l.identifier.as_str())
    }

    pub fn obtain_node_type(&self) -> Option<&str> {
        self.obtain_current_level().map(|l| l.node_type.as_str())
    }

    pub fn current_step_type(&self) -> Option<&StepType> {
        self.obtain_current_level().map(|l| &l.step_type)
    }

    pub fn current_group(&self) -> Option<&str> {
        self.obtain_current_level().map(|l| l.group.as_str())
    }

    pub fn current_level_start_ts(&self) -> EngineResult<i64> {
        self.obtain_current_level()
            .map(|l| l.start_ts)
            .ok_or_else(|| EngineError::invalid_request("Ambiance has no levels"))
    }

    pub fn obtain_parent_runtime_id(&self) -> Option<&str> {
        self.obtain_parent_level().map(|l| l.runtime_id.as_str())
    }

    pub fn parent_step_type(&self) -> Option<&StepType> {
        self.obtain_parent_level().map(|l| &l.step_type)
    }

    fn last_level_of(&self, category: StepCategory) -> Option<&Level> {
        self.levels.iter().rev().find(|l| l.category() == category)
    }

    pub fn stage_level(&self) -> Option<&Level> {
        self.last_level_of(StepCategory::Stage)
    }

    pub fn strategy_level(&self) -> Option<&Level> {
        self.last_level_of(StepCategory::Strategy)
    }

    pub fn step_group_level(&self) -> Option<&Level> {
        self.last_level_of(StepCategory::StepGroup)
    }

    pub fn obtain_step_group_identifier(&self) -> Option<&str> {
        self.step_group_level().map(|l| l.identifier.as_str())
    }

    pub fn stage_runtime_id(&self) -> EngineResult<&str> {
        self.stage_level()
            .map(|l| l.runtime_id.as_str())
            .ok_or_else(|| EngineError::invalid_request("Stage not present"))
    }

    pub fn is_retry(&self) -> bool {
        self.obtain_current_level()
            .map(|l| l.retry_index > 0)
            .unwrap_or(false)
    }

    pub fn is_current_level_at_step(&self) -> bool {
        self.obtain_current_level()
            .map(|l| l.category() == StepCategory::Step)
            .unwrap_or(false)
    }

    pub fn is_current_level_inside_stage(&self) -> bool {
        self.stage_level().is_some()
    }

    pub fn is_current_node_under_stage_strategy(&self) -> bool {
        self.stage_level()
            .map(|l| l.strategy_metadata.is_some())
            .unwrap_or(false)
    }

    pub fn is_current_level_child_of_step(&self, step_type: &str) -> bool {
        self.parent_step_type()
            .map(|t| t.step_type == step_type)
            .unwrap_or(false)
    }

    /// True when the current strategy node iterates stages: either its parent is the
    /// `STAGES` group or a parallel fork directly under it
    pub fn is_current_strategy_level_at_stage(&self) -> bool {
        let count = self.levels.len();
        if count >= 2 && self.levels[count - 2].group == yaml::STAGES {
            return true;
        }
        count >= 3
            && self.levels[count - 2].category() == StepCategory::Fork
            && self.levels[count - 3].group == yaml::STAGES
    }

    pub fn is_under_rollback_steps(&self) -> bool {
        self.levels
            .iter()
            .any(|l| l.identifier == yaml::ROLLBACK_STEPS)
    }

    pub fn account_id(&self) -> Option<&str> {
        self.setup_abstractions
            .get(setup_abstractions::ACCOUNT_ID)
            .map(String::as_str)
    }

    pub fn org_identifier(&self) -> Option<&str> {
        self.setup_abstractions
            .get(setup_abstractions::ORG_IDENTIFIER)
            .map(String::as_str)
    }

    pub fn project_identifier(&self) -> Option<&str> {
        self.setup_abstractions
            .get(setup_abstractions::PROJECT_IDENTIFIER)
            .map(String::as_str)
    }

    pub fn pipeline_identifier(&self) -> &str {
        &self.metadata.pipeline_identifier
    }

    pub fn pipeline_execution_identifier(&self) -> &str {
        if !self.metadata.execution_uuid.is_empty() {
            &self.metadata.execution_uuid
        } else {
            &self.plan_execution_id
        }
    }

    pub fn pipeline_version(&self) -> PipelineVersion {
        match self.metadata.harness_version.as_str() {
            "1" => PipelineVersion::V1,
            _ => PipelineVersion::V0,
        }
    }

    pub fn plan_execution_id_for_execution_mode(&self) -> &str {
        if self.metadata.execution_mode.is_rollback_mode() {
            &self.metadata.original_plan_execution_id_for_rollback_mode
        } else {
            &self.plan_execution_id
        }
    }

    pub fn stage_execution_id_for_execution_mode(&self) -> &str {
        if self.metadata.execution_mode.is_rollback_mode() {
            &self.original_stage_execution_id_for_rollback_mode
        } else {
            &self.stage_execution_id
        }
    }

    pub fn triggered_by(&self) -> Option<&TriggeredBy> {
        self.metadata.trigger_info.as_ref().map(|t| &t.triggered_by)
    }

    pub fn trigger_type(&self) -> TriggerType {
        self.metadata
            .trigger_info
            .as_ref()
            .map(|t| t.trigger_type)
            .unwrap_or_default()
    }

    pub fn trigger_identifier(&self) -> Option<&str> {
        self.triggered_by().map(|t| t.identifier.as_str())
    }

    pub fn email(&self) -> Option<&str> {
        self.triggered_by()
            .and_then(|t| t.extra_info.get("email"))
            .map(String::as_str)
    }

    pub fn enabled_feature_flags(&self) -> Vec<String> {
        self.metadata
            .feature_flag_to_value_map
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(flag, _)| flag.clone())
            .collect()
    }

    pub fn setting_value(&self, setting: &str) -> Option<&str> {
        self.metadata
            .setting_to_value_map
            .get(setting)
            .map(String::as_str)
    }

    /// Only the literal `"true"` enables a setting
    pub fn check_if_setting_enabled(&self, setting: &str) -> bool {
        self.setting_value(setting) == Some("true")
    }

    pub fn should_use_matrix_field_name(&self) -> bool {
        self.check_if_setting_enabled(settings::ENABLE_MATRIX_FIELD_NAME_SETTING)
    }

    pub fn is_node_execution_audits_enabled(&self) -> bool {
        self.check_if_setting_enabled(settings::ENABLE_NODE_EXECUTION_AUDIT_EVENTS)
    }

    pub fn should_use_expression_engine_v2(&self) -> bool {
        self.check_if_setting_enabled(settings::ENABLE_EXPRESSION_ENGINE_V2)
    }

    /// Tracing span carrying the execution coordinates of this ambiance
    pub fn log_span(&self, event_type: &str) -> Span {
        tracing::info_span!(
            "ambiance",
            plan_execution_id = %self.plan_execution_id,
            plan_id = %self.plan_id,
            pipeline_identifier = %self.metadata.pipeline_identifier,
            step_identifier = self.obtain_step_identifier().unwrap_or_default(),
            runtime_id = self.obtain_current_runtime_id().unwrap_or_default(),
            event_type = %event_type,
        )
    }
}

/// Fully qualified name of a level stack: `pipeline.stages.stage1.spec.execution.step1`
pub fn fqn_using_levels(levels: &[Level]) -> String {
    levels
        .iter()
        .filter(|l| !l.skip_expression_chain && l.identifier != yaml::PARALLEL)
        .map(|l| l.identifier.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

/// Identifier suffix distinguishing strategy iterations, e.g. `_0_1` or `_linux_2`
pub fn strategy_postfix(level: &Level, use_matrix_field_name: bool) -> String {
    let Some(strategy) = level.strategy_metadata.as_ref() else {
        return String::new();
    };

    let Some(matrix) = strategy.matrix_metadata.as_ref() else {
        return format!("_{}", strategy.current_iteration);
    };

    let mut parts: Vec<String> = if !matrix.node_name.is_empty() {
        vec![matrix.node_name.clone()]
    } else if use_matrix_field_name {
        matrix
            .matrix_values
            .iter()
            .filter(|(key, _)| key.as_str() != MATRIX_IDENTIFIER_POSTFIX_FOR_DUPLICATES)
            .map(|(_, value)| value.clone())
            .collect()
    } else {
        matrix
            .matrix_combination
            .iter()
            .map(|c| c.to_string())
            .collect()
    };

    if let Some(dup) = matrix
        .matrix_values
        .get(MATRIX_IDENTIFIER_POSTFIX_FOR_DUPLICATES)
    {
        parts.push(dup.clone());
    }

    if parts.is_empty() {
        return String::new();
    }
    format!("_{}", parts.join("_"))
}
