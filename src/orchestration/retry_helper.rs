use crate::models::{Level, NodeExecution};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Build the next attempt of `old`: fresh uuid and runtime id, retry index bumped,
/// history carried in `retry_ids`, same tree position.
pub fn build_retry_attempt(old: &NodeExecution) -> NodeExecution {
    let new_uuid = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp_millis();

    let level = old
        .ambiance
        .obtain_current_level()
        .cloned()
        .unwrap_or_default();
    let retry_index = level.retry_index + 1;
    let level = Level {
        runtime_id: new_uuid.clone(),
        start_ts: now,
        retry_index,
        ..level
    };
    let ambiance = old.ambiance.clone_for_finish().clone_for_child(level);

    let mut retry_ids = old.retry_ids.clone();
    retry_ids.push(old.uuid.clone());

    NodeExecution::queued(new_uuid, ambiance, old.node_id.clone())
        .with_name(old.name.clone())
        .with_parent_id(old.parent_id.clone())
        .with_previous_id(old.previous_id.clone())
        .with_stage_fqn(old.stage_fqn.clone())
        .with_mode(old.mode)
        .with_retry_ids(retry_ids)
}

/// Saved retry attempts waiting out their wait interval before they start
#[derive(Debug, Default)]
pub struct RetryScheduler {
    pending: Mutex<HashMap<String, Instant>>,
}

impl RetryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, attempt_id: impl Into<String>, wait: Duration) {
        self.pending.lock().insert(attempt_id.into(), Instant::now() + wait);
    }

    /// Remove and return the attempts whose wait has elapsed
    pub fn take_due(&self) -> Vec<String> {
        let now = Instant::now();
        let mut pending = self.pending.lock();
        let due: Vec<String> = pending
            .iter()
            .filter(|(_, due_at)| **due_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &due {
            pending.remove(id);
        }
        due
    }

    pub fn is_scheduled(&self, attempt_id: &str) -> bool {
        self.pending.lock().contains_key(attempt_id)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
