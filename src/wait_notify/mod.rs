//! # Wait / Notify
//!
//! Correlates an asynchronous result (a delegate task finishing, a callback arriving)
//! with the node waiting for it. Either side may arrive first:
//!
//! - `wait_for` before `notify`: the callback is parked until the result shows up
//! - `notify` before `wait_for`: the result is parked and the callback fires on registration
//!
//! Each correlation id fires at most once. An id only counts as fired once its callback
//! returned `Ok`; a failed delivery puts the waiter (or the parked result) back so the
//! next delivery fires it again.
//!
//! [`WaitNotifyEngine::expire_timed_out`] hands waits older than the timeout to the
//! callback's `on_timeout` and drops parked results nobody claimed within the same
//! timeout. Fired ids are kept in a bounded FIFO and purged with their plan execution.

use crate::error::EngineResult;
use crate::models::StepResponse;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub type ResponseData = StepResponse;

pub const DEFAULT_FIRED_CAPACITY: usize = 10_000;

#[async_trait]
pub trait NotifyCallback: Send + Sync {
    async fn notify(&self, response: ResponseData) -> EngineResult<()>;

    async fn on_timeout(&self) -> EngineResult<()> {
        Ok(())
    }

    /// Plan execution the wait belongs to, used to purge it with the execution
    fn plan_execution_id(&self) -> Option<&str> {
        None
    }
}

struct Waiter {
    callback: Arc<dyn NotifyCallback>,
    registered_at: Instant,
}

impl Waiter {
    fn plan_execution_id(&self) -> Option<String> {
        self.callback.plan_execution_id().map(str::to_string)
    }
}

struct Parked {
    response: ResponseData,
    parked_at: Instant,
}

/// Bounded FIFO of fired ids, tagged with their plan execution
struct FiredIds {
    capacity: usize,
    order: VecDeque<(String, Option<String>)>,
    ids: HashSet<String>,
}

impl FiredIds {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    fn contains(&self, correlation_id: &str) -> bool {
        self.ids.contains(correlation_id)
    }

    fn insert(&mut self, correlation_id: String, plan_execution_id: Option<String>) {
        if !self.ids.insert(correlation_id.clone()) {
            return;
        }
        self.order.push_back((correlation_id, plan_execution_id));
        while self.order.len() > self.capacity {
            if let Some((evicted, _)) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
    }

    fn purge(&mut self, plan_execution_ids: &HashSet<&str>) -> usize {
        let before = self.order.len();
        let ids = &mut self.ids;
        self.order.retain(|(correlation_id, plan)| {
            let keep = !plan
                .as_deref()
                .is_some_and(|plan| plan_execution_ids.contains(plan));
            if !keep {
                ids.remove(correlation_id);
            }
            keep
        });
        before - self.order.len()
    }
}

struct WaitState {
    waiting: HashMap<String, Waiter>,
    parked: HashMap<String, Parked>,
    /// Ids whose callback is running right now
    firing: HashSet<String>,
    fired: FiredIds,
}

impl WaitState {
    fn is_claimed(&self, correlation_id: &str) -> bool {
        self.fired.contains(correlation_id) || self.firing.contains(correlation_id)
    }
}

pub struct WaitNotifyEngine {
    state: Mutex<WaitState>,
    timeout: Duration,
}

impl Default for WaitNotifyEngine {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

impl WaitNotifyEngine {
    pub fn new(timeout: Duration) -> Self {
        Self::with_fired_capacity(timeout, DEFAULT_FIRED_CAPACITY)
    }

    pub fn with_fired_capacity(timeout: Duration, fired_capacity: usize) -> Self {
        Self {
            state: Mutex::new(WaitState {
                waiting: HashMap::new(),
                parked: HashMap::new(),
                firing: HashSet::new(),
                fired: FiredIds::new(fired_capacity),
            }),
            timeout,
        }
    }

    /// Register `callback` for `correlation_id`. Returns `true` if it fired immediately.
    pub async fn wait_for(
        &self,
        correlation_id: impl Into<String>,
        callback: Arc<dyn NotifyCallback>,
    ) -> EngineResult<bool> {
        let correlation_id = correlation_id.into();
        let parked = {
            let mut state = self.state.lock();
            if state.is_claimed(&correlation_id) {
                warn!(correlation_id = %correlation_id, "Wait registered for an already fired correlation id");
                return Ok(false);
            }
            match state.parked.remove(&correlation_id) {
                Some(parked) => {
                    state.firing.insert(correlation_id.clone());
                    Some(parked)
                }
                None => {
                    state.waiting.insert(
                        correlation_id.clone(),
                        Waiter {
                            callback: callback.clone(),
                            registered_at: Instant::now(),
                        },
                    );
                    None
                }
            }
        };

        let Some(parked) = parked else {
            return Ok(false);
        };

        debug!(correlation_id = %correlation_id, "Delivering parked response");
        match callback.notify(parked.response.clone()).await {
            Ok(()) => {
                let mut state = self.state.lock();
                state.firing.remove(&correlation_id);
                state
                    .fired
                    .insert(correlation_id, callback.plan_execution_id().map(str::to_string));
                Ok(true)
            }
            Err(error) => {
                warn!(
                    correlation_id = %correlation_id,
                    error = %error,
                    "Parked response delivery failed, keeping it parked"
                );
                let mut state = self.state.lock();
                state.firing.remove(&correlation_id);
                state.parked.insert(correlation_id, parked);
                Err(error)
            }
        }
    }

    /// Deliver a result. Returns `true` if a waiting callback fired.
    pub async fn notify(
        &self,
        correlation_id: impl Into<String>,
        response: ResponseData,
    ) -> EngineResult<bool> {
        let correlation_id = correlation_id.into();
        let waiter = {
            let mut state = self.state.lock();
            if state.is_claimed(&correlation_id) {
                debug!(correlation_id = %correlation_id, "Duplicate notify ignored");
                return Ok(false);
            }
            match state.waiting.remove(&correlation_id) {
                Some(waiter) => {
                    state.firing.insert(correlation_id.clone());
                    Some(waiter)
                }
                None => {
                    state.parked.insert(
                        correlation_id.clone(),
                        Parked {
                            response: response.clone(),
                            parked_at: Instant::now(),
                        },
                    );
                    None
                }
            }
        };

        let Some(waiter) = waiter else {
            debug!(correlation_id = %correlation_id, "No waiter yet, parking response");
            return Ok(false);
        };

        match waiter.callback.notify(response).await {
            Ok(()) => {
                let mut state = self.state.lock();
                state.firing.remove(&correlation_id);
                let plan_execution_id = waiter.plan_execution_id();
                state.fired.insert(correlation_id, plan_execution_id);
                Ok(true)
            }
            Err(error) => {
                warn!(
                    correlation_id = %correlation_id,
                    error = %error,
                    "Notify callback failed, wait stays registered"
                );
                let mut state = self.state.lock();
                state.firing.remove(&correlation_id);
                state.waiting.insert(correlation_id, waiter);
                Err(error)
            }
        }
    }

    /// Fire `on_timeout` for every wait registered longer than the timeout ago, and drop
    /// parked results older than the timeout. Returns the number of expired waits.
    pub async fn expire_timed_out(&self) -> EngineResult<usize> {
        let expired: Vec<(String, Arc<dyn NotifyCallback>)> = {
            let mut state = self.state.lock();
            let timeout = self.timeout;

            let parked_before = state.parked.len();
            state.parked.retain(|_, p| p.parked_at.elapsed() < timeout);
            let dropped = parked_before - state.parked.len();
            if dropped > 0 {
                info!(dropped, "Dropped unclaimed parked responses");
            }

            let stale: Vec<String> = state
                .waiting
                .iter()
                .filter(|(_, w)| w.registered_at.elapsed() >= timeout)
                .map(|(id, _)| id.clone())
                .collect();
            stale
                .into_iter()
                .filter_map(|id| {
                    let waiter = state.waiting.remove(&id)?;
                    let plan_execution_id = waiter.plan_execution_id();
                    state.fired.insert(id.clone(), plan_execution_id);
                    Some((id, waiter.callback))
                })
                .collect()
        };

        for (correlation_id, callback) in &expired {
            info!(correlation_id = %correlation_id, "⏰ Wait timed out");
            callback.on_timeout().await?;
        }
        Ok(expired.len())
    }

    /// Forget waits and fired ids of the given plan executions
    pub fn purge_plan_executions(&self, plan_execution_ids: &[String]) -> usize {
        let plans: HashSet<&str> = plan_execution_ids.iter().map(String::as_str).collect();
        let mut state = self.state.lock();

        let waiting_before = state.waiting.len();
        state.waiting.retain(|_, w| {
            !w.callback
                .plan_execution_id()
                .is_some_and(|plan| plans.contains(plan))
        });
        let purged = waiting_before - state.waiting.len() + state.fired.purge(&plans);

        debug!(purged, "Purged wait/notify state of deleted plan executions");
        purged
    }

    pub fn callbacks_waiting(&self) -> usize {
        self.state.lock().waiting.len()
    }

    pub fn responses_parked(&self) -> usize {
        self.state.lock().parked.len()
    }

    pub fn fired_ids(&self) -> usize {
        self.state.lock().fired.order.len()
    }
}
