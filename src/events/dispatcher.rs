//! # SDK Response Event Handler
//!
//! Routes each [`SdkResponseEvent`] to the processor registered for its payload type.
//!
//! Events arrive at least once. Ids of successfully processed events are kept in a
//! bounded cache so a re-delivery is acknowledged without touching the node again;
//! duplicates that outlive the cache still hit conditional status updates.

use super::processors::{
    AddExecutableResponseProcessor, AddStepDetailsProcessor, HandleProgressProcessor,
    HandleStepResponseProcessor, QueueTaskProcessor, ResolveStepInputsProcessor,
    SdkResponseProcessor,
};
use super::sdk_response::{SdkResponseEvent, SdkResponseType};
use crate::error::{EngineError, EngineResult};
use crate::logging::log_error;
use crate::orchestration::NodeExecutor;
use crate::wait_notify::WaitNotifyEngine;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, Instrument};

#[derive(Debug, Default)]
struct EventIds {
    order: VecDeque<String>,
    done: HashSet<String>,
    in_flight: HashSet<String>,
}

/// Bounded FIFO set of processed event ids, plus the ids currently being processed
#[derive(Debug)]
pub struct ProcessedEvents {
    capacity: usize,
    inner: Mutex<EventIds>,
}

impl ProcessedEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(EventIds::default()),
        }
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.inner.lock().done.contains(event_id)
    }

    /// Reserve `event_id` for processing. `false` if it is done or another consumer holds it.
    pub fn try_claim(&self, event_id: &str) -> bool {
        let mut ids = self.inner.lock();
        !ids.done.contains(event_id) && ids.in_flight.insert(event_id.to_string())
    }

    /// Give a claimed id back so a re-delivery is processed again
    pub fn release(&self, event_id: &str) {
        self.inner.lock().in_flight.remove(event_id);
    }

    /// Mark `event_id` processed, dropping its claim
    pub fn record(&self, event_id: &str) {
        let mut guard = self.inner.lock();
        let ids = &mut *guard;
        ids.in_flight.remove(event_id);
        if !ids.done.insert(event_id.to_string()) {
            return;
        }
        ids.order.push_back(event_id.to_string());
        while ids.order.len() > self.capacity {
            if let Some(evicted) = ids.order.pop_front() {
                ids.done.remove(&evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct SdkResponseEventHandler {
    processors: HashMap<SdkResponseType, Arc<dyn SdkResponseProcessor>>,
    processed: ProcessedEvents,
}

impl SdkResponseEventHandler {
    pub fn new(dedup_capacity: usize) -> Self {
        Self {
            processors: HashMap::new(),
            processed: ProcessedEvents::new(dedup_capacity),
        }
    }

    /// Handler with every payload type wired to its processor
    pub fn with_defaults(
        executor: Arc<NodeExecutor>,
        wait_notify: Arc<WaitNotifyEngine>,
        dedup_capacity: usize,
    ) -> Self {
        let mut handler = Self::new(dedup_capacity);
        handler.register(
            SdkResponseType::QueueTask,
            Arc::new(QueueTaskProcessor::new(executor.clone(), wait_notify)),
        );
        handler.register(
            SdkResponseType::HandleProgress,
            Arc::new(HandleProgressProcessor::new(executor.clone())),
        );
        handler.register(
            SdkResponseType::AddStepDetails,
            Arc::new(AddStepDetailsProcessor::new(executor.clone())),
        );
        handler.register(
            SdkResponseType::AddExecutableResponse,
            Arc::new(AddExecutableResponseProcessor::new(executor.clone())),
        );
        handler.register(
            SdkResponseType::HandleStepResponse,
            Arc::new(HandleStepResponseProcessor::new(executor.clone())),
        );
        handler.register(
            SdkResponseType::ResolveStepInputs,
            Arc::new(ResolveStepInputsProcessor::new(executor)),
        );
        handler
    }

    pub fn register(&mut self, response_type: SdkResponseType, processor: Arc<dyn SdkResponseProcessor>) {
        self.processors.insert(response_type, processor);
    }

    /// Process `event`. Returns `false` when it was a known duplicate or is already being
    /// processed by another consumer.
    pub async fn handle_event(&self, event: &SdkResponseEvent) -> EngineResult<bool> {
        let response_type = event.response_type();
        let processor = self.processors.get(&response_type).ok_or_else(|| {
            EngineError::invalid_request(format!("No processor registered for {response_type}"))
        })?;

        if !self.processed.try_claim(&event.event_id) {
            debug!(event_id = %event.event_id, "Duplicate SDK response event acknowledged");
            return Ok(false);
        }

        let span = event.ambiance.log_span(response_type.as_str());
        let result = processor.handle_event(event).instrument(span).await;

        match result {
            Ok(()) => {
                self.processed.record(&event.event_id);
                Ok(true)
            }
            Err(error) => {
                self.processed.release(&event.event_id);
                log_error(
                    "sdk_response_event_handler",
                    response_type.as_str(),
                    &error.to_string(),
                    Some(&event.node_execution_id),
                );
                Err(error)
            }
        }
    }

    pub fn registered_types(&self) -> Vec<SdkResponseType> {
        SdkResponseType::ALL
            .into_iter()
            .filter(|t| self.processors.contains_key(t))
            .collect()
    }
}
