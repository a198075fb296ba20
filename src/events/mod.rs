//! # Events
//!
//! Two directions of traffic:
//!
//! - **Outbound**: [`OrchestrationEvent`]s broadcast through the [`EventPublisher`]
//! - **Inbound**: [`SdkResponseEvent`]s from step runtimes, routed by the
//!   [`SdkResponseEventHandler`] to one processor per payload type

pub mod dispatcher;
pub mod processors;
pub mod publisher;
pub mod sdk_response;
pub mod types;

pub use dispatcher::{ProcessedEvents, SdkResponseEventHandler};
pub use processors::{ResumeNodeCallback, SdkResponseProcessor};
pub use publisher::{EventPublisher, PublishError, PublishedEvent};
pub use sdk_response::{SdkResponseEvent, SdkResponsePayload, SdkResponseType};
pub use types::OrchestrationEvent;
