//! Reconciles streamed agent task events into a renderable per-task view.
//!
//! Producers publish `StreamEvent`s on an `EventBus`. Each open `TaskStream`
//! keeps the events addressed to its task, folds them into a
//! `TaskStreamState`, and exposes a `TaskView` for display. After a message
//! completes, generated files are fetched with bounded retry through an
//! `ArtifactLookup`.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use taskstream_core::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), EngineError> {
//! let hub = StreamHub::new(
//!     EventBus::new(),
//!     Arc::new(HttpArtifactLookup::from_env()?),
//!     EngineConfig::from_env()?,
//! );
//! let task = hub.open(TaskOptions::assistant("task-1").project("p1").agent("a1"))?;
//!
//! hub.publish(&StreamEvent::MessageStart { task_id: "task-1".into() });
//! hub.publish(&StreamEvent::AssistantSection {
//!     task_id: "task-1".into(),
//!     text: "Working on it".into(),
//! });
//! println!("{:?}", task.view().body);
//! # Ok(())
//! # }
//! ```

/// Generated-file metadata, lookup backends and the retrieval loop.
pub mod artifacts;
/// Synchronous publish/subscribe bus keyed by event kind.
pub mod bus;
/// Cooperative cancellation handles.
pub mod cancel;
/// Engine and HTTP lookup configuration.
pub mod config;
/// Public error types.
pub mod errors;
/// Registry of open task streams.
pub mod hub;
/// Identifiers and task open options.
pub mod model;
/// Global tracing setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Retry timing for artifact retrieval.
pub mod policy;
/// Status inference from raw chunk text.
pub mod status;
/// Stream event types.
pub mod stream;
/// Per-task state machine and view.
pub mod task;
/// Tool call tracking within a section.
pub mod tools;

pub use artifacts::{
    Artifact, ArtifactLookup, HttpArtifactLookup, RetrievalOutcome, StaticArtifactLookup,
    retrieve_artifacts,
};
pub use bus::{EventBus, Subscription};
pub use cancel::{CancelHandle, CancelToken, cancel_pair};
pub use config::{EngineConfig, HttpLookupConfig};
pub use errors::{EngineError, LookupError};
pub use hub::StreamHub;
pub use model::{AgentId, ArtifactKey, ProjectId, TaskId, TaskOptions, TaskRole};
pub use observability::{LogSink, init_observability};
pub use policy::RetryPolicy;
pub use status::infer_status;
pub use stream::{EventKind, StreamEvent};
pub use task::{DisplayBody, RenderPosition, TaskStream, TaskStreamState, TaskView};
pub use tools::{ToolCall, ToolCallStatus, ToolCallTracker};
