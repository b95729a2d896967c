//! Common imports for wiring a hub and reading task views.
pub use crate::{
    Artifact, ArtifactLookup, DisplayBody, EngineConfig, EngineError, EventBus, HttpArtifactLookup,
    StreamEvent, StreamHub, TaskId, TaskOptions, TaskStream, TaskView,
};
