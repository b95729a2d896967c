//! Pure per-task reducer.
//!
//! `TaskReducer::apply` folds one event into the task's state and reports the
//! side effects the async shell must schedule. It never sleeps, spawns or
//! performs I/O, so every transition is testable without a runtime.

use tracing::debug;

use crate::artifacts::Artifact;
use crate::model::{AgentId, TaskId, TaskOptions, TaskRole};
use crate::status::infer_status;
use crate::stream::StreamEvent;

use super::state::TaskStreamState;

/// Where the presentation layer currently draws a task's element.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderPosition {
    /// Top edge of the element.
    pub element_top: f32,
    /// Bottom edge of the visible viewport.
    pub viewport_bottom: f32,
}

impl RenderPosition {
    fn slide_distance(&self) -> f32 {
        (self.viewport_bottom - self.element_top).max(0.0)
    }
}

/// Side effects requested by one `apply` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Effects {
    /// State changed and must be republished.
    pub changed: bool,
    /// Mark visible after the display delay, unless stream `generation` moved on.
    pub schedule_display: Option<u64>,
    /// Abort any artifact retrieval still running for a previous stream.
    pub cancel_artifacts: bool,
    /// Start the artifact retrieval loop.
    pub fetch_artifacts: bool,
    /// Clear the slide-in offset after the animation window.
    pub schedule_slide_clear: Option<u64>,
}

pub(crate) struct TaskReducer {
    task_id: TaskId,
    role: TaskRole,
    agent_id: Option<AgentId>,
    original_content: Option<String>,
    default_timeout_message: String,
    state: TaskStreamState,
    /// Whether any stream activity was ever seen.
    started: bool,
    /// Bumped on every `MessageStart`.
    generation: u64,
    slide_generation: u64,
    render_position: Option<RenderPosition>,
}

impl TaskReducer {
    pub fn new(options: &TaskOptions, default_timeout_message: impl Into<String>) -> Self {
        let mut state = TaskStreamState::default();
        if let Some(content) = &options.initial_content {
            state.current_section_text = content.clone();
            state.is_visible = true;
        }
        Self {
            task_id: options.task_id.clone(),
            role: options.role,
            agent_id: options.agent_id.clone(),
            original_content: options.initial_content.clone(),
            default_timeout_message: default_timeout_message.into(),
            state,
            started: false,
            generation: 0,
            slide_generation: 0,
            render_position: None,
        }
    }

    pub fn state(&self) -> &TaskStreamState {
        &self.state
    }

    /// Whether `event` is addressed to this task.
    ///
    /// User submissions are matched by content rather than id: the input box
    /// that publishes them cannot know the id the new message will receive.
    pub fn accepts(&self, event: &StreamEvent) -> bool {
        match event {
            StreamEvent::UserMessageSubmit { .. } => self.role == TaskRole::User,
            other => other.task_id() == &self.task_id,
        }
    }

    pub fn apply(&mut self, event: &StreamEvent) -> Effects {
        let mut fx = Effects::default();
        if !self.accepts(event) {
            return fx;
        }
        let was_streaming = self.state.is_streaming;
        match event {
            StreamEvent::MessageStart { .. } => {
                self.generation += 1;
                self.started = true;
                self.state = TaskStreamState {
                    is_streaming: true,
                    ..TaskStreamState::default()
                };
                fx.changed = true;
                fx.cancel_artifacts = true;
                fx.schedule_display = Some(self.generation);
            }
            StreamEvent::MessageChunk {
                content, status, ..
            } => {
                if self.final_locked() {
                    return fx;
                }
                self.implicit_start(&mut fx);
                match status {
                    Some(status) => {
                        if !content.is_empty() {
                            self.state.legacy_buffer.push_str(content);
                        }
                        self.state.status_message = Some(status.clone());
                        fx.changed = true;
                    }
                    None => {
                        if let Some(inferred) = infer_status(content) {
                            self.state.status_message = Some(inferred);
                            fx.changed = true;
                        } else if !content.is_empty() {
                            self.state.legacy_buffer.push_str(content);
                            self.state.status_message = None;
                            fx.changed = true;
                        } else if self.state.status_message.take().is_some() {
                            fx.changed = true;
                        }
                    }
                }
            }
            StreamEvent::AssistantSection { text, .. } => {
                if self.final_locked() {
                    return fx;
                }
                self.implicit_start(&mut fx);
                self.state.current_section_text = text.clone();
                self.state.tools.clear();
                self.state.status_message = None;
                fx.changed = true;
            }
            StreamEvent::ToolUseStart {
                tool_id,
                tool_name,
                input,
                ..
            } => {
                if self.final_locked() {
                    return fx;
                }
                self.implicit_start(&mut fx);
                self.state
                    .tools
                    .start(tool_id.clone(), tool_name.clone(), input.clone());
                fx.changed = true;
            }
            StreamEvent::ToolUseComplete {
                tool_id, result, ..
            } => {
                fx.changed = self.state.tools.complete(tool_id, result.clone());
                if !fx.changed {
                    debug!(event = "task.tool_event_ignored", task_id = %self.task_id, tool_id = %tool_id, kind = "complete");
                }
            }
            StreamEvent::ToolUseError { tool_id, error, .. } => {
                fx.changed = self.state.tools.fail(tool_id, error.clone());
                if !fx.changed {
                    debug!(event = "task.tool_event_ignored", task_id = %self.task_id, tool_id = %tool_id, kind = "error");
                }
            }
            StreamEvent::FinalResponse { response, .. } => {
                self.started = true;
                let state = &mut self.state;
                state.final_response = Some(response.clone());
                state.current_section_text.clear();
                state.tools.clear();
                state.legacy_buffer.clear();
                state.status_message = None;
                state.timeout_message = None;
                fx.changed = true;
            }
            StreamEvent::MessageComplete { .. } => {
                if self.state.is_streaming {
                    self.state.is_streaming = false;
                    self.state.status_message = None;
                    fx.changed = true;
                }
            }
            StreamEvent::StreamError {
                agent_id, error, ..
            } => {
                if let Some(owner) = &self.agent_id
                    && owner != agent_id
                {
                    debug!(
                        event = "task.foreign_stream_error_ignored",
                        task_id = %self.task_id,
                        owner = %owner,
                        agent_id = %agent_id
                    );
                    return fx;
                }
                self.started = true;
                let state = &mut self.state;
                state.is_streaming = false;
                state.error_message = Some(error.clone());
                state.status_message = None;
                state.timeout_message = None;
                fx.changed = true;
            }
            StreamEvent::TaskTimeout { message, .. } => {
                self.started = true;
                let state = &mut self.state;
                state.is_streaming = false;
                state.timeout_message = Some(
                    message
                        .clone()
                        .unwrap_or_else(|| self.default_timeout_message.clone()),
                );
                state.error_message = None;
                state.final_response = None;
                state.status_message = None;
                fx.changed = true;
            }
            StreamEvent::UserMessageSubmit { text, .. } => {
                let matches = self
                    .original_content
                    .as_deref()
                    .is_some_and(|original| original.trim() == text.trim());
                if matches && let Some(position) = self.render_position {
                    self.slide_generation += 1;
                    self.state.slide_in = Some(position.slide_distance());
                    fx.changed = true;
                    fx.schedule_slide_clear = Some(self.slide_generation);
                }
            }
        }
        // Leaving the streaming state by any route starts artifact retrieval.
        if was_streaming && !self.state.is_streaming {
            fx.fetch_artifacts = true;
        }
        fx
    }

    /// Stores a retrieved artifact batch. Returns whether anything changed.
    pub fn set_artifacts(&mut self, artifacts: Vec<Artifact>) -> bool {
        if self.state.artifacts == artifacts {
            return false;
        }
        self.state.artifacts = artifacts;
        true
    }

    /// Marks the task visible if stream `generation` is still current.
    pub fn mark_visible(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.state.is_visible {
            return false;
        }
        self.state.is_visible = true;
        true
    }

    /// Clears the slide-in offset set by submission `slide_generation`.
    pub fn clear_slide(&mut self, slide_generation: u64) -> bool {
        if slide_generation != self.slide_generation || self.state.slide_in.is_none() {
            return false;
        }
        self.state.slide_in = None;
        true
    }

    pub fn set_render_position(&mut self, position: RenderPosition) {
        self.render_position = Some(position);
    }

    fn final_locked(&self) -> bool {
        self.state.final_response.is_some()
    }

    // First content event for a task that never saw `MessageStart` opens the
    // stream without resetting caller-supplied content.
    fn implicit_start(&mut self, fx: &mut Effects) {
        if self.started {
            return;
        }
        self.started = true;
        self.generation += 1;
        self.state.is_streaming = true;
        fx.changed = true;
        fx.schedule_display = Some(self.generation);
    }
}
