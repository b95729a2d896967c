use serde::Serialize;

use crate::artifacts::Artifact;
use crate::tools::{ToolCall, ToolCallTracker};

/// Everything currently known about one task.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskStreamState {
    /// Text of the current assistant section.
    pub current_section_text: String,
    /// Tool calls of the current section.
    pub tools: ToolCallTracker,
    pub final_response: Option<String>,
    /// Concatenated `MessageChunk` text.
    pub legacy_buffer: String,
    pub is_streaming: bool,
    /// Set once the post-start debounce has elapsed.
    pub is_visible: bool,
    pub status_message: Option<String>,
    pub error_message: Option<String>,
    pub timeout_message: Option<String>,
    pub artifacts: Vec<Artifact>,
    /// One-shot slide-in distance for a just-submitted user message.
    pub slide_in: Option<f32>,
}

/// Narrative chosen for display, in precedence order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum DisplayBody {
    Timeout(String),
    Error(String),
    Final(String),
    Text(String),
    Empty,
}

/// Render-ready projection of a `TaskStreamState`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskView {
    pub body: DisplayBody,
    /// `None` whenever a final response exists.
    pub tools: Option<Vec<ToolCall>>,
    pub status: Option<String>,
    pub streaming: bool,
    pub visible: bool,
    pub artifacts: Vec<Artifact>,
    pub slide_in: Option<f32>,
}

impl TaskStreamState {
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tools.calls()
    }

    fn has_final(&self) -> bool {
        self.final_response
            .as_deref()
            .is_some_and(|response| !response.is_empty())
    }

    /// Resolves display precedence: timeout, then error, then final response,
    /// then streamed text.
    pub fn display_body(&self) -> DisplayBody {
        if let Some(message) = &self.timeout_message {
            return DisplayBody::Timeout(message.clone());
        }
        if let Some(message) = &self.error_message {
            return DisplayBody::Error(message.clone());
        }
        if let Some(response) = self.final_response.as_ref().filter(|r| !r.is_empty()) {
            return DisplayBody::Final(response.clone());
        }
        if !self.legacy_buffer.is_empty() {
            return DisplayBody::Text(self.legacy_buffer.clone());
        }
        if !self.current_section_text.is_empty() {
            return DisplayBody::Text(self.current_section_text.clone());
        }
        DisplayBody::Empty
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            body: self.display_body(),
            tools: (!self.has_final()).then(|| self.tools.calls().to_vec()),
            status: self.status_message.clone(),
            streaming: self.is_streaming,
            visible: self.is_visible,
            artifacts: self.artifacts.clone(),
            slide_in: self.slide_in,
        }
    }
}
