use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{AgentId, TaskId};

/// Decoded notification about one task's execution.
///
/// Every variant carries the `task_id` it is addressed to. On the wire the
/// variant is selected by a snake_case `type` tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A new assistant message stream begins.
    MessageStart { task_id: TaskId },
    /// Legacy text delta; may carry an explicit status hint instead of text.
    MessageChunk {
        task_id: TaskId,
        #[serde(default)]
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
    /// Replaces the current section's text wholesale.
    AssistantSection { task_id: TaskId, text: String },
    ToolUseStart {
        task_id: TaskId,
        tool_id: String,
        tool_name: String,
        #[serde(default)]
        input: serde_json::Map<String, serde_json::Value>,
    },
    ToolUseComplete {
        task_id: TaskId,
        tool_id: String,
        #[serde(default)]
        result: serde_json::Value,
    },
    ToolUseError {
        task_id: TaskId,
        tool_id: String,
        error: String,
    },
    /// Authoritative final answer for the task.
    FinalResponse { task_id: TaskId, response: String },
    /// The message stream finished.
    MessageComplete { task_id: TaskId },
    /// The stream failed for the given agent.
    StreamError {
        task_id: TaskId,
        agent_id: AgentId,
        error: String,
    },
    TaskTimeout {
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// The user submitted a message; only user tasks react to it.
    UserMessageSubmit { task_id: TaskId, text: String },
}

/// Discriminant of `StreamEvent`, used as the bus subscription key.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EventKind {
    MessageStart,
    MessageChunk,
    AssistantSection,
    ToolUseStart,
    ToolUseComplete,
    ToolUseError,
    FinalResponse,
    MessageComplete,
    StreamError,
    TaskTimeout,
    UserMessageSubmit,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::MessageStart,
        EventKind::MessageChunk,
        EventKind::AssistantSection,
        EventKind::ToolUseStart,
        EventKind::ToolUseComplete,
        EventKind::ToolUseError,
        EventKind::FinalResponse,
        EventKind::MessageComplete,
        EventKind::StreamError,
        EventKind::TaskTimeout,
        EventKind::UserMessageSubmit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MessageStart => "message_start",
            EventKind::MessageChunk => "message_chunk",
            EventKind::AssistantSection => "assistant_section",
            EventKind::ToolUseStart => "tool_use_start",
            EventKind::ToolUseComplete => "tool_use_complete",
            EventKind::ToolUseError => "tool_use_error",
            EventKind::FinalResponse => "final_response",
            EventKind::MessageComplete => "message_complete",
            EventKind::StreamError => "stream_error",
            EventKind::TaskTimeout => "task_timeout",
            EventKind::UserMessageSubmit => "user_message_submit",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MessageStart { .. } => EventKind::MessageStart,
            Self::MessageChunk { .. } => EventKind::MessageChunk,
            Self::AssistantSection { .. } => EventKind::AssistantSection,
            Self::ToolUseStart { .. } => EventKind::ToolUseStart,
            Self::ToolUseComplete { .. } => EventKind::ToolUseComplete,
            Self::ToolUseError { .. } => EventKind::ToolUseError,
            Self::FinalResponse { .. } => EventKind::FinalResponse,
            Self::MessageComplete { .. } => EventKind::MessageComplete,
            Self::StreamError { .. } => EventKind::StreamError,
            Self::TaskTimeout { .. } => EventKind::TaskTimeout,
            Self::UserMessageSubmit { .. } => EventKind::UserMessageSubmit,
        }
    }

    /// Task the event is addressed to.
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::MessageStart { task_id }
            | Self::MessageChunk { task_id, .. }
            | Self::AssistantSection { task_id, .. }
            | Self::ToolUseStart { task_id, .. }
            | Self::ToolUseComplete { task_id, .. }
            | Self::ToolUseError { task_id, .. }
            | Self::FinalResponse { task_id, .. }
            | Self::MessageComplete { task_id }
            | Self::StreamError { task_id, .. }
            | Self::TaskTimeout { task_id, .. }
            | Self::UserMessageSubmit { task_id, .. } => task_id,
        }
    }
}
