use serde::{Deserialize, Serialize};

/// Lifecycle state of one tool invocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Running,
    Complete,
    Error,
}

impl ToolCallStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One tool invocation within the current section of a task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Map<String, serde_json::Value>,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ordered set of tool calls for the current section.
///
/// Transitions are accepted only from `Running`; completion or failure for an
/// unknown or already-terminal id is ignored, which makes duplicate delivery
/// harmless.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolCallTracker {
    calls: Vec<ToolCall>,
}

impl ToolCallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new running call. Calls are never deduplicated by name.
    pub fn start(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Map<String, serde_json::Value>,
    ) {
        self.calls.push(ToolCall {
            id: id.into(),
            name: name.into(),
            input,
            status: ToolCallStatus::Running,
            result: None,
            error: None,
        });
    }

    /// Marks a running call complete. Returns whether anything changed.
    pub fn complete(&mut self, id: &str, result: serde_json::Value) -> bool {
        match self.running_mut(id) {
            Some(call) => {
                call.status = ToolCallStatus::Complete;
                call.result = Some(result);
                true
            }
            None => false,
        }
    }

    /// Marks a running call failed. Returns whether anything changed.
    pub fn fail(&mut self, id: &str, error: impl Into<String>) -> bool {
        match self.running_mut(id) {
            Some(call) => {
                call.status = ToolCallStatus::Error;
                call.error = Some(error.into());
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    pub fn calls(&self) -> &[ToolCall] {
        &self.calls
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    // Ids are expected to be unique; if a producer reuses one, the most recent
    // running entry is the one that transitions.
    fn running_mut(&mut self, id: &str) -> Option<&mut ToolCall> {
        self.calls
            .iter_mut()
            .rev()
            .find(|call| call.id == id && call.status == ToolCallStatus::Running)
    }
}
