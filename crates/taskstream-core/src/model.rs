use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Creates an id from any string-like value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

string_id!(
    /// Opaque identifier of one streamed task (a user or assistant exchange unit).
    TaskId
);
string_id!(
    /// Identifier of the agent that owns a task.
    AgentId
);
string_id!(
    /// Identifier of the project an agent belongs to.
    ProjectId
);

/// Which side of the exchange a task represents.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRole {
    #[default]
    Assistant,
    User,
}

/// Options used to open a task stream.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TaskOptions {
    pub task_id: TaskId,
    #[serde(default)]
    pub role: TaskRole,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    /// Content of an already-completed task, shown until a new stream starts.
    #[serde(default)]
    pub initial_content: Option<String>,
    /// Task metadata says generated files exist; fetch them right away.
    #[serde(default)]
    pub expects_artifacts: bool,
}

impl TaskOptions {
    /// Options for an assistant task with no project context.
    pub fn assistant(task_id: impl Into<TaskId>) -> Self {
        Self {
            task_id: task_id.into(),
            role: TaskRole::Assistant,
            project_id: None,
            agent_id: None,
            initial_content: None,
            expects_artifacts: false,
        }
    }

    /// Options for a task representing the user's own message.
    pub fn user(task_id: impl Into<TaskId>, content: impl Into<String>) -> Self {
        Self {
            role: TaskRole::User,
            initial_content: Some(content.into()),
            ..Self::assistant(task_id)
        }
    }

    pub fn project(mut self, project_id: impl Into<ProjectId>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn agent(mut self, agent_id: impl Into<AgentId>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn initial_content(mut self, content: impl Into<String>) -> Self {
        self.initial_content = Some(content.into());
        self
    }

    pub fn expects_artifacts(mut self, expects: bool) -> Self {
        self.expects_artifacts = expects;
        self
    }

    /// Lookup key for this task's artifacts, when it is an assistant task with
    /// known project and agent.
    pub fn artifact_key(&self) -> Option<ArtifactKey> {
        if self.role != TaskRole::Assistant {
            return None;
        }
        Some(ArtifactKey {
            project_id: self.project_id.clone()?,
            agent_id: self.agent_id.clone()?,
            task_id: self.task_id.clone(),
        })
    }
}

/// `(project, agent, task)` triple addressing one task's generated files.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ArtifactKey {
    pub project_id: ProjectId,
    pub agent_id: AgentId,
    pub task_id: TaskId,
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project_id, self.agent_id, self.task_id)
    }
}
