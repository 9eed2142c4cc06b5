use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlowCoreError>;

#[derive(Debug, Error)]
pub enum FlowCoreError {
    #[error("no flow engine registered for type `{0}`")]
    EngineNotRegistered(String),
    #[error("no agent definition registered for id `{0}`")]
    AgentNotDefined(String),
    #[error("no agent builder supports type `{0}`")]
    NoBuilderForType(String),
    #[error("agent constructor `{0}` not found in registry or any plugin")]
    ConstructorNotFound(String),
    #[error("task `{task_id}` failed")]
    TaskFailed {
        task_id: String,
        #[source]
        source: Box<FlowCoreError>,
    },
    #[error("agent `{agent_id}` failed")]
    AgentFailed {
        agent_id: String,
        #[source]
        source: Box<FlowCoreError>,
    },
    #[error("subflow for task `{task_id}` failed")]
    SubflowFailed {
        task_id: String,
        #[source]
        source: Box<FlowCoreError>,
    },
    #[error("value for key `{key}` is not a `{expected}`")]
    TypeMismatch { key: String, expected: String },
    #[error("expression error: {0}")]
    Expression(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("loader error: {0}")]
    Loader(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowCoreError {
    /// Wraps an error with the id of the task that raised it.
    pub fn for_task(task_id: impl Into<String>, source: FlowCoreError) -> Self {
        FlowCoreError::TaskFailed {
            task_id: task_id.into(),
            source: Box::new(source),
        }
    }
}
