use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named, ordered task graph plus globals and an engine-type selector.
///
/// Flows are immutable once loaded; the loader produces a fresh `Flow` per
/// invocation, so no state leaks between runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    pub name: String,
    /// Selects the flow engine: `sequential`, `parallel`, `conversational`.
    #[serde(rename = "type")]
    pub flow_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Merged into the context's data map before any task runs.
    #[serde(default)]
    pub globals: HashMap<String, Value>,
}

/// One step in a flow: an agent invocation or a subflow reference, with an
/// optional guarding condition and loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub agent_id: String,
    /// Literal values or `${name}` references resolved against the context.
    #[serde(default)]
    pub input: HashMap<String, Value>,
    /// Where the result is stored in the context; absent means discard.
    #[serde(default)]
    pub output_key: Option<String>,
    /// A failed optional task is logged and absorbed instead of aborting.
    #[serde(default)]
    pub optional: bool,
    /// Path to a subflow document; takes precedence over agent dispatch.
    #[serde(default)]
    pub flow_ref: Option<String>,
    /// Boolean expression over `data` / `globals`; empty means always run.
    #[serde(default)]
    pub condition: Option<String>,
    /// Context key naming a list to fan the task out over.
    #[serde(default)]
    pub loop_over: Option<String>,
}

/// Static configuration identifying an agent's type and parameters,
/// independent of any running instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub agent_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    system_prompt: Option<String>,
    /// Dispatch key for the agent factory (`llm`, `native`, ...).
    #[serde(rename = "type")]
    pub agent_type: String,
    #[serde(default)]
    enabled_extensions: Vec<String>,
    #[serde(default)]
    config: HashMap<String, String>,
}

impl AgentDefinition {
    pub fn new(agent_id: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: String::new(),
            system_prompt: None,
            agent_type: agent_type.into(),
            enabled_extensions: Vec::new(),
            config: HashMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.enabled_extensions = extensions;
        self
    }

    pub fn with_config_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Never null: an unset prompt is the empty string.
    pub fn system_prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or("")
    }

    pub fn enabled_extensions(&self) -> &[String] {
        &self.enabled_extensions
    }

    pub fn config(&self) -> &HashMap<String, String> {
        &self.config
    }
}
