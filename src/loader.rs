use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FlowCoreError, Result};
use crate::model::{AgentDefinition, Flow};

/// Produces a fresh `Flow` per call; the subflow runner resolves
/// `flow_ref` paths through this seam.
pub trait FlowLoader: Send + Sync {
    fn load(&self, flow_ref: &str) -> Result<Flow>;
}

/// Loads flow documents from YAML (or JSON) files. Absolute paths and
/// paths that already resolve are used as-is; everything else is resolved
/// against the configured flows directory.
pub struct YamlFlowLoader {
    flows_dir: PathBuf,
}

impl YamlFlowLoader {
    pub fn new(flows_dir: impl Into<PathBuf>) -> Self {
        Self {
            flows_dir: flows_dir.into(),
        }
    }

    fn resolve_path(&self, flow_ref: &str) -> PathBuf {
        let direct = Path::new(flow_ref);
        if direct.is_absolute() || direct.exists() {
            direct.to_path_buf()
        } else {
            self.flows_dir.join(flow_ref)
        }
    }
}

impl FlowLoader for YamlFlowLoader {
    fn load(&self, flow_ref: &str) -> Result<Flow> {
        let path = self.resolve_path(flow_ref);
        tracing::debug!(path = %path.display(), "loading flow file");
        let content = fs::read_to_string(&path).map_err(|e| {
            FlowCoreError::Loader(format!("cannot read flow file `{}`: {e}", path.display()))
        })?;
        let flow: Flow = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .map_err(|e| FlowCoreError::Loader(format!("invalid flow `{flow_ref}`: {e}")))?
        } else {
            serde_yaml::from_str(&content)
                .map_err(|e| FlowCoreError::Loader(format!("invalid flow `{flow_ref}`: {e}")))?
        };
        validate_flow(&flow)?;
        tracing::info!(flow_id = %flow.id, tasks = flow.tasks.len(), "flow loaded");
        Ok(flow)
    }
}

/// Structural checks applied after parsing: a flow needs an id and a type,
/// task ids must be non-empty and unique, and every task needs an agent or
/// a subflow reference to dispatch to.
pub fn validate_flow(flow: &Flow) -> Result<()> {
    if flow.id.trim().is_empty() {
        return Err(FlowCoreError::Loader("flow id must not be empty".into()));
    }
    if flow.flow_type.trim().is_empty() {
        return Err(FlowCoreError::Loader(format!(
            "flow `{}` has no type",
            flow.id
        )));
    }
    let mut seen = HashSet::new();
    for task in &flow.tasks {
        if task.id.trim().is_empty() {
            return Err(FlowCoreError::Loader(format!(
                "flow `{}` contains a task without an id",
                flow.id
            )));
        }
        if !seen.insert(task.id.as_str()) {
            return Err(FlowCoreError::Loader(format!(
                "flow `{}` has duplicate task id `{}`",
                flow.id, task.id
            )));
        }
        let has_agent = !task.agent_id.trim().is_empty();
        let has_subflow = task.flow_ref.as_deref().is_some_and(|r| !r.trim().is_empty());
        if !has_agent && !has_subflow {
            return Err(FlowCoreError::Loader(format!(
                "task `{}` names neither an agent nor a subflow",
                task.id
            )));
        }
    }
    Ok(())
}

/// Loads the agent definition document consumed by the definition
/// registry: a YAML (or JSON) list of definitions.
pub struct AgentDefinitionLoader;

impl AgentDefinitionLoader {
    pub fn load(path: impl AsRef<Path>) -> Result<Vec<AgentDefinition>> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "loading agent definitions");
        let content = fs::read_to_string(path).map_err(|e| {
            FlowCoreError::Loader(format!(
                "cannot read agent definitions `{}`: {e}",
                path.display()
            ))
        })?;
        let definitions: Vec<AgentDefinition> = if path
            .extension()
            .is_some_and(|ext| ext == "json")
        {
            serde_json::from_str(&content)
                .map_err(|e| FlowCoreError::Loader(format!("invalid agent definitions: {e}")))?
        } else {
            serde_yaml::from_str(&content)
                .map_err(|e| FlowCoreError::Loader(format!("invalid agent definitions: {e}")))?
        };
        tracing::info!(count = definitions.len(), "agent definitions loaded");
        Ok(definitions)
    }
}
