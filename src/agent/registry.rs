use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::AgentExtension;
use crate::model::AgentDefinition;

/// In-memory map of agent definitions keyed by agent id.
///
/// Loaded once at startup and replaced wholesale on reload; there are no
/// partial updates.
#[derive(Default)]
pub struct AgentDefinitionRegistry {
    definitions: RwLock<HashMap<String, AgentDefinition>>,
}

impl AgentDefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_all(&self, definitions: Vec<AgentDefinition>) {
        let mut map = HashMap::with_capacity(definitions.len());
        for definition in definitions {
            map.insert(definition.agent_id.clone(), definition);
        }
        *self.definitions.write() = map;
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentDefinition> {
        self.definitions.read().get(agent_id).cloned()
    }

    pub fn all(&self) -> Vec<AgentDefinition> {
        self.definitions.read().values().cloned().collect()
    }
}

/// Extension lookup keyed by extension name, built once from the full set
/// of available extensions at startup.
#[derive(Default)]
pub struct AgentExtensionRegistry {
    registry: HashMap<String, Arc<dyn AgentExtension>>,
}

impl AgentExtensionRegistry {
    pub fn new(extensions: Vec<Arc<dyn AgentExtension>>) -> Self {
        let mut registry = HashMap::with_capacity(extensions.len());
        for extension in extensions {
            registry.insert(extension.name().to_string(), extension);
        }
        Self { registry }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentExtension>> {
        self.registry.get(name).cloned()
    }

    /// Resolves a definition's enabled-extension names, silently dropping
    /// names with no registered extension.
    pub fn enabled(&self, names: &[String]) -> Vec<Arc<dyn AgentExtension>> {
        names.iter().filter_map(|name| self.get(name)).collect()
    }
}
