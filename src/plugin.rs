use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::agent::{Agent, AgentExtension};
use crate::error::Result;
use crate::model::AgentDefinition;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Agent,
    Extension,
    Other,
}

/// `plugin.json` at the root of each plugin directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    #[serde(default = "PluginManifest::default_kind")]
    pub kind: PluginKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Constructor entry names this plugin can build.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl PluginManifest {
    fn default_kind() -> PluginKind {
        PluginKind::Other
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin manifest not found: {0}")]
    ManifestMissing(String),
    #[error("failed to parse plugin manifest: {0}")]
    ManifestParse(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Constructs agents on behalf of one plugin. This is the extension point
/// behind which runtime loading (e.g. a shared object with a fixed
/// entry-point symbol) can sit; the engine only sees this trait.
pub trait AgentProvider: Send + Sync {
    fn plugin_name(&self) -> &str;
    /// `None` when this provider does not know `entry`; an `Err` is logged
    /// by the caller and the next provider is tried.
    fn construct(
        &self,
        entry: &str,
        definition: &AgentDefinition,
        extensions: Vec<Arc<dyn AgentExtension>>,
    ) -> Option<Result<Arc<dyn Agent>>>;
}

/// Plugin manifests discovered at startup plus the providers registered
/// for them. Read-only once initialization completes, so it can be shared
/// across workers without locking.
#[derive(Default)]
pub struct PluginRegistry {
    manifests: HashMap<String, PluginManifest>,
    providers: Vec<Arc<dyn AgentProvider>>,
    base_dir: Option<PathBuf>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(mut self, base: PathBuf) -> Self {
        self.base_dir = Some(base);
        self
    }

    /// Scans `dir` for `<plugin>/plugin.json` manifests. A missing
    /// directory is a warning, not an error, matching a deployment with no
    /// plugins installed.
    pub fn load_directory(&mut self, dir: impl AsRef<Path>) -> std::result::Result<(), PluginError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "plugins directory does not exist");
            return Ok(());
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                let manifest_path = path.join("plugin.json");
                if manifest_path.exists() {
                    let manifest = Self::load_manifest(&manifest_path)?;
                    tracing::info!(plugin = %manifest.name, version = %manifest.version, "plugin discovered");
                    self.register_manifest(manifest);
                }
            }
        }
        Ok(())
    }

    pub fn register_manifest(&mut self, manifest: PluginManifest) {
        self.manifests.insert(manifest.name.clone(), manifest);
    }

    pub fn register_provider(&mut self, provider: Arc<dyn AgentProvider>) {
        self.providers.push(provider);
    }

    pub fn manifests(&self) -> impl Iterator<Item = &PluginManifest> {
        self.manifests.values()
    }

    pub fn providers(&self) -> &[Arc<dyn AgentProvider>] {
        &self.providers
    }

    fn load_manifest(path: &Path) -> std::result::Result<PluginManifest, PluginError> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|err| PluginError::ManifestParse(err.to_string()))
    }
}
