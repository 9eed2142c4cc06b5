use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;

use flowcore::utils::logging::LoggingConfig;
use flowcore::{
    default_engine_registry, register_builtin_agents, validate_flow, AgentBuilder,
    AgentConstructorRegistry, AgentDefinitionLoader, AgentDefinitionRegistry, AgentExecutor,
    AgentExtensionRegistry, AgentFactory, FlowExecutor, FlowLoader, FlowRuntime,
    InMemoryContextStore, LlmAgentBuilder, LocalEchoClient, NativeAgentBuilder, PluginRegistry,
    TaskRunner, YamlFlowLoader,
};

#[derive(Parser)]
#[command(name = "flowcore", version, about = "FlowCore workflow runner", author)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a flow against a fresh or existing conversation context.
    Run {
        /// Flow reference: a path, resolved against --flows-dir when relative.
        #[arg(long)]
        flow: String,
        #[arg(long, default_value = "flows")]
        flows_dir: PathBuf,
        /// Agent definition document (YAML or JSON list).
        #[arg(long)]
        agents: PathBuf,
        #[arg(long, default_value = "plugins")]
        plugins_dir: PathBuf,
        #[arg(long, default_value = "default")]
        tenant: String,
        #[arg(long, default_value = "local")]
        conversation: String,
        /// Extra globals as key=value pairs.
        #[arg(long = "set", value_name = "KEY=VALUE")]
        sets: Vec<String>,
    },
    /// Parse and structurally validate a flow document.
    Validate {
        #[arg(long)]
        flow: String,
        #[arg(long, default_value = "flows")]
        flows_dir: PathBuf,
    },
    Plugins {
        #[command(subcommand)]
        command: PluginCommand,
    },
}

#[derive(Subcommand)]
enum PluginCommand {
    List {
        #[arg(long, default_value = "plugins")]
        dir: PathBuf,
    },
}

fn parse_globals(sets: &[String]) -> anyhow::Result<HashMap<String, Value>> {
    let mut globals = HashMap::new();
    for entry in sets {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected KEY=VALUE, got `{entry}`"))?;
        globals.insert(key.to_string(), Value::String(value.to_string()));
    }
    Ok(globals)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    LoggingConfig::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            flow,
            flows_dir,
            agents,
            plugins_dir,
            tenant,
            conversation,
            sets,
        } => {
            let definitions = Arc::new(AgentDefinitionRegistry::new());
            definitions.replace_all(AgentDefinitionLoader::load(&agents)?);

            let mut constructors = AgentConstructorRegistry::new();
            register_builtin_agents(&mut constructors);

            let mut plugins = PluginRegistry::new().with_base_dir(plugins_dir.clone());
            plugins.load_directory(&plugins_dir)?;

            let extensions = Arc::new(AgentExtensionRegistry::new(Vec::new()));
            let builders: Vec<Arc<dyn AgentBuilder>> = vec![
                Arc::new(LlmAgentBuilder::new(
                    Arc::new(LocalEchoClient),
                    Arc::clone(&extensions),
                )),
                Arc::new(NativeAgentBuilder::new(
                    Arc::new(constructors),
                    Arc::new(plugins),
                    Arc::clone(&extensions),
                )),
            ];
            let factory = Arc::new(AgentFactory::new(builders));

            let loader: Arc<dyn FlowLoader> = Arc::new(YamlFlowLoader::new(flows_dir));
            let runner = Arc::new(TaskRunner::new(
                Arc::new(AgentExecutor::new(factory, definitions)),
                Arc::clone(&loader),
            ));
            let executor = FlowExecutor::new(Arc::new(default_engine_registry(runner)));
            let runtime = FlowRuntime::new(executor, Arc::new(InMemoryContextStore::new()));

            let flow = Arc::new(loader.load(&flow)?);
            let globals = parse_globals(&sets)?;
            let context = runtime.run(&tenant, &conversation, flow, &globals).await?;

            println!(
                "{}",
                serde_json::to_string_pretty(&context.snapshot())?
            );
        }
        Command::Validate { flow, flows_dir } => {
            let loader = YamlFlowLoader::new(flows_dir);
            let loaded = loader.load(&flow)?;
            validate_flow(&loaded)?;
            println!("flow `{}` is valid ({} tasks)", loaded.id, loaded.tasks.len());
        }
        Command::Plugins {
            command: PluginCommand::List { dir },
        } => {
            let mut registry = PluginRegistry::new();
            registry.load_directory(&dir)?;
            let manifests: Vec<_> = registry.manifests().collect();
            println!("{}", serde_json::to_string_pretty(&manifests)?);
        }
    }
    Ok(())
}
