use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use flowcore::{
    default_engine_registry, Agent, AgentBuilder, AgentContext, AgentDefinition,
    AgentDefinitionRegistry, AgentExecutor, AgentFactory, AgentInvocation, EchoAgent, Flow,
    FlowCoreError, FlowExecutor, FlowLoader, Result, TaskRunner, YamlFlowLoader, LOOP_ITEM_KEY,
};

/// Records what it was called with: the `msg` input when present,
/// otherwise the current loop item.
struct Recorder {
    name: String,
    calls: Arc<Mutex<Vec<Value>>>,
    reply: Value,
    fail: bool,
    delay: Option<Duration>,
}

impl Recorder {
    fn new(name: &str, calls: Arc<Mutex<Vec<Value>>>) -> Self {
        Self {
            name: name.to_string(),
            calls,
            reply: Value::Null,
            fail: false,
            delay: None,
        }
    }

    fn replying(mut self, reply: Value) -> Self {
        self.reply = reply;
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Agent for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        invocation: &mut AgentInvocation,
        context: &AgentContext,
    ) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let entry = invocation
            .input("msg")
            .cloned()
            .or_else(|| context.get(LOOP_ITEM_KEY))
            .unwrap_or(Value::Null);
        self.calls.lock().push(entry);
        if self.fail {
            return Err(anyhow::anyhow!("boom").into());
        }
        if !self.reply.is_null() {
            invocation.set_result(self.reply.clone());
        }
        Ok(())
    }
}

/// Resolves agents from a fixed id -> instance map; registered under the
/// `test` agent type.
struct MapBuilder {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentBuilder for MapBuilder {
    fn supports(&self, agent_type: &str) -> bool {
        agent_type == "test"
    }

    fn build(&self, definition: &AgentDefinition) -> Result<Arc<dyn Agent>> {
        self.agents
            .get(&definition.agent_id)
            .cloned()
            .ok_or_else(|| FlowCoreError::AgentNotDefined(definition.agent_id.clone()))
    }
}

fn executor_for(agents: Vec<(&str, Arc<dyn Agent>)>) -> FlowExecutor {
    let definitions = Arc::new(AgentDefinitionRegistry::new());
    definitions.replace_all(
        agents
            .iter()
            .map(|(id, _)| AgentDefinition::new(*id, "test"))
            .collect(),
    );
    let map = agents
        .into_iter()
        .map(|(id, agent)| (id.to_string(), agent))
        .collect();
    let builders: Vec<Arc<dyn AgentBuilder>> = vec![Arc::new(MapBuilder { agents: map })];
    let factory = Arc::new(AgentFactory::new(builders));
    let loader: Arc<dyn FlowLoader> = Arc::new(YamlFlowLoader::new("flows"));
    let runner = Arc::new(TaskRunner::new(
        Arc::new(AgentExecutor::new(factory, definitions)),
        loader,
    ));
    FlowExecutor::new(Arc::new(default_engine_registry(runner)))
}

fn flow(doc: Value) -> Arc<Flow> {
    Arc::new(serde_json::from_value(doc).unwrap())
}

#[tokio::test]
async fn sequential_chains_outputs_between_tasks() {
    let echo: Arc<dyn Agent> = Arc::new(EchoAgent::new(&AgentDefinition::new("echo", "test")));
    let executor = executor_for(vec![("echo", echo)]);
    let ctx = AgentContext::new("t", "c");

    let flow = flow(json!({
        "id": "chain", "name": "Chain", "type": "sequential",
        "tasks": [
            { "id": "t1", "agentId": "echo", "input": { "msg": "hi" }, "outputKey": "out1" },
            { "id": "t2", "agentId": "echo", "input": { "msg": "${out1}" }, "outputKey": "out2" }
        ]
    }));
    executor.run(flow, &ctx).await.unwrap();

    assert_eq!(ctx.get("out1"), Some(json!("hi")));
    assert_eq!(ctx.get("out2"), Some(json!("hi")));
}

#[tokio::test]
async fn empty_flow_only_merges_globals() {
    let executor = executor_for(vec![]);
    let ctx = AgentContext::new("t", "c");

    let flow = flow(json!({
        "id": "empty", "name": "Empty", "type": "sequential",
        "globals": { "env": "prod" },
        "tasks": []
    }));
    executor.run(flow, &ctx).await.unwrap();

    assert_eq!(ctx.get("env"), Some(json!("prod")));
    assert_eq!(ctx.size(), 1);
}

#[tokio::test]
async fn condition_decides_whether_a_task_runs() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let agent: Arc<dyn Agent> = Arc::new(Recorder::new("rec", Arc::clone(&calls)));
    let executor = executor_for(vec![("rec", agent)]);
    let ctx = AgentContext::new("t", "c");
    ctx.put("ready", json!("yes"));

    let flow = flow(json!({
        "id": "guarded", "name": "Guarded", "type": "sequential",
        "tasks": [
            { "id": "skipped", "agentId": "rec", "input": { "msg": "a" },
              "condition": "data.flag == true", "outputKey": "skipped_out" },
            { "id": "taken", "agentId": "rec", "input": { "msg": "b" },
              "condition": "data.ready == 'yes'" }
        ]
    }));
    executor.run(flow, &ctx).await.unwrap();

    assert_eq!(*calls.lock(), vec![json!("b")]);
    assert!(ctx.get("skipped_out").is_none());
}

#[tokio::test]
async fn loop_over_fans_out_per_item() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let agent: Arc<dyn Agent> = Arc::new(Recorder::new("rec", Arc::clone(&calls)));
    let executor = executor_for(vec![("rec", agent)]);
    let ctx = AgentContext::new("t", "c");
    ctx.put("items", json!(["a", "b", "c"]));

    let flow = flow(json!({
        "id": "looped", "name": "Looped", "type": "sequential",
        "tasks": [
            { "id": "t1", "agentId": "rec", "loopOver": "items" }
        ]
    }));
    executor.run(flow, &ctx).await.unwrap();

    assert_eq!(*calls.lock(), vec![json!("a"), json!("b"), json!("c")]);
}

#[tokio::test]
async fn loop_over_missing_list_runs_once() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let agent: Arc<dyn Agent> = Arc::new(Recorder::new("rec", Arc::clone(&calls)));
    let executor = executor_for(vec![("rec", agent)]);
    let ctx = AgentContext::new("t", "c");
    ctx.put("not_a_list", json!("scalar"));

    let flow = flow(json!({
        "id": "looped", "name": "Looped", "type": "sequential",
        "tasks": [
            { "id": "t1", "agentId": "rec", "loopOver": "not_a_list" },
            { "id": "t2", "agentId": "rec", "loopOver": "absent" }
        ]
    }));
    executor.run(flow, &ctx).await.unwrap();

    assert_eq!(calls.lock().len(), 2);
}

#[tokio::test]
async fn optional_failure_is_absorbed() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let bad: Arc<dyn Agent> = Arc::new(Recorder::new("bad", Arc::clone(&calls)).failing());
    let good: Arc<dyn Agent> =
        Arc::new(Recorder::new("good", Arc::clone(&calls)).replying(json!("ok")));
    let executor = executor_for(vec![("bad", bad), ("good", good)]);
    let ctx = AgentContext::new("t", "c");

    let flow = flow(json!({
        "id": "lenient", "name": "Lenient", "type": "sequential",
        "tasks": [
            { "id": "t1", "agentId": "bad", "optional": true, "outputKey": "bad_out" },
            { "id": "t2", "agentId": "good", "outputKey": "good_out" }
        ]
    }));
    executor.run(flow, &ctx).await.unwrap();

    assert!(ctx.get("bad_out").is_none());
    assert_eq!(ctx.get("good_out"), Some(json!("ok")));
    assert_eq!(calls.lock().len(), 2);
}

#[tokio::test]
async fn required_failure_aborts_the_flow() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let bad: Arc<dyn Agent> = Arc::new(Recorder::new("bad", Arc::clone(&calls)).failing());
    let good: Arc<dyn Agent> = Arc::new(Recorder::new("good", Arc::clone(&calls)));
    let executor = executor_for(vec![("bad", bad), ("good", good)]);
    let ctx = AgentContext::new("t", "c");

    let flow = flow(json!({
        "id": "strict", "name": "Strict", "type": "sequential",
        "tasks": [
            { "id": "t1", "agentId": "bad" },
            { "id": "t2", "agentId": "good" }
        ]
    }));
    let error = executor.run(flow, &ctx).await.unwrap_err();

    assert!(matches!(
        error,
        FlowCoreError::TaskFailed { ref task_id, .. } if task_id == "t1"
    ));
    // t1 was invoked, t2 never was.
    assert_eq!(calls.lock().len(), 1);
}

#[tokio::test]
async fn unknown_agent_id_fails_the_task() {
    let executor = executor_for(vec![]);
    let ctx = AgentContext::new("t", "c");

    let flow = flow(json!({
        "id": "broken", "name": "Broken", "type": "sequential",
        "tasks": [ { "id": "t1", "agentId": "ghost" } ]
    }));
    let error = executor.run(flow, &ctx).await.unwrap_err();

    assert!(matches!(error, FlowCoreError::TaskFailed { ref task_id, .. } if task_id == "t1"));
}

#[tokio::test]
async fn unknown_flow_type_is_rejected() {
    let executor = executor_for(vec![]);
    let ctx = AgentContext::new("t", "c");

    let flow = flow(json!({
        "id": "odd", "name": "Odd", "type": "mystery", "tasks": []
    }));
    let error = executor.run(flow, &ctx).await.unwrap_err();

    assert!(matches!(error, FlowCoreError::EngineNotRegistered(ref t) if t == "mystery"));
}

#[tokio::test]
async fn parallel_runs_every_task() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let agent: Arc<dyn Agent> =
        Arc::new(Recorder::new("writer", Arc::clone(&calls)).replying(json!("done")));
    let executor = executor_for(vec![("writer", agent)]);
    let ctx = AgentContext::new("t", "c");

    let flow = flow(json!({
        "id": "fanout", "name": "Fanout", "type": "parallel",
        "tasks": [
            { "id": "p1", "agentId": "writer", "outputKey": "k1" },
            { "id": "p2", "agentId": "writer", "outputKey": "k2" },
            { "id": "p3", "agentId": "writer", "outputKey": "k3" },
            { "id": "p4", "agentId": "writer", "outputKey": "k4" },
            { "id": "p5", "agentId": "writer", "outputKey": "k5" }
        ]
    }));
    executor.run(flow, &ctx).await.unwrap();

    for key in ["k1", "k2", "k3", "k4", "k5"] {
        assert_eq!(ctx.get(key), Some(json!("done")), "missing {key}");
    }
    assert_eq!(calls.lock().len(), 5);
}

#[tokio::test]
async fn parallel_surfaces_failure_after_all_tasks_finish() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let bad: Arc<dyn Agent> = Arc::new(Recorder::new("bad", Arc::clone(&calls)).failing());
    let slow: Arc<dyn Agent> = Arc::new(
        Recorder::new("slow", Arc::clone(&calls))
            .replying(json!("late"))
            .delayed(Duration::from_millis(20)),
    );
    let executor = executor_for(vec![("bad", bad), ("slow", slow)]);
    let ctx = AgentContext::new("t", "c");

    let flow = flow(json!({
        "id": "fanout", "name": "Fanout", "type": "parallel",
        "tasks": [
            { "id": "p1", "agentId": "bad" },
            { "id": "p2", "agentId": "slow", "outputKey": "k2" },
            { "id": "p3", "agentId": "slow", "outputKey": "k3" }
        ]
    }));
    let error = executor.run(flow, &ctx).await.unwrap_err();

    // The first-submitted failure wins, but only after the slow tasks ran.
    assert!(matches!(error, FlowCoreError::TaskFailed { ref task_id, .. } if task_id == "p1"));
    assert_eq!(ctx.get("k2"), Some(json!("late")));
    assert_eq!(ctx.get("k3"), Some(json!("late")));
    assert_eq!(calls.lock().len(), 3);
}

#[tokio::test]
async fn parallel_loop_fans_out_concurrently() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let agent: Arc<dyn Agent> = Arc::new(Recorder::new("rec", Arc::clone(&calls)));
    let executor = executor_for(vec![("rec", agent)]);
    let ctx = AgentContext::new("t", "c");
    ctx.put("items", json!(["a", "b", "c"]));

    let flow = flow(json!({
        "id": "looped", "name": "Looped", "type": "parallel",
        "tasks": [ { "id": "t1", "agentId": "rec", "loopOver": "items" } ]
    }));
    executor.run(flow, &ctx).await.unwrap();

    // No ordering guarantee, and loop_item writes may interleave; only the
    // invocation count and value domain are stable.
    let calls = calls.lock();
    assert_eq!(calls.len(), 3);
    for call in calls.iter() {
        assert!(["a", "b", "c"].contains(&call.as_str().unwrap()));
    }
}
