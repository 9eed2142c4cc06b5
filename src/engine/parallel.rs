use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;

use super::{FlowEngine, FlowEngineRegistry, TaskRunner, LOOP_ITEM_KEY};
use crate::context::AgentContext;
use crate::error::{FlowCoreError, Result};
use crate::model::Flow;

/// Fans every task (and loop expansion) out as concurrent work against the
/// same shared context and waits for all of it before returning.
///
/// No ordering is guaranteed between concurrently submitted tasks, only
/// "all complete before `execute` returns". Handles are joined in
/// submission order, so the first-submitted failure is the one surfaced,
/// and only after every worker has been observed. The `loop_item` key is written by
/// each worker against the shared context; tasks mixing loops with other
/// readers of that key must treat the interleaving as a hazard.
pub struct ParallelFlowEngine {
    runner: Arc<TaskRunner>,
}

impl ParallelFlowEngine {
    pub fn new(runner: Arc<TaskRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl FlowEngine for ParallelFlowEngine {
    fn flow_type(&self) -> &str {
        "parallel"
    }

    async fn execute(
        &self,
        flow: Arc<Flow>,
        context: AgentContext,
        engines: Arc<FlowEngineRegistry>,
    ) -> Result<()> {
        self.runner.merge_globals(&flow, &context);

        let mut handles: Vec<JoinHandle<Result<()>>> = Vec::new();
        for task in &flow.tasks {
            if self.runner.should_skip(task, &flow, &context) {
                continue;
            }
            let instances: Vec<Option<Value>> = match self.runner.loop_items(task, &context) {
                Some(items) => items.into_iter().map(Some).collect(),
                None => vec![None],
            };
            for item in instances {
                let runner = Arc::clone(&self.runner);
                let task = task.clone();
                let context = context.clone();
                let engines = Arc::clone(&engines);
                handles.push(tokio::spawn(async move {
                    if let Some(item) = item {
                        context.put(LOOP_ITEM_KEY, item);
                    }
                    runner.run_task(&task, &context, &engines).await
                }));
            }
        }

        let mut first_error: Option<FlowCoreError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
                Err(join_error) => {
                    if first_error.is_none() {
                        first_error = Some(FlowCoreError::Other(join_error.into()));
                    }
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
