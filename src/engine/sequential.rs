use std::sync::Arc;

use async_trait::async_trait;

use super::{FlowEngine, FlowEngineRegistry, TaskRunner, LOOP_ITEM_KEY};
use crate::context::AgentContext;
use crate::error::Result;
use crate::model::Flow;

/// In-order execution: task N's context writes are visible to task N+1.
pub struct SequentialFlowEngine {
    runner: Arc<TaskRunner>,
}

impl SequentialFlowEngine {
    pub fn new(runner: Arc<TaskRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl FlowEngine for SequentialFlowEngine {
    fn flow_type(&self) -> &str {
        "sequential"
    }

    async fn execute(
        &self,
        flow: Arc<Flow>,
        context: AgentContext,
        engines: Arc<FlowEngineRegistry>,
    ) -> Result<()> {
        self.runner.merge_globals(&flow, &context);
        for task in &flow.tasks {
            if self.runner.should_skip(task, &flow, &context) {
                continue;
            }
            match self.runner.loop_items(task, &context) {
                Some(items) => {
                    for item in items {
                        context.put(LOOP_ITEM_KEY, item);
                        self.runner.run_task(task, &context, &engines).await?;
                    }
                }
                None => self.runner.run_task(task, &context, &engines).await?,
            }
        }
        Ok(())
    }
}
