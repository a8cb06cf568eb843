use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::trace;

use crate::graphql::pipeline::{GraphqlReply, GraphqlRequest, Next, PipelineError, Stage};

/// Runs mutations one at a time in submission order.
///
/// `tokio::sync::Mutex` hands out its lock in FIFO order, and the guard is
/// released when the rest of the chain returns, whatever the result. Queries
/// pass straight through.
#[derive(Clone, Default)]
pub struct MutationQueueStage {
    gate: Arc<Mutex<()>>,
}

impl MutationQueueStage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Stage for MutationQueueStage {
    fn name(&self) -> &'static str {
        "mutation_queue"
    }

    async fn call(
        &self,
        request: GraphqlRequest,
        next: Next<'_>,
    ) -> Result<GraphqlReply, PipelineError> {
        if !request.operation.is_mutation() {
            return next.run(request).await;
        }

        let _turn = self.gate.lock().await;
        trace!(
            target = "vetrina::graphql",
            operation = request.operation.label(),
            "mutation dequeued"
        );
        next.run(request).await
    }
}
