use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::GraphQLRequest;
use crate::error::QueryError;
use crate::query_executor::QueryExecutor;
use crate::query_planner::QueryPlanner;
use crate::schema_merge::MergedSchema;

/// The gateway: one merged schema plus the planner/executor pair that turns
/// a client request into upstream calls. The schema is built once at
/// startup and never mutated, so requests share it without locking.
pub struct StitchGateway {
    schema: Arc<MergedSchema>,
    planner: Box<dyn QueryPlanner>,
    executor: Box<dyn QueryExecutor>,
}

impl StitchGateway {
    pub fn new(
        schema: MergedSchema,
        planner: Box<dyn QueryPlanner>,
        executor: Box<dyn QueryExecutor>,
    ) -> Self {
        StitchGateway {
            schema: Arc::new(schema),
            planner,
            executor,
        }
    }

    /// Plan and execute one client request. Planning failures bubble up as
    /// `QueryError` so the server layer can answer with a GraphQL error
    /// payload; execution failures are already embedded in the response.
    pub async fn process_request(&self, request: GraphQLRequest) -> Result<Value, QueryError> {
        debug!(operation = ?request.operation_name, "processing request");

        let plan = self.planner.plan(&request, &self.schema).await?;
        Ok(self.executor.execute(plan, &self.schema).await)
    }

    pub fn schema(&self) -> &MergedSchema {
        &self.schema
    }
}
