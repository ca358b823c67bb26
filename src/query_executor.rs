use async_trait::async_trait;
use futures::future::join_all;
use graphql_parser::query::{Selection, SelectionSet};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::GraphQLRequest;
use crate::introspection_resolver;
use crate::query_planner::{LinkJob, OperationKind, QueryPlan, result_key};
use crate::schema_merge::MergedSchema;

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, plan: QueryPlan, schema: &MergedSchema) -> Value;
}

/// Runs a query plan: meta fields locally, service operations and link
/// delegations against their upstreams, all failures confined to the
/// response being built.
pub struct DelegatingQueryExecutor;

impl DelegatingQueryExecutor {
    pub fn new() -> Self {
        DelegatingQueryExecutor
    }
}

impl Default for DelegatingQueryExecutor {
    fn default() -> Self {
        DelegatingQueryExecutor::new()
    }
}

#[async_trait]
impl QueryExecutor for DelegatingQueryExecutor {
    async fn execute(&self, plan: QueryPlan, schema: &MergedSchema) -> Value {
        let mut data = Map::new();
        let mut errors: Vec<Value> = Vec::new();

        let root_type = match plan.kind {
            OperationKind::Query => schema.query_type_name(),
            OperationKind::Mutation => schema.mutation_type_name().unwrap_or("Mutation"),
        };
        for field in &plan.meta_fields {
            data.insert(
                result_key(field).to_string(),
                introspection_resolver::resolve_meta_field(
                    schema,
                    root_type,
                    field,
                    plan.variables.as_ref(),
                ),
            );
        }

        // All service operations are independent; run them concurrently.
        let service_results = join_all(plan.service_ops.iter().map(|op| {
            let request = GraphQLRequest {
                query: op.query.clone(),
                variables: op.variables.clone(),
                operation_name: None,
                auth_headers: plan.auth_headers.clone(),
            };
            async move {
                let result = match schema.schema(&op.service) {
                    Some(remote) => remote.execute(&request).await.map_err(|e| e.to_string()),
                    None => Err(format!("unknown service {:?}", op.service)),
                };
                (op, result)
            }
        }))
        .await;

        for (op, result) in service_results {
            match result {
                Ok(response) => {
                    if let Some(Value::Object(fields)) = response.get("data") {
                        for (key, value) in fields {
                            data.insert(key.clone(), value.clone());
                        }
                    }
                    collect_errors(&mut errors, &response, &op.service);
                }
                Err(message) => {
                    warn!(service = %op.service, error = %message, "service call failed");
                    for key in &op.root_keys {
                        data.entry(key.clone()).or_insert(Value::Null);
                    }
                    errors.push(json!({
                        "message": format!("Execution error: {}", message),
                        "service": op.service,
                    }));
                }
            }
        }

        // Delegations are likewise independent of each other.
        let delegation_results = join_all(plan.link_jobs.iter().map(|job| {
            let request = GraphQLRequest {
                query: job.query.clone(),
                variables: job.variables.clone(),
                operation_name: None,
                auth_headers: plan.auth_headers.clone(),
            };
            async move {
                debug!(service = %job.service, operation = %job.operation, "delegating link field");
                let result = match schema.schema(&job.service) {
                    Some(remote) => remote.execute(&request).await.map_err(|e| e.to_string()),
                    None => Err(format!("unknown service {:?}", job.service)),
                };
                (job, result)
            }
        }))
        .await;

        for (job, result) in delegation_results {
            match result {
                Ok(response) => {
                    let value = response
                        .get("data")
                        .and_then(|data| data.get(&job.operation))
                        .cloned()
                        .unwrap_or(Value::Null);
                    collect_errors(&mut errors, &response, &job.service);
                    attach(&mut data, job, value);
                }
                Err(message) => {
                    warn!(service = %job.service, error = %message, "delegation failed");
                    let mut path: Vec<Value> = job.path.iter().map(|p| json!(p)).collect();
                    path.push(json!(job.output_key));
                    errors.push(json!({
                        "message": format!("Delegation error: {}", message),
                        "service": job.service,
                        "path": path,
                    }));
                    attach(&mut data, job, Value::Null);
                }
            }
        }

        // Shape the payload exactly as the client asked: fields the gateway
        // injected for its own needs (link requirements) must not leak out.
        let data = project(&Value::Object(data), &plan.selection_set);

        let mut response = Map::new();
        response.insert("data".to_string(), data);
        if !errors.is_empty() {
            response.insert("errors".to_string(), Value::Array(errors));
        }
        Value::Object(response)
    }
}

/// Project a value onto a selection set, recursing through objects and
/// fanning out over lists. Leaf selections copy verbatim.
fn project(value: &Value, set: &SelectionSet<'static, String>) -> Value {
    match value {
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| project(item, set)).collect())
        }
        Value::Object(fields) => {
            let mut out = Map::new();
            project_into(&mut out, fields, set);
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn project_into(
    out: &mut Map<String, Value>,
    fields: &Map<String, Value>,
    set: &SelectionSet<'static, String>,
) {
    for item in &set.items {
        match item {
            Selection::Field(field) => {
                let key = result_key(field);
                let child = fields.get(key).cloned().unwrap_or(Value::Null);
                let value = if field.selection_set.items.is_empty() {
                    child
                } else {
                    project(&child, &field.selection_set)
                };
                out.insert(key.to_string(), value);
            }
            Selection::InlineFragment(fragment) => {
                // When the concrete type is known it gates the fragment;
                // otherwise the fragment's fields are merged as selected.
                if let Some(graphql_parser::query::TypeCondition::On(condition)) =
                    &fragment.type_condition
                    && let Some(Value::String(type_name)) = fields.get("__typename")
                    && type_name != condition
                {
                    continue;
                }
                project_into(out, fields, &fragment.selection_set);
            }
            Selection::FragmentSpread(_) => {}
        }
    }
}

/// Copy a response's errors into the merged error list, tagged with the
/// service they came from.
fn collect_errors(errors: &mut Vec<Value>, response: &Value, service: &str) {
    let Some(Value::Array(list)) = response.get("errors") else {
        return;
    };
    for error in list {
        let mut error = error.clone();
        if let Value::Object(fields) = &mut error {
            fields.insert("service".to_string(), json!(service));
        }
        errors.push(error);
    }
}

/// Splice a delegated result onto every parent object the job's path leads
/// to, fanning out over lists.
fn attach(data: &mut Map<String, Value>, job: &LinkJob, value: Value) {
    let Some(first) = job.path.first() else {
        return;
    };
    let Some(root) = data.get_mut(first) else {
        return;
    };
    let mut parents = Vec::new();
    locate(root, &job.path[1..], &mut parents);
    for parent in parents {
        if let Value::Object(fields) = parent {
            fields.insert(job.output_key.clone(), value.clone());
        }
    }
}

fn locate<'a>(value: &'a mut Value, path: &[String], out: &mut Vec<&'a mut Value>) {
    if value.is_array() {
        if let Value::Array(items) = value {
            for item in items {
                locate(item, path, out);
            }
        }
        return;
    }
    if path.is_empty() {
        if value.is_object() {
            out.push(value);
        }
        return;
    }
    if let Value::Object(fields) = value
        && let Some(child) = fields.get_mut(&path[0])
    {
        locate(child, &path[1..], out);
    }
}
