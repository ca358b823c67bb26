mod common;

use graphql_parser::query::{Definition, OperationDefinition, Selection};
use pretty_assertions::assert_eq;
use serde_json::json;

use common::merged_schema;
use graphweave::error::QueryError;
use graphweave::query_planner::{OperationKind, QueryPlan, QueryPlanner, StitchQueryPlanner};
use graphweave::{CART_SERVICE, CHECKOUT_SERVICE, GraphQLRequest, USER_SERVICE};

async fn plan(query: &str) -> Result<QueryPlan, QueryError> {
    plan_request(GraphQLRequest::new(query)).await
}

async fn plan_request(request: GraphQLRequest) -> Result<QueryPlan, QueryError> {
    let schema = merged_schema();
    StitchQueryPlanner::new().plan(&request, &schema).await
}

/// Names selected directly under `root_field` in a rendered operation.
fn selected_names(query: &str, root_field: &str) -> Vec<String> {
    let document = graphql_parser::parse_query::<String>(query).unwrap();
    for definition in &document.definitions {
        let set = match definition {
            Definition::Operation(OperationDefinition::Query(q)) => &q.selection_set,
            Definition::Operation(OperationDefinition::Mutation(m)) => &m.selection_set,
            _ => continue,
        };
        for item in &set.items {
            if let Selection::Field(field) = item
                && field.name == root_field
            {
                return field
                    .selection_set
                    .items
                    .iter()
                    .filter_map(|item| match item {
                        Selection::Field(f) => Some(f.name.clone()),
                        _ => None,
                    })
                    .collect();
            }
        }
    }
    Vec::new()
}

#[tokio::test]
async fn splits_root_fields_by_owning_service() {
    let plan = plan(r#"{ cartForCurrentUser { id } user(id: "1") { id } }"#)
        .await
        .unwrap();

    assert_eq!(plan.kind, OperationKind::Query);
    assert_eq!(plan.service_ops.len(), 2);
    assert_eq!(plan.service_ops[0].service, CART_SERVICE);
    assert_eq!(plan.service_ops[0].root_keys, vec!["cartForCurrentUser"]);
    assert_eq!(plan.service_ops[1].service, USER_SERVICE);
    assert_eq!(plan.service_ops[1].root_keys, vec!["user"]);
    assert!(plan.link_jobs.is_empty());
}

#[tokio::test]
async fn strips_link_fields_into_delegation_jobs() {
    let plan = plan(r#"{ user(id: "1") { name cart { id } } }"#).await.unwrap();

    assert_eq!(plan.service_ops.len(), 1);
    assert_eq!(plan.service_ops[0].service, USER_SERVICE);

    // The forwarded parent selection keeps name, gains id, loses cart.
    let mut names = selected_names(&plan.service_ops[0].query, "user");
    names.sort();
    assert_eq!(names, vec!["id", "name"]);

    assert_eq!(plan.link_jobs.len(), 1);
    let job = &plan.link_jobs[0];
    assert_eq!(job.service, CART_SERVICE);
    assert_eq!(job.operation, "cartForCurrentUser");
    assert_eq!(job.path, vec!["user"]);
    assert_eq!(job.output_key, "cart");
    assert_eq!(selected_names(&job.query, "cartForCurrentUser"), vec!["id"]);
}

#[tokio::test]
async fn respects_aliases_in_paths_and_output_keys() {
    let plan = plan(r#"{ u: user(id: "1") { c: cart { id } } }"#).await.unwrap();

    let job = &plan.link_jobs[0];
    assert_eq!(job.path, vec!["u"]);
    assert_eq!(job.output_key, "c");
    // The delegated root field is the target operation, not the alias.
    assert!(job.query.contains("cartForCurrentUser"));
}

#[tokio::test]
async fn does_not_duplicate_an_already_selected_id() {
    let plan = plan(r#"{ user(id: "1") { id cart { id } } }"#).await.unwrap();

    let names = selected_names(&plan.service_ops[0].query, "user");
    assert_eq!(names, vec!["id"]);
}

#[tokio::test]
async fn prunes_variables_per_service() {
    let request = GraphQLRequest {
        query: r#"query($uid: ID!, $oid: ID!) {
            user(id: $uid) { id }
            order(id: $oid) { id }
        }"#
        .to_string(),
        variables: Some(json!({ "uid": "1", "oid": "2" })),
        operation_name: None,
        auth_headers: None,
    };
    let plan = plan_request(request).await.unwrap();

    let user_op = plan
        .service_ops
        .iter()
        .find(|op| op.service == USER_SERVICE)
        .unwrap();
    assert!(user_op.query.contains("$uid"));
    assert!(!user_op.query.contains("$oid"));
    assert_eq!(user_op.variables, Some(json!({ "uid": "1" })));

    let checkout_op = plan
        .service_ops
        .iter()
        .find(|op| op.service == CHECKOUT_SERVICE)
        .unwrap();
    assert!(checkout_op.query.contains("$oid"));
    assert!(!checkout_op.query.contains("$uid"));
    assert_eq!(checkout_op.variables, Some(json!({ "oid": "2" })));
}

#[tokio::test]
async fn inlines_named_fragments_before_planning() {
    let plan = plan(
        r#"
        query {
            user(id: "1") { ...userBits }
        }
        fragment userBits on User {
            name
            cart { id }
        }
        "#,
    )
    .await
    .unwrap();

    // The link field inside the fragment is still found and stripped.
    assert_eq!(plan.link_jobs.len(), 1);
    assert_eq!(plan.link_jobs[0].path, vec!["user"]);
    let query = &plan.service_ops[0].query;
    assert!(query.contains("... on User"));
    assert!(!query.contains("cart"));
}

#[tokio::test]
async fn keeps_meta_fields_local() {
    let plan = plan(r#"{ __typename __schema { queryType { name } } }"#)
        .await
        .unwrap();

    assert!(plan.service_ops.is_empty());
    assert_eq!(plan.meta_fields.len(), 2);
}

#[tokio::test]
async fn routes_mutations_by_mutation_root() {
    let plan = plan(r#"mutation { createUser(name: "Ada") { id } }"#)
        .await
        .unwrap();

    assert_eq!(plan.kind, OperationKind::Mutation);
    assert_eq!(plan.service_ops.len(), 1);
    assert_eq!(plan.service_ops[0].service, USER_SERVICE);
    assert!(plan.service_ops[0].query.starts_with("mutation"));
}

#[tokio::test]
async fn selects_operations_by_name() {
    let query = r#"
        query First { users { id } }
        query Second { cartForCurrentUser { id } }
    "#;

    let request = GraphQLRequest {
        query: query.to_string(),
        variables: None,
        operation_name: Some("Second".to_string()),
        auth_headers: None,
    };
    let plan = plan_request(request).await.unwrap();
    assert_eq!(plan.service_ops[0].service, CART_SERVICE);

    let request = GraphQLRequest {
        query: query.to_string(),
        variables: None,
        operation_name: Some("Missing".to_string()),
        auth_headers: None,
    };
    let err = plan_request(request).await.unwrap_err();
    assert!(matches!(err, QueryError::UnknownOperation(name) if name == "Missing"));
}

#[tokio::test]
async fn rejects_unroutable_fields() {
    let err = plan(r#"{ nonsense { id } }"#).await.unwrap_err();
    assert!(matches!(err, QueryError::UnroutableField(name) if name == "nonsense"));
}

#[tokio::test]
async fn rejects_subscriptions() {
    let err = plan(r#"subscription { user { id } }"#).await.unwrap_err();
    assert!(matches!(err, QueryError::Subscription));
}

#[tokio::test]
async fn rejects_unknown_and_cyclic_fragments() {
    let err = plan(r#"{ user(id: "1") { ...missing } }"#).await.unwrap_err();
    assert!(matches!(err, QueryError::UnknownFragment(name) if name == "missing"));

    let err = plan(
        r#"
        query { user(id: "1") { ...a } }
        fragment a on User { ...b }
        fragment b on User { ...a }
        "#,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, QueryError::FragmentCycle(_)));
}

#[tokio::test]
async fn rejects_malformed_queries() {
    let err = plan("{ user(").await.unwrap_err();
    assert!(matches!(err, QueryError::Parse(_)));
}
