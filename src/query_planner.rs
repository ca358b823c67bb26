use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use graphql_parser::query::{
    Definition, Document, Field, FragmentDefinition, InlineFragment, Mutation,
    OperationDefinition, Query, Selection, SelectionSet, TypeCondition, Value as AstValue,
    VariableDefinition,
};
use serde_json::Value;
use tracing::debug;

use crate::GraphQLRequest;
use crate::error::QueryError;
use crate::link_resolvers::LinkRule;
use crate::schema_merge::{MergedSchema, base_type_name};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

/// One operation forwarded to the service owning its root fields.
#[derive(Debug)]
pub struct ServiceOperation {
    pub service: String,
    pub kind: OperationKind,
    pub query: String,
    pub variables: Option<Value>,
    /// Response keys this operation is expected to produce.
    pub root_keys: Vec<String>,
}

/// One stripped link field, ready to be delegated to its target service and
/// spliced back into the response.
#[derive(Debug)]
pub struct LinkJob {
    pub service: String,
    pub operation: String,
    /// Response keys from the root of `data` down to the parent object(s).
    pub path: Vec<String>,
    /// Key the delegated result lands under on each parent.
    pub output_key: String,
    pub query: String,
    pub variables: Option<Value>,
}

#[derive(Debug)]
pub struct QueryPlan {
    pub kind: OperationKind,
    pub service_ops: Vec<ServiceOperation>,
    pub link_jobs: Vec<LinkJob>,
    /// Root `__schema`/`__type`/`__typename` selections, resolved locally.
    pub meta_fields: Vec<Field<'static, String>>,
    /// The client's full root selection (fragments inlined); the final
    /// response is projected onto it so gateway-injected fields never leak.
    pub selection_set: SelectionSet<'static, String>,
    pub variables: Option<Value>,
    pub auth_headers: Option<HashMap<String, String>>,
}

#[async_trait]
pub trait QueryPlanner: Send + Sync {
    async fn plan(
        &self,
        request: &GraphQLRequest,
        schema: &MergedSchema,
    ) -> Result<QueryPlan, QueryError>;
}

/// Splits a client operation into per-service operations, lifts link fields
/// out as delegation jobs, and keeps meta fields local.
pub struct StitchQueryPlanner;

impl StitchQueryPlanner {
    pub fn new() -> Self {
        StitchQueryPlanner
    }
}

impl Default for StitchQueryPlanner {
    fn default() -> Self {
        StitchQueryPlanner::new()
    }
}

struct LinkSite {
    path: Vec<String>,
    field: Field<'static, String>,
    rule: LinkRule,
}

#[async_trait]
impl QueryPlanner for StitchQueryPlanner {
    async fn plan(
        &self,
        request: &GraphQLRequest,
        schema: &MergedSchema,
    ) -> Result<QueryPlan, QueryError> {
        let document = graphql_parser::parse_query::<String>(&request.query)
            .map_err(|e| QueryError::Parse(e.to_string()))?
            .into_static();

        let fragments = collect_fragments(&document);
        let operation = select_operation(&document, request.operation_name.as_deref())?;

        let (kind, op_name, variable_definitions, selection_set) = match operation {
            OperationDefinition::Query(query) => (
                OperationKind::Query,
                query.name.clone(),
                query.variable_definitions.clone(),
                &query.selection_set,
            ),
            OperationDefinition::SelectionSet(set) => {
                (OperationKind::Query, None, Vec::new(), set)
            }
            OperationDefinition::Mutation(mutation) => (
                OperationKind::Mutation,
                mutation.name.clone(),
                mutation.variable_definitions.clone(),
                &mutation.selection_set,
            ),
            OperationDefinition::Subscription(_) => return Err(QueryError::Subscription),
        };

        let selection_set = inline_fragments(selection_set, &fragments, &mut Vec::new())?;

        // Route every root field to its owning service; meta fields stay local.
        let mut groups: Vec<(String, Vec<Selection<'static, String>>)> = Vec::new();
        let mut meta_fields = Vec::new();
        route_root(schema, kind, &selection_set, &mut groups, &mut meta_fields)?;

        let root_type = match kind {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
        };

        let mut service_ops = Vec::new();
        let mut link_sites = Vec::new();
        for (service, items) in groups {
            let group_set = SelectionSet {
                span: selection_set.span,
                items,
            };
            let rewritten =
                rewrite_selection_set(schema, root_type, &group_set, &[], &mut link_sites);
            let root_keys = top_level_keys(&rewritten);

            let used = used_variables(&rewritten);
            let query = render_operation(
                kind,
                op_name.clone(),
                filter_definitions(&variable_definitions, &used),
                rewritten,
            );
            debug!(service = %service, query = %query, "planned service operation");

            service_ops.push(ServiceOperation {
                service,
                kind,
                query,
                variables: variables_subset(&request.variables, &used),
                root_keys,
            });
        }

        let link_jobs = link_sites
            .into_iter()
            .map(|site| build_link_job(site, &variable_definitions, &request.variables))
            .collect();

        Ok(QueryPlan {
            kind,
            service_ops,
            link_jobs,
            meta_fields,
            selection_set,
            variables: request.variables.clone(),
            auth_headers: request.auth_headers.clone(),
        })
    }
}

fn collect_fragments(
    document: &Document<'static, String>,
) -> HashMap<String, FragmentDefinition<'static, String>> {
    document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            Definition::Fragment(fragment) => Some((fragment.name.clone(), fragment.clone())),
            _ => None,
        })
        .collect()
}

fn select_operation<'a>(
    document: &'a Document<'static, String>,
    operation_name: Option<&str>,
) -> Result<&'a OperationDefinition<'static, String>, QueryError> {
    let mut operations = document.definitions.iter().filter_map(|d| match d {
        Definition::Operation(operation) => Some(operation),
        _ => None,
    });

    match operation_name {
        Some(wanted) => operations
            .find(|operation| name_of(operation) == Some(wanted))
            .ok_or_else(|| QueryError::UnknownOperation(wanted.to_string())),
        None => operations.next().ok_or(QueryError::NoOperation),
    }
}

fn name_of<'a>(operation: &'a OperationDefinition<'static, String>) -> Option<&'a str> {
    match operation {
        OperationDefinition::Query(q) => q.name.as_deref(),
        OperationDefinition::Mutation(m) => m.name.as_deref(),
        OperationDefinition::Subscription(s) => s.name.as_deref(),
        OperationDefinition::SelectionSet(_) => None,
    }
}

/// Replace every fragment spread with an equivalent inline fragment,
/// rejecting unknown fragments and cycles.
fn inline_fragments(
    set: &SelectionSet<'static, String>,
    fragments: &HashMap<String, FragmentDefinition<'static, String>>,
    stack: &mut Vec<String>,
) -> Result<SelectionSet<'static, String>, QueryError> {
    let mut items = Vec::with_capacity(set.items.len());
    for item in &set.items {
        match item {
            Selection::Field(field) => {
                let mut field = field.clone();
                field.selection_set = inline_fragments(&field.selection_set, fragments, stack)?;
                items.push(Selection::Field(field));
            }
            Selection::InlineFragment(fragment) => {
                let mut fragment = fragment.clone();
                fragment.selection_set =
                    inline_fragments(&fragment.selection_set, fragments, stack)?;
                items.push(Selection::InlineFragment(fragment));
            }
            Selection::FragmentSpread(spread) => {
                if stack.contains(&spread.fragment_name) {
                    return Err(QueryError::FragmentCycle(spread.fragment_name.clone()));
                }
                let definition = fragments
                    .get(&spread.fragment_name)
                    .ok_or_else(|| QueryError::UnknownFragment(spread.fragment_name.clone()))?;

                stack.push(spread.fragment_name.clone());
                let selection_set = inline_fragments(&definition.selection_set, fragments, stack)?;
                stack.pop();

                let TypeCondition::On(on) = &definition.type_condition;
                items.push(Selection::InlineFragment(InlineFragment {
                    position: spread.position,
                    type_condition: Some(TypeCondition::On(on.clone())),
                    directives: spread.directives.clone(),
                    selection_set,
                }));
            }
        }
    }
    Ok(SelectionSet {
        span: set.span,
        items,
    })
}

fn route_root(
    schema: &MergedSchema,
    kind: OperationKind,
    set: &SelectionSet<'static, String>,
    groups: &mut Vec<(String, Vec<Selection<'static, String>>)>,
    meta_fields: &mut Vec<Field<'static, String>>,
) -> Result<(), QueryError> {
    for item in &set.items {
        match item {
            Selection::Field(field) => {
                if field.name.starts_with("__") {
                    meta_fields.push(field.clone());
                    continue;
                }
                let service = match kind {
                    OperationKind::Query => schema.service_for_query_field(&field.name),
                    OperationKind::Mutation => schema.service_for_mutation_field(&field.name),
                }
                .ok_or_else(|| QueryError::UnroutableField(field.name.clone()))?
                .to_string();

                match groups.iter_mut().find(|(name, _)| *name == service) {
                    Some((_, items)) => items.push(Selection::Field(field.clone())),
                    None => groups.push((service, vec![Selection::Field(field.clone())])),
                }
            }
            Selection::InlineFragment(fragment) => {
                route_root(schema, kind, &fragment.selection_set, groups, meta_fields)?;
            }
            Selection::FragmentSpread(spread) => {
                // Spreads were inlined before routing.
                return Err(QueryError::UnknownFragment(spread.fragment_name.clone()));
            }
        }
    }
    Ok(())
}

/// Walk a selection set with type tracking, stripping link fields into
/// `sites` and making sure their required parent fields stay selected.
fn rewrite_selection_set(
    schema: &MergedSchema,
    parent_type: &str,
    set: &SelectionSet<'static, String>,
    path: &[String],
    sites: &mut Vec<LinkSite>,
) -> SelectionSet<'static, String> {
    let mut items = Vec::with_capacity(set.items.len());
    let mut required = Vec::new();

    for item in &set.items {
        match item {
            Selection::Field(field) => {
                if let Some(rule) = schema.link(parent_type, &field.name) {
                    if let Some(fields) = rule.required_fields() {
                        required.extend(fields);
                    }
                    sites.push(LinkSite {
                        path: path.to_vec(),
                        field: field.clone(),
                        rule: rule.clone(),
                    });
                    continue;
                }

                let mut field = field.clone();
                if !field.selection_set.items.is_empty()
                    && let Some(child_type) = schema
                        .field_type(parent_type, &field.name)
                        .map(base_type_name)
                {
                    let child_type = child_type.to_string();
                    let mut child_path = path.to_vec();
                    child_path.push(result_key(&field).to_string());
                    field.selection_set = rewrite_selection_set(
                        schema,
                        &child_type,
                        &field.selection_set,
                        &child_path,
                        sites,
                    );
                }
                items.push(Selection::Field(field));
            }
            Selection::InlineFragment(fragment) => {
                let mut fragment = fragment.clone();
                let condition = match &fragment.type_condition {
                    Some(TypeCondition::On(name)) => name.clone(),
                    None => parent_type.to_string(),
                };
                fragment.selection_set = rewrite_selection_set(
                    schema,
                    &condition,
                    &fragment.selection_set,
                    path,
                    sites,
                );
                items.push(Selection::InlineFragment(fragment));
            }
            Selection::FragmentSpread(_) => {}
        }
    }

    // The parent must still carry whatever the stripped link rules require.
    for name in required {
        let present = items
            .iter()
            .any(|item| matches!(item, Selection::Field(f) if result_key(f) == name));
        if !present {
            items.push(Selection::Field(Field {
                position: set.span.0,
                alias: None,
                name,
                arguments: vec![],
                directives: vec![],
                selection_set: SelectionSet {
                    span: set.span,
                    items: vec![],
                },
            }));
        }
    }

    SelectionSet {
        span: set.span,
        items,
    }
}

/// Delegation re-roots the link field as the target service's operation:
/// same arguments, same sub-selection, original alias dropped in favor of
/// the operation name.
fn build_link_job(
    site: LinkSite,
    variable_definitions: &[VariableDefinition<'static, String>],
    variables: &Option<Value>,
) -> LinkJob {
    let output_key = result_key(&site.field).to_string();

    let mut root = site.field;
    root.alias = None;
    root.name = site.rule.operation.to_string();

    let span = root.selection_set.span;
    let selection_set = SelectionSet {
        span,
        items: vec![Selection::Field(root)],
    };

    let used = used_variables(&selection_set);
    let query = render_operation(
        OperationKind::Query,
        None,
        filter_definitions(variable_definitions, &used),
        selection_set,
    );

    LinkJob {
        service: site.rule.service.to_string(),
        operation: site.rule.operation.to_string(),
        path: site.path,
        output_key,
        query,
        variables: variables_subset(variables, &used),
    }
}

pub fn result_key<'a>(field: &'a Field<'static, String>) -> &'a str {
    field.alias.as_deref().unwrap_or(&field.name)
}

fn top_level_keys(set: &SelectionSet<'static, String>) -> Vec<String> {
    let mut keys = Vec::new();
    for item in &set.items {
        match item {
            Selection::Field(field) => keys.push(result_key(field).to_string()),
            Selection::InlineFragment(fragment) => {
                keys.extend(top_level_keys(&fragment.selection_set));
            }
            Selection::FragmentSpread(_) => {}
        }
    }
    keys
}

fn render_operation(
    kind: OperationKind,
    name: Option<String>,
    variable_definitions: Vec<VariableDefinition<'static, String>>,
    selection_set: SelectionSet<'static, String>,
) -> String {
    let position = selection_set.span.0;
    let operation = match kind {
        OperationKind::Query => OperationDefinition::Query(Query {
            position,
            name,
            variable_definitions,
            directives: vec![],
            selection_set,
        }),
        OperationKind::Mutation => OperationDefinition::Mutation(Mutation {
            position,
            name,
            variable_definitions,
            directives: vec![],
            selection_set,
        }),
    };
    Document {
        definitions: vec![Definition::Operation(operation)],
    }
    .to_string()
}

fn used_variables(set: &SelectionSet<'static, String>) -> HashSet<String> {
    let mut used = HashSet::new();
    collect_set_variables(set, &mut used);
    used
}

fn collect_set_variables(set: &SelectionSet<'static, String>, used: &mut HashSet<String>) {
    for item in &set.items {
        match item {
            Selection::Field(field) => {
                for (_, value) in &field.arguments {
                    collect_value_variables(value, used);
                }
                for directive in &field.directives {
                    for (_, value) in &directive.arguments {
                        collect_value_variables(value, used);
                    }
                }
                collect_set_variables(&field.selection_set, used);
            }
            Selection::InlineFragment(fragment) => {
                for directive in &fragment.directives {
                    for (_, value) in &directive.arguments {
                        collect_value_variables(value, used);
                    }
                }
                collect_set_variables(&fragment.selection_set, used);
            }
            Selection::FragmentSpread(spread) => {
                for directive in &spread.directives {
                    for (_, value) in &directive.arguments {
                        collect_value_variables(value, used);
                    }
                }
            }
        }
    }
}

fn collect_value_variables(value: &AstValue<'static, String>, used: &mut HashSet<String>) {
    match value {
        AstValue::Variable(name) => {
            used.insert(name.clone());
        }
        AstValue::List(values) => {
            for value in values {
                collect_value_variables(value, used);
            }
        }
        AstValue::Object(fields) => {
            for value in fields.values() {
                collect_value_variables(value, used);
            }
        }
        _ => {}
    }
}

fn filter_definitions(
    definitions: &[VariableDefinition<'static, String>],
    used: &HashSet<String>,
) -> Vec<VariableDefinition<'static, String>> {
    definitions
        .iter()
        .filter(|definition| used.contains(&definition.name))
        .cloned()
        .collect()
}

fn variables_subset(variables: &Option<Value>, used: &HashSet<String>) -> Option<Value> {
    let map = match variables {
        Some(Value::Object(map)) => map,
        _ => return None,
    };
    let filtered: serde_json::Map<String, Value> = map
        .iter()
        .filter(|(name, _)| used.contains(name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    if filtered.is_empty() {
        None
    } else {
        Some(Value::Object(filtered))
    }
}
