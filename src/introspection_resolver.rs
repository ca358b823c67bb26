//! Serves the merged schema's own `__schema`/`__type` selections so
//! external tools can introspect the gateway like any other GraphQL
//! service. Resolution is driven by the client's selection set: aliases,
//! inline fragments, and `includeDeprecated` behave as expected.

use graphql_parser::query::{
    Field as QueryField, Selection, SelectionSet, Value as AstValue,
};
use graphql_parser::schema::{
    Directive, EnumValue, Field as SchemaField, InputValue, Type, TypeDefinition,
};
use serde_json::{Map, Value, json};

use crate::query_planner::result_key;
use crate::schema_merge::{BUILTIN_SCALARS, MergedSchema, type_definition_name};

type Selections = SelectionSet<'static, String>;

pub fn resolve_meta_field(
    schema: &MergedSchema,
    root_type: &str,
    field: &QueryField<'static, String>,
    variables: Option<&Value>,
) -> Value {
    match field.name.as_str() {
        "__typename" => json!(root_type),
        "__schema" => Value::Object(resolve_schema_selections(schema, &field.selection_set)),
        "__type" => {
            let name = argument_string(field, "name", variables);
            match name.as_deref() {
                Some(name) => resolve_named_type(schema, name, &field.selection_set),
                None => Value::Null,
            }
        }
        _ => Value::Null,
    }
}

fn resolve_schema_selections(schema: &MergedSchema, set: &Selections) -> Map<String, Value> {
    let mut out = Map::new();
    for item in &set.items {
        match item {
            Selection::Field(field) => {
                let value = match field.name.as_str() {
                    "types" => {
                        let mut types: Vec<Value> = schema
                            .types()
                            .iter()
                            .map(|td| {
                                Value::Object(resolve_type_definition(
                                    schema,
                                    td,
                                    &field.selection_set,
                                ))
                            })
                            .collect();
                        types.extend(BUILTIN_SCALARS.iter().map(|name| {
                            Value::Object(resolve_scalar_shape(name, &field.selection_set))
                        }));
                        Value::Array(types)
                    }
                    "queryType" => match schema.type_def(schema.query_type_name()) {
                        Some(td) => {
                            Value::Object(resolve_type_definition(schema, td, &field.selection_set))
                        }
                        None => Value::Null,
                    },
                    "mutationType" => match schema
                        .mutation_type_name()
                        .and_then(|name| schema.type_def(name))
                    {
                        Some(td) => {
                            Value::Object(resolve_type_definition(schema, td, &field.selection_set))
                        }
                        None => Value::Null,
                    },
                    "subscriptionType" => Value::Null,
                    // Upstream directive definitions are not re-exposed.
                    "directives" => json!([]),
                    "description" => Value::Null,
                    "__typename" => json!("__Schema"),
                    _ => Value::Null,
                };
                out.insert(result_key(field).to_string(), value);
            }
            Selection::InlineFragment(fragment) => {
                out.extend(resolve_schema_selections(schema, &fragment.selection_set));
            }
            Selection::FragmentSpread(_) => {}
        }
    }
    out
}

fn resolve_type_definition(
    schema: &MergedSchema,
    type_def: &TypeDefinition<'static, String>,
    set: &Selections,
) -> Map<String, Value> {
    let mut out = Map::new();
    for item in &set.items {
        match item {
            Selection::Field(field) => {
                let value = match field.name.as_str() {
                    "kind" => json!(kind_str(type_def)),
                    "name" => json!(type_definition_name(type_def)),
                    "description" => json_or_null(description_of(type_def)),
                    "fields" => {
                        let fields = match type_def {
                            TypeDefinition::Object(object) => Some(&object.fields),
                            TypeDefinition::Interface(interface) => Some(&interface.fields),
                            _ => None,
                        };
                        match fields {
                            Some(fields) => {
                                let include = include_deprecated(field);
                                Value::Array(
                                    fields
                                        .iter()
                                        .filter(|f| {
                                            !f.name.starts_with("__")
                                                && (include || !is_deprecated(&f.directives))
                                        })
                                        .map(|f| {
                                            Value::Object(resolve_field_def(
                                                schema,
                                                f,
                                                &field.selection_set,
                                            ))
                                        })
                                        .collect(),
                                )
                            }
                            None => Value::Null,
                        }
                    }
                    "interfaces" => match type_def {
                        TypeDefinition::Object(object) => Value::Array(
                            object
                                .implements_interfaces
                                .iter()
                                .filter_map(|name| schema.type_def(name))
                                .map(|td| {
                                    Value::Object(resolve_type_definition(
                                        schema,
                                        td,
                                        &field.selection_set,
                                    ))
                                })
                                .collect(),
                        ),
                        TypeDefinition::Interface(_) => json!([]),
                        _ => Value::Null,
                    },
                    "possibleTypes" => match type_def {
                        TypeDefinition::Union(union) => Value::Array(
                            union
                                .types
                                .iter()
                                .filter_map(|name| schema.type_def(name))
                                .map(|td| {
                                    Value::Object(resolve_type_definition(
                                        schema,
                                        td,
                                        &field.selection_set,
                                    ))
                                })
                                .collect(),
                        ),
                        TypeDefinition::Interface(interface) => Value::Array(
                            schema
                                .types()
                                .iter()
                                .filter(|td| match td {
                                    TypeDefinition::Object(object) => object
                                        .implements_interfaces
                                        .iter()
                                        .any(|name| *name == interface.name),
                                    _ => false,
                                })
                                .map(|td| {
                                    Value::Object(resolve_type_definition(
                                        schema,
                                        td,
                                        &field.selection_set,
                                    ))
                                })
                                .collect(),
                        ),
                        _ => Value::Null,
                    },
                    "enumValues" => match type_def {
                        TypeDefinition::Enum(enum_type) => {
                            let include = include_deprecated(field);
                            Value::Array(
                                enum_type
                                    .values
                                    .iter()
                                    .filter(|v| include || !is_deprecated(&v.directives))
                                    .map(|v| {
                                        Value::Object(resolve_enum_value(v, &field.selection_set))
                                    })
                                    .collect(),
                            )
                        }
                        _ => Value::Null,
                    },
                    "inputFields" => match type_def {
                        TypeDefinition::InputObject(input) => Value::Array(
                            input
                                .fields
                                .iter()
                                .map(|f| {
                                    Value::Object(resolve_input_value(
                                        schema,
                                        f,
                                        &field.selection_set,
                                    ))
                                })
                                .collect(),
                        ),
                        _ => Value::Null,
                    },
                    "ofType" => Value::Null,
                    "__typename" => json!("__Type"),
                    _ => Value::Null,
                };
                out.insert(result_key(field).to_string(), value);
            }
            Selection::InlineFragment(fragment) => {
                out.extend(resolve_type_definition(
                    schema,
                    type_def,
                    &fragment.selection_set,
                ));
            }
            Selection::FragmentSpread(_) => {}
        }
    }
    out
}

fn resolve_field_def(
    schema: &MergedSchema,
    field_def: &SchemaField<'static, String>,
    set: &Selections,
) -> Map<String, Value> {
    let mut out = Map::new();
    for item in &set.items {
        match item {
            Selection::Field(field) => {
                let value = match field.name.as_str() {
                    "name" => json!(field_def.name),
                    "description" => json_or_null(field_def.description.as_deref()),
                    "args" => Value::Array(
                        field_def
                            .arguments
                            .iter()
                            .map(|arg| {
                                Value::Object(resolve_input_value(
                                    schema,
                                    arg,
                                    &field.selection_set,
                                ))
                            })
                            .collect(),
                    ),
                    "type" => resolve_type(schema, &field_def.field_type, &field.selection_set),
                    "isDeprecated" => json!(is_deprecated(&field_def.directives)),
                    "deprecationReason" => {
                        json_or_null(deprecation_reason(&field_def.directives))
                    }
                    "__typename" => json!("__Field"),
                    _ => Value::Null,
                };
                out.insert(result_key(field).to_string(), value);
            }
            Selection::InlineFragment(fragment) => {
                out.extend(resolve_field_def(schema, field_def, &fragment.selection_set));
            }
            Selection::FragmentSpread(_) => {}
        }
    }
    out
}

fn resolve_input_value(
    schema: &MergedSchema,
    input: &InputValue<'static, String>,
    set: &Selections,
) -> Map<String, Value> {
    let mut out = Map::new();
    for item in &set.items {
        match item {
            Selection::Field(field) => {
                let value = match field.name.as_str() {
                    "name" => json!(input.name),
                    "description" => json_or_null(input.description.as_deref()),
                    "type" => resolve_type(schema, &input.value_type, &field.selection_set),
                    "defaultValue" => match &input.default_value {
                        Some(default) => json!(default.to_string()),
                        None => Value::Null,
                    },
                    "isDeprecated" => json!(false),
                    "deprecationReason" => Value::Null,
                    "__typename" => json!("__InputValue"),
                    _ => Value::Null,
                };
                out.insert(result_key(field).to_string(), value);
            }
            Selection::InlineFragment(fragment) => {
                out.extend(resolve_input_value(schema, input, &fragment.selection_set));
            }
            Selection::FragmentSpread(_) => {}
        }
    }
    out
}

fn resolve_enum_value(
    enum_value: &EnumValue<'static, String>,
    set: &Selections,
) -> Map<String, Value> {
    let mut out = Map::new();
    for item in &set.items {
        match item {
            Selection::Field(field) => {
                let value = match field.name.as_str() {
                    "name" => json!(enum_value.name),
                    "description" => json_or_null(enum_value.description.as_deref()),
                    "isDeprecated" => json!(is_deprecated(&enum_value.directives)),
                    "deprecationReason" => {
                        json_or_null(deprecation_reason(&enum_value.directives))
                    }
                    "__typename" => json!("__EnumValue"),
                    _ => Value::Null,
                };
                out.insert(result_key(field).to_string(), value);
            }
            Selection::InlineFragment(fragment) => {
                out.extend(resolve_enum_value(enum_value, &fragment.selection_set));
            }
            Selection::FragmentSpread(_) => {}
        }
    }
    out
}

fn resolve_type(schema: &MergedSchema, ty: &Type<'static, String>, set: &Selections) -> Value {
    match ty {
        Type::NamedType(name) => resolve_named_type(schema, name, set),
        Type::ListType(inner) => Value::Object(resolve_wrapper(schema, "LIST", inner, set)),
        Type::NonNullType(inner) => {
            Value::Object(resolve_wrapper(schema, "NON_NULL", inner, set))
        }
    }
}

fn resolve_named_type(schema: &MergedSchema, name: &str, set: &Selections) -> Value {
    match schema.type_def(name) {
        Some(td) => Value::Object(resolve_type_definition(schema, td, set)),
        // Built-in scalars are not stored in the merged type list; anything
        // else unknown is presented the same way rather than crashing the
        // introspection response.
        None => Value::Object(resolve_scalar_shape(name, set)),
    }
}

fn resolve_wrapper(
    schema: &MergedSchema,
    kind: &str,
    inner: &Type<'static, String>,
    set: &Selections,
) -> Map<String, Value> {
    let mut out = Map::new();
    for item in &set.items {
        match item {
            Selection::Field(field) => {
                let value = match field.name.as_str() {
                    "kind" => json!(kind),
                    "name" => Value::Null,
                    "ofType" => resolve_type(schema, inner, &field.selection_set),
                    "__typename" => json!("__Type"),
                    _ => Value::Null,
                };
                out.insert(result_key(field).to_string(), value);
            }
            Selection::InlineFragment(fragment) => {
                out.extend(resolve_wrapper(schema, kind, inner, &fragment.selection_set));
            }
            Selection::FragmentSpread(_) => {}
        }
    }
    out
}

fn resolve_scalar_shape(name: &str, set: &Selections) -> Map<String, Value> {
    let mut out = Map::new();
    for item in &set.items {
        match item {
            Selection::Field(field) => {
                let value = match field.name.as_str() {
                    "kind" => json!("SCALAR"),
                    "name" => json!(name),
                    "__typename" => json!("__Type"),
                    _ => Value::Null,
                };
                out.insert(result_key(field).to_string(), value);
            }
            Selection::InlineFragment(fragment) => {
                out.extend(resolve_scalar_shape(name, &fragment.selection_set));
            }
            Selection::FragmentSpread(_) => {}
        }
    }
    out
}

fn kind_str(type_def: &TypeDefinition<'static, String>) -> &'static str {
    match type_def {
        TypeDefinition::Scalar(_) => "SCALAR",
        TypeDefinition::Object(_) => "OBJECT",
        TypeDefinition::Interface(_) => "INTERFACE",
        TypeDefinition::Union(_) => "UNION",
        TypeDefinition::Enum(_) => "ENUM",
        TypeDefinition::InputObject(_) => "INPUT_OBJECT",
    }
}

fn description_of<'a>(type_def: &'a TypeDefinition<'static, String>) -> Option<&'a str> {
    match type_def {
        TypeDefinition::Scalar(t) => t.description.as_deref(),
        TypeDefinition::Object(t) => t.description.as_deref(),
        TypeDefinition::Interface(t) => t.description.as_deref(),
        TypeDefinition::Union(t) => t.description.as_deref(),
        TypeDefinition::Enum(t) => t.description.as_deref(),
        TypeDefinition::InputObject(t) => t.description.as_deref(),
    }
}

fn is_deprecated(directives: &[Directive<'static, String>]) -> bool {
    directives.iter().any(|d| d.name == "deprecated")
}

fn deprecation_reason<'a>(directives: &'a [Directive<'static, String>]) -> Option<&'a str> {
    directives
        .iter()
        .find(|d| d.name == "deprecated")
        .and_then(|d| {
            d.arguments
                .iter()
                .find(|(name, _)| name == "reason")
                .and_then(|(_, value)| match value {
                    AstValue::String(reason) => Some(reason.as_str()),
                    _ => None,
                })
        })
}

fn include_deprecated(field: &QueryField<'static, String>) -> bool {
    field
        .arguments
        .iter()
        .find(|(name, _)| name == "includeDeprecated")
        .map(|(_, value)| matches!(value, AstValue::Boolean(true)))
        .unwrap_or(false)
}

fn argument_string(
    field: &QueryField<'static, String>,
    argument: &str,
    variables: Option<&Value>,
) -> Option<String> {
    let (_, value) = field.arguments.iter().find(|(name, _)| name == argument)?;
    match value {
        AstValue::String(value) => Some(value.clone()),
        AstValue::Variable(name) => variables?
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn json_or_null(value: Option<&str>) -> Value {
    match value {
        Some(value) => json!(value),
        None => Value::Null,
    }
}
