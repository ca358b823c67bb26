//! Introspection of remote services: the outbound query and the decoding of
//! its JSON result back into SDL that the merge step can parse.

use std::fmt::Write;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::GraphQLRequest;

/// GraphQL types we do not re-encode to SDL: the introspection meta types
/// and the built-in scalars.
const GRAPHQL_NAMED_TYPES: [&str; 13] = [
    "__Schema",
    "__Type",
    "__TypeKind",
    "__Field",
    "__InputValue",
    "__EnumValue",
    "__DirectiveLocation",
    "__Directive",
    "Boolean",
    "Float",
    "String",
    "Int",
    "ID",
];

/// The standard introspection query, asking for the full type system.
pub const INTROSPECTION_QUERY: &str = r#"
query IntrospectionQuery {
  __schema {
    queryType { name }
    mutationType { name }
    subscriptionType { name }
    types {
      ...FullType
    }
    directives {
      name
      description
      locations
      args {
        ...InputValue
      }
    }
  }
}

fragment FullType on __Type {
  kind
  name
  description
  fields(includeDeprecated: true) {
    name
    description
    args {
      ...InputValue
    }
    type {
      ...TypeRef
    }
    isDeprecated
    deprecationReason
  }
  inputFields {
    ...InputValue
  }
  interfaces {
    ...TypeRef
  }
  enumValues(includeDeprecated: true) {
    name
    description
    isDeprecated
    deprecationReason
  }
  possibleTypes {
    ...TypeRef
  }
}

fragment InputValue on __InputValue {
  name
  description
  type { ...TypeRef }
  defaultValue
}

fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType {
        kind
        name
        ofType {
          kind
          name
          ofType {
            kind
            name
            ofType {
              kind
              name
              ofType {
                kind
                name
              }
            }
          }
        }
      }
    }
  }
}
"#;

pub fn introspection_request() -> GraphQLRequest {
    GraphQLRequest {
        query: INTROSPECTION_QUERY.to_string(),
        variables: None,
        operation_name: Some("IntrospectionQuery".to_string()),
        auth_headers: None,
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("response carries no data.__schema object")]
    MissingSchema,
    #[error("unexpected introspection shape: {0}")]
    Shape(String),
    #[error("schema declares no query type")]
    MissingQueryType,
    #[error("type reference is missing a name")]
    UnnamedTypeRef,
}

/// Decode a full introspection response into the SDL of the remote type
/// system. The SDL is what the merge step parses; nothing else about the
/// response is retained.
pub fn schema_sdl(response: &Value) -> Result<String, DecodeError> {
    let schema_json = response
        .get("data")
        .and_then(|data| data.get("__schema"))
        .ok_or(DecodeError::MissingSchema)?;

    let schema: IntrospectionSchema = serde_json::from_value(schema_json.clone())
        .map_err(|e| DecodeError::Shape(e.to_string()))?;
    schema.encode()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectionSchema {
    query_type: Option<NamedTypeRef>,
    mutation_type: Option<NamedTypeRef>,
    subscription_type: Option<NamedTypeRef>,
    types: Vec<FullType>,
}

#[derive(Debug, Deserialize)]
struct NamedTypeRef {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullType {
    kind: String,
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    fields: Option<Vec<FieldDef>>,
    #[serde(default)]
    input_fields: Option<Vec<InputValueDef>>,
    #[serde(default)]
    interfaces: Option<Vec<TypeRef>>,
    #[serde(default)]
    enum_values: Option<Vec<EnumValueDef>>,
    #[serde(default)]
    possible_types: Option<Vec<TypeRef>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldDef {
    name: String,
    description: Option<String>,
    #[serde(default)]
    args: Vec<InputValueDef>,
    #[serde(rename = "type")]
    field_type: TypeRef,
    #[serde(default)]
    is_deprecated: bool,
    deprecation_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputValueDef {
    name: String,
    description: Option<String>,
    #[serde(rename = "type")]
    value_type: TypeRef,
    default_value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnumValueDef {
    name: String,
    description: Option<String>,
    #[serde(default)]
    is_deprecated: bool,
    deprecation_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeRef {
    kind: String,
    name: Option<String>,
    of_type: Option<Box<TypeRef>>,
}

impl TypeRef {
    fn render(&self) -> Result<String, DecodeError> {
        match self.kind.as_str() {
            "NON_NULL" => {
                let inner = self.of_type.as_ref().ok_or(DecodeError::UnnamedTypeRef)?;
                Ok(format!("{}!", inner.render()?))
            }
            "LIST" => {
                let inner = self.of_type.as_ref().ok_or(DecodeError::UnnamedTypeRef)?;
                Ok(format!("[{}]", inner.render()?))
            }
            _ => self.name.clone().ok_or(DecodeError::UnnamedTypeRef),
        }
    }
}

impl IntrospectionSchema {
    fn encode(self) -> Result<String, DecodeError> {
        let mut sdl = String::new();

        let query_name = self
            .query_type
            .as_ref()
            .and_then(|t| t.name.clone())
            .ok_or(DecodeError::MissingQueryType)?;
        let mutation_name = self.mutation_type.as_ref().and_then(|t| t.name.clone());
        let subscription_name = self.subscription_type.as_ref().and_then(|t| t.name.clone());

        // A schema block is only needed when the root types deviate from
        // their conventional names or a mutation/subscription root exists.
        if mutation_name.is_some() || subscription_name.is_some() || query_name != "Query" {
            let _ = writeln!(sdl, "schema {{");
            let _ = writeln!(sdl, "  query: {}", query_name);
            if let Some(name) = &mutation_name {
                let _ = writeln!(sdl, "  mutation: {}", name);
            }
            if let Some(name) = &subscription_name {
                let _ = writeln!(sdl, "  subscription: {}", name);
            }
            let _ = writeln!(sdl, "}}");
        }

        for type_ in self.types {
            let Some(name) = type_.name.clone() else {
                continue;
            };
            if GRAPHQL_NAMED_TYPES.contains(&name.as_str()) || name.starts_with("__") {
                continue;
            }
            encode_type(&mut sdl, &name, &type_)?;
        }

        Ok(sdl)
    }
}

fn encode_type(sdl: &mut String, name: &str, type_: &FullType) -> Result<(), DecodeError> {
    if !sdl.is_empty() {
        sdl.push('\n');
    }
    push_description(sdl, "", &type_.description);

    match type_.kind.as_str() {
        "SCALAR" => {
            let _ = writeln!(sdl, "scalar {}", name);
        }
        "OBJECT" => {
            let _ = write!(sdl, "type {}", name);
            push_interfaces(sdl, &type_.interfaces)?;
            push_field_block(sdl, &type_.fields)?;
        }
        "INTERFACE" => {
            let _ = write!(sdl, "interface {}", name);
            push_field_block(sdl, &type_.fields)?;
        }
        "UNION" => {
            let members = type_
                .possible_types
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|t| t.name.clone().ok_or(DecodeError::UnnamedTypeRef))
                .collect::<Result<Vec<_>, _>>()?;
            if members.is_empty() {
                let _ = writeln!(sdl, "union {}", name);
            } else {
                let _ = writeln!(sdl, "union {} = {}", name, members.join(" | "));
            }
        }
        "ENUM" => {
            if type_.enum_values.as_deref().unwrap_or_default().is_empty() {
                let _ = writeln!(sdl, "enum {}", name);
                return Ok(());
            }
            let _ = writeln!(sdl, "enum {} {{", name);
            for value in type_.enum_values.as_deref().unwrap_or_default() {
                push_description(sdl, "  ", &value.description);
                let _ = write!(sdl, "  {}", value.name);
                push_deprecated(sdl, value.is_deprecated, &value.deprecation_reason);
                sdl.push('\n');
            }
            let _ = writeln!(sdl, "}}");
        }
        "INPUT_OBJECT" => {
            if type_.input_fields.as_deref().unwrap_or_default().is_empty() {
                let _ = writeln!(sdl, "input {}", name);
                return Ok(());
            }
            let _ = writeln!(sdl, "input {} {{", name);
            for field in type_.input_fields.as_deref().unwrap_or_default() {
                push_description(sdl, "  ", &field.description);
                let _ = write!(sdl, "  {}", render_input_value(field)?);
                sdl.push('\n');
            }
            let _ = writeln!(sdl, "}}");
        }
        other => {
            return Err(DecodeError::Shape(format!(
                "unknown type kind {other:?} for {name}"
            )));
        }
    }
    Ok(())
}

fn push_interfaces(sdl: &mut String, interfaces: &Option<Vec<TypeRef>>) -> Result<(), DecodeError> {
    let names = interfaces
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|t| t.name.clone().ok_or(DecodeError::UnnamedTypeRef))
        .collect::<Result<Vec<_>, _>>()?;
    if !names.is_empty() {
        let _ = write!(sdl, " implements {}", names.join(" & "));
    }
    Ok(())
}

fn push_field_block(sdl: &mut String, fields: &Option<Vec<FieldDef>>) -> Result<(), DecodeError> {
    if fields.as_deref().unwrap_or_default().is_empty() {
        sdl.push('\n');
        return Ok(());
    }
    let _ = writeln!(sdl, " {{");
    for field in fields.as_deref().unwrap_or_default() {
        push_description(sdl, "  ", &field.description);
        let _ = write!(sdl, "  {}", field.name);
        let args = &field.args;
        if !args.is_empty() {
            let rendered = args
                .iter()
                .map(render_input_value)
                .collect::<Result<Vec<_>, _>>()?;
            let _ = write!(sdl, "({})", rendered.join(", "));
        }
        let _ = write!(sdl, ": {}", field.field_type.render()?);
        push_deprecated(sdl, field.is_deprecated, &field.deprecation_reason);
        sdl.push('\n');
    }
    let _ = writeln!(sdl, "}}");
    Ok(())
}

fn render_input_value(value: &InputValueDef) -> Result<String, DecodeError> {
    let mut rendered = format!("{}: {}", value.name, value.value_type.render()?);
    // defaultValue arrives as a GraphQL literal and can be spliced verbatim.
    if let Some(default) = &value.default_value {
        let _ = write!(rendered, " = {}", default);
    }
    Ok(rendered)
}

fn push_deprecated(sdl: &mut String, is_deprecated: bool, reason: &Option<String>) {
    if !is_deprecated {
        return;
    }
    match reason {
        Some(reason) => {
            let escaped = reason.replace('\\', "\\\\").replace('"', "\\\"");
            let _ = write!(sdl, " @deprecated(reason: \"{}\")", escaped);
        }
        None => {
            let _ = write!(sdl, " @deprecated");
        }
    }
}

fn push_description(sdl: &mut String, indent: &str, description: &Option<String>) {
    let Some(description) = description else {
        return;
    };
    if description.is_empty() || description.contains("\"\"\"") {
        return;
    }
    if description.contains('\n') {
        let _ = writeln!(sdl, "{indent}\"\"\"");
        for line in description.lines() {
            let _ = writeln!(sdl, "{indent}{line}");
        }
        let _ = writeln!(sdl, "{indent}\"\"\"");
    } else {
        let _ = writeln!(sdl, "{indent}\"\"\"{description}\"\"\"");
    }
}
