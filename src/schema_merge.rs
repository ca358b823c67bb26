use std::collections::HashMap;
use std::sync::Arc;

use graphql_parser::schema::{
    Definition, Document, ObjectType, Type, TypeDefinition, TypeExtension,
};
use tracing::{debug, info, warn};

use crate::error::SchemaError;
use crate::link_resolvers::LinkRule;
use crate::schema_loader::RemoteSchema;

pub const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

const QUERY_TYPE: &str = "Query";
const MUTATION_TYPE: &str = "Mutation";

/// The unified schema: the union of every proxy schema's type system plus
/// the link extension, with each root field mapped to the service that owns
/// it and each link field mapped to its delegation rule.
///
/// Built once at startup and shared read-only across all requests.
pub struct MergedSchema {
    types: Vec<TypeDefinition<'static, String>>,
    index: HashMap<String, usize>,
    root_query_fields: HashMap<String, String>,
    root_mutation_fields: HashMap<String, String>,
    links: HashMap<(String, String), LinkRule>,
    schemas: HashMap<String, Arc<RemoteSchema>>,
}

impl MergedSchema {
    /// Combine the proxy schemas, the link type extension, and the link
    /// rules. Root operation types merge field-wise (later services win on
    /// same-named root fields); other type collisions are last-write-wins.
    /// Any inconsistency is a construction error: the gateway never serves
    /// a partially merged graph.
    pub fn new(
        remotes: Vec<RemoteSchema>,
        link_type_defs: &str,
        rules: Vec<LinkRule>,
    ) -> Result<Self, SchemaError> {
        let mut unified_query: Option<ObjectType<'static, String>> = None;
        let mut unified_mutation: Option<ObjectType<'static, String>> = None;
        let mut root_query_fields = HashMap::new();
        let mut root_mutation_fields = HashMap::new();
        let mut others: Vec<TypeDefinition<'static, String>> = Vec::new();
        let mut schemas = HashMap::new();

        for remote in remotes {
            let (query_name, mutation_name) = root_type_names(&remote.document);

            for definition in &remote.document.definitions {
                let Definition::TypeDefinition(type_def) = definition else {
                    continue;
                };

                if let TypeDefinition::Object(object) = type_def {
                    if object.name == query_name {
                        merge_root_fields(
                            &mut unified_query,
                            object,
                            QUERY_TYPE,
                            &remote.name,
                            &mut root_query_fields,
                        );
                        continue;
                    }
                    if Some(object.name.as_str()) == mutation_name.as_deref() {
                        merge_root_fields(
                            &mut unified_mutation,
                            object,
                            MUTATION_TYPE,
                            &remote.name,
                            &mut root_mutation_fields,
                        );
                        continue;
                    }
                }

                let name = type_definition_name(type_def).to_string();
                if let Some(existing) = others
                    .iter_mut()
                    .find(|existing| type_definition_name(existing) == name)
                {
                    warn!(type_name = %name, service = %remote.name, "type collision, later definition wins");
                    *existing = type_def.clone();
                } else {
                    others.push(type_def.clone());
                }
            }

            schemas.insert(remote.name.clone(), Arc::new(remote));
        }

        let unified_query = unified_query.ok_or(SchemaError::MissingQueryRoot)?;
        if root_query_fields.is_empty() {
            return Err(SchemaError::MissingQueryRoot);
        }

        let mut types = Vec::with_capacity(others.len() + 2);
        types.push(TypeDefinition::Object(unified_query));
        if let Some(mutation) = unified_mutation {
            types.push(TypeDefinition::Object(mutation));
        }
        types.extend(others);

        let mut merged = MergedSchema {
            index: build_index(&types),
            types,
            root_query_fields,
            root_mutation_fields,
            links: HashMap::new(),
            schemas,
        };

        merged.apply_link_extension(link_type_defs)?;
        merged.install_link_rules(rules)?;

        info!(
            types = merged.types.len(),
            query_fields = merged.root_query_fields.len(),
            mutation_fields = merged.root_mutation_fields.len(),
            "merged unified schema"
        );
        Ok(merged)
    }

    fn apply_link_extension(&mut self, link_type_defs: &str) -> Result<(), SchemaError> {
        if link_type_defs.trim().is_empty() {
            return Ok(());
        }
        let document = graphql_parser::parse_schema::<String>(link_type_defs)
            .map_err(|e| SchemaError::InvalidLinkTypeDefs(e.to_string()))?
            .into_static();

        for definition in document.definitions {
            let Definition::TypeExtension(TypeExtension::Object(extension)) = definition else {
                continue;
            };

            // Validate every referenced field type against the merged graph
            // before touching the target type.
            for field in &extension.fields {
                let referenced = base_type_name(&field.field_type);
                if !BUILTIN_SCALARS.contains(&referenced) && !self.index.contains_key(referenced) {
                    return Err(SchemaError::UnknownLinkFieldType {
                        type_name: extension.name.clone(),
                        field_name: field.name.clone(),
                        referenced: referenced.to_string(),
                    });
                }
            }

            let target = self
                .index
                .get(&extension.name)
                .copied()
                .ok_or_else(|| SchemaError::UnknownLinkTarget(extension.name.clone()))?;
            let TypeDefinition::Object(object) = &mut self.types[target] else {
                return Err(SchemaError::UnknownLinkTarget(extension.name.clone()));
            };

            for field in extension.fields {
                debug!(type_name = %object.name, field = %field.name, "adding link field");
                if let Some(existing) =
                    object.fields.iter_mut().find(|f| f.name == field.name)
                {
                    *existing = field;
                } else {
                    object.fields.push(field);
                }
            }
        }
        Ok(())
    }

    fn install_link_rules(&mut self, rules: Vec<LinkRule>) -> Result<(), SchemaError> {
        for rule in rules {
            if !self.schemas.contains_key(rule.service) {
                return Err(SchemaError::UnknownLinkService {
                    type_name: rule.type_name.to_string(),
                    field_name: rule.field_name.to_string(),
                    service: rule.service.to_string(),
                });
            }
            if rule.required_fields().is_none() {
                return Err(SchemaError::InvalidRequiresFragment {
                    type_name: rule.type_name.to_string(),
                    field_name: rule.field_name.to_string(),
                    fragment: rule.requires.to_string(),
                });
            }
            self.links.insert(
                (rule.type_name.to_string(), rule.field_name.to_string()),
                rule,
            );
        }
        Ok(())
    }

    pub fn types(&self) -> &[TypeDefinition<'static, String>] {
        &self.types
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDefinition<'static, String>> {
        self.index.get(name).map(|&i| &self.types[i])
    }

    pub fn query_type_name(&self) -> &str {
        QUERY_TYPE
    }

    pub fn mutation_type_name(&self) -> Option<&str> {
        if self.root_mutation_fields.is_empty() {
            None
        } else {
            Some(MUTATION_TYPE)
        }
    }

    /// Declared type of `type_name.field_name`, if the parent is an object
    /// or interface carrying that field.
    pub fn field_type(&self, type_name: &str, field_name: &str) -> Option<&Type<'static, String>> {
        let fields = match self.type_def(type_name)? {
            TypeDefinition::Object(object) => &object.fields,
            TypeDefinition::Interface(interface) => &interface.fields,
            _ => return None,
        };
        fields
            .iter()
            .find(|field| field.name == field_name)
            .map(|field| &field.field_type)
    }

    pub fn service_for_query_field(&self, field_name: &str) -> Option<&str> {
        self.root_query_fields.get(field_name).map(String::as_str)
    }

    pub fn service_for_mutation_field(&self, field_name: &str) -> Option<&str> {
        self.root_mutation_fields
            .get(field_name)
            .map(String::as_str)
    }

    pub fn link(&self, type_name: &str, field_name: &str) -> Option<&LinkRule> {
        self.links
            .get(&(type_name.to_string(), field_name.to_string()))
    }

    pub fn schema(&self, service: &str) -> Option<&Arc<RemoteSchema>> {
        self.schemas.get(service)
    }
}

/// Root operation type names declared by a service, defaulting to the
/// conventional `Query`/`Mutation`.
fn root_type_names(document: &Document<'static, String>) -> (String, Option<String>) {
    for definition in &document.definitions {
        if let Definition::SchemaDefinition(schema_def) = definition {
            return (
                schema_def
                    .query
                    .clone()
                    .unwrap_or_else(|| QUERY_TYPE.to_string()),
                schema_def.mutation.clone(),
            );
        }
    }
    (QUERY_TYPE.to_string(), Some(MUTATION_TYPE.to_string()))
}

fn merge_root_fields(
    unified: &mut Option<ObjectType<'static, String>>,
    object: &ObjectType<'static, String>,
    unified_name: &str,
    service: &str,
    ownership: &mut HashMap<String, String>,
) {
    for field in &object.fields {
        if ownership.insert(field.name.clone(), service.to_string()).is_some() {
            warn!(field = %field.name, service = %service, "root field collision, later service wins");
        }
    }

    match unified {
        None => {
            let mut root = object.clone();
            root.name = unified_name.to_string();
            *unified = Some(root);
        }
        Some(root) => {
            for field in &object.fields {
                if let Some(existing) = root.fields.iter_mut().find(|f| f.name == field.name) {
                    *existing = field.clone();
                } else {
                    root.fields.push(field.clone());
                }
            }
        }
    }
}

fn build_index(types: &[TypeDefinition<'static, String>]) -> HashMap<String, usize> {
    types
        .iter()
        .enumerate()
        .map(|(i, type_def)| (type_definition_name(type_def).to_string(), i))
        .collect()
}

pub fn type_definition_name<'a>(type_def: &'a TypeDefinition<'static, String>) -> &'a str {
    match type_def {
        TypeDefinition::Scalar(t) => &t.name,
        TypeDefinition::Object(t) => &t.name,
        TypeDefinition::Interface(t) => &t.name,
        TypeDefinition::Union(t) => &t.name,
        TypeDefinition::Enum(t) => &t.name,
        TypeDefinition::InputObject(t) => &t.name,
    }
}

/// Unwrap list/non-null wrappers down to the named type.
pub fn base_type_name<'a>(ty: &'a Type<'static, String>) -> &'a str {
    match ty {
        Type::NamedType(name) => name,
        Type::ListType(inner) => base_type_name(inner),
        Type::NonNullType(inner) => base_type_name(inner),
    }
}
