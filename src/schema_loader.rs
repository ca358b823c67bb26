use std::sync::Arc;

use futures::future::try_join_all;
use graphql_parser::schema;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{SchemaError, TransportError};
use crate::transport::{GraphQLTransport, HttpTransport};
use crate::{GraphQLRequest, UpstreamConfig, introspection};

/// A remote service's type system paired with the transport that forwards
/// operations to it. Built once at startup, immutable afterwards.
pub struct RemoteSchema {
    pub name: String,
    pub document: schema::Document<'static, String>,
    transport: Arc<dyn GraphQLTransport>,
}

impl RemoteSchema {
    /// Introspect one upstream and wrap the result as an executable proxy.
    pub async fn load(
        name: String,
        transport: Arc<dyn GraphQLTransport>,
    ) -> Result<Self, SchemaError> {
        debug!(service = %name, endpoint = %transport.endpoint(), "introspecting upstream");

        let response = transport
            .execute(&introspection::introspection_request())
            .await
            .map_err(|source| SchemaError::Introspection {
                service: name.clone(),
                source,
            })?;

        if let Some(errors) = response.get("errors").and_then(Value::as_array)
            && !errors.is_empty()
        {
            return Err(SchemaError::IntrospectionErrors {
                service: name,
                message: join_error_messages(errors),
            });
        }

        let sdl = introspection::schema_sdl(&response).map_err(|e| {
            SchemaError::MalformedIntrospection {
                service: name.clone(),
                reason: e.to_string(),
            }
        })?;

        let document = graphql_parser::parse_schema::<String>(&sdl)
            .map_err(|e| SchemaError::Parse {
                service: name.clone(),
                message: e.to_string(),
            })?
            .into_static();

        info!(service = %name, "introspected upstream");
        Ok(RemoteSchema {
            name,
            document,
            transport,
        })
    }

    /// Build a proxy schema from already-known SDL, skipping introspection.
    pub fn from_sdl(
        name: &str,
        sdl: &str,
        transport: Arc<dyn GraphQLTransport>,
    ) -> Result<Self, SchemaError> {
        let document = graphql_parser::parse_schema::<String>(sdl)
            .map_err(|e| SchemaError::Parse {
                service: name.to_string(),
                message: e.to_string(),
            })?
            .into_static();
        Ok(RemoteSchema {
            name: name.to_string(),
            document,
            transport,
        })
    }

    /// Forward an operation to the remote service.
    pub async fn execute(&self, request: &GraphQLRequest) -> Result<Value, TransportError> {
        self.transport.execute(request).await
    }
}

/// Introspect every configured upstream concurrently. The whole load fails
/// if any single introspection fails; a partial schema list is never
/// returned. Output order matches input order.
pub async fn load_all(
    client: &reqwest::Client,
    upstreams: &[UpstreamConfig],
) -> Result<Vec<RemoteSchema>, SchemaError> {
    try_join_all(upstreams.iter().map(|upstream| {
        let transport: Arc<dyn GraphQLTransport> = Arc::new(HttpTransport::new(
            client.clone(),
            upstream.uri.clone(),
        ));
        RemoteSchema::load(upstream.name.clone(), transport)
    }))
    .await
}

fn join_error_messages(errors: &[Value]) -> String {
    errors
        .iter()
        .map(|error| {
            error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("; ")
}
