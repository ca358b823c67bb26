pub mod config;
pub mod error;
pub mod introspection;
pub mod introspection_resolver;
pub mod link_resolvers;
pub mod query_executor;
pub mod query_planner;
pub mod schema_loader;
pub mod schema_merge;
pub mod server;
pub mod stitch_gateway;
pub mod transport;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use link_resolvers::{LINK_TYPE_DEFS, LinkRule, link_rules};
pub use query_executor::DelegatingQueryExecutor;
pub use query_planner::StitchQueryPlanner;
pub use schema_loader::RemoteSchema;
pub use schema_merge::MergedSchema;
pub use stitch_gateway::StitchGateway;
pub use transport::HttpTransport;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Logical names the link resolvers use to address upstreams.
pub const CART_SERVICE: &str = "cart";
pub const CHECKOUT_SERVICE: &str = "checkout";
pub const USER_SERVICE: &str = "user";

/// One remote GraphQL service the gateway stitches in.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub name: String,
    pub uri: String,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(skip)]
    pub auth_headers: Option<HashMap<String, String>>,
}

impl GraphQLRequest {
    pub fn new(query: impl Into<String>) -> Self {
        GraphQLRequest {
            query: query.into(),
            variables: None,
            operation_name: None,
            auth_headers: None,
        }
    }
}
