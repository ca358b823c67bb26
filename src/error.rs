use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {0} is empty")]
    Empty(&'static str),
    #[error("invalid PORT value {value:?}: {source}")]
    InvalidPort {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid response body from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Failures while building the unified schema. All of these are fatal to
/// startup: the gateway never serves a partially merged graph.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("introspection of service {service:?} failed: {source}")]
    Introspection {
        service: String,
        #[source]
        source: TransportError,
    },
    #[error("introspection of service {service:?} returned errors: {message}")]
    IntrospectionErrors { service: String, message: String },
    #[error("introspection of service {service:?} returned no usable schema: {reason}")]
    MalformedIntrospection { service: String, reason: String },
    #[error("failed to parse schema of service {service:?}: {message}")]
    Parse { service: String, message: String },
    #[error("link extension could not be parsed: {0}")]
    InvalidLinkTypeDefs(String),
    #[error("link extension targets unknown type {0:?}")]
    UnknownLinkTarget(String),
    #[error("link field {type_name}.{field_name} references unknown type {referenced:?}")]
    UnknownLinkFieldType {
        type_name: String,
        field_name: String,
        referenced: String,
    },
    #[error("link rule for {type_name}.{field_name} targets unknown service {service:?}")]
    UnknownLinkService {
        type_name: String,
        field_name: String,
        service: String,
    },
    #[error("link rule for {type_name}.{field_name} has an invalid requires fragment: {fragment:?}")]
    InvalidRequiresFragment {
        type_name: String,
        field_name: String,
        fragment: String,
    },
    #[error("merged schema has no query root field")]
    MissingQueryRoot,
}

/// Per-request failures. These surface as GraphQL errors in the response,
/// never as a gateway crash.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed to parse query: {0}")]
    Parse(String),
    #[error("unknown operation {0:?}")]
    UnknownOperation(String),
    #[error("query contains no operation")]
    NoOperation,
    #[error("subscriptions are not supported")]
    Subscription,
    #[error("unknown fragment {0:?}")]
    UnknownFragment(String),
    #[error("fragment cycle involving {0:?}")]
    FragmentCycle(String),
    #[error("no service found for root field {0:?}")]
    UnroutableField(String),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}
