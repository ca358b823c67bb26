use async_trait::async_trait;
use serde_json::Value;

use crate::GraphQLRequest;
use crate::error::TransportError;

/// A link to one remote GraphQL service. Every operation the gateway
/// forwards or delegates travels through one of these.
#[async_trait]
pub trait GraphQLTransport: Send + Sync {
    async fn execute(&self, request: &GraphQLRequest) -> Result<Value, TransportError>;

    fn endpoint(&self) -> &str;
}

/// HTTP transport over a shared reqwest client. Connection pooling is the
/// client's concern, not ours.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        HttpTransport { client, endpoint }
    }
}

#[async_trait]
impl GraphQLTransport for HttpTransport {
    async fn execute(&self, request: &GraphQLRequest) -> Result<Value, TransportError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(request);

        // Forward the caller's auth context unchanged.
        if let Some(headers) = &request.auth_headers {
            for (name, value) in headers {
                builder = builder.header(name, value);
            }
        }

        let response = builder
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|source| TransportError::Http {
                endpoint: self.endpoint.clone(),
                source,
            })?;

        response
            .json::<Value>()
            .await
            .map_err(|source| TransportError::Decode {
                endpoint: self.endpoint.clone(),
                source,
            })
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
