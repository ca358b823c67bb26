use std::env;

use crate::error::ConfigError;
use crate::{CART_SERVICE, CHECKOUT_SERVICE, USER_SERVICE, UpstreamConfig};

const CART_URI_VAR: &str = "GRAPHQL_CART_SERVICE_URI";
const CHECKOUT_URI_VAR: &str = "GRAPHQL_CHECKOUT_SERVICE_URI";
const USER_URI_VAR: &str = "GRAPHQL_USER_SERVICE_URI";
const PORT_VAR: &str = "PORT";

const DEFAULT_PORT: u16 = 4000;

/// Process configuration, read once at startup from the environment.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub cart_uri: String,
    pub checkout_uri: String,
    pub user_uri: String,
    pub port: u16,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(GatewayConfig {
            cart_uri: required_var(CART_URI_VAR)?,
            checkout_uri: required_var(CHECKOUT_URI_VAR)?,
            user_uri: required_var(USER_URI_VAR)?,
            port: port_from_env()?,
        })
    }

    /// The upstreams to stitch, keyed by the logical names the link
    /// resolvers address them with.
    pub fn upstreams(&self) -> Vec<UpstreamConfig> {
        vec![
            UpstreamConfig {
                name: CART_SERVICE.to_string(),
                uri: self.cart_uri.clone(),
            },
            UpstreamConfig {
                name: CHECKOUT_SERVICE.to_string(),
                uri: self.checkout_uri.clone(),
            },
            UpstreamConfig {
                name: USER_SERVICE.to_string(),
                uri: self.user_uri.clone(),
            },
        ]
    }
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    let value = env::var(name).map_err(|_| ConfigError::Missing(name))?;
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(ConfigError::Empty(name));
    }
    Ok(value)
}

fn port_from_env() -> Result<u16, ConfigError> {
    match env::var(PORT_VAR) {
        Err(_) => Ok(DEFAULT_PORT),
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|source| ConfigError::InvalidPort { value: raw, source }),
    }
}
