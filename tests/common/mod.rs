#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use graphweave::error::TransportError;
use graphweave::transport::GraphQLTransport;
use graphweave::{
    CART_SERVICE, CHECKOUT_SERVICE, DelegatingQueryExecutor, GraphQLRequest, LINK_TYPE_DEFS,
    MergedSchema, RemoteSchema, StitchGateway, StitchQueryPlanner, USER_SERVICE, UpstreamConfig,
    link_rules, schema_loader,
};

pub const CART_SDL: &str = r#"
type Query {
  cartForCurrentUser: Cart!
}

type Cart {
  id: ID!
  items: [CartItem!]!
}

type CartItem {
  productId: ID!
  quantity: Int!
}
"#;

pub const CHECKOUT_SDL: &str = r#"
type Query {
  ordersForCurrentCustomer: [Order!]!
  order(id: ID!): Order
}

type Order {
  id: ID!
  total: Float!
}
"#;

pub const USER_SDL: &str = r#"
type Query {
  user(id: ID!): User
  users: [User!]!
}

type Mutation {
  createUser(name: String!): User
}

type User {
  id: ID!
  name: String!
  email: String!
}
"#;

/// Transport for plan-only tests: anything that actually sends through it
/// is a test failure.
pub struct NullTransport {
    endpoint: String,
}

#[async_trait]
impl GraphQLTransport for NullTransport {
    async fn execute(&self, _request: &GraphQLRequest) -> Result<Value, TransportError> {
        panic!("transport for {} should not be used", self.endpoint);
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

pub fn null_transport(endpoint: &str) -> Arc<dyn GraphQLTransport> {
    Arc::new(NullTransport {
        endpoint: endpoint.to_string(),
    })
}

/// The three-service merged schema used by planner and merge tests, built
/// from local SDL without any network involved.
pub fn merged_schema() -> MergedSchema {
    let remotes = vec![
        RemoteSchema::from_sdl(CART_SERVICE, CART_SDL, null_transport("http://cart.test")).unwrap(),
        RemoteSchema::from_sdl(
            CHECKOUT_SERVICE,
            CHECKOUT_SDL,
            null_transport("http://checkout.test"),
        )
        .unwrap(),
        RemoteSchema::from_sdl(USER_SERVICE, USER_SDL, null_transport("http://user.test")).unwrap(),
    ];
    MergedSchema::new(remotes, LINK_TYPE_DEFS, link_rules()).unwrap()
}

// Introspection response builders for the mock upstreams.

pub fn named(kind: &str, name: &str) -> Value {
    json!({ "kind": kind, "name": name, "ofType": null })
}

pub fn non_null(inner: Value) -> Value {
    json!({ "kind": "NON_NULL", "name": null, "ofType": inner })
}

pub fn list_of(inner: Value) -> Value {
    json!({ "kind": "LIST", "name": null, "ofType": inner })
}

pub fn field(name: &str, field_type: Value) -> Value {
    json!({
        "name": name,
        "description": null,
        "args": [],
        "type": field_type,
        "isDeprecated": false,
        "deprecationReason": null
    })
}

pub fn field_with_args(name: &str, args: Vec<Value>, field_type: Value) -> Value {
    json!({
        "name": name,
        "description": null,
        "args": args,
        "type": field_type,
        "isDeprecated": false,
        "deprecationReason": null
    })
}

pub fn arg(name: &str, arg_type: Value) -> Value {
    json!({ "name": name, "description": null, "type": arg_type, "defaultValue": null })
}

pub fn object(name: &str, fields: Vec<Value>) -> Value {
    json!({
        "kind": "OBJECT",
        "name": name,
        "description": null,
        "fields": fields,
        "inputFields": null,
        "interfaces": [],
        "enumValues": null,
        "possibleTypes": null
    })
}

pub fn introspection_response(types: Vec<Value>) -> Value {
    json!({
        "data": {
            "__schema": {
                "queryType": { "name": "Query" },
                "mutationType": null,
                "subscriptionType": null,
                "types": types,
                "directives": []
            }
        }
    })
}

pub fn cart_introspection() -> Value {
    introspection_response(vec![
        object(
            "Query",
            vec![field("cartForCurrentUser", non_null(named("OBJECT", "Cart")))],
        ),
        object(
            "Cart",
            vec![
                field("id", non_null(named("SCALAR", "ID"))),
                field(
                    "items",
                    non_null(list_of(non_null(named("OBJECT", "CartItem")))),
                ),
            ],
        ),
        object(
            "CartItem",
            vec![
                field("productId", non_null(named("SCALAR", "ID"))),
                field("quantity", non_null(named("SCALAR", "Int"))),
            ],
        ),
    ])
}

pub fn checkout_introspection() -> Value {
    introspection_response(vec![
        object(
            "Query",
            vec![
                field(
                    "ordersForCurrentCustomer",
                    non_null(list_of(non_null(named("OBJECT", "Order")))),
                ),
                field_with_args(
                    "order",
                    vec![arg("id", non_null(named("SCALAR", "ID")))],
                    named("OBJECT", "Order"),
                ),
            ],
        ),
        object(
            "Order",
            vec![
                field("id", non_null(named("SCALAR", "ID"))),
                field("total", non_null(named("SCALAR", "Float"))),
            ],
        ),
    ])
}

pub fn user_introspection() -> Value {
    introspection_response(vec![
        object(
            "Query",
            vec![
                field_with_args(
                    "user",
                    vec![arg("id", non_null(named("SCALAR", "ID")))],
                    named("OBJECT", "User"),
                ),
                field("users", non_null(list_of(non_null(named("OBJECT", "User"))))),
            ],
        ),
        object(
            "User",
            vec![
                field("id", non_null(named("SCALAR", "ID"))),
                field("name", non_null(named("SCALAR", "String"))),
                field("email", non_null(named("SCALAR", "String"))),
            ],
        ),
    ])
}

pub async fn mount_introspection(server: &MockServer, response: Value) {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string_contains("IntrospectionQuery"))
        .respond_with(ResponseTemplate::new(200).set_body_json(response))
        .mount(server)
        .await;
}

/// Mount a data response matched by a marker substring of the forwarded
/// query, so introspection and data traffic hit different mocks.
pub async fn mount_data(server: &MockServer, marker: &str, response: Value) {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string_contains(marker))
        .respond_with(ResponseTemplate::new(200).set_body_json(response))
        .mount(server)
        .await;
}

pub async fn mount_failure(server: &MockServer, marker: &str, status: u16) {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string_contains(marker))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Three mock upstreams answering introspection, ready for data mocks.
pub async fn start_upstreams() -> (MockServer, MockServer, MockServer) {
    let cart = MockServer::start().await;
    let checkout = MockServer::start().await;
    let user = MockServer::start().await;

    mount_introspection(&cart, cart_introspection()).await;
    mount_introspection(&checkout, checkout_introspection()).await;
    mount_introspection(&user, user_introspection()).await;

    (cart, checkout, user)
}

pub fn upstream_configs(cart: &MockServer, checkout: &MockServer, user: &MockServer) -> Vec<UpstreamConfig> {
    vec![
        UpstreamConfig {
            name: CART_SERVICE.to_string(),
            uri: cart.uri(),
        },
        UpstreamConfig {
            name: CHECKOUT_SERVICE.to_string(),
            uri: checkout.uri(),
        },
        UpstreamConfig {
            name: USER_SERVICE.to_string(),
            uri: user.uri(),
        },
    ]
}

/// Introspect the mock upstreams and assemble a live gateway around them.
pub async fn stitched_gateway(
    cart: &MockServer,
    checkout: &MockServer,
    user: &MockServer,
) -> StitchGateway {
    let client = reqwest::Client::new();
    let remotes = schema_loader::load_all(&client, &upstream_configs(cart, checkout, user))
        .await
        .expect("introspection of mock upstreams failed");
    let schema = MergedSchema::new(remotes, LINK_TYPE_DEFS, link_rules())
        .expect("schema merge failed");

    StitchGateway::new(
        schema,
        Box::new(StitchQueryPlanner::new()),
        Box::new(DelegatingQueryExecutor::new()),
    )
}

pub async fn run_query(gateway: &StitchGateway, query: &str, variables: Option<Value>) -> Value {
    let request = GraphQLRequest {
        query: query.to_string(),
        variables,
        operation_name: None,
        auth_headers: None,
    };
    gateway
        .process_request(request)
        .await
        .expect("query was not plannable")
}

/// Bodies of every request a mock upstream has received.
pub async fn received_bodies(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| String::from_utf8_lossy(&request.body).to_string())
        .collect()
}
