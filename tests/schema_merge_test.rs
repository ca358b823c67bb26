mod common;

use graphql_parser::schema::{Type, TypeDefinition};
use pretty_assertions::assert_eq;

use common::{CHECKOUT_SDL, USER_SDL, merged_schema, null_transport};
use graphweave::error::SchemaError;
use graphweave::schema_merge::base_type_name;
use graphweave::{
    CART_SERVICE, CHECKOUT_SERVICE, LINK_TYPE_DEFS, LinkRule, MergedSchema, RemoteSchema,
    USER_SERVICE, link_rules,
};

fn remote(name: &str, sdl: &str) -> RemoteSchema {
    RemoteSchema::from_sdl(name, sdl, null_transport(&format!("http://{name}.test"))).unwrap()
}

#[test]
fn root_fields_are_owned_by_their_services() {
    let schema = merged_schema();

    assert_eq!(
        schema.service_for_query_field("cartForCurrentUser"),
        Some(CART_SERVICE)
    );
    assert_eq!(
        schema.service_for_query_field("ordersForCurrentCustomer"),
        Some(CHECKOUT_SERVICE)
    );
    assert_eq!(schema.service_for_query_field("user"), Some(USER_SERVICE));
    assert_eq!(schema.service_for_query_field("users"), Some(USER_SERVICE));
    assert_eq!(schema.service_for_query_field("unknown"), None);

    assert_eq!(schema.mutation_type_name(), Some("Mutation"));
    assert_eq!(
        schema.service_for_mutation_field("createUser"),
        Some(USER_SERVICE)
    );
}

#[test]
fn user_type_carries_non_null_link_fields() {
    let schema = merged_schema();

    let cart = schema.field_type("User", "cart").expect("User.cart exists");
    assert!(matches!(cart, Type::NonNullType(_)));
    assert_eq!(base_type_name(cart), "Cart");

    let orders = schema
        .field_type("User", "orders")
        .expect("User.orders exists");
    assert!(matches!(orders, Type::NonNullType(_)));
    assert_eq!(base_type_name(orders), "Order");

    assert_eq!(
        schema.link("User", "cart").map(|rule| rule.service),
        Some(CART_SERVICE)
    );
    assert_eq!(
        schema.link("User", "orders").map(|rule| rule.service),
        Some(CHECKOUT_SERVICE)
    );
    assert!(schema.link("User", "name").is_none());
}

#[test]
fn later_definitions_win_type_collisions() {
    let first = remote(
        "first",
        "type Query { a: Widget }\ntype Widget { x: Int }",
    );
    let second = remote(
        "second",
        "type Query { b: Widget }\ntype Widget { y: Int }",
    );

    let schema = MergedSchema::new(vec![first, second], "", vec![]).unwrap();

    assert_eq!(schema.service_for_query_field("a"), Some("first"));
    assert_eq!(schema.service_for_query_field("b"), Some("second"));
    assert!(schema.field_type("Widget", "y").is_some());
    assert!(schema.field_type("Widget", "x").is_none());
}

#[test]
fn later_services_win_root_field_collisions() {
    let first = remote("first", "type Query { thing: Int }");
    let second = remote("second", "type Query { thing: Int }");

    let schema = MergedSchema::new(vec![first, second], "", vec![]).unwrap();
    assert_eq!(schema.service_for_query_field("thing"), Some("second"));
}

#[test]
fn merge_requires_a_query_root() {
    let no_root = remote("lonely", "type Thing { id: ID! }");
    let result = MergedSchema::new(vec![no_root], "", vec![]);
    assert!(matches!(result, Err(SchemaError::MissingQueryRoot)));
}

#[test]
fn link_rules_must_target_loaded_services() {
    let user = remote(USER_SERVICE, USER_SDL);
    let checkout = remote(CHECKOUT_SERVICE, CHECKOUT_SDL);

    let rules = vec![LinkRule {
        type_name: "User",
        field_name: "orders",
        requires: "{ id }",
        service: "payments",
        operation: "ordersForCurrentCustomer",
    }];

    let result = MergedSchema::new(
        vec![user, checkout],
        "extend type User { orders: [Order!]! }",
        rules,
    );
    assert!(matches!(
        result,
        Err(SchemaError::UnknownLinkService { service, .. }) if service == "payments"
    ));
}

#[test]
fn link_fields_must_reference_known_types() {
    let user = remote(USER_SERVICE, USER_SDL);

    let result = MergedSchema::new(
        vec![user],
        "extend type User { stuff: Missing! }",
        vec![],
    );
    assert!(matches!(
        result,
        Err(SchemaError::UnknownLinkFieldType { referenced, .. }) if referenced == "Missing"
    ));
}

#[test]
fn link_extension_requires_its_target_type() {
    let checkout = remote(CHECKOUT_SERVICE, CHECKOUT_SDL);

    let result = MergedSchema::new(vec![checkout], LINK_TYPE_DEFS, link_rules());
    assert!(matches!(result, Err(SchemaError::UnknownLinkTarget(name)) if name == "User"));
}

#[test]
fn merged_types_include_every_service() {
    let schema = merged_schema();
    let names: Vec<&str> = schema
        .types()
        .iter()
        .map(graphweave::schema_merge::type_definition_name)
        .collect();

    for expected in ["Query", "Mutation", "Cart", "CartItem", "Order", "User"] {
        assert!(names.contains(&expected), "missing {expected}");
    }
}
