//! The cross-service link fields: what gets grafted onto `User` and where
//! each field's data actually comes from.

use crate::{CART_SERVICE, CHECKOUT_SERVICE};

/// Schema fragment grafting the cart/checkout entities onto the user
/// service's `User` type. The referenced field types must exist in one of
/// the proxy schemas or merging fails.
pub const LINK_TYPE_DEFS: &str = r#"
extend type User {
  cart: Cart!
  orders: [Order!]!
}
"#;

/// How one link field resolves: which fields the parent object must carry,
/// and which operation on which service the resolution delegates to.
/// Delegation is pure forwarding; arguments, sub-selection, and request
/// context pass through unchanged.
#[derive(Clone, Debug)]
pub struct LinkRule {
    pub type_name: &'static str,
    pub field_name: &'static str,
    /// Minimal selection the parent must expose for delegation to work.
    pub requires: &'static str,
    /// Logical service name the delegated operation runs against.
    pub service: &'static str,
    /// Root query field on the target service.
    pub operation: &'static str,
}

/// The link resolver map. Services are addressed by name, never by the
/// position they were configured in.
pub fn link_rules() -> Vec<LinkRule> {
    vec![
        LinkRule {
            type_name: "User",
            field_name: "cart",
            requires: "{ id }",
            service: CART_SERVICE,
            operation: "cartForCurrentUser",
        },
        LinkRule {
            type_name: "User",
            field_name: "orders",
            requires: "{ id }",
            service: CHECKOUT_SERVICE,
            operation: "ordersForCurrentCustomer",
        },
    ]
}

impl LinkRule {
    /// Field names the `requires` fragment selects on the parent.
    pub fn required_fields(&self) -> Option<Vec<String>> {
        let document = graphql_parser::parse_query::<String>(self.requires).ok()?;
        let mut fields = Vec::new();
        for definition in &document.definitions {
            if let graphql_parser::query::Definition::Operation(
                graphql_parser::query::OperationDefinition::SelectionSet(set),
            ) = definition
            {
                for item in &set.items {
                    if let graphql_parser::query::Selection::Field(field) = item {
                        fields.push(field.name.clone());
                    }
                }
            }
        }
        if fields.is_empty() { None } else { Some(fields) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_cover_cart_and_orders() {
        let rules = link_rules();
        assert_eq!(rules.len(), 2);
        assert!(
            rules
                .iter()
                .any(|r| r.field_name == "cart" && r.service == CART_SERVICE)
        );
        assert!(
            rules
                .iter()
                .any(|r| r.field_name == "orders" && r.service == CHECKOUT_SERVICE)
        );
    }

    #[test]
    fn requires_fragment_selects_only_id() {
        for rule in link_rules() {
            assert_eq!(rule.required_fields(), Some(vec!["id".to_string()]));
        }
    }

    #[test]
    fn link_type_defs_parse_as_extension() {
        graphql_parser::parse_schema::<String>(LINK_TYPE_DEFS).unwrap();
    }
}
