//! Expression syntax tree.

use crate::visitor::{Visitor, walk};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;

/// Parameter bindings, by parameter name.
pub type Bindings = BTreeMap<String, Expr>;

/// A parsed permission expression.
///
/// The `Display` implementation prints the canonical text form, which parses
/// back to an equal expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// All objects of a registered type: `group`.
    Model(String),
    /// Objects reached through a relation: `group.subgroups`.
    Join { lhs: Box<Expr>, relation: String },
    /// Objects whose field matches a value: `group#id(1)`.
    Filter {
        lhs: Box<Expr>,
        field: String,
        value: Box<Expr>,
    },
    /// A permission applied to arguments: `create_user(a, b)`.
    Instance {
        permission: String,
        arguments: Vec<Expr>,
    },
    /// A named placeholder: `$current_user`.
    Parameter(String),
    /// Any object: `*`.
    Wildcard,
    Integer(i64),
    Text(String),
}

/// A literal value appearing in an expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Integer(i64),
    Text(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(value) => write!(f, "{value}"),
            Literal::Text(value) => f.write_str(&quote_text(value)),
        }
    }
}

impl From<Literal> for Expr {
    fn from(value: Literal) -> Self {
        match value {
            Literal::Integer(value) => Expr::Integer(value),
            Literal::Text(value) => Expr::Text(value),
        }
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Integer(value)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::Integer(value.into())
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::Text(value.to_string())
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Expr::Text(value)
    }
}

impl Expr {
    pub fn model(name: impl Into<String>) -> Self {
        Expr::Model(name.into())
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        Expr::Parameter(name.into())
    }

    pub fn instance(permission: impl Into<String>, arguments: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Instance {
            permission: permission.into(),
            arguments: arguments.into_iter().collect(),
        }
    }

    /// Follow a relation from this expression.
    pub fn join(self, relation: impl Into<String>) -> Self {
        Expr::Join {
            lhs: Box::new(self),
            relation: relation.into(),
        }
    }

    /// Narrow this expression by a filter.
    pub fn filter(self, field: impl Into<String>, value: impl Into<Expr>) -> Self {
        Expr::Filter {
            lhs: Box::new(self),
            field: field.into(),
            value: Box::new(value.into()),
        }
    }

    pub fn is_instance(&self) -> bool {
        matches!(self, Expr::Instance { .. })
    }

    /// Replace bound parameters with their expressions.
    ///
    /// Parameters without a binding are left in place.
    pub fn bind(&self, bindings: &Bindings) -> Expr {
        match self {
            Expr::Parameter(name) => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
            Expr::Join { lhs, relation } => Expr::Join {
                lhs: Box::new(lhs.bind(bindings)),
                relation: relation.clone(),
            },
            Expr::Filter { lhs, field, value } => Expr::Filter {
                lhs: Box::new(lhs.bind(bindings)),
                field: field.clone(),
                value: Box::new(value.bind(bindings)),
            },
            Expr::Instance {
                permission,
                arguments,
            } => Expr::Instance {
                permission: permission.clone(),
                arguments: arguments.iter().map(|a| a.bind(bindings)).collect(),
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match walk(&mut Canonical, self) {
            Ok(text) => f.write_str(&text),
            Err(never) => match never {},
        }
    }
}

/// Prints the canonical text form of an expression.
struct Canonical;

impl Visitor for Canonical {
    type Output = String;
    type Error = Infallible;

    fn visit_model(&mut self, name: &str) -> Result<String, Infallible> {
        Ok(name.to_string())
    }

    fn visit_join(&mut self, lhs: &String, relation: &str) -> Result<String, Infallible> {
        Ok(format!("{lhs}.{relation}"))
    }

    fn visit_filter(&mut self, lhs: &String, field: &str, value: &String) -> Result<String, Infallible> {
        Ok(format!("{lhs}#{field}({value})"))
    }

    fn visit_instance(&mut self, permission: &str, arguments: &[Expr]) -> Result<String, Infallible> {
        let arguments = arguments
            .iter()
            .map(|a| walk(self, a))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("{permission}({})", arguments.join(", ")))
    }

    fn visit_parameter(&mut self, name: &str) -> Result<String, Infallible> {
        Ok(format!("${name}"))
    }

    fn visit_wildcard(&mut self) -> Result<String, Infallible> {
        Ok("*".to_string())
    }

    fn visit_literal(&mut self, value: Literal) -> Result<String, Infallible> {
        Ok(value.to_string())
    }
}

fn quote_text(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use proptest::collection::vec;
    use proptest::option;
    use proptest::prelude::*;

    #[test]
    fn test_canonical_text() {
        let expr = Expr::instance(
            "add_to_group",
            [
                Expr::parameter("me"),
                Expr::model("user").filter("username", "o\"brien"),
                Expr::model("group").filter("id", 1).join("subgroups"),
                Expr::Wildcard,
            ],
        );
        assert_eq!(
            expr.to_string(),
            r#"add_to_group($me, user#username("o\"brien"), group#id(1).subgroups, *)"#
        );
    }

    #[test]
    fn test_round_trip() {
        let exprs = [
            Expr::model("user"),
            Expr::model("user").join("supervisor").join("groups"),
            Expr::model("user").filter("username", r"back\slash"),
            Expr::model("group").filter("id", Expr::model("user").filter("id", 5).join("groups")),
            Expr::instance("p", []),
            Expr::instance(
                "delegate",
                [Expr::Wildcard, Expr::instance("create_user", [Expr::parameter("me"), 7.into()])],
            ),
        ];
        for expr in exprs {
            assert_eq!(parse(&expr.to_string()).unwrap(), expr, "{expr}");
        }
    }

    #[test]
    fn test_integer_round_trip() {
        for value in [i64::MIN, -1, 0, i64::MAX] {
            let expr = Expr::model("group").filter("id", value);
            assert_eq!(parse(&expr.to_string()).unwrap(), expr, "{expr}");
        }
    }

    fn identifier() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9_]{0,7}"
    }

    fn any_expr() -> impl Strategy<Value = Expr> {
        let leaf = prop_oneof![
            any::<i64>().prop_map(Expr::Integer),
            any::<String>().prop_map(Expr::Text),
            identifier().prop_map(Expr::Parameter),
            Just(Expr::Wildcard),
            identifier().prop_map(Expr::Model),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                (
                    identifier(),
                    vec((identifier(), option::of(inner.clone())), 1..4)
                )
                    .prop_map(|(model, suffixes)| {
                        suffixes.into_iter().fold(Expr::model(model), |lhs, (name, value)| {
                            match value {
                                Some(value) => lhs.filter(name, value),
                                None => lhs.join(name),
                            }
                        })
                    }),
                (identifier(), vec(inner, 0..4))
                    .prop_map(|(permission, arguments)| Expr::instance(permission, arguments)),
            ]
        })
    }

    proptest! {
        #[test]
        fn test_round_trip_any_expr(expr in any_expr()) {
            let text = expr.to_string();
            prop_assert_eq!(parse(&text).ok(), Some(expr), "{}", text);
        }
    }

    #[test]
    fn test_bind_replaces_parameters() {
        let mut bindings = Bindings::new();
        bindings.insert("me".to_string(), Expr::model("user").filter("id", 5));

        let expr = Expr::instance("create_user", [Expr::parameter("me"), Expr::parameter("other")]);
        assert_eq!(
            expr.bind(&bindings).to_string(),
            "create_user(user#id(5), $other)"
        );
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(Expr::model("group").join("parent")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "join": { "lhs": { "model": "group" }, "relation": "parent" } })
        );
    }
}
