//! Grant tree and match index records.

use chrono::{DateTime, Utc};
use policy::{Expr, Model};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A concrete object: its registered type name and integer id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub object_type: String,
    pub id: i64,
}

impl ObjectRef {
    pub fn new(object_type: impl Into<String>, id: i64) -> Self {
        Self {
            object_type: object_type.into(),
            id,
        }
    }

    /// An expression selecting exactly this object, for use as a check
    /// argument.
    pub fn to_expr(&self, model: &Model) -> policy::Result<Expr> {
        model.object_expr(&self.object_type, self.id)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.id)
    }
}

/// Identifier of a stored grant, i.e. the root node of its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GrantId(pub i64);

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of any node in a grant tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub i64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored root grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantRecord {
    pub id: GrantId,
    pub permission: String,
    /// Canonical text of the whole grant.
    pub expr: String,
    pub created_at: DateTime<Utc>,
}

/// An object-set argument node; its match rows are derived from `expr`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentNode {
    pub id: NodeId,
    pub expr: Expr,
}

/// Result of inserting a grant.
#[derive(Debug, Clone)]
pub struct Grant {
    pub id: GrantId,
    /// Object-set argument nodes created for the grant, at any depth.
    pub arguments: Vec<ArgumentNode>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture;

    #[test]
    fn test_object_ref_to_expr_selects_itself() {
        let (store, model) = fixture();
        let group = ObjectRef::new("group", 3);

        let expr = group.to_expr(&model).unwrap();
        assert_eq!(expr.to_string(), "group#id(3)");
        assert_eq!(store.select(&model, &expr).unwrap(), vec![group]);

        assert!(matches!(
            ObjectRef::new("team", 1).to_expr(&model),
            Err(policy::Error::UnknownObject(_))
        ));
    }
}
