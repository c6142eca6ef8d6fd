//! Model-checked expression builder.
//!
//! Produces the same [`Expr`] trees as the textual grammar, but checks each
//! relation and filter against the model as it is added.

use crate::ast::Expr;
use crate::model::{Model, ObjectDefinition, ObjectHandle, PermissionSignature};
use crate::Result;

/// An object-set expression under construction.
#[derive(Debug, Clone)]
pub struct Fluent<'m> {
    model: &'m Model,
    object: &'m ObjectDefinition,
    expr: Expr,
}

impl<'m> Fluent<'m> {
    /// Follow a relation, e.g. `.join("subgroups")`.
    pub fn join(self, relation: &str) -> Result<Self> {
        let target = self.object.relation(relation)?.target();
        let object = self.model.object(target)?;
        Ok(Self {
            model: self.model,
            object,
            expr: self.expr.join(relation),
        })
    }

    /// Narrow by a filter, e.g. `.filter("id", 1)`.
    pub fn filter(self, name: &str, value: impl Into<Expr>) -> Result<Self> {
        self.object.filter(name)?;
        Ok(Self {
            expr: self.expr.filter(name, value),
            ..self
        })
    }

    /// The object type the expression currently selects.
    pub fn object(&self) -> &'m ObjectDefinition {
        self.object
    }

    pub fn into_expr(self) -> Expr {
        self.expr
    }
}

impl From<Fluent<'_>> for Expr {
    fn from(fluent: Fluent<'_>) -> Self {
        fluent.expr
    }
}

/// Builds instances of one permission with its arity checked.
#[derive(Debug, Clone, Copy)]
pub struct PermissionConstructor<'m> {
    signature: &'m PermissionSignature,
}

impl PermissionConstructor<'_> {
    pub fn apply<A, I>(&self, arguments: I) -> Result<Expr>
    where
        I: IntoIterator<Item = A>,
        A: Into<Expr>,
    {
        let arguments: Vec<Expr> = arguments.into_iter().map(Into::into).collect();
        self.signature.check_arity(arguments.len())?;
        Ok(Expr::instance(self.signature.name(), arguments))
    }
}

impl Model {
    /// Start a fluent expression selecting every object of a type.
    pub fn select(&self, object: &ObjectHandle) -> Result<Fluent<'_>> {
        let definition = self.object(object.name())?;
        Ok(Fluent {
            model: self,
            object: definition,
            expr: object.all(),
        })
    }

    pub fn constructor(&self, permission: &str) -> Result<PermissionConstructor<'_>> {
        Ok(PermissionConstructor {
            signature: self.permission(permission)?,
        })
    }
}

/// The wildcard argument, matching any object.
pub fn any() -> Expr {
    Expr::Wildcard
}
