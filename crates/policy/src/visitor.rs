//! Typed multi-pass traversal of expression trees.
//!
//! A [`Visitor`] folds an expression bottom-up with one method per node
//! kind. An [`Observer`] is a second pass that runs alongside a visitor and
//! receives the visitor's result for every node it handles through
//! [`Inputs`], so one pass can build on another without re-walking the tree.

use crate::ast::{Expr, Literal};

/// A bottom-up pass over an expression.
///
/// Child results are passed by reference so that a driver can hand them to
/// an [`Observer`] afterwards. Permission instances are not folded: their
/// arguments are handed over unvisited and the pass decides how to recurse.
pub trait Visitor {
    type Output;
    type Error;

    fn visit_model(&mut self, name: &str) -> Result<Self::Output, Self::Error>;

    fn visit_join(&mut self, lhs: &Self::Output, relation: &str)
    -> Result<Self::Output, Self::Error>;

    fn visit_filter(
        &mut self,
        lhs: &Self::Output,
        field: &str,
        value: &Self::Output,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_instance(
        &mut self,
        permission: &str,
        arguments: &[Expr],
    ) -> Result<Self::Output, Self::Error>;

    fn visit_parameter(&mut self, name: &str) -> Result<Self::Output, Self::Error>;

    fn visit_wildcard(&mut self) -> Result<Self::Output, Self::Error>;

    fn visit_literal(&mut self, value: Literal) -> Result<Self::Output, Self::Error>;
}

/// The visitor's results available to an observer at one node.
pub struct Inputs<'a, U> {
    /// Result for the node itself.
    pub node: &'a U,
    /// Result for the left-hand side of a join or filter.
    pub lhs: &'a U,
    /// Result for the value of a filter.
    pub value: Option<&'a U>,
}

/// A pass that consumes the per-node results of a visitor producing `U`.
pub trait Observer<U> {
    type Output;
    type Error;

    fn observe_model(&mut self, name: &str, node: &U) -> Result<Self::Output, Self::Error>;

    fn observe_join(
        &mut self,
        lhs: Self::Output,
        relation: &str,
        inputs: Inputs<'_, U>,
    ) -> Result<Self::Output, Self::Error>;

    fn observe_filter(
        &mut self,
        lhs: Self::Output,
        field: &str,
        value: Self::Output,
        inputs: Inputs<'_, U>,
    ) -> Result<Self::Output, Self::Error>;

    fn observe_instance(
        &mut self,
        permission: &str,
        arguments: &[Expr],
        node: &U,
    ) -> Result<Self::Output, Self::Error>;

    /// Parameters, wildcards and literals.
    fn observe_leaf(&mut self, expr: &Expr, node: &U) -> Result<Self::Output, Self::Error>;
}

/// Run a single visitor over `expr`.
pub fn walk<V>(visitor: &mut V, expr: &Expr) -> Result<V::Output, V::Error>
where
    V: Visitor + ?Sized,
{
    match expr {
        Expr::Model(name) => visitor.visit_model(name),
        Expr::Join { lhs, relation } => {
            let lhs = walk(visitor, lhs)?;
            visitor.visit_join(&lhs, relation)
        }
        Expr::Filter { lhs, field, value } => {
            let lhs = walk(visitor, lhs)?;
            let value = walk(visitor, value)?;
            visitor.visit_filter(&lhs, field, &value)
        }
        Expr::Instance {
            permission,
            arguments,
        } => visitor.visit_instance(permission, arguments),
        Expr::Parameter(name) => visitor.visit_parameter(name),
        Expr::Wildcard => visitor.visit_wildcard(),
        Expr::Integer(value) => visitor.visit_literal(Literal::Integer(*value)),
        Expr::Text(value) => visitor.visit_literal(Literal::Text(value.clone())),
    }
}

/// Run a visitor and an observer over `expr` in one traversal.
///
/// At each node the visitor runs first; its result is then threaded into
/// the observer together with the results of the node's children.
pub fn walk_with<V, O>(
    visitor: &mut V,
    observer: &mut O,
    expr: &Expr,
) -> Result<(V::Output, O::Output), O::Error>
where
    V: Visitor,
    O: Observer<V::Output>,
    O::Error: From<V::Error>,
{
    match expr {
        Expr::Model(name) => {
            let node = visitor.visit_model(name)?;
            let observed = observer.observe_model(name, &node)?;
            Ok((node, observed))
        }
        Expr::Join { lhs, relation } => {
            let (lhs_node, lhs_observed) = walk_with(visitor, observer, lhs)?;
            let node = visitor.visit_join(&lhs_node, relation)?;
            let inputs = Inputs {
                node: &node,
                lhs: &lhs_node,
                value: None,
            };
            let observed = observer.observe_join(lhs_observed, relation, inputs)?;
            Ok((node, observed))
        }
        Expr::Filter { lhs, field, value } => {
            let (lhs_node, lhs_observed) = walk_with(visitor, observer, lhs)?;
            let (value_node, value_observed) = walk_with(visitor, observer, value)?;
            let node = visitor.visit_filter(&lhs_node, field, &value_node)?;
            let inputs = Inputs {
                node: &node,
                lhs: &lhs_node,
                value: Some(&value_node),
            };
            let observed = observer.observe_filter(lhs_observed, field, value_observed, inputs)?;
            Ok((node, observed))
        }
        Expr::Instance {
            permission,
            arguments,
        } => {
            let node = visitor.visit_instance(permission, arguments)?;
            let observed = observer.observe_instance(permission, arguments, &node)?;
            Ok((node, observed))
        }
        leaf => {
            let node = walk(visitor, leaf)?;
            let observed = observer.observe_leaf(leaf, &node)?;
            Ok((node, observed))
        }
    }
}
