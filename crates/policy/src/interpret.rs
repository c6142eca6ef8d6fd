//! Expression interpreter: compiles object-set expressions to SQL.
//!
//! Every fragment selects a single `id` column holding primary keys of the
//! expression's object type, so fragments nest as `IN (...)` subqueries.

use crate::ast::{Bindings, Expr, Literal};
use crate::model::{Model, ObjectDefinition, RelationKind};
use crate::visitor::{Visitor, walk};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// SQL text with positional `?` parameters in textual order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub sql: String,
    pub params: Vec<Literal>,
}

/// Result of interpreting one expression node.
#[derive(Debug, Clone)]
pub struct Evaluated<'m> {
    pub object: Option<&'m ObjectDefinition>,
    pub fragment: Option<Fragment>,
    /// At most one object is selected.
    pub is_singular: bool,
    pub literal: Option<Literal>,
    pub is_wildcard: bool,
    /// Literal values pinned by unique filters, by filter name.
    pub known_values: BTreeMap<String, Literal>,
}

impl<'m> Evaluated<'m> {
    fn literal(value: Literal) -> Self {
        Self {
            object: None,
            fragment: None,
            is_singular: true,
            literal: Some(value),
            is_wildcard: false,
            known_values: BTreeMap::new(),
        }
    }

    fn wildcard() -> Self {
        Self {
            object: None,
            fragment: None,
            is_singular: false,
            literal: None,
            is_wildcard: true,
            known_values: BTreeMap::new(),
        }
    }

    fn object_set(object: &'m ObjectDefinition, fragment: Fragment, is_singular: bool) -> Self {
        Self {
            object: Some(object),
            fragment: Some(fragment),
            is_singular,
            literal: None,
            is_wildcard: false,
            known_values: BTreeMap::new(),
        }
    }

    pub fn is_literal(&self) -> bool {
        self.literal.is_some()
    }

    /// The object type and fragment, for expressions that select objects.
    pub fn as_object_set(&self) -> Option<(&'m ObjectDefinition, &Fragment)> {
        Some((self.object?, self.fragment.as_ref()?))
    }

    /// The primary key of the single selected object.
    ///
    /// Only keys pinned by a literal primary-key filter are known; this never
    /// falls back to running a query.
    pub fn primary_key(&self) -> Result<&Literal> {
        let object = self
            .object
            .ok_or_else(|| Error::AmbiguousPrimaryKey("a non-object expression".to_string()))?;
        if !self.is_singular {
            return Err(Error::AmbiguousPrimaryKey(object.name().to_string()));
        }
        object
            .primary_key_filter()
            .and_then(|filter| self.known_values.get(filter.name()))
            .ok_or_else(|| Error::AmbiguousPrimaryKey(object.name().to_string()))
    }
}

/// Quote an SQL identifier.
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Folds expressions into [`Evaluated`] results against a [`Model`].
pub struct Interpreter<'m> {
    model: &'m Model,
    bindings: Option<&'m Bindings>,
    /// Parameters whose bindings are being evaluated.
    resolving: Vec<String>,
    next_alias: usize,
}

impl<'m> Interpreter<'m> {
    pub fn new(model: &'m Model) -> Self {
        Self {
            model,
            bindings: None,
            resolving: Vec::new(),
            next_alias: 0,
        }
    }

    /// Resolve `$parameters` against `bindings`.
    pub fn with_bindings(mut self, bindings: &'m Bindings) -> Self {
        self.bindings = Some(bindings);
        self
    }

    pub fn model(&self) -> &'m Model {
        self.model
    }

    pub fn evaluate(&mut self, expr: &Expr) -> Result<Evaluated<'m>> {
        walk(self, expr)
    }

    fn alias(&mut self) -> String {
        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    fn require_object(&self, evaluated: &Evaluated<'m>, context: &str) -> Result<(&'m ObjectDefinition, Fragment)> {
        evaluated
            .as_object_set()
            .map(|(object, fragment)| (object, fragment.clone()))
            .ok_or_else(|| Error::NotAnObjectSet(context.to_string()))
    }
}

impl<'m> Visitor for Interpreter<'m> {
    type Output = Evaluated<'m>;
    type Error = Error;

    fn visit_model(&mut self, name: &str) -> Result<Evaluated<'m>> {
        let object = self.model.object(name)?;
        let a = self.alias();
        let sql = format!(
            "SELECT {a}.{pk} AS id FROM {table} AS {a}",
            pk = quote(object.primary_key()),
            table = quote(object.table()),
        );
        Ok(Evaluated::object_set(object, Fragment { sql, params: Vec::new() }, false))
    }

    fn visit_filter(&mut self, lhs: &Evaluated<'m>, field: &str, value: &Evaluated<'m>) -> Result<Evaluated<'m>> {
        let (object, lhs_fragment) = self.require_object(lhs, &format!("left-hand side of #{field}"))?;
        let filter = object.filter(field)?;
        let a = self.alias();
        let column = format!("{a}.{}", quote(filter.column_name()));

        let mut sql = format!(
            "SELECT {a}.{pk} AS id FROM {table} AS {a} WHERE {a}.{pk} IN ({inner})",
            pk = quote(object.primary_key()),
            table = quote(object.table()),
            inner = lhs_fragment.sql,
        );
        let mut params = lhs_fragment.params;

        if let Some(literal) = &value.literal {
            sql.push_str(&format!(" AND {column} = ?"));
            params.push(literal.clone());
        } else if let Some((_, value_fragment)) = value.as_object_set() {
            sql.push_str(&format!(" AND {column} IN ({})", value_fragment.sql));
            params.extend(value_fragment.params.iter().cloned());
        } else if !value.is_wildcard {
            return Err(Error::NotAnObjectSet(format!("value of #{field}")));
        }

        let mut result = Evaluated::object_set(object, Fragment { sql, params }, lhs.is_singular);
        result.known_values = lhs.known_values.clone();
        if let Some(literal) = value.literal.as_ref().filter(|_| filter.is_unique()) {
            result.is_singular = true;
            result.known_values.insert(field.to_string(), literal.clone());
        }
        Ok(result)
    }

    fn visit_join(&mut self, lhs: &Evaluated<'m>, relation: &str) -> Result<Evaluated<'m>> {
        let (source, lhs_fragment) = self.require_object(lhs, &format!("left-hand side of .{relation}"))?;
        let path = source.relation(relation)?.resolve(self.model, source)?;
        let (b, s) = (self.alias(), self.alias());

        let mut linked = format!(
            "SELECT {s}.{local} FROM {source} AS {s} WHERE {s}.{pk} IN ({inner})",
            local = quote(&path.local_field),
            source = quote(source.table()),
            pk = quote(source.primary_key()),
            inner = lhs_fragment.sql,
        );
        if let Some(junction) = &path.junction {
            let j = self.alias();
            linked = format!(
                "SELECT {j}.{remote} FROM {table} AS {j} WHERE {j}.{local} IN ({linked})",
                remote = quote(&junction.remote_column),
                table = quote(&junction.table),
                local = quote(&junction.local_column),
            );
        }

        let sql = format!(
            "SELECT {b}.{pk} AS id FROM {target} AS {b} WHERE {b}.{remote} IN ({linked})",
            pk = quote(path.target.primary_key()),
            target = quote(path.target.table()),
            remote = quote(&path.remote_field),
        );
        let is_singular = path.kind == RelationKind::ManyToOne && lhs.is_singular;

        Ok(Evaluated::object_set(
            path.target,
            Fragment { sql, params: lhs_fragment.params },
            is_singular,
        ))
    }

    fn visit_instance(&mut self, permission: &str, _arguments: &[Expr]) -> Result<Evaluated<'m>> {
        Err(Error::NotAnObjectSet(format!("{permission}(...)")))
    }

    fn visit_parameter(&mut self, name: &str) -> Result<Evaluated<'m>> {
        let bound = self
            .bindings
            .and_then(|bindings| bindings.get(name))
            .ok_or_else(|| Error::UnboundParameter(name.to_string()))?;
        if self.resolving.iter().any(|n| n == name) {
            return Err(Error::CyclicBinding(name.to_string()));
        }

        self.resolving.push(name.to_string());
        let result = walk(self, bound);
        self.resolving.pop();
        result
    }

    fn visit_wildcard(&mut self) -> Result<Evaluated<'m>> {
        Ok(Evaluated::wildcard())
    }

    fn visit_literal(&mut self, value: Literal) -> Result<Evaluated<'m>> {
        Ok(Evaluated::literal(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entity, Filter, Relation};
    use crate::parse;

    fn model() -> Model {
        let mut builder = Model::builder();
        builder
            .register_object(
                "user",
                Entity::table("user"),
                [
                    Relation::many_to_many("groups", "group", "group_membership"),
                    Relation::many_to_one("supervisor", "user").local_field("supervisor_id"),
                    Relation::one_to_many("subordinates", "user").remote_field("supervisor_id"),
                ],
                [Filter::primary_key("id"), Filter::unique("username")],
            )
            .unwrap();
        builder
            .register_object(
                "group",
                Entity::table("group"),
                [
                    Relation::many_to_one("parent", "group").local_field("parent_id"),
                    Relation::one_to_many("subgroups", "group").remote_field("parent_id"),
                ],
                [Filter::primary_key("id"), Filter::new("name")],
            )
            .unwrap();
        builder.build()
    }

    fn evaluate<'m>(model: &'m Model, text: &str) -> Result<Evaluated<'m>> {
        Interpreter::new(model).evaluate(&parse(text)?)
    }

    #[test]
    fn test_model_selects_all() {
        let model = model();
        let evaluated = evaluate(&model, "group").unwrap();
        assert!(!evaluated.is_singular);
        assert_eq!(
            evaluated.fragment.unwrap().sql,
            r#"SELECT t0."id" AS id FROM "group" AS t0"#
        );
    }

    #[test]
    fn test_primary_key_is_inferred_from_literal() {
        let model = model();
        let evaluated = evaluate(&model, "group#id(1)").unwrap();
        assert!(evaluated.is_singular);
        assert_eq!(evaluated.primary_key().unwrap(), &Literal::Integer(1));
        assert_eq!(evaluated.fragment.unwrap().params, vec![Literal::Integer(1)]);
    }

    #[test]
    fn test_non_unique_filter_is_ambiguous() {
        let model = model();
        let evaluated = evaluate(&model, "group#name(\"eng\")").unwrap();
        assert!(!evaluated.is_singular);
        assert!(matches!(evaluated.primary_key(), Err(Error::AmbiguousPrimaryKey(_))));
    }

    #[test]
    fn test_unique_non_key_filter_is_singular_without_key() {
        let model = model();
        let evaluated = evaluate(&model, "user#username(\"ada\")").unwrap();
        assert!(evaluated.is_singular);
        assert!(matches!(evaluated.primary_key(), Err(Error::AmbiguousPrimaryKey(_))));
    }

    #[test]
    fn test_many_to_one_keeps_singular() {
        let model = model();
        let evaluated = evaluate(&model, "user#id(5).supervisor").unwrap();
        assert!(evaluated.is_singular);
        assert_eq!(evaluated.object.unwrap().name(), "user");
        // the supervisor's key is not known without a query
        assert!(evaluated.primary_key().is_err());
    }

    #[test]
    fn test_one_to_many_is_never_singular() {
        let model = model();
        assert!(!evaluate(&model, "user#id(5).subordinates").unwrap().is_singular);
        assert!(!evaluate(&model, "group#id(1).subgroups").unwrap().is_singular);
        assert!(!evaluate(&model, "user#id(5).groups").unwrap().is_singular);
    }

    #[test]
    fn test_many_to_many_goes_through_junction() {
        let model = model();
        let sql = evaluate(&model, "user#id(5).groups").unwrap().fragment.unwrap().sql;
        assert!(sql.contains(r#"FROM "group_membership" AS t4"#), "{sql}");
        assert!(sql.contains(r#"t4."user_id" IN"#), "{sql}");
        assert!(sql.starts_with(r#"SELECT t2."id" AS id FROM "group" AS t2 WHERE t2."id" IN (SELECT t4."group_id""#), "{sql}");
    }

    #[test]
    fn test_filter_by_object_set() {
        let model = model();
        let evaluated = evaluate(&model, "user#id(user#username(\"ada\").subordinates)").unwrap();
        let fragment = evaluated.fragment.unwrap();
        assert_eq!(fragment.params, vec![Literal::Text("ada".to_string())]);
        assert!(!evaluated.is_singular);
    }

    #[test]
    fn test_unknown_names() {
        let model = model();
        assert!(matches!(
            evaluate(&model, "group.members"),
            Err(Error::UnknownRelation { relation, .. }) if relation == "members"
        ));
        assert!(matches!(
            evaluate(&model, "group#title(\"x\")"),
            Err(Error::UnknownFilter { filter, .. }) if filter == "title"
        ));
        assert!(matches!(evaluate(&model, "team"), Err(Error::UnknownObject(_))));
    }

    #[test]
    fn test_parameters_resolve_through_bindings() {
        let model = model();
        let mut bindings = Bindings::new();
        bindings.insert("me".to_string(), parse("user#id(9)").unwrap());

        let evaluated = Interpreter::new(&model)
            .with_bindings(&bindings)
            .evaluate(&parse("user#id($me).groups").unwrap())
            .unwrap();
        assert_eq!(evaluated.object.unwrap().name(), "group");

        let evaluated = Interpreter::new(&model)
            .with_bindings(&bindings)
            .evaluate(&Expr::parameter("me").join("groups"))
            .unwrap();
        assert_eq!(evaluated.object.unwrap().name(), "group");

        assert!(matches!(
            evaluate(&model, "$me"),
            Err(Error::UnboundParameter(name)) if name == "me"
        ));
    }

    #[test]
    fn test_cyclic_bindings_are_rejected() {
        let model = model();
        let mut bindings = Bindings::new();
        bindings.insert("a".to_string(), Expr::parameter("a"));
        bindings.insert("b".to_string(), parse("user#id($c)").unwrap());
        bindings.insert("c".to_string(), parse("user#id($b).groups").unwrap());
        bindings.insert("d".to_string(), parse("user#id($e)").unwrap());
        bindings.insert("e".to_string(), Expr::Integer(3));

        let mut interpreter = Interpreter::new(&model).with_bindings(&bindings);
        assert!(matches!(
            interpreter.evaluate(&Expr::parameter("a")),
            Err(Error::CyclicBinding(name)) if name == "a"
        ));
        assert!(matches!(
            interpreter.evaluate(&Expr::parameter("b")),
            Err(Error::CyclicBinding(name)) if name == "b"
        ));

        // The same parameter used twice side by side is not a cycle.
        let evaluated = interpreter
            .evaluate(&parse("user#id($d)#id($d)").unwrap())
            .unwrap();
        assert_eq!(evaluated.object.unwrap().name(), "user");
    }

    #[test]
    fn test_literals_and_wildcards() {
        let model = model();
        let literal = evaluate(&model, "42").unwrap();
        assert!(literal.is_literal() && literal.is_singular);
        let wildcard = evaluate(&model, "*").unwrap();
        assert!(wildcard.is_wildcard && wildcard.fragment.is_none());
        assert!(matches!(evaluate(&model, "p(1)"), Err(Error::NotAnObjectSet(_))));
    }
}
