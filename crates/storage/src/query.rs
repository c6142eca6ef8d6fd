//! Check queries over the grant tree and match index.
//!
//! A check instance is compiled into one SQL statement. Each argument
//! position becomes a join from its parent node to the child node stored at
//! the same position. Bound positions add a condition against the child's
//! match rows, so only grants satisfying every bound position survive. The
//! surviving grants are collected in a `satisfied` CTE, and the result is the
//! union of the objects at each leaf position.

use crate::{GrantStore, ObjectRef, Result};
use policy::{Expr, Fragment, Interpreter, Literal, Model, ObjectDefinition};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How the bound positions of a nested permission instance combine.
///
/// Positions of the root instance are always combined with AND.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositionPolicy {
    /// Every bound position of a sub-grant must be satisfied.
    #[default]
    All,
    /// At least one bound position of a sub-grant must be satisfied.
    Any,
}

/// SQL text with its positional parameters in textual order.
#[derive(Debug, Default)]
pub(crate) struct Sql {
    pub text: String,
    pub params: Vec<Value>,
}

impl Sql {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: impl AsRef<str>) {
        self.text.push_str(text.as_ref());
    }

    pub fn bind(&mut self, value: Value) {
        self.params.push(value);
    }

    pub fn push_fragment(&mut self, fragment: &Fragment) {
        self.text.push_str(&fragment.sql);
        self.params.extend(fragment.params.iter().map(to_value));
    }

    pub fn append(&mut self, other: Sql) {
        self.text.push_str(&other.text);
        self.params.extend(other.params);
    }
}

fn to_value(literal: &Literal) -> Value {
    match literal {
        Literal::Integer(value) => Value::Integer(*value),
        Literal::Text(value) => Value::Text(value.clone()),
    }
}

/// A non-instance argument position of the check.
struct Leaf<'m> {
    /// Alias of the joined child node.
    alias: String,
    /// The query's object set, or `None` for a query wildcard.
    bound: Option<(&'m ObjectDefinition, Fragment)>,
}

struct CheckCompiler<'m> {
    interpreter: Interpreter<'m>,
    model: &'m Model,
    composition: CompositionPolicy,
    joins: Sql,
    leaves: Vec<Leaf<'m>>,
    next_alias: usize,
}

impl<'m> CheckCompiler<'m> {
    fn new(model: &'m Model, composition: CompositionPolicy) -> Self {
        Self {
            interpreter: Interpreter::new(model),
            model,
            composition,
            joins: Sql::new(),
            leaves: Vec::new(),
            next_alias: 0,
        }
    }

    /// Join the positions of an instance below `parent` and return the
    /// condition its bound positions impose, if any.
    fn instance(&mut self, parent: &str, permission: &str, arguments: &[Expr]) -> Result<Option<Sql>> {
        self.model.signature_for(permission, arguments.len())?;

        let mut conditions = Vec::new();
        for (index, argument) in arguments.iter().enumerate() {
            let alias = format!("c{}", self.next_alias);
            self.next_alias += 1;
            self.joins.push(format!(
                " JOIN grant_expressions {alias} ON {alias}.parent_id = {parent}.id AND {alias}.parent_argument = {index}"
            ));

            match argument {
                Expr::Wildcard => self.leaves.push(Leaf { alias, bound: None }),
                Expr::Instance {
                    permission,
                    arguments,
                } => {
                    self.joins.push(format!(" AND {alias}.permission = ?"));
                    self.joins.bind(Value::Text(permission.clone()));
                    if let Some(condition) = self.instance(&alias, permission, arguments)? {
                        conditions.push(condition);
                    }
                }
                _ => {
                    let evaluated = self.interpreter.evaluate(argument)?;
                    if evaluated.is_wildcard {
                        self.leaves.push(Leaf { alias, bound: None });
                        continue;
                    }
                    let (object, fragment) = evaluated
                        .as_object_set()
                        .ok_or_else(|| policy::Error::NotAnObjectSet(argument.to_string()))?;

                    let mut condition = Sql::new();
                    condition.push(format!(
                        "({alias}.is_wildcard = 1 OR EXISTS (SELECT 1 FROM expression_matches m \
                         WHERE m.expression_id = {alias}.id AND m.object_type = ? AND m.object_id IN ("
                    ));
                    condition.bind(Value::Text(object.name().to_string()));
                    condition.push_fragment(fragment);
                    condition.push(")))");
                    conditions.push(condition);

                    self.leaves.push(Leaf {
                        alias,
                        bound: Some((object, fragment.clone())),
                    });
                }
            }
        }

        if conditions.is_empty() {
            return Ok(None);
        }
        let separator = match self.composition {
            CompositionPolicy::Any if parent != ROOT => " OR ",
            _ => " AND ",
        };
        let mut combined = Sql::new();
        combined.push("(");
        for (i, condition) in conditions.into_iter().enumerate() {
            if i > 0 {
                combined.push(separator);
            }
            combined.append(condition);
        }
        combined.push(")");
        Ok(Some(combined))
    }
}

const ROOT: &str = "g";

/// A compiled check: the `satisfied` CTE and the union of leaf objects.
struct CheckQuery {
    cte: Sql,
    union: Sql,
}

fn compile(model: &Model, expr: &Expr, composition: CompositionPolicy) -> Result<Option<CheckQuery>> {
    let Expr::Instance {
        permission,
        arguments,
    } = expr
    else {
        return Err(policy::Error::InvalidGrantShape(expr.to_string()).into());
    };

    let mut compiler = CheckCompiler::new(model, composition);
    let condition = compiler.instance(ROOT, permission, arguments)?;
    if compiler.leaves.is_empty() {
        return Ok(None);
    }

    let columns: Vec<String> = compiler
        .leaves
        .iter()
        .enumerate()
        .map(|(k, leaf)| format!("{a}.id AS n{k}, {a}.is_wildcard AS w{k}", a = leaf.alias))
        .collect();

    let mut cte = Sql::new();
    cte.push(format!(
        "WITH satisfied AS (SELECT {ROOT}.id AS root, {} FROM grant_expressions {ROOT}",
        columns.join(", ")
    ));
    cte.append(compiler.joins);
    cte.push(format!(
        " WHERE {ROOT}.parent_id IS NULL AND {ROOT}.permission = ?"
    ));
    cte.bind(Value::Text(permission.clone()));
    if let Some(condition) = condition {
        cte.push(" AND ");
        cte.append(condition);
    }
    cte.push(") ");

    let mut union = Sql::new();
    for (k, leaf) in compiler.leaves.iter().enumerate() {
        if k > 0 {
            union.push(" UNION ");
        }
        match &leaf.bound {
            Some((object, fragment)) => {
                union.push(format!(
                    "SELECT m.object_type AS object_type, m.object_id AS object_id \
                     FROM satisfied s JOIN expression_matches m ON m.expression_id = s.n{k} \
                     WHERE m.object_type = ? AND m.object_id IN ("
                ));
                union.bind(Value::Text(object.name().to_string()));
                union.push_fragment(fragment);
                union.push(")");

                union.push(" UNION SELECT ? AS object_type, f.id AS object_id FROM satisfied s JOIN (");
                union.bind(Value::Text(object.name().to_string()));
                union.push_fragment(fragment);
                union.push(format!(") AS f WHERE s.w{k} = 1"));
            }
            None => union.push(format!(
                "SELECT m.object_type AS object_type, m.object_id AS object_id \
                 FROM satisfied s JOIN expression_matches m ON m.expression_id = s.n{k}"
            )),
        }
    }

    Ok(Some(CheckQuery { cte, union }))
}

impl GrantStore {
    /// All objects granted by instance `expr` of a permission.
    ///
    /// Bound arguments constrain which grants apply; wildcard arguments
    /// leave their position open. The result is the union, across every
    /// applicable grant, of the objects at each argument position.
    pub fn check(
        &self,
        model: &Model,
        expr: &Expr,
        composition: CompositionPolicy,
    ) -> Result<BTreeSet<ObjectRef>> {
        let Some(query) = compile(model, expr, composition)? else {
            return Ok(BTreeSet::new());
        };

        let mut sql = query.cte;
        sql.push("SELECT object_type, object_id FROM (");
        sql.append(query.union);
        sql.push(")");
        tracing::debug!(sql = %sql.text, "check {expr}");

        let mut stmt = self.connection().prepare(&sql.text)?;
        let objects = stmt
            .query_map(params_from_iter(sql.params.iter()), |row| {
                Ok(ObjectRef::new(row.get::<_, String>(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;

        tracing::debug!(matches = objects.len(), "check {expr}");
        Ok(objects)
    }

    /// Whether `object` is in the result of [`check`](Self::check).
    pub fn matches(
        &self,
        model: &Model,
        expr: &Expr,
        object: &ObjectRef,
        composition: CompositionPolicy,
    ) -> Result<bool> {
        let Some(query) = compile(model, expr, composition)? else {
            return Ok(false);
        };

        let mut sql = query.cte;
        sql.push("SELECT EXISTS (SELECT 1 FROM (");
        sql.append(query.union);
        sql.push(") WHERE object_type = ? AND object_id = ?)");
        sql.bind(Value::Text(object.object_type.clone()));
        sql.bind(Value::Integer(object.id));
        tracing::debug!(sql = %sql.text, object = %object, "matches {expr}");

        let found = self
            .connection()
            .query_row(&sql.text, params_from_iter(sql.params.iter()), |row| row.get(0))?;
        Ok(found)
    }
}
