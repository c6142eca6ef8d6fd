//! SQLite grant store implementation.

use crate::query::Sql;
use crate::{ArgumentNode, Error, Grant, GrantId, GrantRecord, NodeId, ObjectRef, Result};
use chrono::{DateTime, Utc};
use policy::{Expr, Fragment, Interpreter, Model, parse};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::path::Path;

/// SQLite-backed store of grant trees and their match index.
///
/// The host's entity tables live in the same database so that interpreted
/// fragments can be executed against them.
pub struct GrantStore {
    conn: Connection,
}

impl GrantStore {
    /// Open or create a grant store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Create an in-memory grant store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Use an existing connection, creating the grant tables if needed.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// The underlying connection, shared with the host's entity tables.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS grant_expressions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                permission TEXT,
                parent_id INTEGER REFERENCES grant_expressions(id) ON DELETE CASCADE,
                parent_argument INTEGER,
                expr TEXT NOT NULL,
                is_wildcard INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_grant_expressions_parent
                ON grant_expressions(parent_id, parent_argument);
            CREATE INDEX IF NOT EXISTS idx_grant_expressions_permission
                ON grant_expressions(permission, parent_id);
            CREATE TABLE IF NOT EXISTS expression_matches (
                expression_id INTEGER NOT NULL
                    REFERENCES grant_expressions(id) ON DELETE CASCADE,
                object_type TEXT NOT NULL,
                object_id INTEGER NOT NULL,
                PRIMARY KEY (expression_id, object_type, object_id)
            );
            CREATE INDEX IF NOT EXISTS idx_expression_matches_object
                ON expression_matches(object_type, object_id);
            "#,
        )?;
        Ok(())
    }

    /// Store a grant and index the objects each argument selects.
    ///
    /// `expr` must be a permission instance. Arguments that are themselves
    /// instances are stored as linked sub-grants. All rows are written in one
    /// transaction; any failure leaves the store unchanged.
    pub fn grant(&self, model: &Model, expr: &Expr) -> Result<Grant> {
        let Expr::Instance {
            permission,
            arguments,
        } = expr
        else {
            return Err(policy::Error::InvalidGrantShape(expr.to_string()).into());
        };

        let tx = self.conn.unchecked_transaction()?;
        let (root, arguments) = {
            let mut inserter = Inserter {
                conn: &tx,
                model,
                created_at: Utc::now().to_rfc3339(),
                arguments: Vec::new(),
            };
            let root = inserter.instance(expr, permission, arguments, None)?;
            (root, inserter.arguments)
        };
        tx.commit()?;

        tracing::info!(grant = root, permission = %permission, "stored grant {expr}");
        Ok(Grant {
            id: GrantId(root),
            arguments,
        })
    }

    /// Delete a grant with its whole tree and match rows.
    ///
    /// Returns every node that was removed.
    pub fn revoke(&self, grant: GrantId) -> Result<Vec<NodeId>> {
        const SUBTREE: &str = "WITH RECURSIVE subtree(id) AS (
                SELECT id FROM grant_expressions WHERE id = ?1 AND parent_id IS NULL
                UNION ALL
                SELECT g.id FROM grant_expressions g JOIN subtree s ON g.parent_id = s.id
            )";

        let tx = self.conn.unchecked_transaction()?;
        let nodes = {
            let mut stmt = tx.prepare(&format!("{SUBTREE} SELECT id FROM subtree"))?;
            stmt.query_map([grant.0], |row| row.get(0).map(NodeId))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        if nodes.is_empty() {
            return Err(Error::NotFound(format!("grant {grant}")));
        }

        tx.execute(
            &format!(
                "{SUBTREE} DELETE FROM expression_matches WHERE expression_id IN (SELECT id FROM subtree)"
            ),
            [grant.0],
        )?;
        tx.execute(
            &format!("{SUBTREE} DELETE FROM grant_expressions WHERE id IN (SELECT id FROM subtree)"),
            [grant.0],
        )?;
        tx.commit()?;

        tracing::info!(grant = grant.0, nodes = nodes.len(), "revoked grant");
        Ok(nodes)
    }

    /// Re-evaluate an argument node and replace its match rows.
    ///
    /// Wildcard and sub-grant nodes have no match rows; they yield 0.
    pub fn regenerate(&self, model: &Model, node: NodeId) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let row: Option<(String, bool, Option<String>)> = tx
            .query_row(
                "SELECT expr, is_wildcard, permission FROM grant_expressions
                 WHERE id = ?1 AND parent_id IS NOT NULL",
                [node.0],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((text, is_wildcard, permission)) = row else {
            return Err(Error::NotFound(format!("argument node {node}")));
        };
        if is_wildcard || permission.is_some() {
            return Ok(0);
        }

        let expr = parse(&text)?;
        let evaluated = Interpreter::new(model).evaluate(&expr)?;
        let (object, fragment) = evaluated
            .as_object_set()
            .ok_or_else(|| policy::Error::NotAnObjectSet(text.clone()))?;

        tx.execute("DELETE FROM expression_matches WHERE expression_id = ?1", [node.0])?;
        let count = write_matches(&tx, node.0, object.name(), fragment)?;
        tx.commit()?;

        tracing::debug!(node = node.0, matches = count, "regenerated matches for {text}");
        Ok(count)
    }

    /// All object-set argument nodes, across every grant.
    pub fn argument_nodes(&self) -> Result<Vec<ArgumentNode>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, expr FROM grant_expressions
             WHERE parent_id IS NOT NULL AND permission IS NULL AND is_wildcard = 0
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, text)| {
                Ok(ArgumentNode {
                    id: NodeId(id),
                    expr: parse(&text)?,
                })
            })
            .collect()
    }

    /// Stored root grants, optionally of one permission, oldest first.
    pub fn grants(&self, permission: Option<&str>) -> Result<Vec<GrantRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, permission, expr, created_at FROM grant_expressions
             WHERE parent_id IS NULL AND (?1 IS NULL OR permission = ?1)
             ORDER BY id",
        )?;
        let grants = stmt
            .query_map(params![permission], |row| {
                let created_at: String = row.get(3)?;
                Ok(GrantRecord {
                    id: GrantId(row.get(0)?),
                    permission: row.get(1)?,
                    expr: row.get(2)?,
                    created_at: created_at.parse::<DateTime<Utc>>().map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
                    })?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(grants)
    }

    /// Objects recorded for an argument node.
    pub fn node_matches(&self, node: NodeId) -> Result<Vec<ObjectRef>> {
        let mut stmt = self.conn.prepare(
            "SELECT object_type, object_id FROM expression_matches
             WHERE expression_id = ?1 ORDER BY object_type, object_id",
        )?;
        let matches = stmt
            .query_map([node.0], |row| Ok(ObjectRef::new(row.get::<_, String>(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(matches)
    }

    /// Run a plain object-set expression, without involving any grant.
    pub fn select(&self, model: &Model, expr: &Expr) -> Result<Vec<ObjectRef>> {
        let evaluated = Interpreter::new(model).evaluate(expr)?;
        let (object, fragment) = evaluated
            .as_object_set()
            .ok_or_else(|| policy::Error::NotAnObjectSet(expr.to_string()))?;

        let mut sql = Sql::new();
        sql.push("SELECT id FROM (");
        sql.push_fragment(fragment);
        sql.push(") ORDER BY id");

        let mut stmt = self.conn.prepare(&sql.text)?;
        let ids = stmt
            .query_map(params_from_iter(sql.params.iter()), |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids
            .into_iter()
            .map(|id| ObjectRef::new(object.name(), id))
            .collect())
    }

    /// Whether an object-set expression selects `object`.
    pub fn expression_matches(&self, model: &Model, expr: &Expr, object: &ObjectRef) -> Result<bool> {
        let evaluated = Interpreter::new(model).evaluate(expr)?;
        let (definition, fragment) = evaluated
            .as_object_set()
            .ok_or_else(|| policy::Error::NotAnObjectSet(expr.to_string()))?;
        if definition.name() != object.object_type {
            return Ok(false);
        }

        let mut sql = Sql::new();
        sql.push("SELECT EXISTS (SELECT 1 FROM (");
        sql.push_fragment(fragment);
        sql.push(") AS r WHERE r.id = ?)");
        sql.bind(Value::Integer(object.id));

        let found = self
            .conn
            .query_row(&sql.text, params_from_iter(sql.params.iter()), |row| row.get(0))?;
        Ok(found)
    }
}

/// Writes one grant tree inside a transaction.
struct Inserter<'a> {
    conn: &'a Connection,
    model: &'a Model,
    created_at: String,
    arguments: Vec<ArgumentNode>,
}

impl Inserter<'_> {
    fn node(&self, permission: Option<&str>, parent: Option<(i64, usize)>, expr: &str, is_wildcard: bool) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO grant_expressions
                (permission, parent_id, parent_argument, expr, is_wildcard, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                permission,
                parent.map(|(id, _)| id),
                parent.map(|(_, index)| index as i64),
                expr,
                is_wildcard,
                self.created_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn instance(
        &mut self,
        expr: &Expr,
        permission: &str,
        arguments: &[Expr],
        parent: Option<(i64, usize)>,
    ) -> Result<i64> {
        self.model.signature_for(permission, arguments.len())?;
        let id = self.node(Some(permission), parent, &expr.to_string(), false)?;

        for (index, argument) in arguments.iter().enumerate() {
            match argument {
                Expr::Instance {
                    permission,
                    arguments,
                } => {
                    self.instance(argument, permission, arguments, Some((id, index)))?;
                }
                _ => self.argument(argument, (id, index))?,
            }
        }
        Ok(id)
    }

    fn argument(&mut self, expr: &Expr, parent: (i64, usize)) -> Result<()> {
        let text = expr.to_string();
        let evaluated = Interpreter::new(self.model).evaluate(expr)?;
        if evaluated.is_wildcard {
            self.node(None, Some(parent), &text, true)?;
            return Ok(());
        }

        let (object, fragment) = evaluated
            .as_object_set()
            .ok_or_else(|| policy::Error::NotAnObjectSet(text.clone()))?;
        let id = self.node(None, Some(parent), &text, false)?;
        let count = write_matches(self.conn, id, object.name(), fragment)?;

        tracing::debug!(node = id, matches = count, "indexed grant argument {text}");
        self.arguments.push(ArgumentNode {
            id: NodeId(id),
            expr: expr.clone(),
        });
        Ok(())
    }
}

fn write_matches(conn: &Connection, node: i64, object_type: &str, fragment: &Fragment) -> Result<usize> {
    let mut sql = Sql::new();
    sql.push("INSERT OR IGNORE INTO expression_matches (expression_id, object_type, object_id) SELECT ?, ?, id FROM (");
    sql.bind(Value::Integer(node));
    sql.bind(Value::Text(object_type.to_string()));
    sql.push_fragment(fragment);
    sql.push(")");

    Ok(conn.execute(&sql.text, params_from_iter(sql.params.iter()))?)
}
