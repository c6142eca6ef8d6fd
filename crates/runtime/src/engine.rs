//! The engine facade.

use crate::config::EngineConfig;
use crate::tracker::DependencyTracker;
use crate::{Error, Result};
use policy::{Bindings, Expr, Model, dependencies};
use std::collections::BTreeSet;
use storage::{CompositionPolicy, Grant, GrantId, GrantRecord, GrantStore, NodeId, ObjectRef};

/// Grants and checks permissions over a registered [`Model`].
pub struct Engine {
    model: Model,
    store: GrantStore,
    tracker: DependencyTracker,
    composition: CompositionPolicy,
}

impl Engine {
    /// Create an engine, indexing the dependencies of grants already stored.
    pub fn new(model: Model, store: GrantStore) -> Result<Self> {
        let tracker = DependencyTracker::rebuild(&model, &store)?;
        Ok(Self {
            model,
            store,
            tracker,
            composition: CompositionPolicy::default(),
        })
    }

    /// Open the configured database and apply the configured policy.
    pub fn from_config(model: Model, config: &EngineConfig) -> Result<Self> {
        let store = match &config.database {
            Some(path) => GrantStore::open(path)?,
            None => GrantStore::in_memory()?,
        };
        Ok(Self::new(model, store)?.with_composition(config.composition))
    }

    pub fn with_composition(mut self, composition: CompositionPolicy) -> Self {
        self.composition = composition;
        self
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn store(&self) -> &GrantStore {
        &self.store
    }

    pub fn tracker(&self) -> &DependencyTracker {
        &self.tracker
    }

    /// Store a grant and track the fields its arguments read.
    pub fn grant(&mut self, expr: &Expr) -> Result<Grant> {
        let grant = self.store.grant(&self.model, expr)?;
        for argument in &grant.arguments {
            let deps = dependencies(&self.model, &argument.expr)?;
            self.tracker.record(argument.id, &deps);
        }
        Ok(grant)
    }

    /// Store a grant after substituting `$parameters`.
    pub fn grant_with(&mut self, expr: &Expr, bindings: &Bindings) -> Result<Grant> {
        self.grant(&expr.bind(bindings))
    }

    /// Parse and store a grant.
    pub fn grant_str(&mut self, text: &str) -> Result<Grant> {
        self.grant(&policy::parse(text)?)
    }

    pub fn revoke(&mut self, grant: GrantId) -> Result<()> {
        for node in self.store.revoke(grant)? {
            self.tracker.forget(node);
        }
        Ok(())
    }

    pub fn grants(&self, permission: Option<&str>) -> Result<Vec<GrantRecord>> {
        Ok(self.store.grants(permission)?)
    }

    /// Objects granted by a permission instance; see [`GrantStore::check`].
    pub fn check(&self, expr: &Expr) -> Result<BTreeSet<ObjectRef>> {
        Ok(self.store.check(&self.model, expr, self.composition)?)
    }

    pub fn check_with(&self, expr: &Expr, bindings: &Bindings) -> Result<BTreeSet<ObjectRef>> {
        self.check(&expr.bind(bindings))
    }

    pub fn matches(&self, expr: &Expr, object: &ObjectRef) -> Result<bool> {
        Ok(self
            .store
            .matches(&self.model, expr, object, self.composition)?)
    }

    /// Fail with the permission's message unless `object` is granted.
    pub fn require(&self, expr: &Expr, object: &ObjectRef) -> Result<()> {
        if self.matches(expr, object)? {
            return Ok(());
        }
        let message = match expr {
            Expr::Instance {
                permission,
                arguments,
            } => self.model.permission(permission)?.describe(arguments),
            _ => expr.to_string(),
        };
        Err(Error::Denied(message))
    }

    /// Regenerate every argument whose matches read `table.column`.
    ///
    /// `table` is the SQL table name, junction tables included, not the
    /// registered object name. Call after the host updates that column.
    /// Returns the regenerated nodes.
    pub fn field_changed(&mut self, table: &str, column: &str) -> Result<Vec<NodeId>> {
        let nodes = self.tracker.dependents_of_field(table, column);
        self.regenerate(nodes, &format!("{table}.{column}"))
    }

    /// Regenerate every argument selecting a set of `object_type`.
    ///
    /// `object_type` is the registered object name, not its table. Call
    /// after the host inserts or deletes rows of that type.
    pub fn objects_changed(&mut self, object_type: &str) -> Result<Vec<NodeId>> {
        let nodes = self.tracker.dependents_of_type(object_type);
        self.regenerate(nodes, object_type)
    }

    /// Regenerate every node, even past failures.
    ///
    /// Each node is replaced in its own transaction, so a failed node keeps
    /// its previous matches. Failures are reported together in
    /// [`Error::Regeneration`].
    fn regenerate(&mut self, nodes: BTreeSet<NodeId>, cause: &str) -> Result<Vec<NodeId>> {
        let mut regenerated = Vec::new();
        let mut failed = Vec::new();
        for node in nodes {
            match self.store.regenerate(&self.model, node) {
                Ok(count) => {
                    tracing::warn!(node = node.0, matches = count, cause, "regenerated grant matches");
                    regenerated.push(node);
                }
                Err(error) => {
                    tracing::error!(node = node.0, %error, cause, "failed to regenerate grant matches");
                    failed.push((node, error));
                }
            }
        }

        if failed.is_empty() {
            Ok(regenerated)
        } else {
            Err(Error::Regeneration {
                regenerated,
                failed,
            })
        }
    }
}
