//! Object model: registered objects, their relations and filters, and
//! permission signatures.
//!
//! A [`Model`] is assembled once through a [`ModelBuilder`] and is immutable
//! afterwards. Relation targets are stored by name and resolved through the
//! model on access, so objects may refer to themselves or to each other
//! regardless of registration order.

use crate::ast::Expr;
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};

/// How a relation links its source object to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// The source row holds a foreign key to one target row.
    ManyToOne,
    /// Target rows hold a foreign key to the source row.
    OneToMany,
    /// Source and target are linked through a junction table.
    ManyToMany,
}

/// Table identity supplied by the host's schema layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub table: String,
    pub primary_key: String,
}

impl Entity {
    /// A table with an `id` primary key column.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: "id".to_string(),
        }
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }
}

/// A named, typed link from one object to another.
#[derive(Debug, Clone)]
pub struct Relation {
    name: String,
    kind: RelationKind,
    target: String,
    local_field: Option<String>,
    remote_field: Option<String>,
    /// Junction table of a many-to-many relation.
    secondary: Option<String>,
    junction_columns: Option<(String, String)>,
}

impl Relation {
    fn new(name: impl Into<String>, kind: RelationKind, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            local_field: None,
            remote_field: None,
            secondary: None,
            junction_columns: None,
        }
    }

    /// The source holds `<target table>_id` unless overridden with
    /// [`local_field`](Self::local_field).
    pub fn many_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationKind::ManyToOne, target)
    }

    /// The target holds `<source table>_id` unless overridden with
    /// [`remote_field`](Self::remote_field).
    pub fn one_to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationKind::OneToMany, target)
    }

    /// Linked through `secondary`, whose columns default to
    /// `<source table>_id` and `<target table>_id`.
    pub fn many_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        secondary: impl Into<String>,
    ) -> Self {
        let mut relation = Self::new(name, RelationKind::ManyToMany, target);
        relation.secondary = Some(secondary.into());
        relation
    }

    /// Column on the source table the join starts from.
    pub fn local_field(mut self, column: impl Into<String>) -> Self {
        self.local_field = Some(column.into());
        self
    }

    /// Column on the target table the join lands on.
    pub fn remote_field(mut self, column: impl Into<String>) -> Self {
        self.remote_field = Some(column.into());
        self
    }

    /// Junction columns referring to the source and the target.
    ///
    /// Only many-to-many relations have a junction; registering any other
    /// relation with these columns set is an error.
    pub fn secondary_columns(mut self, local: impl Into<String>, remote: impl Into<String>) -> Self {
        self.junction_columns = Some((local.into(), remote.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Name of the target object.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Resolve the target and fill in conventional column names.
    pub fn resolve<'m>(&self, model: &'m Model, source: &'m ObjectDefinition) -> Result<JoinPath<'m>> {
        let target = model.object(&self.target)?;

        let (local_field, remote_field) = match self.kind {
            RelationKind::ManyToOne => (
                self.local_field
                    .clone()
                    .unwrap_or_else(|| format!("{}_id", target.table())),
                self.remote_field
                    .clone()
                    .unwrap_or_else(|| target.primary_key().to_string()),
            ),
            RelationKind::OneToMany => (
                self.local_field
                    .clone()
                    .unwrap_or_else(|| source.primary_key().to_string()),
                self.remote_field
                    .clone()
                    .unwrap_or_else(|| format!("{}_id", source.table())),
            ),
            RelationKind::ManyToMany => (
                self.local_field
                    .clone()
                    .unwrap_or_else(|| source.primary_key().to_string()),
                self.remote_field
                    .clone()
                    .unwrap_or_else(|| target.primary_key().to_string()),
            ),
        };

        let junction = match &self.secondary {
            Some(table) => {
                let (local_column, remote_column) = match &self.junction_columns {
                    Some((local, remote)) => (local.clone(), remote.clone()),
                    None => (
                        format!("{}_id", source.table()),
                        format!("{}_id", target.table()),
                    ),
                };
                if local_column == remote_column {
                    return Err(Error::Registration(format!(
                        "relation '{}' on '{}' needs explicit junction columns",
                        self.name,
                        source.name()
                    )));
                }
                Some(Junction {
                    table: table.clone(),
                    local_column,
                    remote_column,
                })
            }
            None => None,
        };

        Ok(JoinPath {
            kind: self.kind,
            source,
            target,
            local_field,
            remote_field,
            junction,
        })
    }
}

/// A junction table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Junction {
    pub table: String,
    /// Column referring to the source side.
    pub local_column: String,
    /// Column referring to the target side.
    pub remote_column: String,
}

/// A relation with its target resolved and every column named.
#[derive(Debug, Clone)]
pub struct JoinPath<'m> {
    pub kind: RelationKind,
    pub source: &'m ObjectDefinition,
    pub target: &'m ObjectDefinition,
    pub local_field: String,
    pub remote_field: String,
    pub junction: Option<Junction>,
}

/// A named predicate field on an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    name: String,
    column: String,
    unique: bool,
    primary_key: bool,
}

impl Filter {
    /// A non-unique filter on the column of the same name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            unique: false,
            primary_key: false,
        }
    }

    pub fn unique(name: impl Into<String>) -> Self {
        Self {
            unique: true,
            ..Self::new(name)
        }
    }

    /// Primary keys are always unique.
    pub fn primary_key(name: impl Into<String>) -> Self {
        Self {
            unique: true,
            primary_key: true,
            ..Self::new(name)
        }
    }

    /// Map the filter onto a differently named column.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_name(&self) -> &str {
        &self.column
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }
}

/// A registered object type.
#[derive(Debug, Clone)]
pub struct ObjectDefinition {
    name: String,
    entity: Entity,
    relations: BTreeMap<String, Relation>,
    filters: BTreeMap<String, Filter>,
}

impl ObjectDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.entity.table
    }

    /// Primary key column.
    pub fn primary_key(&self) -> &str {
        &self.entity.primary_key
    }

    pub fn get_relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn get_filter(&self, name: &str) -> Option<&Filter> {
        self.filters.get(name)
    }

    pub fn relation(&self, name: &str) -> Result<&Relation> {
        self.get_relation(name).ok_or_else(|| Error::UnknownRelation {
            object: self.name.clone(),
            relation: name.to_string(),
        })
    }

    pub fn filter(&self, name: &str) -> Result<&Filter> {
        self.get_filter(name).ok_or_else(|| Error::UnknownFilter {
            object: self.name.clone(),
            filter: name.to_string(),
        })
    }

    pub fn primary_key_filter(&self) -> Option<&Filter> {
        self.filters.values().find(|f| f.is_primary_key())
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }

    pub fn filters(&self) -> impl Iterator<Item = &Filter> {
        self.filters.values()
    }
}

/// Handle to a registered object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectHandle(String);

impl ObjectHandle {
    pub fn name(&self) -> &str {
        &self.0
    }

    /// An expression selecting every object of this type.
    pub fn all(&self) -> Expr {
        Expr::model(self.0.clone())
    }
}

/// A permission name with its ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSignature {
    name: String,
    parameters: Vec<String>,
    message: Option<String>,
}

impl PermissionSignature {
    pub fn new<S: Into<String>>(name: impl Into<String>, parameters: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            parameters: parameters.into_iter().map(Into::into).collect(),
            message: None,
        }
    }

    /// Denial message template; `{parameter}` placeholders are replaced by
    /// the argument text in [`describe`](Self::describe).
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Fail unless `found` arguments match the signature.
    pub fn check_arity(&self, found: usize) -> Result<()> {
        if found == self.arity() {
            Ok(())
        } else {
            Err(Error::ArityMismatch {
                permission: self.name.clone(),
                expected: self.arity(),
                found,
            })
        }
    }

    /// Human-readable description of an instance of this permission.
    pub fn describe(&self, arguments: &[Expr]) -> String {
        match &self.message {
            Some(template) => self
                .parameters
                .iter()
                .zip(arguments)
                .fold(template.clone(), |text, (parameter, argument)| {
                    text.replace(&format!("{{{parameter}}}"), &argument.to_string())
                }),
            None => Expr::instance(self.name.clone(), arguments.iter().cloned()).to_string(),
        }
    }
}

/// The immutable registry of objects and permissions.
#[derive(Debug, Clone, Default)]
pub struct Model {
    objects: BTreeMap<String, ObjectDefinition>,
    permissions: BTreeMap<String, PermissionSignature>,
}

impl Model {
    pub fn builder() -> ModelBuilder {
        ModelBuilder::default()
    }

    pub fn get_object(&self, name: &str) -> Option<&ObjectDefinition> {
        self.objects.get(name)
    }

    pub fn object(&self, name: &str) -> Result<&ObjectDefinition> {
        self.get_object(name)
            .ok_or_else(|| Error::UnknownObject(name.to_string()))
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectDefinition> {
        self.objects.values()
    }

    pub fn permission(&self, name: &str) -> Result<&PermissionSignature> {
        self.permissions
            .get(name)
            .ok_or_else(|| Error::UnknownPermission(name.to_string()))
    }

    /// Look up a permission and check an instance's argument count.
    pub fn signature_for(&self, name: &str, arguments: usize) -> Result<&PermissionSignature> {
        let signature = self.permission(name)?;
        signature.check_arity(arguments)?;
        Ok(signature)
    }

    /// An expression pinning one object by primary key, e.g. `group#id(8)`.
    ///
    /// Fails with `AmbiguousPrimaryKey` when the object has no primary-key
    /// filter to select it by.
    pub fn object_expr(&self, name: &str, id: i64) -> Result<Expr> {
        let filter = self
            .object(name)?
            .primary_key_filter()
            .ok_or_else(|| Error::AmbiguousPrimaryKey(name.to_string()))?;
        Ok(Expr::model(name).filter(filter.name(), id))
    }
}

/// Collects object and permission registrations into a [`Model`].
#[derive(Debug, Default)]
pub struct ModelBuilder {
    model: Model,
}

impl ModelBuilder {
    /// Register an object type.
    ///
    /// Relation and filter names must be unique within the object, and at
    /// most one filter may be the primary key.
    pub fn register_object(
        &mut self,
        name: impl Into<String>,
        entity: Entity,
        relations: impl IntoIterator<Item = Relation>,
        filters: impl IntoIterator<Item = Filter>,
    ) -> Result<ObjectHandle> {
        let name = name.into();
        if self.model.objects.contains_key(&name) {
            return Err(Error::Registration(format!("object '{name}' is already registered")));
        }

        let mut relation_map = BTreeMap::new();
        for relation in relations {
            if relation_map.contains_key(&relation.name) {
                return Err(Error::Registration(format!(
                    "relation '{}' is defined twice on '{name}'",
                    relation.name
                )));
            }
            if relation.junction_columns.is_some() && relation.secondary.is_none() {
                return Err(Error::Registration(format!(
                    "relation '{}' on '{name}' has junction columns but no junction table",
                    relation.name
                )));
            }
            relation_map.insert(relation.name.clone(), relation);
        }

        let mut filter_map: BTreeMap<String, Filter> = BTreeMap::new();
        for filter in filters {
            if filter_map.contains_key(&filter.name) {
                return Err(Error::Registration(format!(
                    "filter '{}' is defined twice on '{name}'",
                    filter.name
                )));
            }
            if filter.primary_key {
                if let Some(existing) = filter_map.values().find(|f| f.primary_key) {
                    return Err(Error::Registration(format!(
                        "'{name}' already has primary key filter '{}'",
                        existing.name
                    )));
                }
                if filter.column != entity.primary_key {
                    return Err(Error::Registration(format!(
                        "primary key filter '{}' on '{name}' must use column '{}'",
                        filter.name, entity.primary_key
                    )));
                }
            }
            filter_map.insert(filter.name.clone(), filter);
        }

        tracing::debug!(object = %name, table = %entity.table, "registered object");
        self.model.objects.insert(
            name.clone(),
            ObjectDefinition {
                name: name.clone(),
                entity,
                relations: relation_map,
                filters: filter_map,
            },
        );
        Ok(ObjectHandle(name))
    }

    /// Register a permission with a fixed parameter list.
    pub fn register_permission(&mut self, signature: PermissionSignature) -> Result<()> {
        if self.model.permissions.contains_key(&signature.name) {
            return Err(Error::Registration(format!(
                "permission '{}' is already registered",
                signature.name
            )));
        }
        let unique: BTreeSet<_> = signature.parameters.iter().collect();
        if unique.len() != signature.parameters.len() {
            return Err(Error::Registration(format!(
                "permission '{}' repeats a parameter name",
                signature.name
            )));
        }
        self.model
            .permissions
            .insert(signature.name.clone(), signature);
        Ok(())
    }

    pub fn build(self) -> Model {
        self.model
    }
}
