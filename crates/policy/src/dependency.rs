//! Field dependencies of object-set expressions.

use crate::ast::Expr;
use crate::interpret::{Evaluated, Interpreter};
use crate::model::{JoinPath, Model};
use crate::visitor::{Inputs, Observer, walk_with};
use crate::{Error, Result};
use std::collections::BTreeSet;

/// A column that an expression's result depends on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldRef {
    pub table: String,
    pub column: String,
}

impl FieldRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// What an expression reads, and what kind of set it produces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    /// Columns read by filter and join steps.
    pub fields: BTreeSet<FieldRef>,
    /// Object type of the result when it can grow or shrink with inserts
    /// and deletes, i.e. when it is not a single pinned object.
    pub object_type: Option<String>,
}

/// Observer collecting the columns touched by each filter and join.
struct FieldCollector<'m> {
    model: &'m Model,
}

impl<'m> Observer<Evaluated<'m>> for FieldCollector<'m> {
    type Output = BTreeSet<FieldRef>;
    type Error = Error;

    fn observe_model(&mut self, _name: &str, _node: &Evaluated<'m>) -> Result<Self::Output> {
        Ok(BTreeSet::new())
    }

    fn observe_join(
        &mut self,
        mut lhs: Self::Output,
        relation: &str,
        inputs: Inputs<'_, Evaluated<'m>>,
    ) -> Result<Self::Output> {
        let Some(source) = inputs.lhs.object else {
            return Ok(lhs);
        };
        let path = source.relation(relation)?.resolve(self.model, source)?;
        lhs.extend(join_fields(&path));
        Ok(lhs)
    }

    fn observe_filter(
        &mut self,
        mut lhs: Self::Output,
        field: &str,
        value: Self::Output,
        inputs: Inputs<'_, Evaluated<'m>>,
    ) -> Result<Self::Output> {
        if let Some(object) = inputs.lhs.object {
            let filter = object.filter(field)?;
            lhs.insert(FieldRef::new(object.table(), filter.column_name()));
        }
        lhs.extend(value);
        Ok(lhs)
    }

    fn observe_instance(&mut self, _: &str, _: &[Expr], _: &Evaluated<'m>) -> Result<Self::Output> {
        Ok(BTreeSet::new())
    }

    fn observe_leaf(&mut self, _: &Expr, _: &Evaluated<'m>) -> Result<Self::Output> {
        Ok(BTreeSet::new())
    }
}

fn join_fields(path: &JoinPath<'_>) -> Vec<FieldRef> {
    let mut fields = vec![
        FieldRef::new(path.source.table(), &path.local_field),
        FieldRef::new(path.target.table(), &path.remote_field),
    ];
    if let Some(junction) = &path.junction {
        fields.push(FieldRef::new(&junction.table, &junction.local_column));
        fields.push(FieldRef::new(&junction.table, &junction.remote_column));
    }
    fields
}

/// Interpret `expr` and collect the fields its result depends on.
pub fn dependencies(model: &Model, expr: &Expr) -> Result<Dependencies> {
    let mut interpreter = Interpreter::new(model);
    let mut collector = FieldCollector { model };
    let (evaluated, fields) = walk_with(&mut interpreter, &mut collector, expr)?;

    let object_type = evaluated
        .object
        .filter(|_| !evaluated.is_singular)
        .map(|object| object.name().to_string());

    Ok(Dependencies { fields, object_type })
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
                [Relation::many_to_many("groups", "group", "group_membership")],
                [Filter::primary_key("id"), Filter::unique("username")],
            )
            .unwrap();
        builder
            .register_object(
                "group",
                Entity::table("group"),
                [Relation::one_to_many("subgroups", "group").remote_field("parent_id")],
                [Filter::primary_key("id"), Filter::new("name")],
            )
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_filter_and_join_fields() {
        let model = model();
        let deps = dependencies(&model, &parse("group#name(\"eng\").subgroups").unwrap()).unwrap();
        assert_eq!(
            deps.fields,
            BTreeSet::from([
                FieldRef::new("group", "name"),
                FieldRef::new("group", "id"),
                FieldRef::new("group", "parent_id"),
            ])
        );
        assert_eq!(deps.object_type.as_deref(), Some("group"));
    }

    #[test]
    fn test_junction_fields() {
        let model = model();
        let deps = dependencies(&model, &parse("user#id(1).groups").unwrap()).unwrap();
        assert!(deps.fields.contains(&FieldRef::new("group_membership", "user_id")));
        assert!(deps.fields.contains(&FieldRef::new("group_membership", "group_id")));
        assert!(!deps.fields.contains(&FieldRef::new("group", "name")));
    }

    #[test]
    fn test_pinned_object_has_no_type_dependency() {
        let model = model();
        let deps = dependencies(&model, &parse("group#id(3)").unwrap()).unwrap();
        assert_eq!(deps.fields, BTreeSet::from([FieldRef::new("group", "id")]));
        assert_eq!(deps.object_type, None);
    }

    #[test]
    fn test_nested_value_fields_are_included() {
        let model = model();
        let deps = dependencies(
            &model,
            &parse("group#id(user#username(\"ada\").groups)").unwrap(),
        )
        .unwrap();
        assert!(deps.fields.contains(&FieldRef::new("user", "username")));
        assert!(deps.fields.contains(&FieldRef::new("group_membership", "user_id")));
    }
}
