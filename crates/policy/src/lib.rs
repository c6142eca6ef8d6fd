//! Permission expression language and object model.
//!
//! Permissions are granted as expressions over a typed graph of objects:
//!
//! ```text
//! create_user(user#id(1), group#id(7).subgroups)
//! ```
//!
//! reads "user 1 may create users in the subgroups of group 7".
//!
//! # Overview
//!
//! - [`tokenize`] and [`parse`] turn expression text into an [`Expr`]. The
//!   `Display` form of an `Expr` is canonical and parses back to the same tree.
//! - A [`Model`] registers object types with their [`Relation`]s and
//!   [`Filter`]s, and permissions with a fixed [`PermissionSignature`].
//! - The [`Interpreter`] compiles object-set expressions into SQL
//!   [`Fragment`]s, tracking whether a result is a single object and which
//!   primary key it has when a literal pins it.
//! - [`Visitor`] and [`Observer`] let several passes share one traversal;
//!   [`dependencies`] uses this to find the columns an expression reads.
//!
//! # Example
//!
//! ```
//! use policy::{Entity, Filter, Interpreter, Model, Relation, parse};
//!
//! let mut builder = Model::builder();
//! builder.register_object(
//!     "group",
//!     Entity::table("group"),
//!     [
//!         Relation::many_to_one("parent", "group").local_field("parent_id"),
//!         Relation::one_to_many("subgroups", "group").remote_field("parent_id"),
//!     ],
//!     [Filter::primary_key("id"), Filter::new("name")],
//! )?;
//! let model = builder.build();
//!
//! let expr = parse("group#id(1)")?;
//! let evaluated = Interpreter::new(&model).evaluate(&expr)?;
//! assert!(evaluated.is_singular);
//! # Ok::<(), policy::Error>(())
//! ```

mod ast;
mod dependency;
mod error;
mod fluent;
mod interpret;
mod model;
mod parse;
mod token;
pub mod visitor;

pub use ast::{Bindings, Expr, Literal};
pub use dependency::{Dependencies, FieldRef, dependencies};
pub use error::{Error, Result};
pub use fluent::{Fluent, PermissionConstructor, any};
pub use interpret::{Evaluated, Fragment, Interpreter, quote};
pub use model::{
    Entity, Filter, JoinPath, Junction, Model, ModelBuilder, ObjectDefinition, ObjectHandle,
    PermissionSignature, Relation, RelationKind,
};
pub use parse::{Parser, parse};
pub use token::{Token, TokenKind, TokenValue, Tokenizer, tokenize};
pub use visitor::{Inputs, Observer, Visitor, walk, walk_with};
