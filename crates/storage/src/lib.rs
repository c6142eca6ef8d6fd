//! SQLite-backed grant storage and checks.
//!
//! Grants are stored as trees: the root node names a permission, and each
//! argument is a child node at its position. Object-set arguments are
//! evaluated once, when the grant is written, and the resulting objects are
//! kept as match rows. Checks then join the tree against the match rows
//! instead of re-running the argument expressions.
//!
//! # Core Concepts
//!
//! ## GrantStore
//!
//! The [`GrantStore`] wraps a SQLite connection that also holds the host's
//! entity tables, so fragments produced by the [`policy`] interpreter run
//! against the same database.
//!
//! ## Grant tree
//!
//! - `grant_expressions`: one row per node. Roots and sub-grants carry a
//!   permission name; leaves carry the canonical text of their argument.
//! - `expression_matches`: one `(node, object_type, object_id)` row per
//!   object a leaf selected when it was evaluated.
//!
//! A `*` argument is stored as a wildcard leaf with no match rows; it accepts
//! any object when checked.
//!
//! ## Checks
//!
//! [`GrantStore::check`] compiles a permission instance into a single query.
//! Bound arguments restrict which grants apply, `*` leaves a position open,
//! and nested instances follow a [`CompositionPolicy`].
//!
//! # Example
//!
//! ```no_run
//! use storage::{CompositionPolicy, GrantStore, ObjectRef};
//! # fn model() -> policy::Model { unimplemented!() }
//!
//! let store = GrantStore::open("grants.db")?;
//! let model = model();
//!
//! store.grant(&model, &policy::parse("create_user(user#id(1), group#id(7).subgroups)")?)?;
//!
//! let query = policy::parse("create_user(user#id(1), *)")?;
//! for object in store.check(&model, &query, CompositionPolicy::All)? {
//!     println!("{object}");
//! }
//!
//! let allowed = store.matches(
//!     &model,
//!     &policy::parse("create_user(user#id(1), group#id(8))")?,
//!     &ObjectRef::new("group", 8),
//!     CompositionPolicy::All,
//! )?;
//! # let _ = allowed;
//! # Ok::<(), storage::Error>(())
//! ```

mod error;
mod grant;
mod query;
mod store;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use grant::{ArgumentNode, Grant, GrantId, GrantRecord, NodeId, ObjectRef};
pub use query::CompositionPolicy;
pub use store::GrantStore;
