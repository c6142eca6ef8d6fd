//! Embedded authorization engine.
//!
//! This crate ties together the expression language from [`policy`] and the
//! grant store from [`storage`], and keeps stored grants current as the
//! host's entity tables change.
//!
//! # Overview
//!
//! - **Engine**: grants, checks and revokes permission instances against a
//!   registered [`Model`](policy::Model).
//! - **DependencyTracker**: remembers which columns and object types each
//!   stored argument read, so [`Engine::field_changed`] and
//!   [`Engine::objects_changed`] regenerate only the affected match rows.
//! - **EngineConfig**: database location and composition policy, from TOML.
//!
//! # Example
//!
//! ```no_run
//! use policy::{Entity, Filter, Model, PermissionSignature, Relation, parse};
//! use runtime::{Engine, EngineConfig};
//! use storage::ObjectRef;
//!
//! let mut builder = Model::builder();
//! builder.register_object(
//!     "user",
//!     Entity::table("user"),
//!     [Relation::many_to_many("groups", "group", "group_membership")],
//!     [Filter::primary_key("id")],
//! )?;
//! builder.register_object(
//!     "group",
//!     Entity::table("group"),
//!     [Relation::one_to_many("subgroups", "group").remote_field("parent_id")],
//!     [Filter::primary_key("id"), Filter::new("name")],
//! )?;
//! builder.register_permission(PermissionSignature::new(
//!     "create_user",
//!     ["current_user", "target_group"],
//! ))?;
//!
//! let config = EngineConfig::load("engine.toml")?;
//! let mut engine = Engine::from_config(builder.build(), &config)?;
//!
//! engine.grant_str("create_user(user#id(1), group#id(7).subgroups)")?;
//! let allowed = engine.matches(
//!     &parse("create_user(user#id(1), group#id(8))")?,
//!     &ObjectRef::new("group", 8),
//! )?;
//!
//! // After the host moves a group, refresh the grants that read parent_id.
//! engine.field_changed("group", "parent_id")?;
//! # let _ = allowed;
//! # Ok::<(), runtime::Error>(())
//! ```

mod config;
mod engine;
mod error;
mod tracker;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, Result};
pub use tracker::DependencyTracker;
