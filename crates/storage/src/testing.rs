//! Shared fixture: users, groups and memberships in an in-memory store.

use crate::{Grant, GrantStore};
use policy::{Entity, Filter, Model, PermissionSignature, Relation, parse};

/// Groups 2 and 3 are children of root group 1, group 4 is a child of 2.
/// Users 1 and 2 belong to group 2, user 3 to group 3.
pub fn fixture() -> (GrantStore, Model) {
    let store = GrantStore::in_memory().unwrap();
    store
        .connection()
        .execute_batch(
            r#"
            CREATE TABLE "user" (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                supervisor_id INTEGER REFERENCES "user"(id)
            );
            CREATE TABLE "group" (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                parent_id INTEGER REFERENCES "group"(id)
            );
            CREATE TABLE group_membership (
                user_id INTEGER NOT NULL REFERENCES "user"(id),
                group_id INTEGER NOT NULL REFERENCES "group"(id)
            );
            INSERT INTO "user" VALUES (1, 'ada', NULL), (2, 'bob', 1), (3, 'cy', 1);
            INSERT INTO "group" VALUES (1, 'root', NULL), (2, 'eng', 1), (3, 'ops', 1), (4, 'infra', 2);
            INSERT INTO group_membership VALUES (1, 2), (2, 2), (3, 3);
            "#,
        )
        .unwrap();

    let mut builder = Model::builder();
    builder
        .register_object(
            "user",
            Entity::table("user"),
            [
                Relation::many_to_one("supervisor", "user").local_field("supervisor_id"),
                Relation::one_to_many("reports", "user").remote_field("supervisor_id"),
                Relation::many_to_many("groups", "group", "group_membership"),
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
                Relation::many_to_many("members", "user", "group_membership"),
            ],
            [Filter::primary_key("id"), Filter::new("name")],
        )
        .unwrap();
    builder
        .register_permission(PermissionSignature::new(
            "create_user",
            ["current_user", "target_group"],
        ))
        .unwrap();
    builder
        .register_permission(PermissionSignature::new("delegate", ["delegator", "permission"]))
        .unwrap();

    (store, builder.build())
}

pub fn grant(store: &GrantStore, model: &Model, text: &str) -> Grant {
    store.grant(model, &parse(text).unwrap()).unwrap()
}
