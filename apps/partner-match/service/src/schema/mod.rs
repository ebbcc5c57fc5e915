//! Versioned schema provisioning.
//!
//! Each migration runs under a durable run-once marker named after it. Applying
//! clears the matching `<name>_down` marker and reverting clears `<name>`, so an
//! apply/revert/apply cycle works while a repeated apply or revert is a no-op.

use async_trait::async_trait;
use partner_match_store::{
    FieldSpec, IndexSpec, Privilege, SpaceEngine, SpaceOptions, Store, StoreError,
};
use serde::Serialize;

mod m001_create_partners;
mod m002_create_matches;

pub use m001_create_partners::PARTNERS_SPACE;
pub use m002_create_matches::MATCHES_SPACE;

const ACCOUNT_OBJECT: &str = "universe";

#[async_trait]
pub trait Migration: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns whether the migration body ran.
    async fn up(&self, store: &Store, owner: &str) -> Result<bool, StoreError>;

    /// Returns whether the revert body ran.
    async fn down(&self, store: &Store) -> Result<bool, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub name: &'static str,
    pub applied: bool,
}

pub fn migrations() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(m001_create_partners::Migration),
        Box::new(m002_create_matches::Migration),
    ]
}

pub fn down_marker(name: &str) -> String {
    format!("{name}_down")
}

pub async fn apply_all(store: &Store, owner: &str) -> Result<(), StoreError> {
    for migration in migrations() {
        let ran = migration.up(store, owner).await?;
        tracing::info!(
            target: "partner_match.schema",
            migration = migration.name(),
            applied = ran,
            "migration up",
        );
    }
    Ok(())
}

pub async fn revert_all(store: &Store) -> Result<(), StoreError> {
    for migration in migrations().into_iter().rev() {
        let ran = migration.down(store).await?;
        tracing::info!(
            target: "partner_match.schema",
            migration = migration.name(),
            reverted = ran,
            "migration down",
        );
    }
    Ok(())
}

pub async fn migration_status(store: &Store) -> Vec<MigrationStatus> {
    let mut statuses = Vec::new();
    for migration in migrations() {
        statuses.push(MigrationStatus {
            name: migration.name(),
            applied: store.has_marker(migration.name()).await,
        });
    }
    statuses
}

/// Creates the service login and grants it full access, once per account name.
pub async fn ensure_service_account(
    store: &Store,
    name: &str,
    secret: &str,
) -> Result<bool, StoreError> {
    let marker = format!("_create_user_{name}");
    let created = store
        .once(&marker, |catalog| {
            catalog.create_user(name, secret);
            catalog.grant(
                name,
                &[Privilege::Read, Privilege::Write, Privilege::Execute],
                ACCOUNT_OBJECT,
            )
        })
        .await?;

    if created {
        tracing::info!(target: "partner_match.schema", user = name, "service account created");
    }
    Ok(created)
}

/// Shared body of the space-creating migrations.
async fn create_space(
    store: &Store,
    migration: &str,
    space: &str,
    engine: SpaceEngine,
    owner: &str,
    format: Vec<FieldSpec>,
) -> Result<bool, StoreError> {
    let down = down_marker(migration);
    store
        .once(migration, |catalog| {
            catalog.create_space(
                space,
                SpaceOptions {
                    engine,
                    owner: Some(owner.to_string()),
                },
            );
            catalog.set_format(space, format)?;
            catalog.create_index(space, IndexSpec::primary(&["id"]))?;
            catalog.delete_marker(&down);
            Ok(())
        })
        .await
}

async fn drop_space(store: &Store, migration: &str, space: &str) -> Result<bool, StoreError> {
    let down = down_marker(migration);
    store
        .once(&down, |catalog| {
            catalog.drop_space(space);
            catalog.delete_marker(migration);
            Ok(())
        })
        .await
}

#[cfg(test)]
mod tests {
    use partner_match_store::{FieldType, SpaceDefinition};

    use super::*;

    const OWNER: &str = "svc";

    type Shape = (SpaceEngine, Option<String>, Vec<FieldSpec>, Vec<IndexSpec>);

    fn shape(definition: &SpaceDefinition) -> Shape {
        (
            definition.engine,
            definition.owner.clone(),
            definition.format.clone(),
            definition.indexes.clone(),
        )
    }

    async fn shapes(store: &Store) -> Vec<Shape> {
        let mut shapes = Vec::new();
        for name in [PARTNERS_SPACE, MATCHES_SPACE] {
            let definition = store.space_definition(name).await.expect("space exists");
            shapes.push(shape(&definition));
        }
        shapes
    }

    #[tokio::test]
    async fn apply_all_provisions_both_spaces() {
        let store = Store::in_memory();
        apply_all(&store, OWNER).await.expect("apply");

        let partners = store
            .space_definition(PARTNERS_SPACE)
            .await
            .expect("partners space");
        assert_eq!(partners.engine, SpaceEngine::Memory);
        assert_eq!(partners.owner.as_deref(), Some(OWNER));
        assert_eq!(
            partners.format,
            vec![
                FieldSpec::new("id", FieldType::Uuid),
                FieldSpec::new("name", FieldType::String),
            ]
        );
        assert_eq!(partners.indexes, vec![IndexSpec::primary(&["id"])]);

        let matches = store
            .space_definition(MATCHES_SPACE)
            .await
            .expect("matches space");
        assert_eq!(matches.engine, SpaceEngine::LogStructured);
        assert_eq!(
            matches.format,
            vec![
                FieldSpec::new("id", FieldType::Uuid),
                FieldSpec::new("partner_pairings", FieldType::Map),
            ]
        );
    }

    #[tokio::test]
    async fn applying_twice_keeps_the_same_shapes() {
        let store = Store::in_memory();
        apply_all(&store, OWNER).await.expect("first apply");
        let before = shapes(&store).await;

        apply_all(&store, "someone_else").await.expect("second apply");
        assert_eq!(shapes(&store).await, before);
    }

    #[tokio::test]
    async fn revert_is_idempotent_and_reapply_restores_spaces() {
        let store = Store::in_memory();
        apply_all(&store, OWNER).await.expect("apply");

        revert_all(&store).await.expect("revert");
        assert!(store.space_names().await.is_empty());
        assert!(
            migration_status(&store)
                .await
                .iter()
                .all(|status| !status.applied)
        );

        for migration in migrations() {
            assert!(!migration.down(&store).await.expect("second revert"));
        }

        apply_all(&store, OWNER).await.expect("reapply");
        assert_eq!(
            store.space_names().await,
            vec![MATCHES_SPACE.to_string(), PARTNERS_SPACE.to_string()]
        );
        assert!(
            migration_status(&store)
                .await
                .iter()
                .all(|status| status.applied)
        );
    }

    #[tokio::test]
    async fn revert_drops_rows_with_the_space() {
        let store = Store::in_memory();
        apply_all(&store, OWNER).await.expect("apply");
        store
            .insert(
                PARTNERS_SPACE,
                &serde_json::json!({
                    "id": "11111111-1111-1111-1111-111111111111",
                    "name": "acme",
                }),
            )
            .await
            .expect("insert partner");

        revert_all(&store).await.expect("revert");
        apply_all(&store, OWNER).await.expect("reapply");
        assert_eq!(store.len(PARTNERS_SPACE).await.expect("len"), 0);
    }

    #[tokio::test]
    async fn service_account_is_created_once() {
        let store = Store::in_memory();
        assert!(
            ensure_service_account(&store, OWNER, "first")
                .await
                .expect("create account")
        );
        assert!(
            !ensure_service_account(&store, OWNER, "second")
                .await
                .expect("repeat account")
        );

        let user = store.user(OWNER).await.expect("user exists");
        assert!(user.password_matches("first"));
        for privilege in [Privilege::Read, Privilege::Write, Privilege::Execute] {
            assert!(user.has_privilege(ACCOUNT_OBJECT, privilege));
        }
    }
}
