use async_trait::async_trait;
use partner_match_store::{FieldSpec, FieldType, SpaceEngine, Store, StoreError};

pub const MATCHES_SPACE: &str = "matches";

const NAME: &str = "_create_matches";

/// One row per first-party identity; written on every sync and grows with
/// traffic, so it uses the log-structured engine.
pub struct Migration;

#[async_trait]
impl super::Migration for Migration {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn up(&self, store: &Store, owner: &str) -> Result<bool, StoreError> {
        super::create_space(
            store,
            NAME,
            MATCHES_SPACE,
            SpaceEngine::LogStructured,
            owner,
            vec![
                FieldSpec::new("id", FieldType::Uuid),
                FieldSpec::new("partner_pairings", FieldType::Map),
            ],
        )
        .await
    }

    async fn down(&self, store: &Store) -> Result<bool, StoreError> {
        super::drop_space(store, NAME, MATCHES_SPACE).await
    }
}
