use async_trait::async_trait;
use partner_match_store::{FieldSpec, FieldType, SpaceEngine, Store, StoreError};

pub const PARTNERS_SPACE: &str = "partners";

const NAME: &str = "_create_partners";

/// Partner directory: small, read on every sync, kept in memory.
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
            PARTNERS_SPACE,
            SpaceEngine::Memory,
            owner,
            vec![
                FieldSpec::new("id", FieldType::Uuid),
                FieldSpec::new("name", FieldType::String),
            ],
        )
        .await
    }

    async fn down(&self, store: &Store) -> Result<bool, StoreError> {
        super::drop_space(store, NAME, PARTNERS_SPACE).await
    }
}
