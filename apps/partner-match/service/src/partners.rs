//! Registry of partner applications allowed to report visitor ids.

use partner_match_store::Store;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ServiceError, parse_uuid};
use crate::schema::PARTNERS_SPACE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub id: Uuid,
    pub name: String,
}

/// CRUD over registered partner applications.
#[derive(Clone)]
pub struct PartnerDirectory {
    store: Store,
}

impl PartnerDirectory {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Registers a new partner. Ids are never overwritten: registering an
    /// existing id is a [`ServiceError::Conflict`].
    pub async fn register(&self, id: &str, name: &str) -> Result<Partner, ServiceError> {
        let id = parse_uuid("id", id)?;
        if name.trim().is_empty() {
            return Err(ServiceError::Validation {
                field: "name",
                message: "name cannot be empty".to_string(),
            });
        }

        let partner = Partner {
            id,
            name: name.to_string(),
        };

        let stored = self
            .store
            .insert(PARTNERS_SPACE, &partner)
            .await
            .map_err(|error| {
                if error.is_duplicate_key() {
                    ServiceError::Conflict {
                        message: format!("partner with id {id} already exists"),
                    }
                } else {
                    ServiceError::Store(error)
                }
            })?;

        tracing::info!(
            target: "partner_match.partners",
            partner_id = %stored.id,
            name = %stored.name,
            "partner registered",
        );
        Ok(stored)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Partner>, ServiceError> {
        Ok(self.store.get(PARTNERS_SPACE, &id.to_string()).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Partner, ServiceError> {
        self.find(id).await?.ok_or_else(|| partner_not_found(id))
    }

    /// All partners in the store's scan order.
    pub async fn list_all(&self) -> Result<Vec<Partner>, ServiceError> {
        Ok(self.store.select(PARTNERS_SPACE).await?)
    }

    pub async fn remove(&self, id: Uuid) -> Result<Partner, ServiceError> {
        let removed: Option<Partner> = self.store.delete(PARTNERS_SPACE, &id.to_string()).await?;
        let partner = removed.ok_or_else(|| partner_not_found(id))?;

        tracing::info!(
            target: "partner_match.partners",
            partner_id = %partner.id,
            "partner removed",
        );
        Ok(partner)
    }
}

pub(crate) fn partner_not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound {
        entity: "partner",
        message: format!("partner with id {id} not found"),
    }
}
