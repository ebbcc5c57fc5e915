//! First-party identity assignment, partner pairing sync and match lookup.

use std::collections::BTreeMap;

use chrono::Utc;
use partner_match_store::Store;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::partners::{PartnerDirectory, partner_not_found};
use crate::schema::MATCHES_SPACE;

/// The visitor id a partner last reported for an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairing {
    pub visitor_id: String,
    pub timestamp: i64,
}

/// All pairings accumulated under one first-party identity, keyed by the
/// partner id's canonical string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: Uuid,
    pub partner_pairings: BTreeMap<String, Pairing>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub is_new: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    UnknownPartner,
}

/// Reads the identity carried by the caller's cookie, or mints a fresh one.
///
/// Purely request-local: two first visits racing before the cookie lands get
/// two different identities.
pub fn resolve_identity(cookie_value: Option<&str>) -> Identity {
    match cookie_value.and_then(|value| Uuid::parse_str(value.trim()).ok()) {
        Some(id) => Identity { id, is_new: false },
        None => Identity {
            id: Uuid::new_v4(),
            is_new: true,
        },
    }
}

#[derive(Clone)]
pub struct MatchEngine {
    store: Store,
    partners: PartnerDirectory,
}

impl MatchEngine {
    pub fn new(store: Store, partners: PartnerDirectory) -> Self {
        Self { store, partners }
    }

    /// Records `visitor_id` as the pairing for `partner_id` under `identity`,
    /// overwriting any earlier pairing for that partner.
    ///
    /// Unknown partners are skipped without touching the store. The
    /// read-modify-write is not isolated: concurrent syncs for one identity may
    /// lose each other's pairings.
    pub async fn sync(
        &self,
        identity: Uuid,
        partner_id: Uuid,
        visitor_id: &str,
    ) -> Result<SyncOutcome, ServiceError> {
        if self.partners.find(partner_id).await?.is_none() {
            tracing::debug!(
                target: "partner_match.matching",
                identity = %identity,
                partner_id = %partner_id,
                "sync skipped for unknown partner",
            );
            return Ok(SyncOutcome::UnknownPartner);
        }

        let existing: Option<MatchRecord> =
            self.store.get(MATCHES_SPACE, &identity.to_string()).await?;
        let (mut record, outcome) = match existing {
            Some(record) => (record, SyncOutcome::Updated),
            None => (
                MatchRecord {
                    id: identity,
                    partner_pairings: BTreeMap::new(),
                },
                SyncOutcome::Created,
            ),
        };

        record.partner_pairings.insert(
            partner_id.to_string(),
            Pairing {
                visitor_id: visitor_id.to_string(),
                timestamp: Utc::now().timestamp(),
            },
        );

        self.store_record(&record, outcome).await?;

        tracing::debug!(
            target: "partner_match.matching",
            identity = %identity,
            partner_id = %partner_id,
            outcome = ?outcome,
            "pairing recorded",
        );
        Ok(outcome)
    }

    /// Inserts a freshly built record or replaces an existing one.
    async fn store_record(
        &self,
        record: &MatchRecord,
        outcome: SyncOutcome,
    ) -> Result<(), ServiceError> {
        if outcome != SyncOutcome::Created {
            self.store.replace(MATCHES_SPACE, record).await?;
            return Ok(());
        }

        match self.store.insert(MATCHES_SPACE, record).await {
            Ok(_) => Ok(()),
            Err(error) if error.is_duplicate_key() => {
                // A concurrent first sync created the row after our read.
                tracing::warn!(
                    target: "partner_match.matching",
                    identity = %record.id,
                    "match row created concurrently; overwriting",
                );
                self.store.replace(MATCHES_SPACE, record).await?;
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Resolves the pairing `partner_id` last reported for `identity`.
    pub async fn lookup(&self, identity: Uuid, partner_id: Uuid) -> Result<Pairing, ServiceError> {
        if self.partners.find(partner_id).await?.is_none() {
            return Err(partner_not_found(partner_id));
        }

        let record: MatchRecord = self
            .store
            .get(MATCHES_SPACE, &identity.to_string())
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "identity",
                message: format!("user with id {identity} not found"),
            })?;

        record
            .partner_pairings
            .get(&partner_id.to_string())
            .cloned()
            .ok_or_else(|| ServiceError::NotFound {
                entity: "pairing",
                message: format!(
                    "user {identity} doesn't have a match with partner {partner_id}"
                ),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::apply_all;

    const ACME: &str = "11111111-1111-1111-1111-111111111111";
    const GLOBEX: &str = "22222222-2222-2222-2222-222222222222";

    struct Fixture {
        store: Store,
        engine: MatchEngine,
        acme: Uuid,
        globex: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Store::in_memory();
        apply_all(&store, "svc").await.expect("apply migrations");
        let partners = PartnerDirectory::new(store.clone());
        let acme = partners.register(ACME, "acme").await.expect("acme").id;
        let globex = partners.register(GLOBEX, "globex").await.expect("globex").id;
        Fixture {
            engine: MatchEngine::new(store.clone(), partners),
            store,
            acme,
            globex,
        }
    }

    #[test]
    fn resolve_identity_keeps_valid_cookie() {
        let id = Uuid::new_v4();
        let identity = resolve_identity(Some(&id.to_string()));
        assert_eq!(identity, Identity { id, is_new: false });
    }

    #[test]
    fn resolve_identity_mints_for_missing_or_malformed_cookie() {
        let missing = resolve_identity(None);
        let malformed = resolve_identity(Some("garbage"));
        assert!(missing.is_new);
        assert!(malformed.is_new);
        assert_ne!(missing.id, malformed.id);
    }

    #[tokio::test]
    async fn sync_then_lookup_round_trips_within_window() {
        let f = fixture().await;
        let identity = Uuid::new_v4();

        let started = Utc::now().timestamp();
        let outcome = f
            .engine
            .sync(identity, f.acme, "visitor-42")
            .await
            .expect("sync");
        let finished = Utc::now().timestamp();
        assert_eq!(outcome, SyncOutcome::Created);

        let pairing = f.engine.lookup(identity, f.acme).await.expect("lookup");
        assert_eq!(pairing.visitor_id, "visitor-42");
        assert!(pairing.timestamp >= started && pairing.timestamp <= finished);
    }

    #[tokio::test]
    async fn pairings_for_other_partners_are_preserved() {
        let f = fixture().await;
        let identity = Uuid::new_v4();

        f.engine.sync(identity, f.acme, "v1").await.expect("sync acme");
        let outcome = f
            .engine
            .sync(identity, f.globex, "v2")
            .await
            .expect("sync globex");
        assert_eq!(outcome, SyncOutcome::Updated);

        let acme = f.engine.lookup(identity, f.acme).await.expect("acme");
        let globex = f.engine.lookup(identity, f.globex).await.expect("globex");
        assert_eq!(acme.visitor_id, "v1");
        assert_eq!(globex.visitor_id, "v2");
    }

    #[tokio::test]
    async fn later_sync_for_same_partner_wins() {
        let f = fixture().await;
        let identity = Uuid::new_v4();

        f.engine.sync(identity, f.acme, "first").await.expect("first");
        f.engine.sync(identity, f.acme, "second").await.expect("second");

        let pairing = f.engine.lookup(identity, f.acme).await.expect("lookup");
        assert_eq!(pairing.visitor_id, "second");

        let record: MatchRecord = f
            .store
            .get(MATCHES_SPACE, &identity.to_string())
            .await
            .expect("get")
            .expect("record exists");
        assert_eq!(record.partner_pairings.len(), 1);
    }

    #[tokio::test]
    async fn first_sync_racing_an_existing_row_overwrites_it() {
        let f = fixture().await;
        let identity = Uuid::new_v4();
        let pairing = |visitor_id: &str| Pairing {
            visitor_id: visitor_id.to_string(),
            timestamp: Utc::now().timestamp(),
        };

        let concurrent = MatchRecord {
            id: identity,
            partner_pairings: BTreeMap::from([(f.globex.to_string(), pairing("other"))]),
        };
        f.store
            .insert(MATCHES_SPACE, &concurrent)
            .await
            .expect("concurrent insert");

        let ours = MatchRecord {
            id: identity,
            partner_pairings: BTreeMap::from([(f.acme.to_string(), pairing("ours"))]),
        };
        f.engine
            .store_record(&ours, SyncOutcome::Created)
            .await
            .expect("duplicate key falls back to replace");

        let stored: MatchRecord = f
            .store
            .get(MATCHES_SPACE, &identity.to_string())
            .await
            .expect("get")
            .expect("record exists");
        assert_eq!(stored, ours);
        assert_eq!(f.store.len(MATCHES_SPACE).await.expect("len"), 1);
    }

    #[tokio::test]
    async fn unknown_partner_sync_creates_nothing() {
        let f = fixture().await;
        let identity = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        let outcome = f
            .engine
            .sync(identity, stranger, "visitor")
            .await
            .expect("sync");
        assert_eq!(outcome, SyncOutcome::UnknownPartner);
        assert_eq!(f.store.len(MATCHES_SPACE).await.expect("len"), 0);

        let error = f
            .engine
            .lookup(identity, stranger)
            .await
            .expect_err("unknown partner");
        assert_eq!(error.not_found_entity(), Some("partner"));
    }

    #[tokio::test]
    async fn lookup_distinguishes_missing_identity_and_missing_pairing() {
        let f = fixture().await;
        let identity = Uuid::new_v4();

        let error = f
            .engine
            .lookup(identity, f.acme)
            .await
            .expect_err("unknown identity");
        assert_eq!(error.not_found_entity(), Some("identity"));

        f.engine.sync(identity, f.acme, "v1").await.expect("sync");
        let error = f
            .engine
            .lookup(identity, f.globex)
            .await
            .expect_err("no pairing");
        assert_eq!(error.not_found_entity(), Some("pairing"));
    }
}
