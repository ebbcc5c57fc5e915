use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::catalog::{Catalog, SpaceDefinition, UserRecord, validate_row};
use crate::error::StoreError;

/// Durable keyed collections with single-operation atomicity.
///
/// Each data operation takes the write (or read) lock exactly once, so an
/// individual insert/replace/delete is atomic, but no lock is held across
/// operations. Callers composing a read with a later write get no isolation.
#[derive(Clone)]
pub struct Store {
    state: Arc<RwLock<StoreState>>,
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub(crate) struct StoreState {
    pub(crate) spaces: BTreeMap<String, Space>,
    pub(crate) markers: BTreeSet<String>,
    pub(crate) users: BTreeMap<String, UserRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Space {
    pub(crate) definition: SpaceDefinition,
    pub(crate) rows: BTreeMap<String, Map<String, Value>>,
}

impl Space {
    fn primary_key(&self, row: &Map<String, Value>) -> Result<String, StoreError> {
        let space = self.definition.name.as_str();
        let index =
            self.definition
                .primary_index()
                .ok_or_else(|| StoreError::MissingPrimaryIndex {
                    space: space.to_string(),
                })?;

        let mut parts = Vec::with_capacity(index.parts.len());
        for part in &index.parts {
            let rendered = match row.get(part) {
                Some(Value::String(value)) => value.clone(),
                Some(Value::Number(value)) => value.to_string(),
                _ => {
                    return Err(StoreError::FormatViolation {
                        space: space.to_string(),
                        field: part.clone(),
                        message: "primary key part must be a string or number".to_string(),
                    });
                }
            };
            parts.push(rendered);
        }

        Ok(parts.join(":"))
    }
}

impl StoreState {
    fn space(&self, name: &str) -> Result<&Space, StoreError> {
        self.spaces.get(name).ok_or_else(|| StoreError::NoSuchSpace {
            space: name.to_string(),
        })
    }

    fn space_mut(&mut self, name: &str) -> Result<&mut Space, StoreError> {
        self.spaces
            .get_mut(name)
            .ok_or_else(|| StoreError::NoSuchSpace {
                space: name.to_string(),
            })
    }
}

impl Store {
    /// Volatile store for tests and ephemeral deployments.
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            path: None,
        }
    }

    /// Opens the snapshot at `path`, or starts empty when the file does not
    /// exist yet. Every successful mutation rewrites the snapshot.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = Self::load_state(&path)?;

        tracing::info!(
            target: "partner_match.store",
            path = %path.display(),
            spaces = state.spaces.len(),
            markers = state.markers.len(),
            "opened store",
        );

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            path: Some(path),
        })
    }

    pub fn from_path(path: Option<&Path>) -> Result<Self, StoreError> {
        match path {
            Some(path) => Self::open(path),
            None => Ok(Self::in_memory()),
        }
    }

    /// Runs `body` at most once across the lifetime of the database.
    ///
    /// The marker check, the body's catalog changes and the marker itself are
    /// committed as one unit; if `body` fails nothing is recorded. Returns
    /// whether the body ran.
    pub async fn once<F>(&self, marker: &str, body: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut Catalog<'_>) -> Result<(), StoreError>,
    {
        let mut state = self.state.write().await;
        if state.markers.contains(marker) {
            tracing::debug!(
                target: "partner_match.store",
                marker,
                "run-once marker already consumed",
            );
            return Ok(false);
        }

        let mut draft = state.clone();
        draft.markers.insert(marker.to_string());
        body(&mut Catalog::new(&mut draft))?;

        self.persist_state(&draft).await?;
        *state = draft;

        tracing::info!(target: "partner_match.store", marker, "run-once body applied");
        Ok(true)
    }

    pub async fn has_marker(&self, marker: &str) -> bool {
        self.state.read().await.markers.contains(marker)
    }

    pub async fn space_definition(&self, name: &str) -> Option<SpaceDefinition> {
        self.state
            .read()
            .await
            .spaces
            .get(name)
            .map(|space| space.definition.clone())
    }

    pub async fn space_names(&self) -> Vec<String> {
        self.state.read().await.spaces.keys().cloned().collect()
    }

    pub async fn user(&self, name: &str) -> Option<UserRecord> {
        self.state.read().await.users.get(name).cloned()
    }

    pub async fn len(&self, space: &str) -> Result<usize, StoreError> {
        Ok(self.state.read().await.space(space)?.rows.len())
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        space: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let state = self.state.read().await;
        state
            .space(space)?
            .rows
            .get(key)
            .map(|row| decode(space, row.clone()))
            .transpose()
    }

    /// All records in primary key order.
    pub async fn select<T: DeserializeOwned>(&self, space: &str) -> Result<Vec<T>, StoreError> {
        let state = self.state.read().await;
        state
            .space(space)?
            .rows
            .values()
            .map(|row| decode(space, row.clone()))
            .collect()
    }

    /// Inserts a new record; fails with [`StoreError::DuplicateKey`] if the
    /// primary key is taken.
    pub async fn insert<T>(&self, space: &str, record: &T) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned,
    {
        let row = encode(space, record)?;
        let stored = self
            .mutate(|state| {
                let target = state.space_mut(space)?;
                validate_row(space, &target.definition.format, &row)?;
                let key = target.primary_key(&row)?;
                if target.rows.contains_key(&key) {
                    return Err(StoreError::DuplicateKey {
                        space: space.to_string(),
                        key,
                    });
                }
                target.rows.insert(key, row.clone());
                Ok(row)
            })
            .await?;

        decode(space, stored)
    }

    /// Inserts or overwrites the record with the same primary key.
    pub async fn replace<T>(&self, space: &str, record: &T) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned,
    {
        let row = encode(space, record)?;
        let stored = self
            .mutate(|state| {
                let target = state.space_mut(space)?;
                validate_row(space, &target.definition.format, &row)?;
                let key = target.primary_key(&row)?;
                target.rows.insert(key, row.clone());
                Ok(row)
            })
            .await?;

        decode(space, stored)
    }

    /// Removes the record and returns its prior value, if any.
    pub async fn delete<T: DeserializeOwned>(
        &self,
        space: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let removed = self
            .mutate(|state| Ok(state.space_mut(space)?.rows.remove(key)))
            .await?;

        removed.map(|row| decode(space, row)).transpose()
    }

    fn load_state(path: &Path) -> Result<StoreState, StoreError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(value) => value,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoreState::default());
            }
            Err(error) => {
                return Err(StoreError::Persistence {
                    message: format!("failed to read store snapshot {}: {error}", path.display()),
                });
            }
        };

        serde_json::from_str::<StoreState>(&raw).map_err(|error| StoreError::Persistence {
            message: format!("failed to parse store snapshot {}: {error}", path.display()),
        })
    }

    async fn persist_state(&self, snapshot: &StoreState) -> Result<(), StoreError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| StoreError::Persistence {
                    message: format!("failed to prepare store directory: {error}"),
                })?;
        }

        let payload = serde_json::to_vec(snapshot).map_err(|error| StoreError::Persistence {
            message: format!("failed to encode store snapshot: {error}"),
        })?;

        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&temp_path, payload)
            .await
            .map_err(|error| StoreError::Persistence {
                message: format!("failed to write store snapshot: {error}"),
            })?;

        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|error| StoreError::Persistence {
                message: format!("failed to finalize store snapshot: {error}"),
            })?;

        Ok(())
    }

    /// Applies `operation` to a draft under the write lock and swaps it in
    /// only after the snapshot lands, so snapshots follow commit order and a
    /// failed write leaves the live state untouched.
    async fn mutate<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut StoreState) -> Result<T, StoreError>,
    {
        let mut state = self.state.write().await;
        let mut draft = state.clone();
        let result = operation(&mut draft)?;

        if let Err(error) = self.persist_state(&draft).await {
            tracing::error!(
                target: "partner_match.store",
                error = %error,
                "failed to persist store snapshot",
            );
            return Err(error);
        }

        *state = draft;
        Ok(result)
    }
}

fn encode<T: Serialize>(space: &str, record: &T) -> Result<Map<String, Value>, StoreError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(_) => Err(StoreError::FormatViolation {
            space: space.to_string(),
            field: "*".to_string(),
            message: "record must serialize to a map".to_string(),
        }),
        Err(source) => Err(StoreError::Encode {
            space: space.to_string(),
            source,
        }),
    }
}

fn decode<T: DeserializeOwned>(space: &str, row: Map<String, Value>) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(row)).map_err(|source| StoreError::Decode {
        space: space.to_string(),
        source,
    })
}
