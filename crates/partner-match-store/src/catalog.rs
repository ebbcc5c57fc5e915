//! Space, index and account definitions plus the DDL handle used inside
//! [`Store::once`](crate::Store::once).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{Space, StoreState};

/// Storage policy for a space.
///
/// `Memory` favours low-latency reads for small, hot reference data.
/// `LogStructured` favours append-heavy workloads that grow with traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceEngine {
    Memory,
    LogStructured,
}

impl SpaceEngine {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::LogStructured => "log_structured",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Uuid,
    String,
    Map,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub parts: Vec<String>,
    pub unique: bool,
}

impl IndexSpec {
    /// Unique index named `primary` over the given fields.
    pub fn primary(parts: &[&str]) -> Self {
        Self {
            name: "primary".to_string(),
            parts: parts.iter().map(|part| (*part).to_string()).collect(),
            unique: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceDefinition {
    pub name: String,
    pub engine: SpaceEngine,
    pub owner: Option<String>,
    pub format: Vec<FieldSpec>,
    pub indexes: Vec<IndexSpec>,
    pub created_at: DateTime<Utc>,
}

impl SpaceDefinition {
    /// The first index of a space is its primary index.
    pub fn primary_index(&self) -> Option<&IndexSpec> {
        self.indexes.first()
    }
}

#[derive(Debug, Clone)]
pub struct SpaceOptions {
    pub engine: SpaceEngine,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    Read,
    Write,
    Execute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    pub password_sha256: String,
    pub grants: BTreeMap<String, BTreeSet<Privilege>>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn has_privilege(&self, object: &str, privilege: Privilege) -> bool {
        self.grants
            .get(object)
            .is_some_and(|granted| granted.contains(&privilege))
    }

    pub fn password_matches(&self, password: &str) -> bool {
        self.password_sha256 == password_digest(password)
    }
}

/// Mutable view over the schema catalog. Every change made through it is
/// committed together with the run-once marker that guards it.
pub struct Catalog<'a> {
    state: &'a mut StoreState,
}

impl<'a> Catalog<'a> {
    pub(crate) fn new(state: &'a mut StoreState) -> Self {
        Self { state }
    }

    pub fn space(&self, name: &str) -> Option<&SpaceDefinition> {
        self.state.spaces.get(name).map(|space| &space.definition)
    }

    /// Creates the space unless it already exists. Returns whether it was created.
    pub fn create_space(&mut self, name: &str, options: SpaceOptions) -> bool {
        if self.state.spaces.contains_key(name) {
            return false;
        }

        self.state.spaces.insert(
            name.to_string(),
            Space {
                definition: SpaceDefinition {
                    name: name.to_string(),
                    engine: options.engine,
                    owner: options.owner,
                    format: Vec::new(),
                    indexes: Vec::new(),
                    created_at: Utc::now(),
                },
                rows: BTreeMap::new(),
            },
        );
        true
    }

    pub fn set_format(&mut self, name: &str, format: Vec<FieldSpec>) -> Result<(), StoreError> {
        let space = self
            .state
            .spaces
            .get_mut(name)
            .ok_or_else(|| StoreError::NoSuchSpace {
                space: name.to_string(),
            })?;

        for row in space.rows.values() {
            validate_row(name, &format, row)?;
        }
        for index in &space.definition.indexes {
            ensure_parts_declared(name, &format, index)?;
        }

        space.definition.format = format;
        Ok(())
    }

    /// Creates the index unless one with the same name exists. The first index
    /// of a space must be unique.
    pub fn create_index(&mut self, name: &str, index: IndexSpec) -> Result<bool, StoreError> {
        let space = self
            .state
            .spaces
            .get_mut(name)
            .ok_or_else(|| StoreError::NoSuchSpace {
                space: name.to_string(),
            })?;

        if space
            .definition
            .indexes
            .iter()
            .any(|existing| existing.name == index.name)
        {
            return Ok(false);
        }

        if index.parts.is_empty() {
            return Err(StoreError::InvalidIndex {
                space: name.to_string(),
                index: index.name,
                message: "index must have at least one part".to_string(),
            });
        }
        if space.definition.indexes.is_empty() && !index.unique {
            return Err(StoreError::InvalidIndex {
                space: name.to_string(),
                index: index.name,
                message: "primary index must be unique".to_string(),
            });
        }
        ensure_parts_declared(name, &space.definition.format, &index)?;

        space.definition.indexes.push(index);
        Ok(true)
    }

    /// Drops the space and its rows. Returns whether it existed.
    pub fn drop_space(&mut self, name: &str) -> bool {
        self.state.spaces.remove(name).is_some()
    }

    /// Creates a login unless one with the same name exists.
    pub fn create_user(&mut self, name: &str, password: &str) -> bool {
        if self.state.users.contains_key(name) {
            return false;
        }

        self.state.users.insert(
            name.to_string(),
            UserRecord {
                name: name.to_string(),
                password_sha256: password_digest(password),
                grants: BTreeMap::new(),
                created_at: Utc::now(),
            },
        );
        true
    }

    pub fn grant(
        &mut self,
        user: &str,
        privileges: &[Privilege],
        object: &str,
    ) -> Result<(), StoreError> {
        let record = self
            .state
            .users
            .get_mut(user)
            .ok_or_else(|| StoreError::NoSuchUser {
                user: user.to_string(),
            })?;

        record
            .grants
            .entry(object.to_string())
            .or_default()
            .extend(privileges.iter().copied());
        Ok(())
    }

    /// Forgets a run-once marker so its guarded body may run again.
    pub fn delete_marker(&mut self, marker: &str) -> bool {
        self.state.markers.remove(marker)
    }
}

pub(crate) fn validate_row(
    space: &str,
    format: &[FieldSpec],
    row: &Map<String, Value>,
) -> Result<(), StoreError> {
    for field in format {
        let violation = |message: &str| StoreError::FormatViolation {
            space: space.to_string(),
            field: field.name.clone(),
            message: message.to_string(),
        };

        let value = match row.get(&field.name) {
            Some(Value::Null) | None => return Err(violation("value is required")),
            Some(value) => value,
        };

        match field.field_type {
            FieldType::Uuid => {
                let raw = value.as_str().ok_or_else(|| violation("expected uuid"))?;
                Uuid::parse_str(raw).map_err(|_| violation("expected uuid"))?;
            }
            FieldType::String => {
                if !value.is_string() {
                    return Err(violation("expected string"));
                }
            }
            FieldType::Map => {
                if !value.is_object() {
                    return Err(violation("expected map"));
                }
            }
        }
    }

    Ok(())
}

fn ensure_parts_declared(
    space: &str,
    format: &[FieldSpec],
    index: &IndexSpec,
) -> Result<(), StoreError> {
    if format.is_empty() {
        return Ok(());
    }

    for part in &index.parts {
        if !format.iter().any(|field| field.name == *part) {
            return Err(StoreError::InvalidIndex {
                space: space.to_string(),
                index: index.name.clone(),
                message: format!("part '{part}' is not a declared field"),
            });
        }
    }

    Ok(())
}

fn password_digest(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}
