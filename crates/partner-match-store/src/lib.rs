//! Single-node document store backing the partner match service.
//!
//! Data lives in named spaces keyed by a unique primary index. Schema changes
//! are made through a [`Catalog`] handed out by [`Store::once`], which records
//! a durable marker so a given change is applied at most once per database.

pub mod catalog;
pub mod error;
pub mod store;

pub use catalog::{
    Catalog, FieldSpec, FieldType, IndexSpec, Privilege, SpaceDefinition, SpaceEngine,
    SpaceOptions, UserRecord,
};
pub use error::StoreError;
pub use store::Store;
