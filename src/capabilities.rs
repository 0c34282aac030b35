//! Capability interfaces for collaborators the pipeline does not ship.
//!
//! Item CRUD and request authorization live outside this crate; these traits
//! are the seams their implementations plug into.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// A JSON item keyed by a string id.
pub type Item = Map<String, Value>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyValueError {
    #[error("item {0} not found")]
    NotFound(String),
    #[error("invalid item - {0}")]
    Invalid(String),
    #[error("key-value backend failure - {0}")]
    Backend(String),
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Item>, KeyValueError>;

    async fn put(&self, id: &str, item: Item) -> Result<(), KeyValueError>;

    /// Merges `changes` into the existing item and returns the updated item.
    async fn update(&self, id: &str, changes: Item) -> Result<Item, KeyValueError>;

    async fn delete(&self, id: &str) -> Result<(), KeyValueError>;

    /// Every item whose `field` equals `value`.
    async fn scan(&self, field: &str, value: &Value) -> Result<Vec<Item>, KeyValueError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unauthorized")]
pub struct Unauthorized;

pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Principal, Unauthorized>;
}
