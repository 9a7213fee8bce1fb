use std::{fmt, str::FromStr, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use shared::domain::{Address, AddressId, AddressPatch, NewAddress, UserId};
use thiserror::Error;
use tracing::info;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Conjunctive match over address columns. An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressFilter {
    pub id: Option<AddressId>,
    pub owner_id: Option<UserId>,
    pub is_primary: Option<bool>,
}

impl AddressFilter {
    pub fn by_id(id: AddressId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn by_owner(owner_id: UserId) -> Self {
        Self {
            owner_id: Some(owner_id),
            ..Self::default()
        }
    }

    pub fn primary_of(owner_id: UserId) -> Self {
        Self {
            owner_id: Some(owner_id),
            is_primary: Some(true),
            ..Self::default()
        }
    }

    pub fn matches(&self, address: &Address) -> bool {
        self.id.map_or(true, |id| address.id == id)
            && self
                .owner_id
                .as_ref()
                .map_or(true, |owner| &address.owner_id == owner)
            && self
                .is_primary
                .map_or(true, |flag| address.is_primary == flag)
    }
}

/// Persistence contract for address records. Implementations must be safe to
/// share across request tasks.
#[async_trait]
pub trait AddressStore: Send + Sync {
    async fn create(&self, record: NewAddress) -> Result<Address>;

    /// Records matching `filter` (all records when `None`), oldest first.
    async fn find_all(&self, filter: Option<AddressFilter>) -> Result<Vec<Address>>;

    async fn find_one(&self, filter: AddressFilter) -> Result<Option<Address>>;

    async fn find_by_id(&self, id: AddressId) -> Result<Option<Address>>;

    /// Applies `patch` to every matching record and returns the number touched.
    async fn update(&self, filter: AddressFilter, patch: AddressPatch) -> Result<u64>;

    /// Merges `patch` into one record and returns it, or `None` if it does not exist.
    async fn update_record(&self, id: AddressId, patch: AddressPatch) -> Result<Option<Address>>;

    /// Removes one record. Returns `false` if it did not exist.
    async fn destroy(&self, id: AddressId) -> Result<bool>;

    /// Clears the owner's primary flag and sets it on `id` as one atomic step.
    /// Returns `false`, leaving state untouched, when `id` is not owned by `owner_id`.
    async fn set_primary(&self, owner_id: &UserId, id: AddressId) -> Result<bool>;

    async fn health_check(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Sqlite => f.write_str("sqlite"),
            StoreBackend::Memory => f.write_str("memory"),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown store backend '{0}' (expected 'sqlite' or 'memory')")]
pub struct ParseStoreBackendError(pub String);

impl FromStr for StoreBackend {
    type Err = ParseStoreBackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sql" => Ok(StoreBackend::Sqlite),
            "memory" | "mem" | "in-memory" => Ok(StoreBackend::Memory),
            other => Err(ParseStoreBackendError(other.to_string())),
        }
    }
}

/// Opens the configured backend once at startup. `database_url` is ignored by
/// the in-memory backend.
pub async fn open_store(
    backend: StoreBackend,
    database_url: &str,
) -> Result<Arc<dyn AddressStore>> {
    let store: Arc<dyn AddressStore> = match backend {
        StoreBackend::Sqlite => Arc::new(SqliteStore::new(database_url).await?),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    info!(%backend, "address store ready");
    Ok(store)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
