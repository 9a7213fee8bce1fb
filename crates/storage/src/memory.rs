use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use shared::domain::{Address, AddressId, AddressPatch, NewAddress, UserId};
use tokio::sync::RwLock;

use crate::{AddressFilter, AddressStore};

/// Process-local backend. Records live for the lifetime of the value.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<Address>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AddressStore for MemoryStore {
    async fn create(&self, record: NewAddress) -> Result<Address> {
        let address = record.into_address(AddressId::generate(), Utc::now());
        self.records.write().await.push(address.clone());
        Ok(address)
    }

    async fn find_all(&self, filter: Option<AddressFilter>) -> Result<Vec<Address>> {
        let filter = filter.unwrap_or_default();
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|address| filter.matches(address))
            .cloned()
            .collect())
    }

    async fn find_one(&self, filter: AddressFilter) -> Result<Option<Address>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|address| filter.matches(address))
            .cloned())
    }

    async fn find_by_id(&self, id: AddressId) -> Result<Option<Address>> {
        self.find_one(AddressFilter::by_id(id)).await
    }

    async fn update(&self, filter: AddressFilter, patch: AddressPatch) -> Result<u64> {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let mut touched = 0;
        for address in records.iter_mut().filter(|address| filter.matches(address)) {
            address.apply(&patch);
            address.updated_at = now;
            touched += 1;
        }
        Ok(touched)
    }

    async fn update_record(&self, id: AddressId, patch: AddressPatch) -> Result<Option<Address>> {
        let mut records = self.records.write().await;
        let Some(address) = records.iter_mut().find(|address| address.id == id) else {
            return Ok(None);
        };
        if address.apply(&patch) {
            address.updated_at = Utc::now();
        }
        Ok(Some(address.clone()))
    }

    async fn destroy(&self, id: AddressId) -> Result<bool> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|address| address.id != id);
        Ok(records.len() != before)
    }

    async fn set_primary(&self, owner_id: &UserId, id: AddressId) -> Result<bool> {
        let mut records = self.records.write().await;
        let owned = records
            .iter()
            .any(|address| address.id == id && &address.owner_id == owner_id);
        if !owned {
            return Ok(false);
        }

        let now = Utc::now();
        for address in records.iter_mut().filter(|a| &a.owner_id == owner_id) {
            let flag = address.id == id;
            if address.is_primary != flag {
                address.is_primary = flag;
                address.updated_at = now;
            }
        }
        Ok(true)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
