//! Cached access to the remote API
//!
//! [`Handle`] wraps a [`RemoteApi`] together with the [`Caches`] in front of
//! it. Reads go through the cache; every mutation is forwarded live and its
//! outcome decides what happens to the cached copy:
//!
//! | outcome | cached entry |
//! |---------|--------------|
//! | success, new value derivable | patched in place |
//! | failure (effect unknown)     | invalidated      |
//!
//! The handle never retries and never decides whether a change is needed;
//! that belongs to the [`Setter`](crate::setter::Setter).

mod lists;
mod zone;

use std::net::IpAddr;
use std::sync::Arc;

use tracing::debug;

use crate::cache::{Caches, RecordsKey};
use crate::config::CacheConfig;
use crate::domain::Domain;
use crate::error::Result;
use crate::ip::IpFamily;
use crate::traits::{DnsRecord, RecordAttrs, RemoteApi};

/// A remote API with its caches
pub struct Handle {
    api: Arc<dyn RemoteApi>,
    caches: Caches,
}

impl Handle {
    /// Wrap `api` with empty caches
    pub fn new(api: Arc<dyn RemoteApi>, config: &CacheConfig) -> Self {
        Self {
            api,
            caches: Caches::new(config),
        }
    }

    /// Name of the wrapped provider
    pub fn provider_name(&self) -> &'static str {
        self.api.provider_name()
    }

    /// The caches, for inspection
    pub fn caches(&self) -> &Caches {
        &self.caches
    }

    /// Forget everything cached so the next reads are live
    pub async fn flush_cache(&self) {
        self.caches.flush().await;
    }

    /// List the records of `family` for `domain`, through the cache
    pub async fn list_records(
        &self,
        zone_id: &str,
        domain: &Domain,
        family: IpFamily,
    ) -> Result<Vec<DnsRecord>> {
        let key = records_key(zone_id, domain, family);
        if let Some(records) = self.caches.records.get(&key).await {
            debug!(domain = %domain, family = %family, "record list cache hit");
            return Ok(records);
        }

        let records = self.api.list_records(zone_id, domain, family).await?;
        self.caches.records.set(key, records.clone()).await;
        Ok(records)
    }

    /// Drop the cached records of `family` for `domain` in `zone_id`
    pub async fn invalidate_records(&self, zone_id: &str, domain: &Domain, family: IpFamily) {
        self.caches
            .records
            .invalidate(&records_key(zone_id, domain, family))
            .await;
    }

    /// Create a record; on success it is appended to the cached listing
    pub async fn create_record(
        &self,
        zone_id: &str,
        domain: &Domain,
        family: IpFamily,
        ip: IpAddr,
        attrs: &RecordAttrs,
    ) -> Result<DnsRecord> {
        let key = records_key(zone_id, domain, family);
        match self
            .api
            .create_record(zone_id, domain, family, ip, attrs)
            .await
        {
            Ok(record) => {
                let created = record.clone();
                self.caches
                    .records
                    .update(&key, move |records| records.push(created))
                    .await;
                Ok(record)
            }
            Err(e) => {
                self.caches.records.invalidate(&key).await;
                Err(e)
            }
        }
    }

    /// Change the address of a record; on success the cached copy is patched
    pub async fn update_record(
        &self,
        zone_id: &str,
        domain: &Domain,
        family: IpFamily,
        record_id: &str,
        ip: IpAddr,
    ) -> Result<()> {
        let key = records_key(zone_id, domain, family);
        match self
            .api
            .update_record(zone_id, domain, family, record_id, ip)
            .await
        {
            Ok(()) => {
                self.caches
                    .records
                    .update(&key, |records| {
                        for record in records.iter_mut().filter(|r| r.id == record_id) {
                            record.ip = ip;
                        }
                    })
                    .await;
                Ok(())
            }
            Err(e) => {
                self.caches.records.invalidate(&key).await;
                Err(e)
            }
        }
    }

    /// Delete a record; on success it is removed from the cached listing
    pub async fn delete_record(
        &self,
        zone_id: &str,
        domain: &Domain,
        family: IpFamily,
        record_id: &str,
    ) -> Result<()> {
        let key = records_key(zone_id, domain, family);
        match self.api.delete_record(zone_id, record_id).await {
            Ok(()) => {
                self.caches
                    .records
                    .update(&key, |records| records.retain(|r| r.id != record_id))
                    .await;
                Ok(())
            }
            Err(e) => {
                self.caches.records.invalidate(&key).await;
                Err(e)
            }
        }
    }
}

fn records_key(zone_id: &str, domain: &Domain, family: IpFamily) -> RecordsKey {
    (zone_id.to_string(), domain.clone(), family)
}
