// # Remote API Trait
//
// Defines the raw, uncached interface to a DNS provider's management API.
//
// ## Implementations
//
// - Cloudflare: `cfsync-cloudflare` crate
//
// ## Usage
//
// Reconcilers never talk to a `RemoteApi` directly. It is wrapped in a
// [`Handle`](crate::handle::Handle), which owns the caches and keeps them
// consistent with the outcome of every mutation:
//
// ```rust,ignore
// use cfsync_core::{Handle, config::CacheConfig};
// use std::sync::Arc;
//
// let api = Arc::new(/* RemoteApi implementation */);
// let handle = Handle::new(api, &CacheConfig::default());
// let zone_id = handle.zone_of(&domain).await?;
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::domain::Domain;
use crate::error::Result;
use crate::ip::{IpFamily, IpPrefix};

/// Status of a zone at the provider
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ZoneStatus {
    Active,
    Pending,
    Initializing,
    Moved,
    Deactivated,
    Deleted,
    /// Any status string this crate does not know about
    Unknown(String),
}

impl ZoneStatus {
    /// Map a provider status string; unknown strings are kept verbatim
    pub fn parse(status: &str) -> Self {
        match status {
            "active" => ZoneStatus::Active,
            "pending" => ZoneStatus::Pending,
            "initializing" => ZoneStatus::Initializing,
            "moved" => ZoneStatus::Moved,
            "deactivated" => ZoneStatus::Deactivated,
            "deleted" => ZoneStatus::Deleted,
            other => ZoneStatus::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ZoneStatus::Active => "active",
            ZoneStatus::Pending => "pending",
            ZoneStatus::Initializing => "initializing",
            ZoneStatus::Moved => "moved",
            ZoneStatus::Deactivated => "deactivated",
            ZoneStatus::Deleted => "deleted",
            ZoneStatus::Unknown(s) => s,
        };
        f.write_str(s)
    }
}

/// A zone returned by a zone-name query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    /// Provider-assigned zone ID
    pub id: String,
    /// Zone name, e.g. `example.com`
    pub name: String,
    /// Provider-side status
    pub status: ZoneStatus,
}

/// Attributes carried by a DNS record besides its address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAttrs {
    /// Time-to-live in seconds; `1` means "automatic" at Cloudflare
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Whether traffic is proxied through the provider
    #[serde(default)]
    pub proxied: bool,

    /// Free-form record comment
    #[serde(default)]
    pub comment: String,
}

impl Default for RecordAttrs {
    fn default() -> Self {
        Self {
            ttl: default_ttl(),
            proxied: false,
            comment: String::new(),
        }
    }
}

fn default_ttl() -> u32 {
    1
}

/// An A or AAAA record as listed by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    /// Provider-assigned record ID
    pub id: String,
    /// Record content; the family always matches the record type
    pub ip: IpAddr,
    /// TTL, proxy flag and comment
    pub attrs: RecordAttrs,
}

/// An account-scoped IP list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WafList {
    /// Provider-assigned list ID
    pub id: String,
    /// List name, unique per account
    pub name: String,
    /// List description
    pub description: String,
    /// List kind (`ip`, `asn`, `hostname`, ...)
    pub kind: String,
}

impl WafList {
    /// Only IP lists are managed; other kinds are invisible to the reconcilers
    pub fn is_ip_list(&self) -> bool {
        self.kind == "ip"
    }
}

/// One entry of an IP list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WafListItem {
    /// Provider-assigned item ID
    pub id: String,
    /// The prefix this item covers
    pub prefix: IpPrefix,
}

/// Trait for DNS provider API implementations
///
/// Every method is a single remote call (or, for the bulk list-item
/// operations, a single logical operation the provider completes
/// asynchronously). Implementations must not cache, retry, or decide whether
/// a change is needed: caching belongs to [`Handle`](crate::handle::Handle),
/// retrying belongs to the next sync cycle, and convergence decisions belong
/// to the [`Setter`](crate::setter::Setter).
///
/// Dropping a returned future abandons the call; the caller then treats the
/// remote state as unknown.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// List zones named exactly `name`, whatever their status
    async fn list_zones(&self, name: &str) -> Result<Vec<Zone>>;

    /// List the records of `family` for `domain` in `zone_id`, in provider order
    ///
    /// A record whose content is not an address of `family` is a data
    /// integrity error ([`Error::InvalidRecord`](crate::Error::InvalidRecord)).
    async fn list_records(
        &self,
        zone_id: &str,
        domain: &Domain,
        family: IpFamily,
    ) -> Result<Vec<DnsRecord>>;

    /// Create a record and return it as stored
    async fn create_record(
        &self,
        zone_id: &str,
        domain: &Domain,
        family: IpFamily,
        ip: IpAddr,
        attrs: &RecordAttrs,
    ) -> Result<DnsRecord>;

    /// Change only the address of an existing record
    ///
    /// TTL, proxy flag and comment must be left as they are.
    async fn update_record(
        &self,
        zone_id: &str,
        domain: &Domain,
        family: IpFamily,
        record_id: &str,
        ip: IpAddr,
    ) -> Result<()>;

    /// Delete a record by ID
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()>;

    /// List all lists of an account (all kinds)
    async fn list_lists(&self, account_id: &str) -> Result<Vec<WafList>>;

    /// Create an empty IP list
    async fn create_list(
        &self,
        account_id: &str,
        name: &str,
        description: &str,
    ) -> Result<WafList>;

    /// Delete a list and all of its items
    async fn delete_list(&self, account_id: &str, list_id: &str) -> Result<()>;

    /// List all items of a list
    async fn list_list_items(&self, account_id: &str, list_id: &str) -> Result<Vec<WafListItem>>;

    /// Add prefixes to a list and return the created items
    async fn create_list_items(
        &self,
        account_id: &str,
        list_id: &str,
        prefixes: &[IpPrefix],
        comment: &str,
    ) -> Result<Vec<WafListItem>>;

    /// Remove items from a list
    async fn delete_list_items(
        &self,
        account_id: &str,
        list_id: &str,
        item_ids: &[String],
    ) -> Result<()>;

    /// Start replacing the whole content of a list
    ///
    /// Returns once the provider has accepted the operation, without waiting
    /// for it to complete.
    async fn replace_list_items(
        &self,
        account_id: &str,
        list_id: &str,
        prefixes: &[IpPrefix],
    ) -> Result<()>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
