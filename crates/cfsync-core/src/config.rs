//! Configuration types for cfsync
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::domain::Domain;
use crate::ip::IpFamily;
use crate::traits::RecordAttrs;

/// Main cfsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// DNS provider configuration
    pub provider: ProviderConfig,

    /// Address families whose public address is detected and published
    #[serde(default = "default_families")]
    pub families: Vec<IpFamily>,

    /// Domains to manage, per family
    #[serde(default)]
    pub domains: BTreeMap<IpFamily, Vec<Domain>>,

    /// IP lists to manage
    #[serde(default)]
    pub waf_lists: Vec<WafListConfig>,

    /// Attributes for newly created records
    #[serde(default)]
    pub record_attrs: RecordAttrs,

    /// Cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Create a configuration with defaults and nothing to manage
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            families: default_families(),
            domains: BTreeMap::new(),
            waf_lists: Vec::new(),
            record_attrs: RecordAttrs::default(),
            cache: CacheConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Domains of `family`, empty if none are configured
    pub fn domains_of(&self, family: IpFamily) -> &[Domain] {
        self.domains.get(&family).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.provider.validate()?;

        let managed_domains = self
            .families
            .iter()
            .map(|family| self.domains_of(*family).len())
            .sum::<usize>();
        if managed_domains == 0 && self.waf_lists.is_empty() {
            return Err(crate::Error::config(
                "Nothing to manage: no domains for the enabled families and no IP lists",
            ));
        }

        for family in self.domains.keys() {
            if !self.families.contains(family) && !self.domains_of(*family).is_empty() {
                return Err(crate::Error::config(format!(
                    "Domains are configured for {} but {} detection is disabled",
                    family, family
                )));
            }
        }

        if self.record_attrs.ttl != 1 && !(30..=86400).contains(&self.record_attrs.ttl) {
            return Err(crate::Error::config(format!(
                "TTL must be 1 (automatic) or between 30 and 86400 seconds. Got: {}",
                self.record_attrs.ttl
            )));
        }

        for list in &self.waf_lists {
            list.validate()?;
        }

        self.engine.validate()?;

        Ok(())
    }
}

fn default_families() -> Vec<IpFamily> {
    IpFamily::ALL.to_vec()
}

/// DNS provider configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
        /// Perform reads but only log mutations
        #[serde(default)]
        dry_run: bool,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare { api_token, .. } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                Ok(())
            }
        }
    }
}

// Keeps the API token out of logs
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Cloudflare { dry_run, .. } => f
                .debug_struct("Cloudflare")
                .field("api_token", &"<REDACTED>")
                .field("dry_run", dry_run)
                .finish(),
        }
    }
}

/// A managed IP list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WafListConfig {
    /// Account owning the list
    pub account_id: String,

    /// List name (Cloudflare allows lowercase letters, digits and underscores)
    pub name: String,

    /// Description used when the list has to be created
    #[serde(default)]
    pub description: String,

    /// Comment attached to every item added to the list
    #[serde(default)]
    pub item_comment: String,
}

impl WafListConfig {
    /// Create a list reference with empty description and item comment
    pub fn new(account_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            name: name.into(),
            description: String::new(),
            item_comment: String::new(),
        }
    }

    /// Set the description used on creation
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the comment attached to created items
    pub fn with_item_comment(mut self, comment: impl Into<String>) -> Self {
        self.item_comment = comment.into();
        self
    }

    /// `account/name`, the form used in logs and reports
    pub fn describe(&self) -> String {
        format!("{}/{}", self.account_id, self.name)
    }

    /// Validate the list reference
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.account_id.is_empty() {
            return Err(crate::Error::config(format!(
                "IP list {:?} has no account ID",
                self.name
            )));
        }

        if self.name.is_empty()
            || self.name.len() > 50
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(crate::Error::config(format!(
                "IP list name {:?} is invalid. \
                Use up to 50 lowercase letters, digits and underscores.",
                self.name
            )));
        }

        Ok(())
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of every cache entry (in seconds); 0 disables caching
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl CacheConfig {
    /// Lifetime of every cache entry
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    6 * 60 * 60
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between sync cycles (in seconds)
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,

    /// Upper bound for detecting one family's address (in seconds)
    #[serde(default = "default_detection_timeout_secs")]
    pub detection_timeout_secs: u64,

    /// Upper bound for reconciling one domain or list (in seconds)
    #[serde(default = "default_update_timeout_secs")]
    pub update_timeout_secs: u64,

    /// Run a cycle immediately instead of waiting one interval
    #[serde(default = "default_true")]
    pub update_on_start: bool,

    /// Remove managed records and lists on shutdown
    #[serde(default)]
    pub delete_on_stop: bool,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn detection_timeout(&self) -> Duration {
        Duration::from_secs(self.detection_timeout_secs)
    }

    pub fn update_timeout(&self) -> Duration {
        Duration::from_secs(self.update_timeout_secs)
    }

    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.update_interval_secs == 0 {
            return Err(crate::Error::config("Update interval must be > 0"));
        }
        if self.detection_timeout_secs == 0 {
            return Err(crate::Error::config("Detection timeout must be > 0"));
        }
        if self.update_timeout_secs == 0 {
            return Err(crate::Error::config("Update timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval_secs(),
            detection_timeout_secs: default_detection_timeout_secs(),
            update_timeout_secs: default_update_timeout_secs(),
            update_on_start: true,
            delete_on_stop: false,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_update_interval_secs() -> u64 {
    5 * 60
}

fn default_detection_timeout_secs() -> u64 {
    5
}

fn default_update_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_event_channel_capacity() -> usize {
    1000
}
