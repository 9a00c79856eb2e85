// # cfsync-core
//
// Core library for keeping DNS records and IP lists in step with the
// host's public addresses.
//
// ## Architecture Overview
//
// - **IpSource**: Trait for detecting the public address of a family
// - **RemoteApi**: Trait for the provider's zone, record and IP list endpoints
// - **Caches / Handle**: TTL caches in front of the RemoteApi, kept coherent
//   with every mutation
// - **Setter**: Converges one domain/family or one IP list per call
// - **SyncEngine**: Detects addresses and drives the Setter periodically
//
// ## Design Principles
//
// 1. **Library-First**: The daemon only wires configuration to these types
// 2. **Minimal Mutation**: Reuse what exists before creating anything
// 3. **Local Failure**: One failing domain or list never blocks the others

pub mod cache;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod handle;
pub mod ip;
pub mod setter;
pub mod traits;

// Re-export core types for convenience
pub use cache::{Caches, TtlCache};
pub use config::{CacheConfig, EngineConfig, ProviderConfig, SyncConfig, WafListConfig};
pub use domain::Domain;
pub use engine::{EngineEvent, SyncEngine};
pub use error::{Error, Result};
pub use handle::Handle;
pub use ip::{IpFamily, IpPrefix};
pub use setter::{DetectedIps, Outcome, Report, Setter, Subject};
pub use traits::{DnsRecord, IpSource, RecordAttrs, RemoteApi, WafList, WafListItem, Zone, ZoneStatus};
