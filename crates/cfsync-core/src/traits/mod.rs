//! Core traits for cfsync
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`RemoteApi`]: Raw calls to the DNS provider's management API
//! - [`IpSource`]: Detect the current public address per family

pub mod ip_source;
pub mod remote_api;

pub use ip_source::IpSource;
pub use remote_api::{
    DnsRecord, RecordAttrs, RemoteApi, WafList, WafListItem, Zone, ZoneStatus,
};
