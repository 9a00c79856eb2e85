// # IP Source Trait
//
// Defines the interface for detecting the current public address of each
// family.
//
// ## Implementations
//
// - HTTP-based: `cfsync-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use cfsync_core::{IpSource, IpFamily};
//
// let source = /* IpSource implementation */;
// let ip = source.detect(IpFamily::V4).await?;
// ```

use async_trait::async_trait;
use std::net::IpAddr;

use crate::ip::IpFamily;

/// Trait for IP source implementations
///
/// Sources are observers: they report an address and nothing else. They do
/// not retry, schedule, or decide whether DNS must change. The engine bounds
/// every call with its detection timeout and validates the result, so an
/// implementation may return any address it sees.
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Detect the current public address of `family`
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: The detected address
    /// - `Err(Error)`: If detection failed; the family is then treated as unknown
    async fn detect(&self, family: IpFamily) -> Result<IpAddr, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn name(&self) -> &'static str;
}
