//! Zone resolution
//!
//! Finds the zone owning a domain by querying successively shorter suffixes
//! of its name until one of them names exactly one usable zone.

use tracing::{debug, warn};

use super::Handle;
use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::traits::{Zone, ZoneStatus};

impl Handle {
    /// List zones named exactly `name`, through the cache
    pub async fn list_zones(&self, name: &str) -> Result<Vec<Zone>> {
        let key = name.to_string();
        if let Some(zones) = self.caches.zones_by_name.get(&key).await {
            debug!(zone_name = %name, "zone list cache hit");
            return Ok(zones);
        }

        let zones = self.api.list_zones(name).await?;
        self.caches.zones_by_name.set(key, zones.clone()).await;
        Ok(zones)
    }

    /// Find the ID of the zone that owns `domain`
    ///
    /// Zones marked deleted are ignored. Zones in any other non-active state
    /// are used but reported. Two or more usable zones with the same name
    /// make the lookup fail: the account configuration is ambiguous.
    pub async fn zone_of(&self, domain: &Domain) -> Result<String> {
        if let Some(zone_id) = self.caches.zone_of_domain.get(domain).await {
            debug!(domain = %domain, zone_id = %zone_id, "zone cache hit");
            return Ok(zone_id);
        }

        for zone_name in domain.zone_candidates() {
            let zones = self.list_zones(zone_name).await?;
            let candidates = usable_zones(zone_name, zones);

            match candidates.as_slice() {
                [] => continue,
                [zone] => {
                    debug!(domain = %domain, zone = %zone.name, zone_id = %zone.id, "resolved zone");
                    self.caches
                        .zone_of_domain
                        .set(domain.clone(), zone.id.clone())
                        .await;
                    return Ok(zone.id.clone());
                }
                many => {
                    return Err(Error::AmbiguousZone {
                        zone_name: zone_name.to_string(),
                        count: many.len(),
                    });
                }
            }
        }

        Err(Error::ZoneNotFound(domain.describe()))
    }
}

/// Drop deleted zones and warn about the other non-active ones
fn usable_zones(zone_name: &str, zones: Vec<Zone>) -> Vec<Zone> {
    zones
        .into_iter()
        .filter(|zone| match &zone.status {
            ZoneStatus::Active => true,
            ZoneStatus::Deleted => {
                debug!(zone = %zone_name, zone_id = %zone.id, "ignoring deleted zone");
                false
            }
            ZoneStatus::Pending | ZoneStatus::Initializing => {
                warn!(
                    zone = %zone_name, zone_id = %zone.id, status = %zone.status,
                    "zone is not active yet; its records may not be served"
                );
                true
            }
            ZoneStatus::Moved | ZoneStatus::Deactivated => {
                warn!(
                    zone = %zone_name, zone_id = %zone.id, status = %zone.status,
                    "zone is no longer active; its records are likely not served"
                );
                true
            }
            ZoneStatus::Unknown(_) => {
                warn!(
                    zone = %zone_name, zone_id = %zone.id, status = %zone.status,
                    "zone has an unrecognized status"
                );
                true
            }
        })
        .collect()
}
