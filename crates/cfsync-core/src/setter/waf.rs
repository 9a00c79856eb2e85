//! IP list reconciliation

use std::collections::BTreeMap;
use std::net::IpAddr;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Outcome, Report, Setter, Subject, stop_requested};
use crate::config::WafListConfig;
use crate::ip::{IpFamily, IpPrefix};
use crate::traits::WafListItem;

/// Detection results per family
///
/// A family missing from the map is not managed: the list should hold none
/// of its prefixes. `None` means detection failed: the list content for that
/// family is left alone.
pub type DetectedIps = BTreeMap<IpFamily, Option<IpAddr>>;

/// What to do with the items of one family
#[derive(Debug, Clone, Copy)]
enum FamilyPlan {
    /// Keep only items covering this address
    Cover(IpAddr),
    /// Address unknown; touch nothing
    Preserve,
    /// Family not managed; remove everything
    Clear,
}

fn plan_for(detected: &DetectedIps, family: IpFamily) -> FamilyPlan {
    match detected.get(&family) {
        None => FamilyPlan::Clear,
        Some(Some(ip)) if family.matches(ip) => FamilyPlan::Cover(*ip),
        Some(_) => FamilyPlan::Preserve,
    }
}

impl Setter {
    /// Make an IP list hold exactly the detected addresses
    ///
    /// The list is created when missing. An item whose prefix contains the
    /// detected address of its family is left alone; other items of that
    /// family are removed, and the address is added as a `/32` (IPv4) or
    /// `/64` (IPv6) prefix when nothing covers it. New prefixes are added
    /// before stale ones are removed, each in one batch.
    pub async fn set_list(
        &self,
        list: &WafListConfig,
        detected: &DetectedIps,
        cancel: &CancellationToken,
    ) -> Report {
        let subject = Subject::List {
            list: list.describe(),
        };

        if stop_requested(cancel) {
            return Report::cancelled(subject, Outcome::Failed);
        }

        let (waf_list, created) = match self.handle.ensure_list(list).await {
            Ok(found) => found,
            Err(e) => {
                error!(list = %list.describe(), "failed to find or create IP list: {}", e);
                return Report::new(subject, Outcome::Failed);
            }
        };
        if created {
            info!(list = %list.describe(), list_id = %waf_list.id, "created IP list");
        }

        let items = match self.handle.list_list_items(list, &waf_list.id).await {
            Ok(items) => items,
            Err(e) => {
                error!(list = %list.describe(), "failed to list IP list items: {}", e);
                return Report::new(subject, Outcome::Failed);
            }
        };

        let (to_create, to_delete) = diff_items(list, &items, detected);

        if to_create.is_empty() && to_delete.is_empty() {
            debug!(list = %list.describe(), "IP list already up to date");
            let outcome = if created {
                Outcome::Updated
            } else {
                Outcome::Noop
            };
            return Report::new(subject, outcome);
        }

        let mut changed = created;
        let mut failed = false;

        if !to_create.is_empty() {
            match self
                .handle
                .create_list_items(list, &waf_list.id, &to_create)
                .await
            {
                Ok(_) => {
                    for prefix in &to_create {
                        info!(list = %list.describe(), prefix = %prefix, "added prefix to IP list");
                    }
                    changed = true;
                }
                Err(e) => {
                    error!(list = %list.describe(), count = to_create.len(), "failed to add prefixes to IP list: {}", e);
                    // Outdated items stay until the replacements are in
                    return Report::new(subject, Outcome::Failed);
                }
            }
        }

        if !to_delete.is_empty() {
            if stop_requested(cancel) {
                warn!(list = %list.describe(), "cancelled before removing outdated IP list items");
                let outcome = if changed {
                    Outcome::Updated
                } else {
                    Outcome::Failed
                };
                return Report::cancelled(subject, outcome);
            }

            let ids: Vec<String> = to_delete.iter().map(|item| item.id.clone()).collect();
            match self
                .handle
                .delete_list_items(list, &waf_list.id, &ids)
                .await
            {
                Ok(()) => {
                    for item in &to_delete {
                        info!(list = %list.describe(), prefix = %item.prefix, "removed prefix from IP list");
                    }
                    changed = true;
                }
                Err(e) => {
                    error!(list = %list.describe(), count = ids.len(), "failed to remove prefixes from IP list: {}", e);
                    failed = true;
                }
            }
        }

        let outcome = if failed {
            Outcome::Failed
        } else if changed {
            Outcome::Updated
        } else {
            Outcome::Noop
        };
        Report::new(subject, outcome)
    }

    /// Last-run cleanup of an IP list
    ///
    /// Deletes the list. A list still referenced by firewall rules cannot be
    /// deleted; it is then emptied instead, which the provider completes
    /// asynchronously.
    ///
    /// | outcome | meaning |
    /// |---------|---------|
    /// | `Noop` | the list did not exist |
    /// | `Updated` | the list was deleted |
    /// | `Updating` | the list was kept and is being emptied |
    /// | `Failed` | neither deleting nor emptying could be started |
    pub async fn final_clear(&self, list: &WafListConfig, cancel: &CancellationToken) -> Report {
        let subject = Subject::List {
            list: list.describe(),
        };

        if stop_requested(cancel) {
            return Report::cancelled(subject, Outcome::Failed);
        }

        // A stale index could hide a list created since the last read
        self.handle
            .caches()
            .lists
            .invalidate(&list.account_id)
            .await;

        let waf_list = match self.handle.find_list(list).await {
            Ok(Some(waf_list)) => waf_list,
            Ok(None) => {
                debug!(list = %list.describe(), "IP list does not exist; nothing to clear");
                return Report::new(subject, Outcome::Noop);
            }
            Err(e) => {
                error!(list = %list.describe(), "failed to look up IP list: {}", e);
                return Report::new(subject, Outcome::Failed);
            }
        };

        match self.handle.delete_list(list, &waf_list.id).await {
            Ok(()) => {
                info!(list = %list.describe(), list_id = %waf_list.id, "deleted IP list");
                Report::new(subject, Outcome::Updated)
            }
            Err(e) => {
                warn!(list = %list.describe(), "failed to delete IP list ({}); emptying it instead", e);
                match self.handle.replace_list_items(list, &waf_list.id, &[]).await {
                    Ok(()) => {
                        info!(list = %list.describe(), list_id = %waf_list.id, "started emptying IP list");
                        Report::new(subject, Outcome::Updating)
                    }
                    Err(e) => {
                        error!(list = %list.describe(), "failed to start emptying IP list: {}", e);
                        Report::new(subject, Outcome::Failed)
                    }
                }
            }
        }
    }
}

/// Prefixes to add and items to remove, items in listing order
fn diff_items<'a>(
    list: &WafListConfig,
    items: &'a [WafListItem],
    detected: &DetectedIps,
) -> (Vec<IpPrefix>, Vec<&'a WafListItem>) {
    let mut to_delete = Vec::new();
    let mut covered: BTreeMap<IpFamily, bool> = BTreeMap::new();

    for item in items {
        let family = item.prefix.family();
        match plan_for(detected, family) {
            FamilyPlan::Cover(ip) if item.prefix.contains(&ip) => {
                covered.insert(family, true);
            }
            FamilyPlan::Cover(_) | FamilyPlan::Clear => to_delete.push(item),
            FamilyPlan::Preserve => {}
        }
    }

    let mut to_create = Vec::new();
    for family in IpFamily::ALL {
        match plan_for(detected, family) {
            FamilyPlan::Cover(ip) => {
                if !covered.get(&family).copied().unwrap_or(false) {
                    to_create.push(IpPrefix::from_detected(ip));
                }
            }
            FamilyPlan::Preserve => {
                debug!(list = %list.describe(), family = %family, "address unknown; keeping existing items");
            }
            FamilyPlan::Clear => {}
        }
    }

    (to_create, to_delete)
}
