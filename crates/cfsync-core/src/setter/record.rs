//! Record reconciliation for one domain and address family

use std::net::IpAddr;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Outcome, Report, Setter, Subject, stop_requested};
use crate::domain::Domain;
use crate::ip::IpFamily;
use crate::traits::{DnsRecord, RecordAttrs};

/// Why records are being deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeletionMode {
    /// The domain/family is no longer wanted
    Regular,
    /// Last-run cleanup: the listing is always fetched live
    Final,
}

impl Setter {
    /// Make `ip` the one and only address of `family` for `domain`
    ///
    /// Existing records are reused before new ones are created: a record
    /// that already holds `ip` is kept, otherwise the first stale record is
    /// repointed, and only when that is impossible a record is created with
    /// `attrs`. Every other record of the family is then deleted, in listing
    /// order.
    pub async fn set(
        &self,
        domain: &Domain,
        family: IpFamily,
        ip: IpAddr,
        attrs: &RecordAttrs,
        cancel: &CancellationToken,
    ) -> Report {
        let subject = Subject::Record {
            domain: domain.describe(),
            family,
        };

        if !family.matches(&ip) {
            error!(domain = %domain, family = %family, ip = %ip, "address does not belong to the record family");
            return Report::new(subject, Outcome::Failed);
        }

        if stop_requested(cancel) {
            return Report::cancelled(subject, Outcome::Failed);
        }

        let zone_id = match self.handle.zone_of(domain).await {
            Ok(zone_id) => zone_id,
            Err(e) => {
                error!(domain = %domain, family = %family, data_integrity = e.is_data_integrity(), "failed to find zone: {}", e);
                return Report::new(subject, Outcome::Failed);
            }
        };

        let records = match self.handle.list_records(&zone_id, domain, family).await {
            Ok(records) => records,
            Err(e) => {
                error!(domain = %domain, family = %family, data_integrity = e.is_data_integrity(), "failed to list records: {}", e);
                return Report::new(subject, Outcome::Failed);
            }
        };

        let mut changed = false;
        let mut failed = false;

        // The first record already holding `ip` wins; later ones are duplicates
        let mut kept_id = records.iter().find(|r| r.ip == ip).map(|r| r.id.clone());

        if kept_id.is_none()
            && let Some(stale) = records.iter().find(|r| r.ip != ip)
        {
            warn_attr_mismatch(domain, family, stale, attrs);

            match self
                .handle
                .update_record(&zone_id, domain, family, &stale.id, ip)
                .await
            {
                Ok(()) => {
                    info!(domain = %domain, family = %family, record_id = %stale.id, from = %stale.ip, to = %ip, "updated record");
                    kept_id = Some(stale.id.clone());
                    changed = true;
                }
                Err(e) => {
                    // No second update attempt; fall back to creating a record
                    warn!(domain = %domain, family = %family, record_id = %stale.id, "failed to update record: {}", e);
                    failed = true;
                }
            }
        }

        if kept_id.is_none() {
            match self
                .handle
                .create_record(&zone_id, domain, family, ip, attrs)
                .await
            {
                Ok(record) => {
                    info!(domain = %domain, family = %family, record_id = %record.id, ip = %ip, "created record");
                    kept_id = Some(record.id);
                    changed = true;
                }
                Err(e) => {
                    // Stale records stay: removing them would leave the name unresolvable
                    error!(domain = %domain, family = %family, ip = %ip, "failed to create record: {}", e);
                    return Report::new(subject, Outcome::Failed);
                }
            }
        }

        let doomed: Vec<&DnsRecord> = records
            .iter()
            .filter(|r| kept_id.as_deref() != Some(r.id.as_str()))
            .collect();

        for (done, record) in doomed.iter().enumerate() {
            if stop_requested(cancel) {
                let remaining = &doomed[done..];
                warn!(domain = %domain, family = %family, remaining = remaining.len(), "cancelled before removing all outdated records");
                // Converged when the kept record is the only one holding `ip`
                let converged =
                    kept_id.is_some() && !failed && remaining.iter().all(|r| r.ip != ip);
                let outcome = if converged {
                    Outcome::Updated
                } else {
                    Outcome::Failed
                };
                return Report::cancelled(subject, outcome);
            }

            let kind = if record.ip == ip { "duplicate" } else { "stale" };
            match self
                .handle
                .delete_record(&zone_id, domain, family, &record.id)
                .await
            {
                Ok(()) => {
                    info!(domain = %domain, family = %family, record_id = %record.id, ip = %record.ip, "deleted {} record", kind);
                    changed = true;
                }
                Err(e) => {
                    warn!(domain = %domain, family = %family, record_id = %record.id, "failed to delete {} record: {}", kind, e);
                    failed = true;
                }
            }
        }

        let outcome = if failed {
            Outcome::Failed
        } else if changed {
            Outcome::Updated
        } else {
            debug!(domain = %domain, family = %family, ip = %ip, "records already up to date");
            Outcome::Noop
        };

        Report::new(subject, outcome)
    }

    /// Remove every record of `family` for `domain`
    pub async fn delete(
        &self,
        domain: &Domain,
        family: IpFamily,
        cancel: &CancellationToken,
    ) -> Report {
        self.delete_all(domain, family, DeletionMode::Regular, cancel)
            .await
    }

    /// Last-run variant of [`delete`](Self::delete)
    ///
    /// Ignores any cached listing so records created since the last live read
    /// are not left behind.
    pub async fn delete_final(
        &self,
        domain: &Domain,
        family: IpFamily,
        cancel: &CancellationToken,
    ) -> Report {
        self.delete_all(domain, family, DeletionMode::Final, cancel)
            .await
    }

    async fn delete_all(
        &self,
        domain: &Domain,
        family: IpFamily,
        mode: DeletionMode,
        cancel: &CancellationToken,
    ) -> Report {
        let subject = Subject::Record {
            domain: domain.describe(),
            family,
        };

        if stop_requested(cancel) {
            return Report::cancelled(subject, Outcome::Failed);
        }

        let zone_id = match self.handle.zone_of(domain).await {
            Ok(zone_id) => zone_id,
            Err(e) => {
                error!(domain = %domain, family = %family, data_integrity = e.is_data_integrity(), "failed to find zone: {}", e);
                return Report::new(subject, Outcome::Failed);
            }
        };

        if mode == DeletionMode::Final {
            self.handle.invalidate_records(&zone_id, domain, family).await;
        }

        let records = match self.handle.list_records(&zone_id, domain, family).await {
            Ok(records) => records,
            Err(e) => {
                error!(domain = %domain, family = %family, data_integrity = e.is_data_integrity(), "failed to list records: {}", e);
                return Report::new(subject, Outcome::Failed);
            }
        };

        if records.is_empty() {
            debug!(domain = %domain, family = %family, "no records to delete");
            return Report::new(subject, Outcome::Noop);
        }

        let final_cleanup = mode == DeletionMode::Final;
        let mut deleted = 0usize;
        let mut failed = false;

        for record in &records {
            if stop_requested(cancel) {
                warn!(domain = %domain, family = %family, deleted, remaining = records.len() - deleted, "cancelled while deleting records");
                let outcome = if deleted > 0 && !failed {
                    Outcome::Updated
                } else {
                    Outcome::Failed
                };
                return Report::cancelled(subject, outcome);
            }

            match self
                .handle
                .delete_record(&zone_id, domain, family, &record.id)
                .await
            {
                Ok(()) => {
                    info!(domain = %domain, family = %family, record_id = %record.id, ip = %record.ip, final_cleanup, "deleted record");
                    deleted += 1;
                }
                Err(e) => {
                    warn!(domain = %domain, family = %family, record_id = %record.id, "failed to delete record: {}", e);
                    failed = true;
                }
            }
        }

        let outcome = if failed {
            Outcome::Failed
        } else {
            Outcome::Updated
        };
        Report::new(subject, outcome)
    }
}

/// Report attribute differences of a record about to be repointed
///
/// The update leaves TTL, proxy flag and comment untouched, so the record
/// keeps whatever an operator set by hand.
fn warn_attr_mismatch(domain: &Domain, family: IpFamily, record: &DnsRecord, desired: &RecordAttrs) {
    if record.attrs.ttl != desired.ttl {
        warn!(domain = %domain, family = %family, record_id = %record.id, actual = record.attrs.ttl, configured = desired.ttl, "record TTL differs from the configured one; keeping it");
    }
    if record.attrs.proxied != desired.proxied {
        warn!(domain = %domain, family = %family, record_id = %record.id, actual = record.attrs.proxied, configured = desired.proxied, "record proxy setting differs from the configured one; keeping it");
    }
    if record.attrs.comment != desired.comment {
        warn!(domain = %domain, family = %family, record_id = %record.id, actual = %record.attrs.comment, configured = %desired.comment, "record comment differs from the configured one; keeping it");
    }
}
