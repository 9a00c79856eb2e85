//! Sync engine
//!
//! The SyncEngine is responsible for:
//! - Detecting the public address of every managed family via IpSource
//! - Reconciling every managed domain and IP list through the Setter
//! - Cleaning up managed records and lists on shutdown, when asked to
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  IpSource   │─── detected addresses ──┐
//! └─────────────┘                         │
//!                                         ▼
//!                                ┌──────────────┐
//!                                │  SyncEngine  │
//!                                └──────────────┘
//!                                         │
//!                     ┌───────────────────┴───────────────────┐
//!                     │                                       │
//!                     ▼                                       ▼
//!             ┌──────────────┐                        ┌─────────────┐
//!             │    Setter    │── Handle ── RemoteApi  │   Events    │
//!             │  (converge)  │                        │  (notify)   │
//!             └──────────────┘                        └─────────────┘
//! ```
//!
//! ## Cycle
//!
//! 1. Detect the address of each enabled family (bounded by the detection timeout)
//! 2. `Set` every domain of a family whose address is known
//! 3. `SetList` every IP list with all detections
//! 4. Emit one event per reconciliation
//!
//! Each reconciliation gets its own deadline. When it passes, the setter
//! stops between remote calls, exactly as on shutdown.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::ip::IpFamily;
use crate::setter::{DetectedIps, Outcome, Report, Setter, Subject};
use crate::traits::{IpSource, RemoteApi};

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started { domains_count: usize, lists_count: usize },

    /// A sync cycle began
    CycleStarted,

    /// An address was detected and accepted
    IpDetected { family: IpFamily, ip: IpAddr },

    /// Detection failed or produced an unusable address
    DetectionFailed { family: IpFamily, error: String },

    /// One domain/family or list was reconciled
    Reconciled {
        subject: Subject,
        outcome: Outcome,
        cancelled: bool,
    },

    /// A sync cycle finished
    CycleFinished { updated: usize, failed: usize },

    /// Engine stopped
    Stopped { reason: String },
}

/// Core sync engine
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Start with [`SyncEngine::run()`], or drive cycles by hand with
///    [`SyncEngine::run_cycle()`]
/// 3. Cancel the shutdown token to stop
///
/// ## Load Resistance
///
/// - **Bounded event channel**: events are dropped with a warning when full
/// - **Per-call deadlines**: a hanging provider cannot stall the loop
/// - **Delayed ticks**: a slow cycle pushes the next one back instead of
///   queueing a burst
pub struct SyncEngine {
    /// IP source for address detection
    ip_source: Box<dyn IpSource>,

    /// Reconciler over the cached remote API
    setter: Setter,

    /// What to manage and how
    config: SyncConfig,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new sync engine
    ///
    /// # Parameters
    ///
    /// - `ip_source`: IP source implementation
    /// - `api`: remote API implementation
    /// - `config`: sync configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        ip_source: Box<dyn IpSource>,
        api: Arc<dyn RemoteApi>,
        config: SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);
        let handle = Arc::new(Handle::new(api, &config.cache));

        let engine = Self {
            ip_source,
            setter: Setter::new(handle),
            config,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// The setter driving reconciliation
    pub fn setter(&self) -> &Setter {
        &self.setter
    }

    /// Run until `shutdown` is cancelled
    ///
    /// Cycles run every update interval, the first one immediately when
    /// `update_on_start` is set. After shutdown, managed records and lists
    /// are removed when `delete_on_stop` is set.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Final cleanup left something behind
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let engine = &self.config.engine;
        let domains_count = self
            .config
            .families
            .iter()
            .map(|family| self.config.domains_of(*family).len())
            .sum();

        self.emit_event(EngineEvent::Started {
            domains_count,
            lists_count: self.config.waf_lists.len(),
        });
        info!(
            provider = self.setter.handle().provider_name(),
            ip_source = self.ip_source.name(),
            domains = domains_count,
            lists = self.config.waf_lists.len(),
            interval_secs = engine.update_interval_secs,
            "Sync engine started"
        );

        let period = engine.update_interval();
        let start = if engine.update_on_start {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + period
        };
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(interval);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }

                Some(_) = ticks.next() => {
                    self.run_cycle(&shutdown).await;
                }
            }
        }

        let result = if engine.delete_on_stop {
            // The shutdown token is already cancelled; cleanup runs on its own
            self.final_cleanup(&CancellationToken::new()).await
        } else {
            Ok(())
        };

        self.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
        info!("Sync engine stopped");

        result
    }

    /// Run one detection and reconciliation cycle
    ///
    /// Never fails as a whole: per-item failures are reported in the
    /// returned reports and the next cycle retries them.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Vec<Report> {
        self.emit_event(EngineEvent::CycleStarted);
        debug!("Starting sync cycle");

        let detected = self.detect_all().await;
        let mut reports = Vec::new();

        for family in &self.config.families {
            let domains = self.config.domains_of(*family);
            let Some(Some(ip)) = detected.get(family) else {
                if !domains.is_empty() {
                    warn!(family = %family, domains = domains.len(), "address unknown; leaving records untouched");
                }
                continue;
            };

            for domain in domains {
                if cancel.is_cancelled() {
                    break;
                }
                let deadline = Deadline::new(cancel, self.config.engine.update_timeout());
                let report = self
                    .setter
                    .set(
                        domain,
                        *family,
                        *ip,
                        &self.config.record_attrs,
                        deadline.token(),
                    )
                    .await;
                self.record(&mut reports, report);
            }
        }

        for list in &self.config.waf_lists {
            if cancel.is_cancelled() {
                break;
            }
            let deadline = Deadline::new(cancel, self.config.engine.update_timeout());
            let report = self
                .setter
                .set_list(list, &detected, deadline.token())
                .await;
            self.record(&mut reports, report);
        }

        let updated = count(&reports, Outcome::Updated);
        let failed = count(&reports, Outcome::Failed);
        self.emit_event(EngineEvent::CycleFinished { updated, failed });
        if failed > 0 {
            warn!(updated, failed, "Sync cycle finished with failures");
        } else {
            debug!(updated, "Sync cycle finished");
        }

        reports
    }

    /// Remove every managed record and IP list
    ///
    /// Caches are flushed first so nothing created since the last live read
    /// is missed.
    pub async fn final_cleanup(&self, cancel: &CancellationToken) -> Result<()> {
        info!("Removing managed records and IP lists");
        self.setter.handle().flush_cache().await;

        let mut reports = Vec::new();

        for family in &self.config.families {
            for domain in self.config.domains_of(*family) {
                let deadline = Deadline::new(cancel, self.config.engine.update_timeout());
                let report = self
                    .setter
                    .delete_final(domain, *family, deadline.token())
                    .await;
                self.record(&mut reports, report);
            }
        }

        for list in &self.config.waf_lists {
            let deadline = Deadline::new(cancel, self.config.engine.update_timeout());
            let report = self.setter.final_clear(list, deadline.token()).await;
            self.record(&mut reports, report);
        }

        let failed = count(&reports, Outcome::Failed);
        if failed > 0 {
            error!(failed, "Final cleanup left managed resources behind");
            return Err(Error::Other(format!(
                "final cleanup failed for {} item(s)",
                failed
            )));
        }
        Ok(())
    }

    /// Detect the address of each enabled family
    ///
    /// Disabled families are absent from the result; enabled ones whose
    /// detection failed map to `None`.
    async fn detect_all(&self) -> DetectedIps {
        let mut detected = DetectedIps::new();
        let limit = self.config.engine.detection_timeout();

        for family in &self.config.families {
            let outcome = match tokio::time::timeout(limit, self.ip_source.detect(*family)).await {
                Ok(Ok(ip)) => family.check_detected(ip),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(Error::ip_detection(format!(
                    "timed out after {}s",
                    limit.as_secs()
                ))),
            };

            match outcome {
                Ok(ip) => {
                    debug!(family = %family, ip = %ip, source = self.ip_source.name(), "Detected address");
                    self.emit_event(EngineEvent::IpDetected {
                        family: *family,
                        ip,
                    });
                    detected.insert(*family, Some(ip));
                }
                Err(e) => {
                    warn!(family = %family, source = self.ip_source.name(), "Failed to detect address: {}", e);
                    self.emit_event(EngineEvent::DetectionFailed {
                        family: *family,
                        error: e.to_string(),
                    });
                    detected.insert(*family, None);
                }
            }
        }

        detected
    }

    fn record(&self, reports: &mut Vec<Report>, report: Report) {
        self.emit_event(EngineEvent::Reconciled {
            subject: report.subject.clone(),
            outcome: report.outcome,
            cancelled: report.cancelled,
        });
        reports.push(report);
    }

    /// Emit an engine event
    ///
    /// # Parameters
    ///
    /// - `event`: The event to emit
    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

fn count(reports: &[Report], outcome: Outcome) -> usize {
    reports.iter().filter(|r| r.outcome == outcome).count()
}

/// A child token cancelled when its parent is, or when `limit` elapses
struct Deadline {
    token: CancellationToken,
    timer: JoinHandle<()>,
}

impl Deadline {
    fn new(parent: &CancellationToken, limit: Duration) -> Self {
        let token = parent.child_token();
        let expiring = token.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            expiring.cancel();
        });
        Self { token, timer }
    }

    fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}
