//! Convergence of remote state toward desired state
//!
//! The [`Setter`] drives the records of one domain and family, or the items of
//! one IP list, toward what the caller wants, using the smallest sequence of
//! create/update/delete calls it can.
//!
//! ## Failure model
//!
//! - A failed remote call is never retried here; the unit of work reports
//!   [`Outcome::Failed`] and the next cycle tries again
//! - Work already done is never undone: every record or item level call is
//!   correct on its own
//! - Failures stay local to one domain/family or one list
//!
//! ## Cancellation
//!
//! Loops check the cancellation token between remote calls, never during one.
//! A cancelled run stops issuing calls and sets [`Report::cancelled`].

mod record;
mod waf;

pub use waf::DetectedIps;

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::handle::Handle;
use crate::ip::IpFamily;

/// Result of one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Remote state already matched; no mutating call was made
    Noop,
    /// Remote state was changed and now matches
    Updated,
    /// The provider accepted an asynchronous change that is still running
    Updating,
    /// At least one call failed, or the run stopped before converging
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Noop => "noop",
            Outcome::Updated => "updated",
            Outcome::Updating => "updating",
            Outcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a reconciliation was about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    /// Records of one family for one domain
    Record { domain: String, family: IpFamily },
    /// One IP list, as `account/name`
    List { list: String },
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Record { domain, family } => write!(f, "{} ({})", domain, family),
            Subject::List { list } => write!(f, "list {}", list),
        }
    }
}

/// Outcome of one reconciliation plus what the caller needs to describe it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub subject: Subject,
    pub outcome: Outcome,
    /// The run observed cancellation and stopped early
    pub cancelled: bool,
}

impl Report {
    fn new(subject: Subject, outcome: Outcome) -> Self {
        Self {
            subject,
            outcome,
            cancelled: false,
        }
    }

    fn cancelled(subject: Subject, outcome: Outcome) -> Self {
        Self {
            subject,
            outcome,
            cancelled: true,
        }
    }
}

/// Whether the caller asked us to stop; checked between remote calls
fn stop_requested(cancel: &CancellationToken) -> bool {
    cancel.is_cancelled()
}

/// Reconciles records and IP lists through a [`Handle`]
#[derive(Clone)]
pub struct Setter {
    handle: Arc<Handle>,
}

impl Setter {
    pub fn new(handle: Arc<Handle>) -> Self {
        Self { handle }
    }

    /// The underlying handle
    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}
