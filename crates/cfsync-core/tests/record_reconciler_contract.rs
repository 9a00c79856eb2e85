//! Contract Test: Record Reconciliation
//!
//! Constraints verified:
//! - Repeating a set with nothing changed remotely makes no mutation
//! - Matching records are reused, stale ones repointed before anything is created
//! - Duplicates collapse to the first matching record
//! - A failed creation never removes the records still serving the name
//! - Cancellation stops between calls and is reported
//!
//! If this test fails, the reconciler issues more (or other) calls than
//! needed, or leaves a domain without an address.

mod common;

use cfsync_core::traits::RecordAttrs;
use cfsync_core::{IpFamily, Outcome, Subject};
use common::*;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn set_twice_is_idempotent() {
    let remote = MockRemote::with_example_zone();
    let setter = setter_for(&remote);
    let cancel = CancellationToken::new();
    let www = domain("www.example.com");

    let first = setter
        .set(&www, IpFamily::V4, ip("203.0.113.7"), &attrs(), &cancel)
        .await;
    assert_eq!(first.outcome, Outcome::Updated);
    assert_eq!(remote.count(Op::CreateRecord), 1);

    remote.clear_calls();
    let second = setter
        .set(&www, IpFamily::V4, ip("203.0.113.7"), &attrs(), &cancel)
        .await;
    assert_eq!(second.outcome, Outcome::Noop);
    assert_eq!(remote.mutation_count(), 0, "second set must not mutate");
    assert_eq!(
        second.subject,
        Subject::Record {
            domain: "www.example.com".to_string(),
            family: IpFamily::V4,
        }
    );
}

#[tokio::test]
async fn converges_to_exactly_one_matching_record() {
    let remote = MockRemote::with_example_zone();
    remote.add_record("zone-1", "example.com", "198.51.100.1");
    let keep = remote.add_record("zone-1", "example.com", "203.0.113.7");
    remote.add_record("zone-1", "example.com", "203.0.113.7");
    remote.add_record("zone-1", "example.com", "198.51.100.2");
    let setter = setter_for(&remote);

    let report = setter
        .set(
            &domain("example.com"),
            IpFamily::V4,
            ip("203.0.113.7"),
            &attrs(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(report.outcome, Outcome::Updated);
    let records = remote.records("example.com", IpFamily::V4);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, keep);
    assert_eq!(records[0].ip, ip("203.0.113.7"));
    assert_eq!(remote.count(Op::UpdateRecord), 0);
    assert_eq!(remote.count(Op::CreateRecord), 0);
}

#[tokio::test]
async fn three_matching_records_collapse_to_one() {
    let remote = MockRemote::with_example_zone();
    let first = remote.add_record("zone-1", "example.com", "203.0.113.7");
    let second = remote.add_record("zone-1", "example.com", "203.0.113.7");
    let third = remote.add_record("zone-1", "example.com", "203.0.113.7");
    let setter = setter_for(&remote);

    let report = setter
        .set(
            &domain("example.com"),
            IpFamily::V4,
            ip("203.0.113.7"),
            &attrs(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(report.outcome, Outcome::Updated);
    let deleted: Vec<String> = remote
        .calls_of(Op::DeleteRecord)
        .into_iter()
        .map(|c| c.target)
        .collect();
    assert_eq!(deleted, vec![second, third]);
    assert_eq!(remote.records("example.com", IpFamily::V4)[0].id, first);
}

#[tokio::test]
async fn stale_record_is_updated_not_recreated() {
    let remote = MockRemote::with_example_zone();
    let stale = remote.add_record("zone-1", "example.com", "198.51.100.1");
    let setter = setter_for(&remote);

    let report = setter
        .set(
            &domain("example.com"),
            IpFamily::V4,
            ip("203.0.113.7"),
            &attrs(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(report.outcome, Outcome::Updated);
    assert_eq!(remote.calls_of(Op::UpdateRecord)[0].target, stale);
    assert_eq!(remote.count(Op::CreateRecord), 0);
    assert_eq!(remote.count(Op::DeleteRecord), 0);

    let records = remote.records("example.com", IpFamily::V4);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, stale);
    assert_eq!(records[0].ip, ip("203.0.113.7"));
}

#[tokio::test]
async fn update_keeps_existing_record_attributes() {
    let remote = MockRemote::with_example_zone();
    let custom = RecordAttrs {
        ttl: 300,
        proxied: true,
        comment: "set by hand".to_string(),
    };
    remote.add_record_with("zone-1", "example.com", "198.51.100.1", custom.clone());
    let setter = setter_for(&remote);

    let report = setter
        .set(
            &domain("example.com"),
            IpFamily::V4,
            ip("203.0.113.7"),
            &attrs(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(report.outcome, Outcome::Updated);
    assert_eq!(remote.records("example.com", IpFamily::V4)[0].attrs, custom);
}

#[tokio::test]
async fn failed_update_falls_back_to_create() {
    let remote = MockRemote::with_example_zone();
    let stale = remote.add_record("zone-1", "example.com", "198.51.100.1");
    remote.fail(Op::UpdateRecord);
    let setter = setter_for(&remote);

    let report = setter
        .set(
            &domain("example.com"),
            IpFamily::V4,
            ip("203.0.113.7"),
            &attrs(),
            &CancellationToken::new(),
        )
        .await;

    // The update failure is still reported even though the name converged
    assert_eq!(report.outcome, Outcome::Failed);

    let ops: Vec<Op> = remote
        .calls()
        .into_iter()
        .map(|c| c.op)
        .filter(|op| op.is_mutation())
        .collect();
    assert_eq!(ops, vec![Op::UpdateRecord, Op::CreateRecord, Op::DeleteRecord]);
    assert_eq!(remote.count(Op::UpdateRecord), 1, "no second update attempt");

    let records = remote.records("example.com", IpFamily::V4);
    assert_eq!(records.len(), 1);
    assert_ne!(records[0].id, stale);
    assert_eq!(records[0].ip, ip("203.0.113.7"));
}

#[tokio::test]
async fn failed_create_keeps_stale_records() {
    let remote = MockRemote::with_example_zone();
    let stale = remote.add_record("zone-1", "example.com", "198.51.100.1");
    remote.fail(Op::UpdateRecord);
    remote.fail(Op::CreateRecord);
    let setter = setter_for(&remote);

    let report = setter
        .set(
            &domain("example.com"),
            IpFamily::V4,
            ip("203.0.113.7"),
            &attrs(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(remote.count(Op::DeleteRecord), 0);
    assert_eq!(remote.records("example.com", IpFamily::V4)[0].id, stale);
}

#[tokio::test]
async fn family_mismatch_fails_without_calls() {
    let remote = MockRemote::with_example_zone();
    let setter = setter_for(&remote);

    let report = setter
        .set(
            &domain("example.com"),
            IpFamily::V6,
            ip("203.0.113.7"),
            &attrs(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(report.outcome, Outcome::Failed);
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn missing_zone_fails() {
    let remote = MockRemote::new();
    let setter = setter_for(&remote);

    let report = setter
        .set(
            &domain("www.example.org"),
            IpFamily::V4,
            ip("203.0.113.7"),
            &attrs(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(remote.mutation_count(), 0);
}

#[tokio::test]
async fn wildcard_records_use_the_wildcard_name() {
    let remote = MockRemote::with_example_zone();
    let setter = setter_for(&remote);

    let report = setter
        .set(
            &domain("*.example.com"),
            IpFamily::V6,
            ip("2001:db8::7"),
            &attrs(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(report.outcome, Outcome::Updated);
    assert_eq!(remote.records("*.example.com", IpFamily::V6).len(), 1);
    assert_eq!(remote.calls_of(Op::ListZones)[0].target, "example.com");
}

#[tokio::test]
async fn cancelled_before_start_makes_no_calls() {
    let remote = MockRemote::with_example_zone();
    let setter = setter_for(&remote);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = setter
        .set(
            &domain("example.com"),
            IpFamily::V4,
            ip("203.0.113.7"),
            &attrs(),
            &cancel,
        )
        .await;

    assert_eq!(report.outcome, Outcome::Failed);
    assert!(report.cancelled);
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn cancellation_with_desired_record_in_place_is_updated() {
    let remote = MockRemote::with_example_zone();
    remote.add_record("zone-1", "example.com", "203.0.113.7");
    remote.add_record("zone-1", "example.com", "198.51.100.1");
    let setter = setter_for(&remote);
    let cancel = CancellationToken::new();
    remote.cancel_after_call(Op::ListRecords, cancel.clone());

    let report = setter
        .set(
            &domain("example.com"),
            IpFamily::V4,
            ip("203.0.113.7"),
            &attrs(),
            &cancel,
        )
        .await;

    assert_eq!(report.outcome, Outcome::Updated);
    assert!(report.cancelled);
    assert_eq!(remote.mutation_count(), 0);
    let matching = remote
        .records("example.com", IpFamily::V4)
        .iter()
        .filter(|r| r.ip == ip("203.0.113.7"))
        .count();
    assert_eq!(matching, 1);
}

#[tokio::test]
async fn cancellation_leaving_a_duplicate_fails() {
    let remote = MockRemote::with_example_zone();
    remote.add_record("zone-1", "example.com", "198.51.100.1");
    remote.add_record("zone-1", "example.com", "203.0.113.7");
    remote.add_record("zone-1", "example.com", "203.0.113.7");
    let setter = setter_for(&remote);
    let cancel = CancellationToken::new();
    remote.cancel_after_mutations(1, cancel.clone());

    let report = setter
        .set(
            &domain("example.com"),
            IpFamily::V4,
            ip("203.0.113.7"),
            &attrs(),
            &cancel,
        )
        .await;

    assert_eq!(report.outcome, Outcome::Failed);
    assert!(report.cancelled);
    assert_eq!(remote.count(Op::DeleteRecord), 1, "stale record goes first");

    let records = remote.records("example.com", IpFamily::V4);
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.ip == ip("203.0.113.7")));
}

#[tokio::test]
async fn cancellation_among_duplicates_keeps_completed_deletions() {
    let remote = MockRemote::with_example_zone();
    remote.add_record("zone-1", "example.com", "203.0.113.7");
    remote.add_record("zone-1", "example.com", "203.0.113.7");
    remote.add_record("zone-1", "example.com", "203.0.113.7");
    let setter = setter_for(&remote);
    let cancel = CancellationToken::new();
    remote.cancel_after_mutations(1, cancel.clone());

    let report = setter
        .set(
            &domain("example.com"),
            IpFamily::V4,
            ip("203.0.113.7"),
            &attrs(),
            &cancel,
        )
        .await;

    assert_eq!(report.outcome, Outcome::Failed);
    assert!(report.cancelled);
    assert_eq!(remote.count(Op::DeleteRecord), 1);
    assert_eq!(remote.records("example.com", IpFamily::V4).len(), 2);
}

#[tokio::test]
async fn failed_cleanup_deletion_does_not_stop_the_rest() {
    let remote = MockRemote::with_example_zone();
    let kept = remote.add_record("zone-1", "example.com", "203.0.113.7");
    let stuck = remote.add_record("zone-1", "example.com", "198.51.100.1");
    remote.add_record("zone-1", "example.com", "198.51.100.2");
    remote.fail_for(Op::DeleteRecord, &stuck);
    let setter = setter_for(&remote);

    let report = setter
        .set(
            &domain("example.com"),
            IpFamily::V4,
            ip("203.0.113.7"),
            &attrs(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(remote.count(Op::DeleteRecord), 2, "later deletions still run");

    let ids: Vec<String> = remote
        .records("example.com", IpFamily::V4)
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![kept, stuck]);
}

#[tokio::test]
async fn delete_removes_every_record_of_the_family() {
    let remote = MockRemote::with_example_zone();
    remote.add_record("zone-1", "example.com", "203.0.113.7");
    remote.add_record("zone-1", "example.com", "198.51.100.1");
    remote.add_record("zone-1", "example.com", "2001:db8::1");
    let setter = setter_for(&remote);

    let report = setter
        .delete(&domain("example.com"), IpFamily::V4, &CancellationToken::new())
        .await;

    assert_eq!(report.outcome, Outcome::Updated);
    assert!(remote.records("example.com", IpFamily::V4).is_empty());
    assert_eq!(remote.records("example.com", IpFamily::V6).len(), 1);

    let again = setter
        .delete(&domain("example.com"), IpFamily::V4, &CancellationToken::new())
        .await;
    assert_eq!(again.outcome, Outcome::Noop);
}

#[tokio::test]
async fn delete_failure_is_reported() {
    let remote = MockRemote::with_example_zone();
    remote.add_record("zone-1", "example.com", "203.0.113.7");
    remote.fail(Op::DeleteRecord);
    let setter = setter_for(&remote);

    let report = setter
        .delete(&domain("example.com"), IpFamily::V4, &CancellationToken::new())
        .await;

    assert_eq!(report.outcome, Outcome::Failed);
}

#[tokio::test]
async fn final_delete_ignores_cached_listing() {
    let remote = MockRemote::with_example_zone();
    let setter = setter_for(&remote);
    let cancel = CancellationToken::new();

    setter
        .set(&domain("example.com"), IpFamily::V4, ip("203.0.113.7"), &attrs(), &cancel)
        .await;

    // Created behind the cache's back
    remote.add_record("zone-1", "example.com", "198.51.100.9");

    let report = setter
        .delete_final(&domain("example.com"), IpFamily::V4, &cancel)
        .await;

    assert_eq!(report.outcome, Outcome::Updated);
    assert!(remote.records("example.com", IpFamily::V4).is_empty());
}
