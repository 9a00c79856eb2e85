//! Test doubles and common utilities for contract tests
//!
//! [`MockRemote`] is an in-memory provider: zones, records, IP lists and
//! their items live in a shared state that tests seed and inspect. Every
//! call is logged, and any operation can be made to fail on demand.

#![allow(dead_code)]

use cfsync_core::cache::Caches;
use cfsync_core::config::{CacheConfig, ProviderConfig, SyncConfig, WafListConfig};
use cfsync_core::error::{Error, Result};
use cfsync_core::traits::{
    DnsRecord, IpSource, RecordAttrs, RemoteApi, WafList, WafListItem, Zone, ZoneStatus,
};
use cfsync_core::{Domain, Handle, IpFamily, IpPrefix, Setter};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Remote operations, for failure injection and call accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListZones,
    ListRecords,
    CreateRecord,
    UpdateRecord,
    DeleteRecord,
    ListLists,
    CreateList,
    DeleteList,
    ListItems,
    CreateItems,
    DeleteItems,
    ReplaceItems,
}

impl Op {
    pub fn is_mutation(self) -> bool {
        !matches!(
            self,
            Op::ListZones | Op::ListRecords | Op::ListLists | Op::ListItems
        )
    }
}

/// One logged call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    /// Record ID, list ID or name the call was about
    pub target: String,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    zone_id: String,
    name: String,
    record: DnsRecord,
}

#[derive(Default)]
struct State {
    zones: Vec<Zone>,
    records: Vec<StoredRecord>,
    lists: Vec<(String, WafList)>,
    items: HashMap<String, Vec<WafListItem>>,
    next_id: usize,
    calls: Vec<Call>,
    failing: HashSet<Op>,
    failing_targets: HashSet<(Op, String)>,
    cancel_after: Option<(usize, CancellationToken)>,
    cancel_on: Option<(Op, CancellationToken)>,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

/// An in-memory RemoteApi that tracks calls
#[derive(Clone, Default)]
pub struct MockRemote {
    state: Arc<Mutex<State>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// A remote holding one active zone `example.com` with ID `zone-1`
    pub fn with_example_zone() -> Self {
        let remote = Self::new();
        remote.add_zone("zone-1", "example.com", ZoneStatus::Active);
        remote
    }

    pub fn add_zone(&self, id: &str, name: &str, status: ZoneStatus) {
        self.state.lock().unwrap().zones.push(Zone {
            id: id.to_string(),
            name: name.to_string(),
            status,
        });
    }

    /// Seed a record; returns its ID
    pub fn add_record(&self, zone_id: &str, name: &str, ip: &str) -> String {
        self.add_record_with(zone_id, name, ip, RecordAttrs::default())
    }

    pub fn add_record_with(&self, zone_id: &str, name: &str, ip: &str, attrs: RecordAttrs) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("rec");
        state.records.push(StoredRecord {
            zone_id: zone_id.to_string(),
            name: name.to_string(),
            record: DnsRecord {
                id: id.clone(),
                ip: ip.parse().unwrap(),
                attrs,
            },
        });
        id
    }

    /// Records currently stored for `name` and `family`, in creation order
    pub fn records(&self, name: &str, family: IpFamily) -> Vec<DnsRecord> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|r| r.name == name && family.matches(&r.record.ip))
            .map(|r| r.record.clone())
            .collect()
    }

    /// Seed an IP list; returns its ID
    pub fn add_list(&self, account_id: &str, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("list");
        state.lists.push((
            account_id.to_string(),
            WafList {
                id: id.clone(),
                name: name.to_string(),
                description: String::new(),
                kind: "ip".to_string(),
            },
        ));
        state.items.insert(id.clone(), Vec::new());
        id
    }

    /// Seed an item; returns its ID
    pub fn add_item(&self, list_id: &str, prefix: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("item");
        let item = WafListItem {
            id: id.clone(),
            prefix: prefix.parse().unwrap(),
        };
        state.items.entry(list_id.to_string()).or_default().push(item);
        id
    }

    /// Prefixes of a list, as strings, in insertion order
    pub fn items(&self, list_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .items
            .get(list_id)
            .map(|items| items.iter().map(|i| i.prefix.to_string()).collect())
            .unwrap_or_default()
    }

    /// ID of the list named `name`, if it exists
    pub fn list_id(&self, account_id: &str, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .lists
            .iter()
            .find(|(acc, l)| acc == account_id && l.name == name)
            .map(|(_, l)| l.id.clone())
    }

    /// Make every call of `op` fail until [`recover`](Self::recover)
    pub fn fail(&self, op: Op) {
        self.state.lock().unwrap().failing.insert(op);
    }

    /// Make `op` fail only when it is about `target`
    pub fn fail_for(&self, op: Op, target: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_targets
            .insert((op, target.to_string()));
    }

    pub fn recover(&self, op: Op) {
        self.state.lock().unwrap().failing.remove(&op);
    }

    /// Cancel `token` once `n` mutating calls have completed
    pub fn cancel_after_mutations(&self, n: usize, token: CancellationToken) {
        self.state.lock().unwrap().cancel_after = Some((n, token));
    }

    /// Cancel `token` once a call of `op` has completed
    pub fn cancel_after_call(&self, op: Op, token: CancellationToken) {
        self.state.lock().unwrap().cancel_on = Some((op, token));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Logged calls of one kind
    pub fn calls_of(&self, op: Op) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls_of(op).len()
    }

    pub fn mutation_count(&self) -> usize {
        self.calls().iter().filter(|c| c.op.is_mutation()).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Log the call, fail it if asked to, and run `apply` on the state
    fn call<T>(&self, op: Op, target: &str, apply: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call {
            op,
            target: target.to_string(),
        });

        if state.failing.contains(&op)
            || state.failing_targets.contains(&(op, target.to_string()))
        {
            return Err(Error::provider("mock", format!("injected {:?} failure", op)));
        }

        let result = apply(&mut *state);

        if op.is_mutation() {
            let done = state.calls.iter().filter(|c| c.op.is_mutation()).count();
            if let Some((n, token)) = &state.cancel_after
                && done >= *n
            {
                token.cancel();
            }
        }

        if let Some((on, token)) = &state.cancel_on
            && *on == op
        {
            token.cancel();
        }

        result
    }
}

#[async_trait::async_trait]
impl RemoteApi for MockRemote {
    async fn list_zones(&self, name: &str) -> Result<Vec<Zone>> {
        self.call(Op::ListZones, name, |state| {
            Ok(state.zones.iter().filter(|z| z.name == name).cloned().collect())
        })
    }

    async fn list_records(&self, zone_id: &str, domain: &Domain, family: IpFamily) -> Result<Vec<DnsRecord>> {
        let name = domain.dns_name_ascii();
        self.call(Op::ListRecords, &name, |state| {
            Ok(state
                .records
                .iter()
                .filter(|r| r.zone_id == zone_id && r.name == name && family.matches(&r.record.ip))
                .map(|r| r.record.clone())
                .collect())
        })
    }

    async fn create_record(
        &self,
        zone_id: &str,
        domain: &Domain,
        _family: IpFamily,
        ip: IpAddr,
        attrs: &RecordAttrs,
    ) -> Result<DnsRecord> {
        let name = domain.dns_name_ascii();
        self.call(Op::CreateRecord, &name, |state| {
            let record = DnsRecord {
                id: state.next_id("rec"),
                ip,
                attrs: attrs.clone(),
            };
            state.records.push(StoredRecord {
                zone_id: zone_id.to_string(),
                name: name.clone(),
                record: record.clone(),
            });
            Ok(record)
        })
    }

    async fn update_record(
        &self,
        _zone_id: &str,
        _domain: &Domain,
        _family: IpFamily,
        record_id: &str,
        ip: IpAddr,
    ) -> Result<()> {
        self.call(Op::UpdateRecord, record_id, |state| {
            let stored = state
                .records
                .iter_mut()
                .find(|r| r.record.id == record_id)
                .ok_or_else(|| Error::not_found(record_id))?;
            stored.record.ip = ip;
            Ok(())
        })
    }

    async fn delete_record(&self, _zone_id: &str, record_id: &str) -> Result<()> {
        self.call(Op::DeleteRecord, record_id, |state| {
            let before = state.records.len();
            state.records.retain(|r| r.record.id != record_id);
            if state.records.len() == before {
                return Err(Error::not_found(record_id));
            }
            Ok(())
        })
    }

    async fn list_lists(&self, account_id: &str) -> Result<Vec<WafList>> {
        self.call(Op::ListLists, account_id, |state| {
            Ok(state
                .lists
                .iter()
                .filter(|(acc, _)| acc == account_id)
                .map(|(_, l)| l.clone())
                .collect())
        })
    }

    async fn create_list(&self, account_id: &str, name: &str, description: &str) -> Result<WafList> {
        self.call(Op::CreateList, name, |state| {
            let list = WafList {
                id: state.next_id("list"),
                name: name.to_string(),
                description: description.to_string(),
                kind: "ip".to_string(),
            };
            state.lists.push((account_id.to_string(), list.clone()));
            state.items.insert(list.id.clone(), Vec::new());
            Ok(list)
        })
    }

    async fn delete_list(&self, _account_id: &str, list_id: &str) -> Result<()> {
        self.call(Op::DeleteList, list_id, |state| {
            state.lists.retain(|(_, l)| l.id != list_id);
            state.items.remove(list_id);
            Ok(())
        })
    }

    async fn list_list_items(&self, _account_id: &str, list_id: &str) -> Result<Vec<WafListItem>> {
        self.call(Op::ListItems, list_id, |state| {
            Ok(state.items.get(list_id).cloned().unwrap_or_default())
        })
    }

    async fn create_list_items(
        &self,
        _account_id: &str,
        list_id: &str,
        prefixes: &[IpPrefix],
        _comment: &str,
    ) -> Result<Vec<WafListItem>> {
        self.call(Op::CreateItems, list_id, |state| {
            let created: Vec<WafListItem> = prefixes
                .iter()
                .map(|prefix| WafListItem {
                    id: state.next_id("item"),
                    prefix: *prefix,
                })
                .collect();
            state
                .items
                .entry(list_id.to_string())
                .or_default()
                .extend(created.iter().cloned());
            Ok(created)
        })
    }

    async fn delete_list_items(&self, _account_id: &str, list_id: &str, item_ids: &[String]) -> Result<()> {
        self.call(Op::DeleteItems, list_id, |state| {
            if let Some(items) = state.items.get_mut(list_id) {
                items.retain(|item| !item_ids.contains(&item.id));
            }
            Ok(())
        })
    }

    async fn replace_list_items(&self, _account_id: &str, list_id: &str, prefixes: &[IpPrefix]) -> Result<()> {
        self.call(Op::ReplaceItems, list_id, |state| {
            let replaced: Vec<WafListItem> = prefixes
                .iter()
                .map(|prefix| WafListItem {
                    id: state.next_id("item"),
                    prefix: *prefix,
                })
                .collect();
            state.items.insert(list_id.to_string(), replaced);
            Ok(())
        })
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// An IP source answering from a fixed table; missing families fail
#[derive(Clone, Default)]
pub struct StaticIpSource {
    answers: Arc<Mutex<HashMap<IpFamily, IpAddr>>>,
    hanging: Arc<Mutex<HashSet<IpFamily>>>,
    detect_call_count: Arc<AtomicUsize>,
}

impl StaticIpSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, family: IpFamily, ip: &str) -> Self {
        self.set(family, ip);
        self
    }

    pub fn set(&self, family: IpFamily, ip: &str) {
        self.answers.lock().unwrap().insert(family, ip.parse().unwrap());
    }

    pub fn forget(&self, family: IpFamily) {
        self.answers.lock().unwrap().remove(&family);
    }

    /// Make detection of `family` never complete
    pub fn hang(&self, family: IpFamily) {
        self.hanging.lock().unwrap().insert(family);
    }

    pub fn detect_call_count(&self) -> usize {
        self.detect_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpSource for StaticIpSource {
    async fn detect(&self, family: IpFamily) -> Result<IpAddr> {
        self.detect_call_count.fetch_add(1, Ordering::SeqCst);

        let hangs = self.hanging.lock().unwrap().contains(&family);
        if hangs {
            std::future::pending::<()>().await;
        }

        self.answers
            .lock()
            .unwrap()
            .get(&family)
            .copied()
            .ok_or_else(|| Error::ip_detection(format!("no {} address", family)))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

pub fn handle_for(remote: &MockRemote) -> Arc<Handle> {
    Arc::new(Handle::new(Arc::new(remote.clone()), &CacheConfig::default()))
}

pub fn setter_for(remote: &MockRemote) -> Setter {
    Setter::new(handle_for(remote))
}

pub fn caches_of(setter: &Setter) -> &Caches {
    setter.handle().caches()
}

pub fn domain(name: &str) -> Domain {
    Domain::parse(name).unwrap()
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn attrs() -> RecordAttrs {
    RecordAttrs::default()
}

pub fn waf_list(name: &str) -> WafListConfig {
    WafListConfig::new("acc-1", name)
}

/// Helper to create a minimal SyncConfig for testing
pub fn minimal_config(ipv4_domain: &str) -> SyncConfig {
    let mut config = SyncConfig::new(ProviderConfig::Cloudflare {
        api_token: "test-token".to_string(),
        dry_run: false,
    });
    config.families = vec![IpFamily::V4];
    config.domains.insert(IpFamily::V4, vec![domain(ipv4_domain)]);
    config.engine.event_channel_capacity = 100;
    config
}
