// # Cloudflare Remote API
//
// This crate implements `cfsync_core::traits::RemoteApi` on top of the
// Cloudflare API v4.
//
// ## Scope
//
// - One HTTP exchange per trait call, except where the API itself splits an
//   operation: paginated listings, and list item changes that Cloudflare runs
//   as asynchronous bulk operations (polled here until done)
// - No caching, no retries: the handle caches and the next sync cycle retries
// - HTTP timeout of 30 seconds on every request
// - Status codes mapped to specific errors (401/403, 404, 409, 429, 5xx)
// - Dry-run mode: reads are live, mutations are only logged
//
// ## Security Requirements
//
// - API token NEVER appears in logs or Debug output
// - Construction fails if the token is empty
//
// ## API Reference
//
// - List Zones: GET `/zones?name=...`
// - DNS Records: GET|POST `/zones/:zone_id/dns_records`,
//   PATCH|DELETE `/zones/:zone_id/dns_records/:record_id`
// - Lists: GET|POST `/accounts/:account_id/rules/lists`,
//   DELETE `/accounts/:account_id/rules/lists/:list_id`
// - List Items: GET|POST|PUT|DELETE `/accounts/:account_id/rules/lists/:list_id/items`
// - Bulk Operations: GET `/accounts/:account_id/rules/lists/bulk_operations/:operation_id`
// - Token Verification: GET `/user/tokens/verify`

mod client;
mod wire;

use async_trait::async_trait;
use cfsync_core::config::ProviderConfig;
use cfsync_core::traits::{DnsRecord, RecordAttrs, RemoteApi, WafList, WafListItem, Zone, ZoneStatus};
use cfsync_core::{Domain, Error, IpFamily, IpPrefix, Result};
use reqwest::Method;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use client::PROVIDER;
use wire::{
    DeleteItems, ItemBody, ItemRef, ListBody, NewItem, NewList, NewRecord, OperationRef,
    OperationStatus, RecordBody, RecordPatch, TokenStatus, ZoneBody,
};

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for DNS record listings
const RECORDS_PER_PAGE: &str = "100";

/// Page size for list item listings
const ITEMS_PER_PAGE: &str = "500";

/// Polling of asynchronous list item operations
const BULK_POLL_INTERVAL: Duration = Duration::from_millis(500);
const BULK_POLL_ATTEMPTS: usize = 20;

/// Cloudflare remote API
///
/// # Dry-Run Mode
///
/// When `dry_run` is true:
/// - All GET requests are performed
/// - Mutations are logged with their payload and **NOT** sent
/// - Created objects are synthesized with `dry-run-N` IDs
///
/// # Security
///
/// The Debug implementation does NOT expose the API token.
pub struct CloudflareApi {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// API base URL, without trailing slash
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: perform GET requests but only log mutations
    dry_run: bool,

    /// Counter for synthesized dry-run IDs
    dry_run_ids: AtomicU64,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareApi")
            .field("api_token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareApi {
    /// Create a new Cloudflare API client
    ///
    /// # Parameters
    ///
    /// - `api_token`: API token with Zone:Read, DNS:Edit and (for IP lists)
    ///   Account Filter Lists:Edit permissions
    /// - `dry_run`: If true, perform GET requests but only log mutations
    ///
    /// # Returns
    ///
    /// - `Err(Error::Config)`: the token is empty
    /// - `Err(Error::Http)`: the HTTP client could not be built
    pub fn new(api_token: impl Into<String>, dry_run: bool) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        if dry_run {
            warn!("Cloudflare API running in DRY-RUN mode - no changes will be made");
        }

        Ok(Self {
            api_token,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run,
            dry_run_ids: AtomicU64::new(0),
        })
    }

    /// Create a client from the provider configuration
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        config.validate()?;
        match config {
            ProviderConfig::Cloudflare { api_token, dry_run } => {
                Self::new(api_token.clone(), *dry_run)
            }
        }
    }

    /// Point the client at another API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Check that the token is valid and active
    ///
    /// ```http
    /// GET /user/tokens/verify
    /// ```
    pub async fn verify_token(&self) -> Result<()> {
        let status: TokenStatus = self
            .fetch(self.request(Method::GET, "/user/tokens/verify"), "verify token")
            .await?;

        if status.status != "active" {
            return Err(Error::auth(format!("API token is {}", status.status)));
        }
        debug!("API token verified");
        Ok(())
    }

    /// Log a mutation instead of sending it
    fn log_dry_run(&self, method: Method, path: &str, payload: &impl serde::Serialize) {
        let payload = serde_json::to_string(payload).unwrap_or_default();
        info!(
            "[DRY-RUN] Would send {} request to {}{} with payload: {}",
            method, self.base_url, path, payload
        );
    }

    fn dry_run_id(&self) -> String {
        let n = self.dry_run_ids.fetch_add(1, Ordering::Relaxed) + 1;
        format!("dry-run-{}", n)
    }

    /// Wait for an asynchronous list item operation to finish
    ///
    /// ```http
    /// GET /accounts/:account_id/rules/lists/bulk_operations/:operation_id
    /// ```
    async fn wait_for_operation(&self, account_id: &str, operation_id: &str) -> Result<()> {
        let path = format!(
            "/accounts/{}/rules/lists/bulk_operations/{}",
            account_id, operation_id
        );

        for attempt in 0..BULK_POLL_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(BULK_POLL_INTERVAL).await;
            }

            let op: OperationStatus = self
                .fetch(self.request(Method::GET, &path), "poll list operation")
                .await?;

            match op.status.as_str() {
                "completed" => return Ok(()),
                "failed" => {
                    return Err(Error::provider(
                        PROVIDER,
                        format!(
                            "list operation {} failed: {}",
                            operation_id,
                            op.error.unwrap_or_default()
                        ),
                    ));
                }
                other => debug!(operation_id = %operation_id, status = %other, "list operation still running"),
            }
        }

        Err(Error::provider(
            PROVIDER,
            format!("list operation {} did not complete in time", operation_id),
        ))
    }
}

fn to_record(body: RecordBody, family: IpFamily) -> Result<DnsRecord> {
    if body.kind != family.record_type() {
        return Err(Error::invalid_record(format!(
            "record {} has type {}, expected {}",
            body.id,
            body.kind,
            family.record_type()
        )));
    }

    let ip: IpAddr = body.content.parse().map_err(|_| {
        Error::invalid_record(format!(
            "record {} has content {:?}, which is not an IP address",
            body.id, body.content
        ))
    })?;
    if !family.matches(&ip) {
        return Err(Error::invalid_record(format!(
            "record {} holds {} in a {} record",
            body.id,
            ip,
            family.record_type()
        )));
    }

    Ok(DnsRecord {
        id: body.id,
        ip,
        attrs: RecordAttrs {
            ttl: body.ttl,
            proxied: body.proxied,
            comment: body.comment.unwrap_or_default(),
        },
    })
}

fn to_list(body: ListBody) -> WafList {
    WafList {
        id: body.id,
        name: body.name,
        description: body.description.unwrap_or_default(),
        kind: body.kind,
    }
}

fn to_item(body: ItemBody) -> Result<WafListItem> {
    let raw = body.ip.ok_or_else(|| {
        Error::invalid_record(format!("list item {} carries no IP prefix", body.id))
    })?;
    let prefix: IpPrefix = raw.parse().map_err(|_| {
        Error::invalid_record(format!("list item {} has invalid prefix {:?}", body.id, raw))
    })?;
    Ok(WafListItem { id: body.id, prefix })
}

fn new_items<'a>(prefixes: &[IpPrefix], comment: Option<&'a str>) -> Vec<NewItem<'a>> {
    prefixes
        .iter()
        .map(|prefix| NewItem {
            ip: prefix.to_string(),
            comment,
        })
        .collect()
}

fn non_empty(s: &str) -> Option<&str> {
    Some(s).filter(|s| !s.is_empty())
}

#[async_trait]
impl RemoteApi for CloudflareApi {
    async fn list_zones(&self, name: &str) -> Result<Vec<Zone>> {
        let zones: Vec<ZoneBody> = self
            .fetch(
                self.request(Method::GET, "/zones")
                    .query(&[("name", name), ("per_page", "50")]),
                "list zones",
            )
            .await?;

        Ok(zones
            .into_iter()
            .map(|z| Zone {
                id: z.id,
                name: z.name,
                status: ZoneStatus::parse(&z.status),
            })
            .collect())
    }

    async fn list_records(
        &self,
        zone_id: &str,
        domain: &Domain,
        family: IpFamily,
    ) -> Result<Vec<DnsRecord>> {
        let path = format!("/zones/{}/dns_records", zone_id);
        let name = domain.dns_name_ascii();
        let mut records = Vec::new();
        let mut page = 1u32;

        loop {
            let page_str = page.to_string();
            let envelope = self
                .send::<Vec<RecordBody>>(
                    self.request(Method::GET, &path).query(&[
                        ("name", name.as_str()),
                        ("type", family.record_type()),
                        ("per_page", RECORDS_PER_PAGE),
                        ("page", page_str.as_str()),
                    ]),
                    "list records",
                )
                .await?;

            for body in envelope.result.unwrap_or_default() {
                records.push(to_record(body, family)?);
            }

            match envelope.result_info {
                Some(info) if info.has_next_page() => page += 1,
                _ => break,
            }
        }

        Ok(records)
    }

    async fn create_record(
        &self,
        zone_id: &str,
        domain: &Domain,
        family: IpFamily,
        ip: IpAddr,
        attrs: &RecordAttrs,
    ) -> Result<DnsRecord> {
        if !family.matches(&ip) {
            return Err(Error::invalid_input(format!(
                "{} is not an {} address",
                ip, family
            )));
        }

        let path = format!("/zones/{}/dns_records", zone_id);
        let name = domain.dns_name_ascii();
        let payload = NewRecord {
            kind: family.record_type(),
            name: &name,
            content: ip.to_string(),
            ttl: attrs.ttl,
            proxied: attrs.proxied,
            comment: non_empty(&attrs.comment),
        };

        if self.dry_run {
            self.log_dry_run(Method::POST, &path, &payload);
            return Ok(DnsRecord {
                id: self.dry_run_id(),
                ip,
                attrs: attrs.clone(),
            });
        }

        let body: RecordBody = self
            .fetch(self.request(Method::POST, &path).json(&payload), "create record")
            .await?;
        to_record(body, family)
    }

    async fn update_record(
        &self,
        zone_id: &str,
        _domain: &Domain,
        family: IpFamily,
        record_id: &str,
        ip: IpAddr,
    ) -> Result<()> {
        if !family.matches(&ip) {
            return Err(Error::invalid_input(format!(
                "{} is not an {} address",
                ip, family
            )));
        }

        let path = format!("/zones/{}/dns_records/{}", zone_id, record_id);
        let payload = RecordPatch {
            content: ip.to_string(),
        };

        if self.dry_run {
            self.log_dry_run(Method::PATCH, &path, &payload);
            return Ok(());
        }

        self.execute(self.request(Method::PATCH, &path).json(&payload), "update record")
            .await
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        let path = format!("/zones/{}/dns_records/{}", zone_id, record_id);

        if self.dry_run {
            self.log_dry_run(Method::DELETE, &path, &serde_json::Value::Null);
            return Ok(());
        }

        self.execute(self.request(Method::DELETE, &path), "delete record")
            .await
    }

    async fn list_lists(&self, account_id: &str) -> Result<Vec<WafList>> {
        let path = format!("/accounts/{}/rules/lists", account_id);
        let lists: Vec<ListBody> = self
            .fetch(self.request(Method::GET, &path), "list IP lists")
            .await?;
        Ok(lists.into_iter().map(to_list).collect())
    }

    async fn create_list(
        &self,
        account_id: &str,
        name: &str,
        description: &str,
    ) -> Result<WafList> {
        let path = format!("/accounts/{}/rules/lists", account_id);
        let payload = NewList {
            name,
            description,
            kind: "ip",
        };

        if self.dry_run {
            self.log_dry_run(Method::POST, &path, &payload);
            return Ok(WafList {
                id: self.dry_run_id(),
                name: name.to_string(),
                description: description.to_string(),
                kind: "ip".to_string(),
            });
        }

        let body: ListBody = self
            .fetch(self.request(Method::POST, &path).json(&payload), "create IP list")
            .await?;
        Ok(to_list(body))
    }

    async fn delete_list(&self, account_id: &str, list_id: &str) -> Result<()> {
        let path = format!("/accounts/{}/rules/lists/{}", account_id, list_id);

        if self.dry_run {
            self.log_dry_run(Method::DELETE, &path, &serde_json::Value::Null);
            return Ok(());
        }

        self.execute(self.request(Method::DELETE, &path), "delete IP list")
            .await
    }

    async fn list_list_items(&self, account_id: &str, list_id: &str) -> Result<Vec<WafListItem>> {
        let path = format!("/accounts/{}/rules/lists/{}/items", account_id, list_id);
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut request = self
                .request(Method::GET, &path)
                .query(&[("per_page", ITEMS_PER_PAGE)]);
            if let Some(after) = &cursor {
                request = request.query(&[("cursor", after.as_str())]);
            }

            let envelope = self
                .send::<Vec<ItemBody>>(request, "list IP list items")
                .await?;

            for body in envelope.result.unwrap_or_default() {
                items.push(to_item(body)?);
            }

            cursor = envelope
                .result_info
                .as_ref()
                .and_then(|info| info.next_cursor())
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }

        Ok(items)
    }

    async fn create_list_items(
        &self,
        account_id: &str,
        list_id: &str,
        prefixes: &[IpPrefix],
        comment: &str,
    ) -> Result<Vec<WafListItem>> {
        let path = format!("/accounts/{}/rules/lists/{}/items", account_id, list_id);
        let payload = new_items(prefixes, non_empty(comment));

        if self.dry_run {
            self.log_dry_run(Method::POST, &path, &payload);
            return Ok(prefixes
                .iter()
                .map(|prefix| WafListItem {
                    id: self.dry_run_id(),
                    prefix: *prefix,
                })
                .collect());
        }

        let op: OperationRef = self
            .fetch(self.request(Method::POST, &path).json(&payload), "add IP list items")
            .await?;
        self.wait_for_operation(account_id, &op.operation_id).await?;

        // The operation answers with no items; read back the ones just added
        let items = self.list_list_items(account_id, list_id).await?;
        Ok(items
            .into_iter()
            .filter(|item| prefixes.contains(&item.prefix))
            .collect())
    }

    async fn delete_list_items(
        &self,
        account_id: &str,
        list_id: &str,
        item_ids: &[String],
    ) -> Result<()> {
        let path = format!("/accounts/{}/rules/lists/{}/items", account_id, list_id);
        let payload = DeleteItems {
            items: item_ids.iter().map(|id| ItemRef { id: id.as_str() }).collect(),
        };

        if self.dry_run {
            self.log_dry_run(Method::DELETE, &path, &payload);
            return Ok(());
        }

        let op: OperationRef = self
            .fetch(
                self.request(Method::DELETE, &path).json(&payload),
                "remove IP list items",
            )
            .await?;
        self.wait_for_operation(account_id, &op.operation_id).await
    }

    async fn replace_list_items(
        &self,
        account_id: &str,
        list_id: &str,
        prefixes: &[IpPrefix],
    ) -> Result<()> {
        let path = format!("/accounts/{}/rules/lists/{}/items", account_id, list_id);
        let payload = new_items(prefixes, None);

        if self.dry_run {
            self.log_dry_run(Method::PUT, &path, &payload);
            return Ok(());
        }

        let op: OperationRef = self
            .fetch(
                self.request(Method::PUT, &path).json(&payload),
                "replace IP list items",
            )
            .await?;
        debug!(list_id = %list_id, operation_id = %op.operation_id, "replacement of IP list items started");
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}
