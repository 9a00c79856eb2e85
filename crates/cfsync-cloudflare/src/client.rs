//! HTTP plumbing: authentication, status mapping and envelope decoding

use cfsync_core::{Error, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::CloudflareApi;
use crate::wire::{ApiMessage, Envelope};

/// Provider name used in errors and logs
pub(crate) const PROVIDER: &str = "cloudflare";

impl CloudflareApi {
    /// Start an authenticated request to `path` (relative to the API base)
    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        debug!(method = %method, path = %path, "Cloudflare API request");
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_token)
    }

    /// Send a request and decode its envelope
    ///
    /// `context` names the operation in error messages.
    pub(crate) async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> Result<Envelope<T>> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::http(format!("{}: request failed: {}", context, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("{}: failed to read response: {}", context, e)))?;

        if !status.is_success() {
            return Err(status_error(status, context, &body));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            Error::provider(PROVIDER, format!("{}: failed to parse response: {}", context, e))
        })?;

        if !envelope.success {
            return Err(Error::provider(
                PROVIDER,
                format!("{}: {}", context, describe_errors(&envelope.errors)),
            ));
        }

        Ok(envelope)
    }

    /// Send a request whose answer must carry a `result`
    pub(crate) async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> Result<T> {
        self.send::<T>(request, context).await?.result.ok_or_else(|| {
            Error::provider(PROVIDER, format!("{}: response has no result", context))
        })
    }

    /// Send a request whose answer body does not matter beyond success
    pub(crate) async fn execute(&self, request: RequestBuilder, context: &str) -> Result<()> {
        self.send::<serde_json::Value>(request, context).await?;
        Ok(())
    }
}

/// Map a non-success HTTP status to an error
fn status_error(status: StatusCode, context: &str, body: &str) -> Error {
    let detail = serde_json::from_str::<Envelope<serde_json::Value>>(body)
        .ok()
        .map(|envelope| describe_errors(&envelope.errors))
        .filter(|detail| !detail.is_empty())
        .unwrap_or_else(|| body.trim().to_string());

    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "{}: invalid API token or insufficient permissions. Status: {}",
            context, status
        )),
        404 => Error::not_found(format!("{}: {}", context, detail)),
        409 => Error::provider(
            PROVIDER,
            format!("{}: conflict with a concurrent change: {}", context, detail),
        ),
        429 => Error::rate_limited(format!(
            "{}: rate limit exceeded. Status: {}",
            context, status
        )),
        500..=599 => Error::provider(
            PROVIDER,
            format!("{}: server error (transient): {} - {}", context, status, detail),
        ),
        _ => Error::provider(PROVIDER, format!("{}: {} - {}", context, status, detail)),
    }
}

fn describe_errors(errors: &[ApiMessage]) -> String {
    errors
        .iter()
        .map(|e| format!("{} (code {})", e.message, e.code))
        .collect::<Vec<_>>()
        .join("; ")
}
