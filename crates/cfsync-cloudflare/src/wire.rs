//! Cloudflare API v4 request and response bodies

use serde::{Deserialize, Serialize};

/// Every v4 response is wrapped in this envelope
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    pub result: Option<T>,
    #[serde(default)]
    pub result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResultInfo {
    pub page: Option<u32>,
    pub total_pages: Option<u32>,
    pub cursors: Option<Cursors>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Cursors {
    pub after: Option<String>,
}

impl ResultInfo {
    /// Whether page-numbered results continue past this page
    pub fn has_next_page(&self) -> bool {
        matches!((self.page, self.total_pages), (Some(page), Some(total)) if page < total)
    }

    /// Cursor of the next page for cursor-paginated results
    pub fn next_cursor(&self) -> Option<&str> {
        self.cursors
            .as_ref()
            .and_then(|c| c.after.as_deref())
            .filter(|after| !after.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ZoneBody {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordBody {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    #[serde(default = "auto_ttl")]
    pub ttl: u32,
    #[serde(default)]
    pub proxied: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

fn auto_ttl() -> u32 {
    1
}

#[derive(Debug, Serialize)]
pub(crate) struct NewRecord<'a> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub name: &'a str,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<&'a str>,
}

/// PATCH body: only the content changes
#[derive(Debug, Serialize)]
pub(crate) struct RecordPatch {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListBody {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewList<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub kind: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ItemBody {
    pub id: String,
    #[serde(default)]
    pub ip: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewItem<'a> {
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ItemRef<'a> {
    pub id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteItems<'a> {
    pub items: Vec<ItemRef<'a>>,
}

/// Answer to an asynchronous list item operation
#[derive(Debug, Deserialize)]
pub(crate) struct OperationRef {
    pub operation_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OperationStatus {
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenStatus {
    pub status: String,
}
