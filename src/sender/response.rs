use serde::Deserialize;
use tracing::warn;

use crate::buffer::Payload;
use crate::shipper::level::Level;

/// A batch (or batch subset) the server reported as rejected.
///
/// `bad_payload` holds the rejected action/document pairs verbatim; it is
/// what ends up in a quarantine file. `server_response` is kept for
/// diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidResult {
    pub status_code: u16,
    pub server_response: String,
    pub bad_payload: String,
}

/// Server guidance about the minimum level worth shipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelHint {
    /// No response was inspected; leave the level switch alone.
    #[default]
    Unknown,
    /// The server expressed no restriction; clear any existing one.
    Unrestricted,
    /// Ship only events at or above this level.
    Minimum(Level),
}

/// Outcome of a send that reached a 2xx response (or had nothing to send).
#[derive(Debug, Clone, Default)]
pub struct SendResult {
    /// HTTP status, `None` when an empty payload skipped the network call.
    pub status: Option<u16>,
    /// Per-item rejections, `None` on a clean success.
    pub invalid: Option<InvalidResult>,
    pub level_hint: LevelHint,
}

impl SendResult {
    /// The no-network-call result for an empty payload.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Structured body of a bulk response: per-item results plus an optional
/// server-driven minimum-level hint. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkItem>,
    #[serde(default)]
    pub minimum_level: Option<String>,
}

/// One entry of the `items` array, keyed by the operation type.
#[derive(Debug, Deserialize)]
pub struct BulkItem {
    #[serde(default)]
    index: Option<ItemResult>,
    #[serde(default)]
    create: Option<ItemResult>,
}

impl BulkItem {
    pub fn result(&self) -> Option<&ItemResult> {
        self.index.as_ref().or(self.create.as_ref())
    }
}

#[derive(Debug, Deserialize)]
pub struct ItemResult {
    #[serde(default)]
    pub status: u16,
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub error: Option<ItemError>,
}

#[derive(Debug, Deserialize)]
pub struct ItemError {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub reason: String,
}

/// Collects every item with status >= 300 into one quarantine bundle,
/// recovering each rejected document from the sent payload via the numeric
/// batch index embedded in its `_id` (`"{index}_{uuid}"`).
///
/// A malformed or out-of-range id is logged and skipped; rejection handling
/// must never fail on a strange server response.
pub fn classify_items(
    payload: &Payload,
    response: &BulkResponse,
    raw_body: &str,
) -> Option<InvalidResult> {
    let mut bad_payload = String::new();
    let mut first_status: Option<u16> = None;
    for item in &response.items {
        let Some(result) = item.result() else { continue };
        if result.status < 300 {
            continue;
        }
        first_status.get_or_insert(result.status);
        let reason = result
            .error
            .as_ref()
            .map(|e| format!("{}: {}", e.kind, e.reason))
            .unwrap_or_default();
        match parse_batch_index(&result.id) {
            Some(index) if index < payload.items.len() => {
                let pair = &payload.items[index];
                warn!(
                    id = %result.id,
                    status = result.status,
                    reason = %reason,
                    "Server rejected a document"
                );
                bad_payload.push_str(&pair.action);
                bad_payload.push('\n');
                bad_payload.push_str(&pair.document);
                bad_payload.push('\n');
            }
            _ => {
                warn!(
                    id = %result.id,
                    status = result.status,
                    reason = %reason,
                    "Rejected item id does not correlate to the sent batch"
                );
            }
        }
    }
    first_status.map(|status_code| InvalidResult {
        status_code,
        server_response: raw_body.to_string(),
        bad_payload,
    })
}

/// Level guidance carried by a successful response. An absent field means
/// the server imposes no restriction.
pub fn level_hint(response: &BulkResponse) -> LevelHint {
    match response.minimum_level.as_deref() {
        None => LevelHint::Unrestricted,
        Some(raw) => match raw.parse::<Level>() {
            Ok(level) => LevelHint::Minimum(level),
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable minimum level from server");
                LevelHint::Unknown
            }
        },
    }
}

fn parse_batch_index(id: &str) -> Option<usize> {
    id.split('_').next()?.parse().ok()
}
