//! Universalis REST API Client
//!
//! Market board sale history for a region. The API answers a one-item
//! request with a bare item object and a multi-item request with an
//! `items` map; both are normalized into [`HistoryBatch`] here so callers
//! never see the difference.

use anyhow::Context;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::models::ItemId;

pub const UNIVERSALIS_API_BASE: &str = "https://universalis.app/api/v2";

/// Largest `entriesToReturn` the API accepts.
pub const MAX_HISTORY_ENTRIES: u32 = 99_999;

/// Largest number of item ids the API accepts per request.
pub const MAX_ITEMS_PER_REQUEST: usize = 100;

const MAX_SALE_PRICE: i64 = 2_147_483_647;

// ============================================================================
// QUERY / RESPONSE TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub item_ids: Vec<ItemId>,
    /// Region, data center or world name (`europe`, `light`, `lich`, ...)
    pub region: String,
    pub entries: u32,
}

impl HistoryQuery {
    /// Entry count is clamped to `1..=MAX_HISTORY_ENTRIES`.
    pub fn new(item_ids: Vec<ItemId>, region: impl Into<String>, entries: u32) -> Self {
        Self {
            item_ids,
            region: region.into(),
            entries: entries.clamp(1, MAX_HISTORY_ENTRIES),
        }
    }

    /// Most recent sale only; used for change detection.
    pub fn sample(item_ids: Vec<ItemId>, region: impl Into<String>) -> Self {
        Self::new(item_ids, region, 1)
    }

    pub fn full_history(item_ids: Vec<ItemId>, region: impl Into<String>) -> Self {
        Self::new(item_ids, region, MAX_HISTORY_ENTRIES)
    }
}

/// One raw sale as served by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleEntry {
    pub hq: bool,
    pub price_per_unit: i64,
    pub quantity: i64,
    pub buyer_name: String,
    /// Epoch seconds
    pub timestamp: i64,
    pub world_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawItemHistory")]
pub struct ItemHistory {
    pub item_id: ItemId,
    /// Epoch milliseconds
    pub last_upload_time: i64,
    pub entries: Vec<SaleEntry>,
}

/// Normalized response: item id -> history.
pub type HistoryBatch = HashMap<ItemId, ItemHistory>;

/// World-scoped responses carry `worldID` once at the item level and omit it
/// from each entry; region and data center responses set it per entry.
#[derive(Debug, Deserialize)]
struct RawSaleEntry {
    hq: bool,
    #[serde(rename = "pricePerUnit")]
    price_per_unit: i64,
    quantity: i64,
    #[serde(rename = "buyerName")]
    buyer_name: String,
    timestamp: i64,
    #[serde(rename = "worldID", default)]
    world_id: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawItemHistory {
    #[serde(rename = "itemID")]
    item_id: ItemId,
    #[serde(rename = "lastUploadTime")]
    last_upload_time: i64,
    #[serde(rename = "worldID", default)]
    world_id: Option<u32>,
    #[serde(default)]
    entries: Vec<RawSaleEntry>,
}

impl TryFrom<RawItemHistory> for ItemHistory {
    type Error = String;

    fn try_from(raw: RawItemHistory) -> Result<Self, Self::Error> {
        let item_id = raw.item_id;
        let item_world = raw.world_id;

        let entries = raw
            .entries
            .into_iter()
            .map(|entry| {
                let world_id = entry.world_id.or(item_world).ok_or_else(|| {
                    format!(
                        "sale at {} for item {} has no worldID",
                        entry.timestamp, item_id
                    )
                })?;
                Ok(SaleEntry {
                    hq: entry.hq,
                    price_per_unit: entry.price_per_unit,
                    quantity: entry.quantity,
                    buyer_name: entry.buyer_name,
                    timestamp: entry.timestamp,
                    world_id,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;

        Ok(Self {
            item_id,
            last_upload_time: raw.last_upload_time,
            entries,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MultiItemResponse {
    items: HashMap<String, ItemHistory>,
    #[serde(rename = "unresolvedItems", default)]
    unresolved_items: Vec<ItemId>,
}

enum HistoryResponse {
    Multi(MultiItemResponse),
    Single(ItemHistory),
}

impl HistoryResponse {
    fn into_batch(self) -> HistoryBatch {
        match self {
            Self::Multi(multi) => {
                if !multi.unresolved_items.is_empty() {
                    debug!(unresolved = ?multi.unresolved_items, "Universalis could not resolve items");
                }
                multi
                    .items
                    .into_values()
                    .map(|item| (item.item_id, item))
                    .collect()
            }
            Self::Single(item) => HashMap::from([(item.item_id, item)]),
        }
    }
}

/// Decode a history response body of either shape. The shape is picked by
/// the presence of an `items` key so decode errors name the offending field.
pub fn decode_history(body: &[u8]) -> Result<HistoryBatch, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    let response = if value.get("items").is_some() {
        HistoryResponse::Multi(serde_json::from_value(value)?)
    } else {
        HistoryResponse::Single(serde_json::from_value(value)?)
    };
    Ok(response.into_batch())
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors surfaced by a history source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// A request with no item ids is malformed; nothing was sent.
    EmptyQuery,
    /// Connection failure or non-success HTTP status.
    Transport { url: String, reason: String },
    /// Body did not match either response shape.
    Decode { url: String, reason: String },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyQuery => write!(f, "history query has no item ids"),
            Self::Transport { url, reason } => write!(f, "GET {} failed: {}", url, reason),
            Self::Decode { url, reason } => {
                write!(f, "failed to decode history response from {}: {}", url, reason)
            }
        }
    }
}

impl std::error::Error for FetchError {}

// ============================================================================
// SOURCE TRAIT + CLIENT
// ============================================================================

/// Anything that can answer a history query.
#[async_trait::async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_history(&self, query: &HistoryQuery) -> Result<HistoryBatch, FetchError>;
}

#[derive(Clone)]
pub struct UniversalisClient {
    client: Client,
    base_url: String,
}

impl UniversalisClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("marketboard-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build UniversalisClient")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Request URL without the query string.
    pub fn history_url(&self, query: &HistoryQuery) -> String {
        let ids = query
            .item_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!("{}/history/{}/{}", self.base_url, query.region, ids)
    }

    fn query_params(query: &HistoryQuery) -> [(&'static str, String); 3] {
        [
            ("entriesToReturn", query.entries.to_string()),
            ("minSalePrice", "0".to_string()),
            ("maxSalePrice", MAX_SALE_PRICE.to_string()),
        ]
    }
}

#[async_trait::async_trait]
impl HistorySource for UniversalisClient {
    async fn fetch_history(&self, query: &HistoryQuery) -> Result<HistoryBatch, FetchError> {
        if query.item_ids.is_empty() {
            return Err(FetchError::EmptyQuery);
        }

        let url = self.history_url(query);
        debug!(
            items = query.item_ids.len(),
            region = %query.region,
            entries = query.entries,
            "Fetching sale history"
        );

        let transport = |reason: String| FetchError::Transport {
            url: url.clone(),
            reason,
        };

        let resp = self
            .client
            .get(&url)
            .query(&Self::query_params(query))
            .send()
            .await
            .map_err(|e| transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(transport(format!("{}: {}", status, text)));
        }

        let body = resp.bytes().await.map_err(|e| transport(e.to_string()))?;

        decode_history(&body).map_err(|e| FetchError::Decode {
            url: url.clone(),
            reason: e.to_string(),
        })
    }
}
