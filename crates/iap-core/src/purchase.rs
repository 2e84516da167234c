//! # Purchase Events
//!
//! Purchase lifecycle events emitted by store providers.
//! Events arrive at any time after initialization: in response to `buy`,
//! during `restore`, or from asynchronous store callbacks.

use crate::product::ProductType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Status carried by a purchase event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Pending,
    Purchased,
    Restored,
    Canceled,
    Expired,
    Error,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Purchased => "purchased",
            PurchaseStatus::Restored => "restored",
            PurchaseStatus::Canceled => "canceled",
            PurchaseStatus::Expired => "expired",
            PurchaseStatus::Error => "error",
        }
    }

    /// Whether the event grants the user the product
    pub fn is_entitled(&self) -> bool {
        matches!(self, PurchaseStatus::Purchased | PurchaseStatus::Restored)
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(PurchaseStatus::Pending),
            "purchased" => Ok(PurchaseStatus::Purchased),
            "restored" => Ok(PurchaseStatus::Restored),
            "canceled" | "cancelled" => Ok(PurchaseStatus::Canceled),
            "expired" => Ok(PurchaseStatus::Expired),
            "error" => Ok(PurchaseStatus::Error),
            other => Err(format!("unknown purchase status: {other}")),
        }
    }
}

/// A purchase event reported by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseEvent {
    /// Originating provider id
    pub provider_id: String,

    /// Product the event refers to
    pub product_id: String,

    /// Store transaction id (empty for canceled or failed events)
    #[serde(default)]
    pub transaction_id: String,

    /// Event status
    pub status: PurchaseStatus,

    /// Product type, when the store reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<ProductType>,

    /// When the provider observed the event
    pub occurred_at: DateTime<Utc>,

    /// Opaque store payload, for diagnostics only
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub raw: Map<String, Value>,
}

impl PurchaseEvent {
    /// Create a new event stamped with the current time
    pub fn new(
        provider_id: impl Into<String>,
        product_id: impl Into<String>,
        status: PurchaseStatus,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            product_id: product_id.into(),
            transaction_id: String::new(),
            status,
            product_type: None,
            occurred_at: Utc::now(),
            raw: Map::new(),
        }
    }

    /// Builder: set transaction id
    pub fn with_transaction(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = transaction_id.into();
        self
    }

    /// Builder: set product type
    pub fn with_product_type(mut self, product_type: ProductType) -> Self {
        self.product_type = Some(product_type);
        self
    }

    /// Builder: add a raw payload entry
    pub fn with_raw(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.raw.insert(key.into(), value.into());
        self
    }

    /// Check the event against optional type and status filters.
    ///
    /// Events with an unknown product type pass a type filter.
    pub fn matches(&self, product_type: Option<ProductType>, status: Option<PurchaseStatus>) -> bool {
        let type_ok = match (product_type, self.product_type) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => true,
        };
        let status_ok = status.map(|s| s == self.status).unwrap_or(true);
        type_ok && status_ok
    }
}
