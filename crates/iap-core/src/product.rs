//! # Product Types
//!
//! Catalog types shared by every store provider.
//! Products are immutable snapshots produced by a provider's catalog query.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Kind of product a store can sell
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    /// Used up once purchased (coins, lives)
    Consumable,
    /// Owned forever once purchased (unlocks)
    NonConsumable,
    /// Recurring entitlement
    Subscription,
}

impl ProductType {
    /// All product types, in declaration order
    pub const ALL: [ProductType; 3] = [
        ProductType::Consumable,
        ProductType::NonConsumable,
        ProductType::Subscription,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Consumable => "consumable",
            ProductType::NonConsumable => "non_consumable",
            ProductType::Subscription => "subscription",
        }
    }

    /// Whether a purchase of this type survives a restore
    pub fn is_restorable(&self) -> bool {
        !matches!(self, ProductType::Consumable)
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "consumable" => Ok(ProductType::Consumable),
            "non_consumable" | "nonconsumable" => Ok(ProductType::NonConsumable),
            "subscription" => Ok(ProductType::Subscription),
            other => Err(format!("unknown product type: {other}")),
        }
    }
}

/// Set of product types a provider can handle
pub type Capabilities = BTreeSet<ProductType>;

/// Platform a provider targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    #[default]
    Any,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Any => "any",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            "any" => Ok(Platform::Any),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// A product as reported by a store provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Store-side product identifier (SKU)
    pub id: String,

    /// Display title
    pub title: String,

    /// Short description
    #[serde(default)]
    pub description: String,

    /// Already-formatted price label (e.g. "$0.99")
    pub price: String,

    /// ISO 4217 currency code, when the store reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    /// Product type
    pub product_type: ProductType,

    /// Owning provider id
    pub provider_id: String,

    /// Opaque store payload, for diagnostics only
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub raw: Map<String, Value>,
}

impl Product {
    /// Create a new product snapshot
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        price: impl Into<String>,
        product_type: ProductType,
        provider_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            price: price.into(),
            currency: None,
            product_type,
            provider_id: provider_id.into(),
            raw: Map::new(),
        }
    }

    /// Builder: set description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder: set currency code
    pub fn with_currency(mut self, code: impl Into<String>) -> Self {
        self.currency = Some(code.into());
        self
    }

    /// Builder: add a raw payload entry
    pub fn with_raw(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.raw.insert(key.into(), value.into());
        self
    }
}
