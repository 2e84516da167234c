//! # Sandbox Catalog
//!
//! Products offered by the sandbox store, loaded from TOML.
//!
//! ```toml
//! [[products]]
//! id = "gems_100"
//! title = "100 Gems"
//! price = "$0.99"
//! currency = "USD"
//! product_type = "consumable"
//! ```

use iap_core::{Capabilities, IapError, IapResult, Product, ProductType};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A product in the sandbox catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Store product id (SKU)
    pub id: String,

    /// Display title
    pub title: String,

    /// Short description
    #[serde(default)]
    pub description: String,

    /// Price label shown to users
    pub price: String,

    /// ISO 4217 currency code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    /// Product type
    pub product_type: ProductType,

    /// Purchases of this product always fail (for exercising error paths)
    #[serde(default)]
    pub fail_purchase: bool,
}

impl CatalogEntry {
    /// Create a new catalog entry
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        price: impl Into<String>,
        product_type: ProductType,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            price: price.into(),
            currency: None,
            product_type,
            fail_purchase: false,
        }
    }

    /// Builder: set currency
    pub fn with_currency(mut self, code: impl Into<String>) -> Self {
        self.currency = Some(code.into());
        self
    }

    /// Builder: make purchases of this entry fail
    pub fn failing(mut self) -> Self {
        self.fail_purchase = true;
        self
    }

    /// Snapshot as a product owned by `provider_id`
    pub fn to_product(&self, provider_id: &str) -> Product {
        let mut product = Product::new(
            self.id.clone(),
            self.title.clone(),
            self.price.clone(),
            self.product_type,
            provider_id,
        )
        .with_description(self.description.clone())
        .with_raw("sandbox", true);
        product.currency = self.currency.clone();
        product
    }
}

/// Sandbox product catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxCatalog {
    #[serde(default)]
    pub products: Vec<CatalogEntry>,
}

impl SandboxCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            products: Vec::new(),
        }
    }

    /// Small catalog covering every product type
    pub fn demo() -> Self {
        Self::new()
            .with_entry(CatalogEntry::new("gems_100", "100 Gems", "$0.99", ProductType::Consumable).with_currency("USD"))
            .with_entry(
                CatalogEntry::new("remove_ads", "Remove Ads", "$2.99", ProductType::NonConsumable)
                    .with_currency("USD"),
            )
            .with_entry(
                CatalogEntry::new("pro_monthly", "Pro Monthly", "$4.99/month", ProductType::Subscription)
                    .with_currency("USD"),
            )
    }

    /// Add a product to the catalog
    pub fn add(&mut self, entry: CatalogEntry) {
        self.products.push(entry);
    }

    /// Add a product with builder pattern
    pub fn with_entry(mut self, entry: CatalogEntry) -> Self {
        self.add(entry);
        self
    }

    /// Find a product by ID
    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.products.iter().find(|p| p.id == id)
    }

    /// Product types present in the catalog
    pub fn capabilities(&self) -> Capabilities {
        self.products.iter().map(|p| p.product_type).collect()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Load catalog from TOML string
    pub fn from_toml(toml_str: &str) -> IapResult<Self> {
        toml::from_str(toml_str)
            .map_err(|e| IapError::Configuration(format!("Invalid sandbox catalog: {}", e)))
    }

    /// Load catalog from a TOML file
    pub fn load(path: &Path) -> IapResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IapError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }
}
