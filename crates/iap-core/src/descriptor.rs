//! # Provider Descriptors
//!
//! Immutable identity of a store provider: id, platform, capabilities and the
//! range of core contract versions it was built against.

use crate::error::{IapError, IapResult};
use crate::product::{Capabilities, Platform, ProductType};
use serde::Serialize;

/// Contract version implemented by this core
pub const API_VERSION: u32 = 1;

/// Immutable description of a store provider.
///
/// Updates go through the consuming `with_*` builders, which return a new
/// validated descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    id: String,
    name: String,
    platform: Platform,
    capabilities: Capabilities,
    api_version_min: u32,
    api_version_max: u32,
}

impl ProviderDescriptor {
    /// Create a descriptor.
    ///
    /// Fails with `InvalidDescriptor` when the id is blank or
    /// `api_version_min > api_version_max`.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        platform: Platform,
        capabilities: impl IntoIterator<Item = ProductType>,
        api_version_min: u32,
        api_version_max: u32,
    ) -> IapResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(IapError::InvalidDescriptor(
                "provider id must not be empty".to_string(),
            ));
        }
        if api_version_min > api_version_max {
            return Err(IapError::InvalidDescriptor(format!(
                "{}: api_version_min {} exceeds api_version_max {}",
                id, api_version_min, api_version_max
            )));
        }

        Ok(Self {
            id,
            name: name.into(),
            platform,
            capabilities: capabilities.into_iter().collect(),
            api_version_min,
            api_version_max,
        })
    }

    /// Descriptor pinned to exactly the running contract version
    pub fn current(
        id: impl Into<String>,
        name: impl Into<String>,
        platform: Platform,
        capabilities: impl IntoIterator<Item = ProductType>,
    ) -> IapResult<Self> {
        Self::new(id, name, platform, capabilities, API_VERSION, API_VERSION)
    }

    /// Whether `version` lies within the inclusive supported range
    pub fn supports(&self, version: u32) -> bool {
        self.api_version_min <= version && version <= self.api_version_max
    }

    /// Whether this provider handles the given product type
    pub fn handles(&self, product_type: ProductType) -> bool {
        self.capabilities.contains(&product_type)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn api_version_min(&self) -> u32 {
        self.api_version_min
    }

    pub fn api_version_max(&self) -> u32 {
        self.api_version_max
    }

    /// Builder: copy with a new display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder: copy with an additional capability
    pub fn with_capability(mut self, product_type: ProductType) -> Self {
        self.capabilities.insert(product_type);
        self
    }

    /// Builder: copy with a new version range
    pub fn with_api_versions(self, min: u32, max: u32) -> IapResult<Self> {
        Self::new(self.id, self.name, self.platform, self.capabilities, min, max)
    }
}
