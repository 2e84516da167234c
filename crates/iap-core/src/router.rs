//! # Purchase Router
//!
//! Host-facing catalog and purchase API. Resolves each call to one named
//! provider or fans it out to every ready provider, running the fan-out
//! concurrently and collecting per-provider failures next to the results.

use crate::error::{IapError, IapResult};
use crate::product::{Product, ProductType};
use crate::provider::SharedProvider;
use crate::purchase::{PurchaseEvent, PurchaseStatus};
use crate::registry::ProviderRegistry;
use futures::future::join_all;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Catalog query options
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductQuery {
    /// Query only this provider
    #[serde(default)]
    pub provider_id: Option<String>,
    /// Query the ready providers handling this type
    #[serde(default)]
    pub product_type: Option<ProductType>,
}

impl ProductQuery {
    pub fn provider(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: Some(provider_id.into()),
            product_type: None,
        }
    }

    pub fn of_type(product_type: ProductType) -> Self {
        Self {
            provider_id: None,
            product_type: Some(product_type),
        }
    }
}

/// Purchase history query options
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PurchaseQuery {
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub product_type: Option<ProductType>,
    #[serde(default)]
    pub status: Option<PurchaseStatus>,
}

/// One provider's error during a fan-out call
#[derive(Debug)]
pub struct ProviderFailure {
    pub provider_id: String,
    pub error: IapError,
}

/// Partial result of a call spread across providers
#[derive(Debug)]
pub struct FanOut<T> {
    pub items: Vec<T>,
    pub failures: Vec<ProviderFailure>,
}

impl<T> FanOut<T> {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// No provider failed
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Ids of the providers that failed
    pub fn failed_providers(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.provider_id.as_str()).collect()
    }
}

/// Routes catalog and purchase calls to providers
#[derive(Clone)]
pub struct PurchaseRouter {
    registry: Arc<ProviderRegistry>,
}

impl PurchaseRouter {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Look up products.
    ///
    /// With `query.provider_id` only that provider is asked and its failure is
    /// returned as an error. Otherwise every ready provider for
    /// `query.product_type` (or every ready provider) is asked concurrently;
    /// a failing provider contributes no products and is listed in
    /// `failures`.
    #[instrument(skip(self, ids), fields(ids = ids.len()))]
    pub async fn query_products(
        &self,
        ids: &BTreeSet<String>,
        query: &ProductQuery,
    ) -> IapResult<FanOut<Product>> {
        if ids.is_empty() {
            return Ok(FanOut::empty());
        }

        let ids = Arc::new(ids.clone());
        self.dispatch(
            query.provider_id.as_deref(),
            query.product_type,
            "query_products",
            move |provider| {
                let ids = ids.clone();
                async move { provider.query_products(&ids).await }
            },
        )
        .await
    }

    /// Start a purchase on an explicitly named provider.
    ///
    /// The provider's `buy` is never invoked unless the provider is ready.
    #[instrument(skip(self))]
    pub async fn buy(
        &self,
        product_id: &str,
        provider_id: &str,
        offer_id: Option<&str>,
    ) -> IapResult<()> {
        if product_id.trim().is_empty() {
            return Err(IapError::InvalidRequest("product_id is required".to_string()));
        }

        let record = self.registry.resolve(provider_id)?;
        let provider = record.ready_provider()?;

        debug!(provider = provider_id, product = product_id, "Dispatching buy");
        provider
            .buy(product_id, offer_id)
            .await
            .map_err(|e| IapError::provider_failed(provider_id, "buy", e))
    }

    /// Restore purchases on one provider, or on every ready provider.
    ///
    /// `items` lists the providers that restored successfully.
    #[instrument(skip(self))]
    pub async fn restore(&self, provider_id: Option<&str>) -> IapResult<FanOut<String>> {
        self.dispatch(provider_id, None, "restore", |provider| async move {
            let id = provider.provider_id().to_string();
            provider.restore().await.map(|()| vec![id])
        })
        .await
    }

    /// Collect known purchases.
    ///
    /// Type and status filters are passed to providers and re-applied here,
    /// since providers are free to ignore them.
    #[instrument(skip(self))]
    pub async fn get_purchases(&self, query: &PurchaseQuery) -> IapResult<FanOut<PurchaseEvent>> {
        let (product_type, status) = (query.product_type, query.status);
        let mut result = self
            .dispatch(
                query.provider_id.as_deref(),
                product_type,
                "get_purchases",
                move |provider| async move { provider.get_purchases(product_type, status).await },
            )
            .await?;

        result.items.retain(|event| event.matches(product_type, status));
        Ok(result)
    }

    async fn dispatch<F, Fut, T>(
        &self,
        provider_id: Option<&str>,
        product_type: Option<ProductType>,
        operation: &'static str,
        call: F,
    ) -> IapResult<FanOut<T>>
    where
        F: Fn(SharedProvider) -> Fut,
        Fut: Future<Output = IapResult<Vec<T>>>,
    {
        if let Some(id) = provider_id {
            let provider = self.registry.resolve(id)?.ready_provider()?;
            let items = call(provider)
                .await
                .map_err(|e| IapError::provider_failed(id, operation, e))?;
            return Ok(FanOut {
                items,
                failures: Vec::new(),
            });
        }

        let targets = self.registry.ready_providers(product_type);
        debug!(operation, targets = targets.len(), "Fanning out");

        let calls = targets.iter().map(|record| {
            let provider = record.provider();
            let fut = call(provider);
            async move { (record.id().to_string(), fut.await) }
        });

        let mut out = FanOut::empty();
        for (id, result) in join_all(calls).await {
            match result {
                Ok(items) => out.items.extend(items),
                Err(e) => {
                    let error = IapError::provider_failed(&id, operation, e);
                    warn!(provider = %id, error = %error, "Provider failed during fan-out");
                    out.failures.push(ProviderFailure {
                        provider_id: id,
                        error,
                    });
                }
            }
        }
        Ok(out)
    }
}
