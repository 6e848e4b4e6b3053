//! Cross-product SKU uniqueness.
//!
//! An aggregate can only see its own stream, so "no two live products share
//! a SKU" cannot be enforced inside [`stockroom_inventory::Product`]. The
//! index owns that invariant at the infrastructure level: callers claim a
//! SKU **before** dispatching the command that uses it, and release it when
//! the owning product gives it up (rename, delete, or failed dispatch).
//!
//! Claiming is an atomic check-and-set under one lock, so two concurrent
//! creates with the same SKU cannot both pass.

use std::collections::HashMap;
use std::sync::RwLock;

use stockroom_core::{DomainError, DomainResult};
use stockroom_inventory::ProductId;

/// Process-wide map of live SKUs to their owning product.
#[derive(Debug, Default)]
pub struct SkuIndex {
    inner: RwLock<HashMap<String, ProductId>>,
}

impl SkuIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a SKU for a product.
    ///
    /// Fails with `DuplicateSku` if another product holds it. Claiming a SKU
    /// the product already owns is a no-op, so re-submitting an unchanged
    /// SKU on update passes. Returns `true` when this call inserted the
    /// claim — a caller that fails afterwards must release exactly the
    /// claims it introduced.
    pub fn claim(&self, sku: &str, product_id: ProductId) -> DomainResult<bool> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| DomainError::invariant("sku index lock poisoned"))?;

        match map.get(sku) {
            Some(owner) if *owner != product_id => Err(DomainError::duplicate_sku(sku)),
            Some(_) => Ok(false),
            None => {
                map.insert(sku.to_string(), product_id);
                Ok(true)
            }
        }
    }

    /// Release a SKU held by a product. A release by a non-owner is a no-op
    /// (the claim may already have moved on).
    pub fn release(&self, sku: &str, product_id: ProductId) {
        if let Ok(mut map) = self.inner.write() {
            if map.get(sku) == Some(&product_id) {
                map.remove(sku);
            }
        }
    }

    pub fn owner(&self, sku: &str) -> Option<ProductId> {
        self.inner.read().ok()?.get(sku).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
