use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use stockroom_core::AggregateId;
use stockroom_events::EventEnvelope;
use stockroom_inventory::{MovementId, MovementType, ProductEvent, ProductId};

use crate::read_model::{InMemoryReadStore, ReadStore};

/// Queryable product read model: catalog fields plus current stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductReadModel {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub cost_price: i64,
    pub selling_price: i64,
    pub reorder_level: i64,
    pub current_stock: i64,
    pub created_at: DateTime<Utc>,
}

impl ProductReadModel {
    /// Low-stock predicate: at or below the reorder level (inclusive).
    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.reorder_level
    }
}

/// Queryable stock movement record, immutable once projected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementReadModel {
    pub movement_id: MovementId,
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub qty: i64,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Derived inventory summary; recomputed on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    /// Sum of `current_stock` across all products.
    pub total_items: i64,
    /// Count of products with `current_stock <= reorder_level`.
    pub low_stock_count: u64,
    /// Sum of `current_stock * cost_price`, in minor currency units.
    pub total_inventory_value: i64,
}

#[derive(Debug, Error)]
pub enum CatalogProjectionError {
    #[error("failed to deserialize product event: {0}")]
    Deserialize(String),

    #[error("event product_id does not match envelope aggregate_id")]
    AggregateMismatch,

    #[error("invalid sequence number {0}")]
    InvalidSequence(u64),
}

/// Per-stream delivery state: the highest contiguously applied sequence
/// number, plus envelopes that arrived ahead of the gap.
#[derive(Debug, Default)]
struct StreamCursor {
    applied: u64,
    pending: BTreeMap<u64, EventEnvelope<JsonValue>>,
}

/// Product catalog projection.
///
/// Consumes published envelopes (JSON payloads) and maintains the product
/// and movement read models plus the derived summary. Deleting a product
/// removes it and its movements in one apply — the cascade the write side
/// promises.
///
/// Delivery may be at-least-once and out of order (concurrent writers commit
/// and publish without a global order): replays at or below the cursor are
/// ignored, and events ahead of a gap are buffered until the gap closes, so
/// each stream is always applied in sequence order exactly once.
///
/// Read models are disposable and rebuildable from the event stream.
#[derive(Debug)]
pub struct ProductCatalogProjection<P, M>
where
    P: ReadStore<ProductId, ProductReadModel>,
    M: ReadStore<ProductId, Vec<MovementReadModel>>,
{
    products: P,
    movements: M,
    cursors: RwLock<HashMap<AggregateId, StreamCursor>>,
}

/// The in-memory flavor used by the API server and tests.
pub type InMemoryProductCatalog = ProductCatalogProjection<
    Arc<InMemoryReadStore<ProductId, ProductReadModel>>,
    Arc<InMemoryReadStore<ProductId, Vec<MovementReadModel>>>,
>;

impl InMemoryProductCatalog {
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryReadStore::new()),
            Arc::new(InMemoryReadStore::new()),
        )
    }
}

impl<P, M> ProductCatalogProjection<P, M>
where
    P: ReadStore<ProductId, ProductReadModel>,
    M: ReadStore<ProductId, Vec<MovementReadModel>>,
{
    pub fn new(products: P, movements: M) -> Self {
        Self {
            products,
            movements,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Query the read model for one product.
    pub fn get(&self, product_id: &ProductId) -> Option<ProductReadModel> {
        self.products.get(product_id)
    }

    /// All products in creation order.
    ///
    /// UUIDv7 ids are time-ordered, so (created_at, id) is a stable insertion
    /// order even for products created in the same instant.
    pub fn list(&self) -> Vec<ProductReadModel> {
        let mut items = self.products.list();
        items.sort_by_key(|p| (p.created_at, *p.product_id.0.as_uuid()));
        items
    }

    /// Movements for one product, oldest first. Empty if the product is
    /// unknown (callers decide whether that is a 404).
    pub fn movements_for(&self, product_id: &ProductId) -> Vec<MovementReadModel> {
        self.movements.get(product_id).unwrap_or_default()
    }

    /// O(n) fold over the product set; reflects the latest applied events.
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for product in self.products.list() {
            summary.total_items += product.current_stock;
            if product.is_low_stock() {
                summary.low_stock_count += 1;
            }
            summary.total_inventory_value += product.current_stock * product.cost_price;
        }
        summary
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Idempotent for at-least-once delivery (replays <= cursor are ignored)
    /// - Out-of-order deliveries are buffered; each stream is applied in
    ///   strict sequence order
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), CatalogProjectionError> {
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if seq == 0 {
            return Err(CatalogProjectionError::InvalidSequence(seq));
        }

        let Ok(mut cursors) = self.cursors.write() else {
            return Ok(());
        };
        let cursor = cursors.entry(aggregate_id).or_default();

        if seq <= cursor.applied {
            // Duplicate or replay; safe to ignore.
            return Ok(());
        }

        cursor.pending.insert(seq, envelope.clone());

        // Drain everything contiguous with the cursor.
        while let Some(next) = cursor.pending.remove(&(cursor.applied + 1)) {
            self.apply_event(&next)?;
            cursor.applied += 1;
        }

        Ok(())
    }

    fn apply_event(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), CatalogProjectionError> {
        let event: ProductEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| CatalogProjectionError::Deserialize(e.to_string()))?;

        let product_id = match &event {
            ProductEvent::ProductCreated(e) => e.product_id,
            ProductEvent::ProductUpdated(e) => e.product_id,
            ProductEvent::ProductDeleted(e) => e.product_id,
            ProductEvent::StockMovementRecorded(e) => e.product_id,
        };
        if product_id.0 != envelope.aggregate_id() {
            return Err(CatalogProjectionError::AggregateMismatch);
        }

        match event {
            ProductEvent::ProductCreated(e) => {
                self.products.upsert(
                    e.product_id,
                    ProductReadModel {
                        product_id: e.product_id,
                        sku: e.sku,
                        name: e.name,
                        category: e.category,
                        cost_price: e.cost_price,
                        selling_price: e.selling_price,
                        reorder_level: e.reorder_level,
                        current_stock: 0,
                        created_at: e.occurred_at,
                    },
                );
                self.movements.upsert(e.product_id, Vec::new());
            }
            ProductEvent::ProductUpdated(e) => {
                if let Some(mut rm) = self.products.get(&e.product_id) {
                    if let Some(sku) = e.sku {
                        rm.sku = sku;
                    }
                    if let Some(name) = e.name {
                        rm.name = name;
                    }
                    if let Some(category) = e.category {
                        rm.category = if category.is_empty() {
                            None
                        } else {
                            Some(category)
                        };
                    }
                    if let Some(cost_price) = e.cost_price {
                        rm.cost_price = cost_price;
                    }
                    if let Some(selling_price) = e.selling_price {
                        rm.selling_price = selling_price;
                    }
                    if let Some(reorder_level) = e.reorder_level {
                        rm.reorder_level = reorder_level;
                    }
                    self.products.upsert(e.product_id, rm);
                }
            }
            ProductEvent::ProductDeleted(e) => {
                // Cascade: the product and its movement history go together.
                self.products.remove(&e.product_id);
                self.movements.remove(&e.product_id);
            }
            ProductEvent::StockMovementRecorded(e) => {
                if let Some(mut rm) = self.products.get(&e.product_id) {
                    rm.current_stock += e.movement_type.signed(e.qty);
                    self.products.upsert(e.product_id, rm);
                }
                let mut history = self.movements.get(&e.product_id).unwrap_or_default();
                history.push(MovementReadModel {
                    movement_id: e.movement_id,
                    product_id: e.product_id,
                    movement_type: e.movement_type,
                    qty: e.qty,
                    note: e.note,
                    occurred_at: e.occurred_at,
                });
                self.movements.upsert(e.product_id, history);
            }
        }

        Ok(())
    }

    /// Rebuild the read models from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), CatalogProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }
        self.products.clear();
        self.movements.clear();

        // Deterministic replay order: aggregate, then sequence.
        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
