use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;

use stockroom_core::AggregateId;
use stockroom_events::{EventEnvelope, InMemoryEventBus};
use stockroom_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{InMemoryEventStore, StoredEvent},
    projections::{InMemoryProductCatalog, MovementReadModel, ProductReadModel, Summary},
    sku_index::SkuIndex,
};
use stockroom_inventory::{
    CreateProduct, DeleteProduct, MovementId, MovementType, Product, ProductCommand, ProductEvent,
    ProductId, RecordStockMovement, UpdateProduct,
};

use crate::app::dto;

/// Stream type every product command is dispatched against.
const AGGREGATE_TYPE: &str = "inventory.product";

/// Bounded retries for movements that lose an optimistic-concurrency race.
const MOVEMENT_RETRY_ATTEMPTS: u32 = 4;

pub type Bus = InMemoryEventBus<EventEnvelope<JsonValue>>;
pub type InMemoryDispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<Bus>>;

/// Realtime message broadcast to SSE clients.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub topic: String,
    pub payload: JsonValue,
}

/// Application service layer: the one place that composes the dispatcher,
/// the catalog projection, and the SKU index into the operations the HTTP
/// surface exposes.
///
/// Committed events are folded into the projection before a mutation
/// returns, so every response (and any immediately following read) observes
/// the write. The bus subscriber delivering the same envelopes for SSE can
/// race freely: projection applies are idempotent per stream cursor.
pub struct AppServices {
    dispatcher: InMemoryDispatcher,
    catalog: Arc<InMemoryProductCatalog>,
    sku_index: Arc<SkuIndex>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
}

impl AppServices {
    pub fn new(
        dispatcher: InMemoryDispatcher,
        catalog: Arc<InMemoryProductCatalog>,
        sku_index: Arc<SkuIndex>,
        realtime_tx: broadcast::Sender<RealtimeMessage>,
    ) -> Self {
        Self {
            dispatcher,
            catalog,
            sku_index,
            realtime_tx,
        }
    }

    pub fn subscribe_realtime(&self) -> broadcast::Receiver<RealtimeMessage> {
        self.realtime_tx.subscribe()
    }

    fn dispatch(
        &self,
        product_id: ProductId,
        command: ProductCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let committed = self.dispatcher.dispatch::<Product>(
            product_id.0,
            AGGREGATE_TYPE,
            command,
            |id| Product::empty(ProductId::new(id)),
        )?;

        // Read-your-writes: fold committed events into the catalog before
        // replying. Duplicate delivery via the bus subscriber is a no-op.
        for stored in &committed {
            if let Err(e) = self.catalog.apply_envelope(&stored.to_envelope()) {
                tracing::warn!(%product_id, "projection apply failed: {e}");
            }
        }

        Ok(committed)
    }

    fn read_model_after_commit(
        &self,
        product_id: &ProductId,
    ) -> Result<ProductReadModel, DispatchError> {
        self.catalog.get(product_id).ok_or_else(|| {
            DispatchError::InvariantViolation("read model missing after commit".to_string())
        })
    }

    fn typed_event(stored: &StoredEvent) -> Option<ProductEvent> {
        serde_json::from_value(stored.payload.clone()).ok()
    }

    pub fn create_product(
        &self,
        req: dto::CreateProductRequest,
    ) -> Result<ProductReadModel, DispatchError> {
        let product_id = ProductId::new(AggregateId::new());
        let sku = req.sku.trim().to_string();

        // Claim the SKU before dispatching; only the claim holder may commit
        // a product carrying it.
        self.sku_index
            .claim(&sku, product_id)
            .map_err(DispatchError::from)?;

        let cmd = ProductCommand::CreateProduct(CreateProduct {
            product_id,
            sku: req.sku,
            name: req.name,
            category: req.category,
            cost_price: req.cost_price,
            selling_price: req.selling_price,
            reorder_level: req.reorder_level,
            occurred_at: Utc::now(),
        });

        match self.dispatch(product_id, cmd) {
            Ok(_) => {
                tracing::info!(%product_id, sku = %sku, "product created");
                self.read_model_after_commit(&product_id)
            }
            Err(e) => {
                self.sku_index.release(&sku, product_id);
                Err(e)
            }
        }
    }

    pub fn update_product(
        &self,
        product_id: ProductId,
        req: dto::UpdateProductRequest,
    ) -> Result<ProductReadModel, DispatchError> {
        let new_sku = req.sku.as_ref().map(|s| s.trim().to_string());

        let newly_claimed = match &new_sku {
            Some(sku) => self
                .sku_index
                .claim(sku, product_id)
                .map_err(DispatchError::from)?,
            None => false,
        };

        let cmd = ProductCommand::UpdateProduct(UpdateProduct {
            product_id,
            sku: req.sku,
            name: req.name,
            category: req.category,
            cost_price: req.cost_price,
            selling_price: req.selling_price,
            reorder_level: req.reorder_level,
            occurred_at: Utc::now(),
        });

        match self.dispatch(product_id, cmd) {
            Ok(committed) => {
                // The committed event names the SKU given up (if any); release
                // exactly that one rather than a pre-dispatch snapshot.
                if let Some(ProductEvent::ProductUpdated(ev)) =
                    committed.first().and_then(Self::typed_event)
                {
                    if let Some(previous_sku) = ev.previous_sku {
                        self.sku_index.release(&previous_sku, product_id);
                    }
                }
                tracing::info!(%product_id, "product updated");
                self.read_model_after_commit(&product_id)
            }
            Err(e) => {
                if newly_claimed {
                    if let Some(sku) = &new_sku {
                        self.sku_index.release(sku, product_id);
                    }
                }
                Err(e)
            }
        }
    }

    pub fn delete_product(&self, product_id: ProductId) -> Result<(), DispatchError> {
        let committed = self.dispatch(
            product_id,
            ProductCommand::DeleteProduct(DeleteProduct {
                product_id,
                occurred_at: Utc::now(),
            }),
        )?;

        if let Some(ProductEvent::ProductDeleted(ev)) =
            committed.first().and_then(Self::typed_event)
        {
            self.sku_index.release(&ev.sku, product_id);
        }
        tracing::info!(%product_id, "product deleted");
        Ok(())
    }

    pub fn record_movement(
        &self,
        product_id: ProductId,
        movement_type: MovementType,
        qty: i64,
        note: Option<String>,
    ) -> Result<MovementReadModel, DispatchError> {
        let movement_id = MovementId::new(AggregateId::new());
        let mut attempt = 0u32;

        loop {
            let cmd = ProductCommand::RecordStockMovement(RecordStockMovement {
                product_id,
                movement_id,
                movement_type,
                qty,
                note: note.clone(),
                occurred_at: Utc::now(),
            });

            match self.dispatch(product_id, cmd) {
                Ok(_) => break,
                Err(e) if e.is_retryable() && attempt < MOVEMENT_RETRY_ATTEMPTS => {
                    attempt += 1;
                    tracing::warn!(%product_id, attempt, "movement lost a write race, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(%product_id, %movement_id, %movement_type, qty, "stock movement recorded");
        self.catalog
            .movements_for(&product_id)
            .into_iter()
            .find(|m| m.movement_id == movement_id)
            .ok_or_else(|| {
                DispatchError::InvariantViolation("movement missing after commit".to_string())
            })
    }

    pub fn product(&self, product_id: &ProductId) -> Option<ProductReadModel> {
        self.catalog.get(product_id)
    }

    pub fn products(&self) -> Vec<ProductReadModel> {
        self.catalog.list()
    }

    /// Movements for one product, oldest first; `NotFound` for unknown ids.
    pub fn movements(&self, product_id: &ProductId) -> Result<Vec<MovementReadModel>, DispatchError> {
        if self.catalog.get(product_id).is_none() {
            return Err(DispatchError::NotFound);
        }
        Ok(self.catalog.movements_for(product_id))
    }

    pub fn summary(&self) -> Summary {
        self.catalog.summary()
    }
}
