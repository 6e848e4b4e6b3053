use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tokio::sync::broadcast;
use tower::ServiceBuilder;

use stockroom_events::{EventBus, InMemoryEventBus};
use stockroom_infra::{
    command_dispatcher::CommandDispatcher, event_store::InMemoryEventStore,
    projections::InMemoryProductCatalog, sku_index::SkuIndex,
};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::{AppServices, RealtimeMessage};

/// Assemble the full application router with in-memory infrastructure.
///
/// Wiring: store + bus feed the command dispatcher; the service layer applies
/// committed events to the catalog projection before replying
/// (read-your-writes), while a background bus subscriber turns the same
/// events into realtime notifications for `/stream` clients.
pub fn build_app() -> Router {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Arc<services::Bus> = Arc::new(InMemoryEventBus::new());
    let catalog = Arc::new(InMemoryProductCatalog::in_memory());
    let sku_index = Arc::new(SkuIndex::new());

    // Realtime channel (SSE): lossy broadcast, no backpressure on the write path.
    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    // Background bridge: bus → SSE notifications.
    {
        let sub = bus.subscribe();
        let realtime_tx = realtime_tx.clone();
        tokio::task::spawn_blocking(move || {
            while let Ok(env) = sub.recv() {
                let _ = realtime_tx.send(RealtimeMessage {
                    topic: "inventory.updated".to_string(),
                    payload: serde_json::json!({
                        "kind": "projection_update",
                        "aggregate_type": env.aggregate_type(),
                        "aggregate_id": env.aggregate_id().to_string(),
                        "sequence_number": env.sequence_number(),
                    }),
                });
            }
        });
    }

    let dispatcher = CommandDispatcher::new(store, bus);
    let services = Arc::new(AppServices::new(dispatcher, catalog, sku_index, realtime_tx));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/stream", get(routes::system::stream))
        .route("/summary", get(routes::summary::summary))
        .nest("/products", routes::products::router())
        .nest("/stock-movements", routes::movements::router())
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
