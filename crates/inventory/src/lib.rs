//! `stockroom-inventory` — the inventory domain model.
//!
//! One aggregate: [`Product`]. A product's stream carries its lifecycle
//! (created/updated/deleted) and every stock movement recorded against it;
//! `current_stock` is the replay of those movements.

pub mod product;

pub use product::{
    CreateProduct, DeleteProduct, MovementId, MovementType, Product, ProductCommand,
    ProductCreated, ProductDeleted, ProductEvent, ProductId, ProductUpdated, RecordStockMovement,
    StockMovementRecorded, UpdateProduct,
};
