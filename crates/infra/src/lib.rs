//! `stockroom-infra` — infrastructure composing the domain with storage and
//! distribution: append-only event store, command dispatcher, catalog
//! projection (read models + summary), and the SKU uniqueness index.

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod sku_index;
