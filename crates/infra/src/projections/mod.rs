//! Projections: disposable read models derived from the event streams.

pub mod catalog;

pub use catalog::{
    CatalogProjectionError, InMemoryProductCatalog, MovementReadModel, ProductCatalogProjection,
    ProductReadModel, Summary,
};
