//! Read model storage abstractions (disposable, rebuildable state).

pub mod store;

pub use store::{InMemoryReadStore, ReadStore};
