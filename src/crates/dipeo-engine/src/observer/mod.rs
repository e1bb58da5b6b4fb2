//! Event bus subscribers (spec §4.4).

pub mod scoped;
pub mod standard;

use async_trait::async_trait;

use crate::event::DomainEvent;

/// A subscriber on the event bus. The bus delivers events to each
/// observer in `seq` order; observer failures are isolated from one
/// another and from the engine (spec §4.4 "Observer exceptions are
/// isolated").
#[async_trait]
pub trait Observer: Send + Sync {
    async fn on_event(&self, event: &DomainEvent);
}

pub use scoped::{ObserverMetadata, ScopedObserver};
pub use standard::{MetricsObserver, ResultObserver, StateStoreObserver, StreamingObserver};
