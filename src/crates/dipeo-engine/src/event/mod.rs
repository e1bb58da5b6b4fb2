//! The per-execution event log and its pub/sub fan-out (spec §3, §4.3,
//! §4.4).

pub mod bus;
pub mod pipeline;
pub mod types;

pub use bus::{EventBus, InMemoryEventBus, Subscription};
pub use pipeline::{summarize_output, EventForwarder, EventPipeline};
pub use types::{DomainEvent, EventMeta, EventScope, EventType};
