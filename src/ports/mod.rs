//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `CounterStore` - Windowed request counting (Redis, in-memory)
//! - `Clock` - Time source for window arithmetic

mod clock;
mod counter_store;

pub use clock::Clock;
pub use counter_store::{CounterSnapshot, CounterStore, StoreError, StoreKind};
