//! Rate limiting domain - windows, policies, keys, and decisions.
//!
//! Everything here is pure: no I/O, no clocks, no shared state. Counting
//! lives behind the `CounterStore` port.

mod client_key;
mod decision;
mod errors;
mod policy;
mod request;
mod window;

pub use client_key::{
    ClientKeyResolver, GlobalKeyStrategy, IpKeyStrategy, KeyStrategy, KeyStrategyKind,
    UserKeyStrategy, UNKNOWN_CLIENT,
};
pub use decision::{Decision, DecisionOutcome};
pub use errors::PolicyError;
pub use policy::{Policy, PolicyTable, RoutePattern, DEFAULT_POLICY_NAME};
pub use request::{ClientPrincipal, RequestContext};
pub use window::{WindowSpec, MAX_WINDOW_SECS};
