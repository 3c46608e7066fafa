//! Clock port - source of "now" for window arithmetic.

use std::fmt::Debug;

use crate::domain::foundation::Timestamp;

/// Provides the current time.
///
/// Stores take a clock instead of reading the system time directly so that
/// window expiry can be tested without sleeping.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Timestamp;
}
