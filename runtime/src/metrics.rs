//! Metric names and descriptions.
//!
//! The runtime and the engine record through the `metrics` facade; whichever
//! recorder the host installs picks them up. Call [`describe`] once after
//! installing a recorder so exporters can show units and help text.
//!
//! # Example
//!
//! ```rust,no_run
//! // install a recorder first, then:
//! skillswap_runtime::metrics::describe();
//! ```

use metrics::{describe_counter, Unit};

/// Actions reduced by a store
pub const ACTIONS: &str = "store.actions.total";
/// Effect tasks spawned by a store
pub const EFFECTS_SPAWNED: &str = "store.effects.spawned";
/// Reads that succeeded after at least one retry
pub const READ_RETRY_RECOVERED: &str = "store.read_retry.recovered";
/// Reads that failed after the last attempt
pub const READ_RETRY_EXHAUSTED: &str = "store.read_retry.exhausted";
/// Two-step mutations that stopped after their first write (`step` label)
pub const PARTIAL_FAILURES: &str = "ledger.partial_failures.total";

// Re-export the macros so callers need not depend on `metrics` directly
pub use metrics::{counter, gauge, histogram};

/// Register descriptions for every metric the engine records.
pub fn describe() {
    describe_counter!(ACTIONS, Unit::Count, "Actions reduced by the store");
    describe_counter!(
        EFFECTS_SPAWNED,
        Unit::Count,
        "Effect tasks spawned by the store"
    );
    describe_counter!(
        READ_RETRY_RECOVERED,
        Unit::Count,
        "Store reads that succeeded after retrying"
    );
    describe_counter!(
        READ_RETRY_EXHAUSTED,
        Unit::Count,
        "Store reads that failed on every attempt"
    );
    describe_counter!(
        PARTIAL_FAILURES,
        Unit::Count,
        "Transfers or bookings left half-applied, labelled by the failed step"
    );
}
