//! Debug assertion macros for shared-ring invariants.
//!
//! These are active only in debug builds (`#[cfg(debug_assertions)]`), so
//! there is zero overhead in release builds. Mirrors the invariant-macro
//! style used for the SPSC ring this crate's ring protocol is descended
//! from, adapted to the cross-process MPSC ring's own sequence rules.

// =============================================================================
// INV-SEQ-01: Bounded Count
// =============================================================================

/// Assert that count does not exceed capacity.
///
/// **Invariant**: `0 <= (write - read) <= capacity` under the non-overwrite policy.
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "INV-SEQ-01 violated: count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

// =============================================================================
// INV-SEQ-02: Monotonic Progress
// =============================================================================

/// Assert that a sequence number only increases (monotonic progress).
///
/// Compares via `wrapping_sub` rather than a raw `>=` so this does not
/// misfire once a sequence number wraps around `u32::MAX`: a forward step of
/// up to `2^31` is accepted as progress, anything larger is treated as
/// having gone backward.
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            ($new.wrapping_sub($old)) < (1u32 << 31),
            "INV-SEQ-02 violated: {} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_monotonic;
