//! Debug assertion macros for span construction. Active only in debug
//! builds, matching `tracering_core::invariants`' zero-release-overhead
//! discipline.

/// Assert a span's end timestamp never precedes its start (the begin/end
/// pair that produced it came from the same monotonic clock source).
macro_rules! debug_assert_span_ordered {
    ($start:expr, $end:expr) => {
        debug_assert!(
            $end >= $start,
            "span ends ({}) before it starts ({})",
            $end,
            $start
        )
    };
}

pub(crate) use debug_assert_span_ordered;
