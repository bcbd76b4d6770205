//! Canonical bar interval vocabulary.
//!
//! Adapters translate their native interval names into one of these before a
//! bar leaves the decoder. Minutes use a lower-case `m`, months an upper-case `M`.

/// Every interval a canonical `Bar` may carry.
pub const CANONICAL_INTERVALS: &[&str] = &[
    "1s", "1m", "2m", "3m", "5m", "10m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d",
    "3d", "1w", "1M",
];

/// Returns true if `interval` belongs to the canonical vocabulary.
#[inline]
pub fn is_canonical(interval: &str) -> bool {
    CANONICAL_INTERVALS.contains(&interval)
}
