//! Process-wide row cache: fingerprints, immutable rows, pins, single-flight reservations.

pub(crate) mod fingerprint;
pub(crate) mod row;
pub(crate) mod store;
