//! Test helpers: an in-memory driver for the pools, and an embedded Postgres
//! server behind the `test-utils` feature.

pub mod mock;

#[cfg(feature = "test-utils")]
pub mod postgres;
