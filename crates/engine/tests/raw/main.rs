//! Raw client integration tests
//!
//! Single-key and batch operations, TTL expiry and scan bounds against the
//! memory cluster.

#[path = "../common/mod.rs"]
mod common;

mod basic;
mod scan;
mod ttl;
