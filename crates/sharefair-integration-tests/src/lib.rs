//! Integration test crate for sharefair.
//!
//! This crate has no library code. It only contains integration tests
//! that exercise end-to-end ledger flows across the workspace crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p sharefair-integration-tests
//! ```
