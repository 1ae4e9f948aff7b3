//! Integration tests module
//!
//! End-to-end tests for the poller over in-memory backends:
//! - Lease exclusion and ownership across competing processes
//! - Schedule → probe → dedup → store cycles
//! - Failure isolation and stand-down

pub mod error_scenarios;
pub mod fixtures;
pub mod lease_test;
pub mod poller_test;
