//! Test doubles for the rate limiting ports.
//!
//! Compiled for this crate's own tests, or for dependents that enable the
//! `test-util` feature:
//!
//! ```toml
//! [dev-dependencies]
//! quotagate = { version = "*", features = ["test-util"] }
//! ```

mod clock;

pub use clock::ManualClock;
