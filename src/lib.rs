//! Quotagate - Admission Control for Multi-Tenant Backends
//!
//! This crate bounds how many requests each caller may make per operation
//! category within a fixed time window. Counters live either in process
//! memory or in a shared Redis store so that horizontally scaled instances
//! enforce one quota together.

pub mod config;
pub mod engine;
pub mod error;
pub mod ratelimit;
pub mod response;

pub use config::{FailureMode, Settings};
pub use engine::AdmissionEngine;
pub use error::{QuotaError, Result};
pub use ratelimit::{Category, Decision, Identifier, Policy, PolicyRegistry};
