//! Routegate - Route-Aware Request Admission Control
//!
//! This crate decides, per inbound HTTP request and without blocking, whether
//! the request may proceed. Decisions combine a global token-bucket budget,
//! per-route budgets selected by glob or literal patterns, and exemptions by
//! route or client identifier.

pub mod config;
pub mod error;
pub mod middleware;
pub mod ratelimit;
