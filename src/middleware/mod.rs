//! Tower middleware for HTTP services.
//!
//! Extracts the method, URI path and `User-Agent` header from each
//! `http::Request`, asks the [`AdmissionController`](crate::ratelimit::AdmissionController)
//! for a verdict, and either forwards the request or fails it with
//! [`AdmissionError::Rejected`]. Turning that error into a response is left
//! to the HTTP framework; [`AdmissionError::status_code`] gives the status.

mod layer;
mod service;

pub use layer::AdmissionLayer;
pub use service::{AdmissionError, AdmissionFuture, AdmissionService};
