//! Rate limiting logic and admission decisions.

mod admission;
mod bucket;
mod pattern;
mod registry;

pub use admission::{AdmissionController, RejectKind, Rejection, Verdict};
pub use bucket::TokenBucket;
pub use pattern::{PatternMatcher, RoutePattern, GLOB_TOKEN};
pub use registry::LimiterRegistry;
