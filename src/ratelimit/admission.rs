//! Admission decisions.
//!
//! Combines ignore rules, special-route budgets and the global budget into a
//! single verdict per request. Special budgets are always consulted before
//! the global one, so a request refused by its route budget never spends a
//! global token.

use http::StatusCode;
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, trace};

use super::pattern::PatternMatcher;
use super::registry::LimiterRegistry;
use crate::config::LimiterConfig;

/// Which budget refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectKind {
    /// The route's dedicated budget is spent
    SpecialLimitExceeded,
    /// The global budget is spent
    GlobalLimitExceeded,
}

impl fmt::Display for RejectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectKind::SpecialLimitExceeded => write!(f, "special rate limit exceeded"),
            RejectKind::GlobalLimitExceeded => write!(f, "global rate limit exceeded"),
        }
    }
}

/// A refused request, with enough context to report it.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{kind}: {method} {route}")]
pub struct Rejection {
    /// Budget that refused the request
    pub kind: RejectKind,
    /// Request method
    pub method: String,
    /// Request route
    pub route: String,
}

impl Rejection {
    /// HTTP status a rejection should be answered with.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::TOO_MANY_REQUESTS
    }
}

/// Outcome of one admission evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Let the request proceed
    Admit,
    /// Refuse the request
    Reject(Rejection),
}

impl Verdict {
    /// Whether the request was admitted.
    pub fn is_admit(&self) -> bool {
        matches!(self, Verdict::Admit)
    }

    /// The rejection, if the request was refused.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Verdict::Admit => None,
            Verdict::Reject(rejection) => Some(rejection),
        }
    }

    /// Convert into a `Result` so callers can use `?`.
    pub fn into_result(self) -> Result<(), Rejection> {
        match self {
            Verdict::Admit => Ok(()),
            Verdict::Reject(rejection) => Err(rejection),
        }
    }
}

/// Decides whether each request may proceed.
///
/// Holds the immutable configuration, the pattern matcher built from it, and
/// the registry whose buckets carry the only mutable state. Share it behind
/// an `Arc`; every method takes `&self` and never blocks.
#[derive(Debug)]
pub struct AdmissionController {
    config: LimiterConfig,
    registry: LimiterRegistry,
    matcher: PatternMatcher,
}

impl AdmissionController {
    /// Build the registry and matcher for `config`.
    pub fn new(config: LimiterConfig) -> Self {
        let registry = LimiterRegistry::build(&config);
        let matcher = PatternMatcher::new(
            registry.special_patterns(),
            config.ignore_urls.iter().map(String::as_str),
            config.ignore_uas.iter().map(String::as_str),
        );

        Self {
            config,
            registry,
            matcher,
        }
    }

    /// The configuration this controller was built from.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// The bucket registry.
    pub fn registry(&self) -> &LimiterRegistry {
        &self.registry
    }

    /// The route classifier.
    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    /// Evaluate a request now.
    pub fn evaluate(&self, method: &str, route: &str, identifier: &str) -> Verdict {
        self.evaluate_at(method, route, identifier, Instant::now())
    }

    /// Evaluate a request as observed at `now`.
    pub fn evaluate_at(&self, method: &str, route: &str, identifier: &str, now: Instant) -> Verdict {
        if !self.config.enabled {
            return Verdict::Admit;
        }

        let ignored = self.matcher.is_ignored(route, identifier);
        let special = self.matcher.classify_special(route);

        trace!(method, route, ignored, special = ?special, "Classified request");

        match special {
            None if ignored => Verdict::Admit,
            Some(_) if ignored && self.config.ignore_priority => Verdict::Admit,
            Some(pattern) => {
                let admitted = self
                    .registry
                    .special(pattern)
                    .map_or(true, |bucket| bucket.try_acquire_at(now));

                if admitted {
                    self.acquire_global(method, route, now)
                } else {
                    reject(RejectKind::SpecialLimitExceeded, method, route)
                }
            }
            None => self.acquire_global(method, route, now),
        }
    }

    fn acquire_global(&self, method: &str, route: &str, now: Instant) -> Verdict {
        match self.registry.global() {
            Some(bucket) if !bucket.try_acquire_at(now) => {
                reject(RejectKind::GlobalLimitExceeded, method, route)
            }
            _ => Verdict::Admit,
        }
    }
}

fn reject(kind: RejectKind, method: &str, route: &str) -> Verdict {
    debug!(method, route, kind = ?kind, "Request rejected");

    Verdict::Reject(Rejection {
        kind,
        method: method.to_string(),
        route: route.to_string(),
    })
}
