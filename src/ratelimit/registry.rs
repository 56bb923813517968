//! Token bucket registry built from configuration.

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use super::bucket::TokenBucket;
use crate::config::LimiterConfig;

/// Owns every token bucket the service enforces.
///
/// Built once at startup. The set of buckets never changes afterwards; only
/// each bucket's internal token count does, so the registry can be shared
/// across threads without further locking.
#[derive(Debug, Default)]
pub struct LimiterRegistry {
    /// Budget shared by every request, if configured
    global: Option<TokenBucket>,
    /// Route pattern -> dedicated budget, in declaration order
    special: IndexMap<String, TokenBucket>,
    /// No buckets because limiting is switched off
    inert: bool,
}

impl LimiterRegistry {
    /// Build the registry from configuration.
    ///
    /// Never fails: a missing or non-positive rate leaves that budget
    /// unlimited and is only reported as a warning.
    pub fn build(config: &LimiterConfig) -> Self {
        if !config.enabled {
            info!("Rate limiting disabled, no buckets built");
            return Self {
                inert: true,
                ..Self::default()
            };
        }

        let global = if is_enforceable(config.global_qps) {
            Some(TokenBucket::new(config.global_qps))
        } else {
            warn!(global_qps = config.global_qps, "Global rate limiter not initialised");
            None
        };

        let mut special = IndexMap::with_capacity(config.special_mapping.len());
        for (pattern, &rate) in &config.special_mapping {
            match rate {
                Some(rate) if is_enforceable(rate) => {
                    debug!(pattern = %pattern, rate, "Creating special rate limiter");
                    special.insert(pattern.clone(), TokenBucket::new(rate));
                }
                _ => warn!(pattern = %pattern, rate = ?rate, "Ignoring special rate limiter"),
            }
        }

        info!(
            global = global.is_some(),
            special = special.len(),
            "Limiter registry built"
        );

        Self {
            global,
            special,
            inert: false,
        }
    }

    /// The global bucket, if one was built.
    pub fn global(&self) -> Option<&TokenBucket> {
        self.global.as_ref()
    }

    /// The bucket dedicated to `pattern`, if one was built.
    pub fn special(&self, pattern: &str) -> Option<&TokenBucket> {
        self.special.get(pattern)
    }

    /// Patterns that received a bucket, in declaration order.
    pub fn special_patterns(&self) -> impl Iterator<Item = &str> {
        self.special.keys().map(String::as_str)
    }

    /// Number of special buckets.
    pub fn special_count(&self) -> usize {
        self.special.len()
    }

    /// Whether limiting was switched off at build time.
    pub fn is_inert(&self) -> bool {
        self.inert
    }
}

fn is_enforceable(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}
