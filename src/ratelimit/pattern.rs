//! Route pattern matching.
//!
//! A pattern containing `**` is a glob: each `**` becomes `.*` and the result
//! must match the whole route. The rest of the pattern is regex syntax, so
//! `/api/v[12]/**` matches `/api/v1/x`. Any other pattern matches only by
//! string equality.

use regex::Regex;
use tracing::warn;

/// Wildcard token that turns a pattern into a glob.
pub const GLOB_TOKEN: &str = "**";

/// Special-mapping keys containing this are left out of the exact-match pass.
const SEGMENT_GLOB: &str = "/**";

/// A configured route pattern with its compiled glob, if any.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    raw: String,
    glob: Option<Regex>,
}

impl RoutePattern {
    /// Parse a pattern, compiling it if it is a glob.
    ///
    /// A glob that cannot be compiled is logged and then only matched by
    /// equality.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let glob = if raw.contains(GLOB_TOKEN) {
            compile_glob(&raw)
        } else {
            None
        };

        Self { raw, glob }
    }

    /// The pattern as configured.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern contains the wildcard token.
    pub fn is_glob(&self) -> bool {
        self.raw.contains(GLOB_TOKEN)
    }

    /// Full-string glob match. Always false for literal patterns.
    pub fn matches_glob(&self, route: &str) -> bool {
        self.glob.as_ref().is_some_and(|re| re.is_match(route))
    }

    /// Exact string equality.
    pub fn matches_exact(&self, route: &str) -> bool {
        self.raw == route
    }
}

fn compile_glob(raw: &str) -> Option<Regex> {
    match Regex::new(&format!("^{}$", raw.replace(GLOB_TOKEN, ".*"))) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern = %raw, error = %e, "Glob pattern not compiled, matching it literally");
            None
        }
    }
}

/// Classifies routes against the special-limit patterns and the ignore
/// rules.
///
/// Built once at startup; all lookups are read-only.
#[derive(Debug, Clone, Default)]
pub struct PatternMatcher {
    /// Special-limit patterns in declaration order
    special: Vec<RoutePattern>,
    /// Exempt route patterns
    ignore_routes: Vec<RoutePattern>,
    /// Exempt identifier substrings, upper-cased
    ignore_identifiers: Vec<String>,
}

impl PatternMatcher {
    /// Create a matcher.
    ///
    /// `special` must be given in declaration order; it decides which glob
    /// wins when several match.
    pub fn new<'a>(
        special: impl IntoIterator<Item = &'a str>,
        ignore_routes: impl IntoIterator<Item = &'a str>,
        ignore_identifiers: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            special: special.into_iter().map(RoutePattern::new).collect(),
            ignore_routes: ignore_routes.into_iter().map(RoutePattern::new).collect(),
            ignore_identifiers: ignore_identifiers
                .into_iter()
                .map(str::to_uppercase)
                .collect(),
        }
    }

    /// Find the special-limit pattern that applies to `route`.
    ///
    /// Globs are tried first, in declaration order. Failing that, every
    /// pattern not containing `/**` is compared by equality, which includes
    /// globs such as `/v1**`.
    pub fn classify_special(&self, route: &str) -> Option<&str> {
        self.special
            .iter()
            .filter(|p| p.is_glob())
            .find(|p| p.matches_glob(route))
            .or_else(|| self.exact_candidates().find(|p| p.matches_exact(route)))
            .map(RoutePattern::as_str)
    }

    fn exact_candidates(&self) -> impl Iterator<Item = &RoutePattern> {
        self.special
            .iter()
            .filter(|p| !p.as_str().contains(SEGMENT_GLOB))
    }

    /// Whether the request is exempt by route or by client identifier.
    pub fn is_ignored(&self, route: &str, identifier: &str) -> bool {
        self.ignore_by_route(route) || self.ignore_by_identifier(identifier)
    }

    /// Whether `route` is exempt.
    ///
    /// Glob entries are tried first; the equality fallback runs over the
    /// whole list, glob entries included.
    pub fn ignore_by_route(&self, route: &str) -> bool {
        self.ignore_routes.iter().any(|p| p.matches_glob(route))
            || self.ignore_routes.iter().any(|p| p.matches_exact(route))
    }

    /// Whether `identifier` contains any exempt substring, ignoring case.
    pub fn ignore_by_identifier(&self, identifier: &str) -> bool {
        if self.ignore_identifiers.is_empty() || identifier.is_empty() {
            return false;
        }

        let identifier = identifier.to_uppercase();
        self.ignore_identifiers
            .iter()
            .any(|needle| identifier.contains(needle.as_str()))
    }
}
