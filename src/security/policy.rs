use axum::http::Method;
use thiserror::Error;

use super::{claims::Principal, verifier::AuthFailure};

/// The read-only catalog namespace served anonymously.
pub const PUBLIC_CATALOG_PATTERN: &str = "/api/nbs/**";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`: exactly one path segment.
    AnySegment,
    /// `**`: zero or more path segments.
    AnyDepth,
}

/// PathPattern
///
/// An Ant-style path matcher supporting literal segments, `*` and `**`.
/// `/api/nbs/**` matches `/api/nbs`, `/api/nbs/` and everything below it.
///
/// Paths holding `.` or `..` segments only match the catch-all pattern, so a
/// traversal such as `/api/nbs/../proxy` can never be routed to an anonymous rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment {
                "**" => Segment::AnyDepth,
                "*" => Segment::AnySegment,
                literal => Segment::Literal(literal.to_owned()),
            })
            .collect();

        Self {
            source: pattern.to_owned(),
            segments,
        }
    }

    pub fn catch_all() -> Self {
        Self::new("/**")
    }

    pub fn is_catch_all(&self) -> bool {
        self.segments == [Segment::AnyDepth]
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if parts.iter().any(|s| *s == "." || *s == "..") {
            return self.is_catch_all();
        }
        match_segments(&self.segments, &parts)
    }
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::AnyDepth, rest)) => {
            (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        }
        Some((Segment::AnySegment, rest)) => !path.is_empty() && match_segments(rest, &path[1..]),
        Some((Segment::Literal(literal), rest)) => {
            path.first() == Some(&literal.as_str()) && match_segments(rest, &path[1..])
        }
    }
}

/// MethodMatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodMatch {
    Any,
    OneOf(Vec<Method>),
}

impl MethodMatch {
    pub fn only(method: Method) -> Self {
        MethodMatch::OneOf(vec![method])
    }

    pub fn matches(&self, method: &Method) -> bool {
        match self {
            MethodMatch::Any => true,
            MethodMatch::OneOf(methods) => methods.contains(method),
        }
    }
}

/// RuleOutcome
///
/// What a matched rule demands of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    AllowAnonymous,
    RequireAuth,
    Deny,
}

/// PathRule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRule {
    pub pattern: PathPattern,
    pub methods: MethodMatch,
    pub outcome: RuleOutcome,
}

impl PathRule {
    pub fn new(pattern: &str, methods: MethodMatch, outcome: RuleOutcome) -> Self {
        Self {
            pattern: PathPattern::new(pattern),
            methods,
            outcome,
        }
    }

    pub fn matches(&self, method: &Method, path: &str) -> bool {
        self.methods.matches(method) && self.pattern.matches(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Public,
    Secured,
}

/// Policy
///
/// A path matcher selecting the requests this policy owns, plus an ordered rule
/// set evaluated first-match-wins. A request owned by the policy that no rule
/// covers is denied.
#[derive(Debug, Clone)]
pub struct Policy {
    pub kind: PolicyKind,
    pub matcher: PathPattern,
    pub rules: Vec<PathRule>,
}

impl Policy {
    /// Anonymous reads under `pattern`; every other method is denied whatever
    /// credential the caller carries.
    pub fn public(pattern: &str) -> Self {
        Self {
            kind: PolicyKind::Public,
            matcher: PathPattern::new(pattern),
            rules: vec![
                PathRule::new(pattern, MethodMatch::only(Method::GET), RuleOutcome::AllowAnonymous),
                PathRule::new(pattern, MethodMatch::Any, RuleOutcome::Deny),
            ],
        }
    }

    /// Every request must carry a valid bearer token.
    pub fn secured() -> Self {
        Self {
            kind: PolicyKind::Secured,
            matcher: PathPattern::catch_all(),
            rules: vec![PathRule::new("/**", MethodMatch::Any, RuleOutcome::RequireAuth)],
        }
    }

    pub fn applies_to(&self, path: &str) -> bool {
        self.matcher.matches(path)
    }

    pub fn evaluate(&self, method: &Method, path: &str) -> RuleOutcome {
        self.rules
            .iter()
            .find(|rule| rule.matches(method, path))
            .map(|rule| rule.outcome)
            .unwrap_or(RuleOutcome::Deny)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyConfigError {
    #[error("the fallback policy must match every path, found matcher `{0}`")]
    FallbackNotCatchAll(String),
}

/// PolicyRouter
///
/// Ordered `(matcher, policy)` pairs evaluated first-match-wins, closed by a
/// fallback policy whose matcher is checked at construction to match every path.
/// Exactly one policy handles each request; the others never run for it.
#[derive(Debug, Clone)]
pub struct PolicyRouter {
    ordered: Vec<Policy>,
    fallback: Policy,
}

impl PolicyRouter {
    pub fn new(ordered: Vec<Policy>, fallback: Policy) -> Result<Self, PolicyConfigError> {
        if !fallback.matcher.is_catch_all() {
            return Err(PolicyConfigError::FallbackNotCatchAll(
                fallback.matcher.as_str().to_owned(),
            ));
        }
        Ok(Self { ordered, fallback })
    }

    /// The public catalog policy followed by the secured catch-all.
    pub fn standard() -> Self {
        Self {
            ordered: vec![Policy::public(PUBLIC_CATALOG_PATTERN)],
            fallback: Policy::secured(),
        }
    }

    pub fn select(&self, path: &str) -> &Policy {
        self.ordered
            .iter()
            .find(|policy| policy.applies_to(path))
            .unwrap_or(&self.fallback)
    }

    /// The rules granting anonymous access, in evaluation order.
    pub fn anonymous_rules(&self) -> Vec<PathRule> {
        self.ordered
            .iter()
            .chain(std::iter::once(&self.fallback))
            .flat_map(|policy| policy.rules.iter())
            .filter(|rule| rule.outcome == RuleOutcome::AllowAnonymous)
            .cloned()
            .collect()
    }
}

/// AccessDecision
///
/// The terminal gateway verdict for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// Proceed; carries the principal when the request was authenticated.
    Permitted(Option<Principal>),
    /// Rejected with a 403 by the access-denied handler.
    Denied,
    /// Rejected with a 401 by the unauthorized responder.
    Unauthenticated(AuthFailure),
}
