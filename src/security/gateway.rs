use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, Method, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::{
    claims::{Principal, extract_principal},
    policy::{AccessDecision, PolicyKind, PolicyRouter, RuleOutcome},
    responder::UnauthorizedResponder,
    verifier::{AuthFailure, TokenVerifier},
};
use crate::error::AppError;

/// SecurityContext
///
/// The process-wide, read-only access-control state: the policy router, the
/// token verifier and the unauthorized responder derived from the same router.
/// Constructed once at start-up and shared as `Arc<SecurityContext>`.
pub struct SecurityContext {
    router: PolicyRouter,
    verifier: TokenVerifier,
    responder: UnauthorizedResponder,
}

pub type SecurityState = Arc<SecurityContext>;

impl SecurityContext {
    pub fn new(router: PolicyRouter, verifier: TokenVerifier) -> Self {
        let responder = UnauthorizedResponder::for_router(&router);
        Self {
            router,
            verifier,
            responder,
        }
    }

    pub fn router(&self) -> &PolicyRouter {
        &self.router
    }

    pub fn responder(&self) -> &UnauthorizedResponder {
        &self.responder
    }

    /// decide
    ///
    /// Selects the single policy owning `path` and applies its first matching
    /// rule. Only a `RequireAuth` outcome inspects the credential.
    pub fn decide(&self, method: &Method, path: &str, headers: &HeaderMap) -> (PolicyKind, AccessDecision) {
        let policy = self.router.select(path);

        let decision = match policy.evaluate(method, path) {
            RuleOutcome::AllowAnonymous => AccessDecision::Permitted(None),
            RuleOutcome::Deny => AccessDecision::Denied,
            RuleOutcome::RequireAuth => match self.authenticate(headers) {
                Ok(principal) => AccessDecision::Permitted(Some(principal)),
                Err(failure) => AccessDecision::Unauthenticated(failure),
            },
        };

        (policy.kind, decision)
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthFailure> {
        let token = bearer_token(headers)?;
        let claims = self.verifier.verify(token)?;
        Ok(extract_principal(&claims))
    }
}

/// Reads the token from `Authorization: Bearer <token>`; the scheme is matched
/// case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthFailure> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthFailure::MissingCredential)?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or(AuthFailure::MissingCredential)?;

    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthFailure::MissingCredential);
    }
    Ok(token)
}

/// access_gateway
///
/// Middleware enforcing the access decision for every request. Permitted
/// requests continue with the principal (if any) stored in the request
/// extensions; denials go to the access-denied handler, authentication failures
/// to the unauthorized responder.
pub async fn access_gateway(
    State(security): State<SecurityState>,
    mut request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let (policy, decision) = security.decide(&method, &path, request.headers());

    match decision {
        AccessDecision::Permitted(principal) => {
            if let Some(principal) = principal {
                tracing::debug!(
                    policy = ?policy,
                    subject = %principal.subject,
                    authorities = principal.authorities.len(),
                    "Request authenticated"
                );
                request.extensions_mut().insert(principal);
            }
            next.run(request).await
        }
        AccessDecision::Denied => {
            tracing::warn!(policy = ?policy, method = %method, path = %path, "Request denied");
            AppError::AccessDenied.into_response()
        }
        AccessDecision::Unauthenticated(failure) => {
            tracing::warn!(
                policy = ?policy,
                method = %method,
                path = %path,
                cause = %failure,
                "Authentication failed"
            );
            security.responder.respond(&method, &path, failure)
        }
    }
}

/// Principal Extractor
///
/// Handlers behind the secured policy take `Principal` as an argument. The
/// gateway has already authenticated the request, so this only reads the
/// extensions; a missing principal means the route is served anonymously and
/// the handler has no identity to act on.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Principal>().cloned().ok_or_else(|| {
            tracing::warn!(path = %parts.uri.path(), "Principal requested on an anonymous route");
            AppError::AccessDenied
        })
    }
}

/// RequiredRoles
///
/// A per-endpoint role requirement, satisfied when the principal holds any one
/// of the listed roles.
#[derive(Debug, Clone, Copy)]
pub struct RequiredRoles(pub &'static [&'static str]);

/// Catalog managers: may create entries, upload media and query upstream data services.
pub const MANAGER_ROLES: RequiredRoles = RequiredRoles(&["SUPER_ADMIN", "ADMIN"]);

impl RequiredRoles {
    pub fn check(&self, principal: &Principal) -> bool {
        principal.has_any_role(self.0)
    }
}

/// require_any_role
///
/// Route layer applied after the gateway. Authentication has already succeeded
/// here, so a failed role check is always a 403, never a 401.
pub async fn require_any_role(
    State(required): State<RequiredRoles>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let permitted = request
        .extensions()
        .get::<Principal>()
        .is_some_and(|principal| required.check(principal));

    if !permitted {
        tracing::warn!(
            path = %request.uri().path(),
            required = ?required.0,
            "Principal lacks the required role"
        );
        return Err(AppError::AccessDenied);
    }

    Ok(next.run(request).await)
}
