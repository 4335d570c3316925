use axum::{
    Json,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;

use super::{
    policy::{PathRule, PolicyRouter},
    verifier::AuthFailure,
};
use crate::responses::ApiResponse;

/// UnauthorizedResponder
///
/// Writes the 401 body when a secured-policy request fails authentication.
///
/// Before writing, it re-checks the request against the router's own anonymous
/// rules. A request those rules permit must never reach this point; if one does,
/// only the bare 401 status is returned so a public read never carries an
/// authentication challenge body. The rules are taken from the same
/// [`PolicyRouter`] the gateway routes with, so the check cannot drift from it.
#[derive(Debug, Clone)]
pub struct UnauthorizedResponder {
    anonymous_rules: Vec<PathRule>,
}

impl UnauthorizedResponder {
    pub fn new(anonymous_rules: Vec<PathRule>) -> Self {
        Self { anonymous_rules }
    }

    pub fn for_router(router: &PolicyRouter) -> Self {
        Self::new(router.anonymous_rules())
    }

    pub fn is_anonymously_permitted(&self, method: &Method, path: &str) -> bool {
        self.anonymous_rules
            .iter()
            .any(|rule| rule.matches(method, path))
    }

    pub fn respond(&self, method: &Method, path: &str, failure: AuthFailure) -> Response {
        if self.is_anonymously_permitted(method, path) {
            tracing::error!(
                method = %method,
                path = %path,
                "Anonymous route reached the unauthorized responder; suppressing body"
            );
            return StatusCode::UNAUTHORIZED.into_response();
        }

        let (message, code) = failure.message_pair();
        let body: ApiResponse<()> = ApiResponse::error(message, Value::from(code));

        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}
