//! Request authorization.
//!
//! Every request passes the rate limiter, then the CORS layer, then the access
//! gateway. The gateway hands the request to exactly one policy: the public
//! catalog policy for `/api/nbs/**`, or the secured policy for everything else.

pub mod claims;
pub mod cors;
pub mod gateway;
pub mod policy;
pub mod rate_limit;
pub mod responder;
pub mod verifier;

pub use claims::{Authority, Principal, TokenClaims, extract_principal};
pub use cors::CorsPolicy;
pub use gateway::{
    MANAGER_ROLES, RequiredRoles, SecurityContext, SecurityState, access_gateway,
    require_any_role,
};
pub use policy::{AccessDecision, PolicyKind, PolicyRouter, RuleOutcome};
pub use rate_limit::{RequestThrottle, throttle_requests};
pub use responder::UnauthorizedResponder;
pub use verifier::{AuthFailure, TokenVerifier};
