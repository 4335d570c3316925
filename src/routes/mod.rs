//! Route tables, grouped by who may call them.
//!
//! Access is decided by the gateway in front of the whole router, not here:
//! `public` sits under the anonymous catalog prefix, `authenticated` needs any
//! valid token, and `admin` additionally carries a role layer.

/// Read-only catalog under `/api/nbs`.
pub mod public;

/// Identity and health, any authenticated caller.
pub mod authenticated;

/// Catalog management and upstream proxies, manager roles only.
pub mod admin;
