use serde_json::{Map, Value};
use std::{collections::BTreeSet, fmt};

const CLAIM_REALM_ACCESS: &str = "realm_access";
const CLAIM_RESOURCE_ACCESS: &str = "resource_access";
const CLAIM_ROLES: &str = "roles";
const CLAIM_PREFERRED_USERNAME: &str = "preferred_username";
const CLAIM_SUBJECT: &str = "sub";
const CLAIM_SCOPE: &str = "scope";
const CLAIM_SCP: &str = "scp";

/// TokenClaims
///
/// The verified payload of a bearer token, kept as an untyped JSON object.
/// Every claim the gateway reads is optional and may carry an unexpected shape.
pub type TokenClaims = Map<String, Value>;

/// Authority
///
/// A permission tag checked against endpoint requirements. Identity-provider
/// roles are held as `ROLE_<name>`, standard OAuth scopes as `SCOPE_<name>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Authority(String);

impl Authority {
    pub fn role(name: &str) -> Self {
        Self(format!("ROLE_{name}"))
    }

    pub fn scope(name: &str) -> Self {
        Self(format!("SCOPE_{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Principal
///
/// The authenticated identity of a single request together with its resolved
/// authority set. Built once per request by the access gateway and placed in the
/// request extensions; it is never cached or shared across requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// The `sub` claim, empty when the provider did not send one.
    pub subject: String,
    /// The `preferred_username` claim, empty when absent.
    pub display_name: String,
    pub authorities: BTreeSet<Authority>,
}

impl Principal {
    pub fn has_authority(&self, authority: &Authority) -> bool {
        self.authorities.contains(authority)
    }

    /// OR semantics: a single matching role is enough.
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles
            .iter()
            .any(|role| self.has_authority(&Authority::role(role)))
    }
}

/// RoleBlock
///
/// The `{ "roles": [..] }` object used by both `realm_access` and every entry of
/// `resource_access`. Decoding is total: anything that is not an object holding a
/// list yields an empty block, and non-string list items are skipped.
#[derive(Debug, Default, PartialEq, Eq)]
struct RoleBlock {
    roles: Vec<String>,
}

impl RoleBlock {
    fn decode(value: &Value) -> Self {
        match value.as_object().and_then(|block| block.get(CLAIM_ROLES)) {
            Some(Value::Array(items)) => Self {
                roles: items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect(),
            },
            _ => Self::default(),
        }
    }
}

/// extract_principal
///
/// Translates verified token claims into a [`Principal`].
///
/// The authority set is the union of:
/// 1. standard scope authorities (`scope` as a space separated string, or `scp`
///    as a string or list), each mapped to `SCOPE_<name>`;
/// 2. realm roles from `realm_access.roles`;
/// 3. client roles from every object-shaped value of `resource_access`.
///
/// Provider roles become `ROLE_<name>`. Malformed claim shapes contribute nothing,
/// so the function never fails: the worst case is a principal with no authorities.
pub fn extract_principal(claims: &TokenClaims) -> Principal {
    let mut authorities: BTreeSet<Authority> = scope_authorities(claims).collect();
    authorities.extend(provider_roles(claims).map(|role| Authority::role(&role)));

    Principal {
        subject: string_claim(claims, CLAIM_SUBJECT),
        display_name: string_claim(claims, CLAIM_PREFERRED_USERNAME),
        authorities,
    }
}

fn string_claim(claims: &TokenClaims, name: &str) -> String {
    claims
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

fn scope_authorities(claims: &TokenClaims) -> impl Iterator<Item = Authority> + '_ {
    let scopes: Vec<&str> = match claims.get(CLAIM_SCOPE).or_else(|| claims.get(CLAIM_SCP)) {
        Some(Value::String(raw)) => raw.split_whitespace().collect(),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    scopes.into_iter().map(Authority::scope)
}

fn provider_roles(claims: &TokenClaims) -> impl Iterator<Item = String> + '_ {
    let realm = claims
        .get(CLAIM_REALM_ACCESS)
        .map(RoleBlock::decode)
        .unwrap_or_default();

    // Non-object entries are skipped without affecting their well-formed siblings.
    let clients = claims
        .get(CLAIM_RESOURCE_ACCESS)
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|clients| clients.values())
        .map(RoleBlock::decode);

    std::iter::once(realm)
        .chain(clients)
        .flat_map(|block| block.roles)
}
