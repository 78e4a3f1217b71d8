//! Caller identity used for ownership and role checks.
//!
//! Authentication and token verification happen upstream; this crate only
//! consumes the already-verified identity.

use serde::{Deserialize, Serialize};

/// The verified identity of the caller of a lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    /// Short name; compared against `QueryDefinition::owner`.
    pub username: String,
    /// Distinguished name.
    pub dn: String,
    pub roles: Vec<String>,
    /// Authorizations this user holds.
    pub auths: Vec<String>,
}

impl UserDetails {
    pub fn new(username: impl Into<String>, dn: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            dn: dn.into(),
            roles: Vec::new(),
            auths: Vec::new(),
        }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_auths(mut self, auths: Vec<String>) -> Self {
        self.auths = auths;
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
