use std::collections::BTreeMap;

use serde::Serialize;

/// Authenticated principal produced by a credential verifier.
///
/// Built fresh for every request and attached to that request only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Principal name (the Basic user name, or the JWT `sub` claim).
    pub principal: String,
    /// Scheme that verified the credentials, e.g. `"Basic"` or `"Bearer"`.
    pub scheme: String,
    /// Additional claims asserted by the scheme.
    /// Uses `BTreeMap` for deterministic serialization order.
    pub claims: BTreeMap<String, String>,
}

impl Identity {
    /// Creates an identity with no extra claims.
    #[must_use]
    pub fn new(principal: impl Into<String>, scheme: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            scheme: scheme.into(),
            claims: BTreeMap::new(),
        }
    }

    /// Adds a claim, replacing any previous value under the same name.
    #[must_use]
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_serialize_in_key_order() {
        let identity = Identity::new("alice", "Bearer")
            .with_claim("role", "admin")
            .with_claim("org", "acme");
        let json = serde_json::to_string(&identity).unwrap();
        assert_eq!(
            json,
            r#"{"principal":"alice","scheme":"Bearer","claims":{"org":"acme","role":"admin"}}"#
        );
    }
}
