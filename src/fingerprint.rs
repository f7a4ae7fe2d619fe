//! Origin fingerprints for same-environment detection

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA256 fingerprint of an environment (tenant + realm)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginFingerprint(String);

impl OriginFingerprint {
    /// Compute the fingerprint for a tenant URL and realm
    pub fn new(tenant: &str, realm: &str) -> Self {
        let tenant = tenant.trim_end_matches('/');
        let realm = realm.trim_start_matches('/');
        let hash = Sha256::digest(format!("{}|{}", tenant, realm).as_bytes());
        Self(format!("{:x}", hash))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this fingerprint identifies the same environment as `tenant`/`realm`
    pub fn matches(&self, tenant: &str, realm: &str) -> bool {
        *self == Self::new(tenant, realm)
    }
}

impl fmt::Display for OriginFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OriginFingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_consistency() {
        let a = OriginFingerprint::new("https://tenant.example.com/am", "alpha");
        let b = OriginFingerprint::new("https://tenant.example.com/am", "alpha");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_normalizes_slashes() {
        let a = OriginFingerprint::new("https://tenant.example.com/am/", "/alpha");
        assert!(a.matches("https://tenant.example.com/am", "alpha"));
    }

    #[test]
    fn test_fingerprint_different_realm() {
        let a = OriginFingerprint::new("https://tenant.example.com/am", "alpha");
        let b = OriginFingerprint::new("https://tenant.example.com/am", "bravo");
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_keeps_tenant_and_realm_apart() {
        let a = OriginFingerprint::new("https://x.example.com/am", "alpha");
        let b = OriginFingerprint::new("https://x.example.com/ama", "lpha");
        assert_ne!(a, b);
    }
}
