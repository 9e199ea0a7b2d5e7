//! TUF-style trust metadata: keys, roles, and the delegation tree.
//!
//! Root metadata declares which keys hold the root and top-level targets
//! roles. Targets metadata carries an ordered list of delegations, each
//! mapping scoped path patterns (`git:<ref>` / `file:<path>`) to a quorum of
//! keys. Delegation order is significant: terminating delegations prune their
//! siblings, non-terminating ones splice their children ahead of remaining
//! siblings (pre-order depth-first traversal).

use crate::error::GitTufError;
use globset::GlobBuilder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Role name of the root of trust.
pub const ROOT_ROLE_NAME: &str = "root";

/// Role name of the top-level targets metadata.
pub const TARGETS_ROLE_NAME: &str = "targets";

/// Reserved name of the trailing catch-all delegation. It is preserved when
/// serializing but never consulted by the path resolver.
pub const ALLOW_RULE_NAME: &str = "allow-rule";

/// The closed set of supported key types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    #[serde(rename = "pgp")]
    Pgp,
    #[serde(rename = "sigstore-oidc")]
    Fulcio,
    #[serde(rename = "ed25519")]
    Ed25519,
    #[serde(rename = "ecdsa")]
    Ecdsa,
    #[serde(rename = "rsa")]
    Rsa,
}

/// Public key material: raw bytes for asymmetric keys, an identity for
/// Sigstore-style keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVal {
    /// Hex-encoded public key bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<String>,

    /// OIDC identity (email or URI) for Sigstore-style keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    /// OIDC issuer URL for Sigstore-style keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

/// A public key trusted by some role.
///
/// `key_id` is content-derived (SHA-256 over the canonical key JSON without
/// the ID itself) and is the only identifier used in cross-references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    #[serde(rename = "keytype")]
    pub key_type: KeyType,
    pub scheme: String,
    #[serde(rename = "keyid", default)]
    pub key_id: String,
    #[serde(rename = "keyval")]
    pub key_val: KeyVal,
}

#[derive(Serialize)]
struct CanonicalKey<'a> {
    keytype: &'a KeyType,
    keyval: &'a KeyVal,
    scheme: &'a str,
}

impl Key {
    fn with_computed_id(mut self) -> Result<Self, GitTufError> {
        self.key_id = self.compute_key_id()?;
        Ok(self)
    }

    /// Construct an ed25519 key from raw public key bytes.
    pub fn ed25519(public: &[u8]) -> Result<Self, GitTufError> {
        Key {
            key_type: KeyType::Ed25519,
            scheme: "ed25519".to_string(),
            key_id: String::new(),
            key_val: KeyVal {
                public: Some(hex::encode(public)),
                identity: None,
                issuer: None,
            },
        }
        .with_computed_id()
    }

    /// Construct an ECDSA P-256 key from SEC1-encoded public key bytes.
    pub fn ecdsa(public: &[u8]) -> Result<Self, GitTufError> {
        Key {
            key_type: KeyType::Ecdsa,
            scheme: "ecdsa-sha2-nistp256".to_string(),
            key_id: String::new(),
            key_val: KeyVal {
                public: Some(hex::encode(public)),
                identity: None,
                issuer: None,
            },
        }
        .with_computed_id()
    }

    /// Construct a Sigstore-style key from an OIDC identity and issuer.
    pub fn fulcio(identity: &str, issuer: &str) -> Result<Self, GitTufError> {
        Key {
            key_type: KeyType::Fulcio,
            scheme: "fulcio".to_string(),
            key_id: String::new(),
            key_val: KeyVal {
                public: None,
                identity: Some(identity.to_string()),
                issuer: Some(issuer.to_string()),
            },
        }
        .with_computed_id()
    }

    /// Parse a key from its JSON serialization, computing the key ID if the
    /// serialization omits it.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GitTufError> {
        let mut key: Key = serde_json::from_slice(bytes)?;
        if key.key_id.is_empty() {
            key.key_id = key.compute_key_id()?;
        }
        Ok(key)
    }

    /// Serialize the key as canonical JSON.
    pub fn to_bytes(&self) -> Result<Vec<u8>, GitTufError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Compute the content-derived key identifier.
    pub fn compute_key_id(&self) -> Result<String, GitTufError> {
        let canonical = CanonicalKey {
            keytype: &self.key_type,
            keyval: &self.key_val,
            scheme: &self.scheme,
        };
        // Routing through Value sorts object keys, making the digest stable.
        let value = serde_json::to_value(&canonical)?;
        let encoded = serde_json::to_vec(&value)?;
        Ok(hex::encode(Sha256::digest(&encoded)))
    }
}

/// A role: a quorum of keys identified by key ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(rename = "keyids")]
    pub key_ids: Vec<String>,
    pub threshold: usize,
}

/// Root metadata: the keys and thresholds anchoring all trust decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootMetadata {
    #[serde(rename = "type")]
    pub metadata_type: String,
    pub version: u64,
    pub expires: String,
    pub keys: BTreeMap<String, Key>,
    pub roles: BTreeMap<String, Role>,
}

impl RootMetadata {
    /// Create empty root metadata at the given version and expiration.
    pub fn new(version: u64, expires: String) -> Self {
        RootMetadata {
            metadata_type: ROOT_ROLE_NAME.to_string(),
            version,
            expires,
            keys: BTreeMap::new(),
            roles: BTreeMap::new(),
        }
    }

    /// Structural validation: the root role must exist, every role must be
    /// satisfiable, and every referenced key must be declared.
    pub fn validate(&self) -> Result<(), GitTufError> {
        if self.version < 1 {
            return Err(GitTufError::InvalidMetadata(
                "root metadata version must be at least 1".to_string(),
            ));
        }
        if !self.roles.contains_key(ROOT_ROLE_NAME) {
            return Err(GitTufError::InvalidMetadata(
                "root metadata must declare the root role".to_string(),
            ));
        }
        for (name, role) in &self.roles {
            if name.is_empty() {
                return Err(GitTufError::InvalidMetadata(
                    "role name must not be empty".to_string(),
                ));
            }
            if role.threshold < 1 {
                return Err(GitTufError::InvalidMetadata(format!(
                    "role {name} must have a threshold of at least 1"
                )));
            }
            if role.key_ids.len() < role.threshold {
                return Err(GitTufError::InvalidMetadata(format!(
                    "role {name} lists fewer keys than its threshold"
                )));
            }
            for key_id in &role.key_ids {
                if !self.keys.contains_key(key_id) {
                    return Err(GitTufError::InvalidMetadata(format!(
                        "role {name} references undeclared key {key_id}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A delegation: path patterns mapped to a quorum of keys, with optional
/// terminating semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub name: String,
    #[serde(rename = "keyids")]
    pub key_ids: Vec<String>,
    pub threshold: usize,
    pub paths: Vec<String>,
    #[serde(default)]
    pub terminating: bool,
}

impl Delegation {
    /// Return true if any of the delegation's patterns matches the scoped
    /// path. `*` matches a single path segment, `**` any suffix; matching is
    /// case-sensitive. Unparseable patterns never match.
    pub fn matches(&self, path: &str) -> bool {
        for pattern in &self.paths {
            let glob = match GlobBuilder::new(pattern).literal_separator(true).build() {
                Ok(glob) => glob,
                Err(_) => continue,
            };
            if glob.compile_matcher().is_match(path) {
                return true;
            }
        }
        false
    }
}

/// The delegation section of a targets document: a key arena plus the ordered
/// delegation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegations {
    pub keys: BTreeMap<String, Key>,
    pub roles: Vec<Delegation>,
}

impl Delegations {
    pub fn new() -> Self {
        Delegations {
            keys: BTreeMap::new(),
            roles: Vec::new(),
        }
    }

    /// The delegation list with a trailing allow-rule stripped, the form the
    /// path resolver and verifier traverse.
    pub fn traversal_roles(&self) -> &[Delegation] {
        match self.roles.last() {
            Some(last) if last.name == ALLOW_RULE_NAME => &self.roles[..self.roles.len() - 1],
            _ => &self.roles,
        }
    }
}

impl Default for Delegations {
    fn default() -> Self {
        Self::new()
    }
}

/// Targets metadata: a delegation tree node. A missing `delegations` section
/// means the document delegates to no one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetsMetadata {
    #[serde(rename = "type")]
    pub metadata_type: String,
    pub version: u64,
    pub expires: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegations: Option<Delegations>,
}

impl TargetsMetadata {
    /// Create empty targets metadata at the given version and expiration.
    pub fn new(version: u64, expires: String) -> Self {
        TargetsMetadata {
            metadata_type: TARGETS_ROLE_NAME.to_string(),
            version,
            expires,
            delegations: Some(Delegations::new()),
        }
    }

    /// Structural validation: unique, non-empty delegation names, thresholds
    /// of at least 1, and non-empty path patterns.
    pub fn validate(&self) -> Result<(), GitTufError> {
        if self.version < 1 {
            return Err(GitTufError::InvalidMetadata(
                "targets metadata version must be at least 1".to_string(),
            ));
        }
        let Some(delegations) = &self.delegations else {
            return Ok(());
        };
        let mut seen = std::collections::HashSet::new();
        for delegation in &delegations.roles {
            if delegation.name.is_empty() {
                return Err(GitTufError::InvalidMetadata(
                    "delegation name must not be empty".to_string(),
                ));
            }
            if !seen.insert(delegation.name.as_str()) {
                return Err(GitTufError::InvalidMetadata(format!(
                    "duplicate delegation name {}",
                    delegation.name
                )));
            }
            if delegation.threshold < 1 {
                return Err(GitTufError::InvalidMetadata(format!(
                    "delegation {} must have a threshold of at least 1",
                    delegation.name
                )));
            }
            if delegation.paths.is_empty() || delegation.paths.iter().any(String::is_empty) {
                return Err(GitTufError::InvalidMetadata(format!(
                    "delegation {} must carry non-empty path patterns",
                    delegation.name
                )));
            }
        }
        Ok(())
    }
}
