//! Signature verifiers and signers.
//!
//! The verifier contract is uniform across signing methods: given payload
//! bytes, signature bytes, and key material, return a typed verdict. Failures
//! are `BadSignature` (wrong key), `MalformedSignature` (undecodable), or
//! `ExpiredIdentity` (Sigstore-style identity outside its validity window).
//! Key types without a wired verifier report `UnknownSigningMethod`.

mod sigstore;

pub use sigstore::{SigstoreBundle, SigstoreVerifier};

use crate::error::GitTufError;
use crate::tuf::{Key, KeyType};
use p256::ecdsa::signature::Verifier as _;

/// Verifies signatures made by a single key.
pub trait Verifier {
    /// The content-derived ID of the key this verifier holds.
    fn key_id(&self) -> &str;

    /// Verify `signature` over `payload`.
    fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<(), GitTufError>;
}

/// Produces signatures attributable to a single key.
pub trait Signer {
    /// The content-derived ID of the signing key.
    fn key_id(&self) -> &str;

    /// Sign `payload`, returning the raw signature bytes.
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, GitTufError>;
}

/// Construct the verifier matching a policy key.
///
/// # Errors
///
/// `UnknownSigningMethod` for key types this build has no verifier for
/// (PGP and RSA verification is delegated to external tooling).
pub fn verifier_for_key(key: &Key) -> Result<Box<dyn Verifier>, GitTufError> {
    match key.key_type {
        KeyType::Ed25519 => Ok(Box::new(Ed25519Verifier::from_key(key)?)),
        KeyType::Ecdsa => Ok(Box::new(EcdsaVerifier::from_key(key)?)),
        KeyType::Fulcio => Ok(Box::new(SigstoreVerifier::from_key(key)?)),
        KeyType::Pgp => Err(GitTufError::UnknownSigningMethod("pgp".to_string())),
        KeyType::Rsa => Err(GitTufError::UnknownSigningMethod("rsa".to_string())),
    }
}

fn public_bytes(key: &Key) -> Result<Vec<u8>, GitTufError> {
    let encoded = key.key_val.public.as_ref().ok_or_else(|| {
        GitTufError::InvalidMetadata(format!("key {} carries no public material", key.key_id))
    })?;
    hex::decode(encoded)
        .map_err(|_| GitTufError::InvalidMetadata(format!("key {} is not hex-encoded", key.key_id)))
}

/// Ed25519 verifier.
pub struct Ed25519Verifier {
    key_id: String,
    pk: ed25519_compact::PublicKey,
}

impl Ed25519Verifier {
    /// Build a verifier from an ed25519 policy key.
    pub fn from_key(key: &Key) -> Result<Self, GitTufError> {
        let pk = ed25519_compact::PublicKey::from_slice(&public_bytes(key)?)?;
        Ok(Ed25519Verifier {
            key_id: key.key_id.clone(),
            pk,
        })
    }
}

impl Verifier for Ed25519Verifier {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<(), GitTufError> {
        let sig = ed25519_compact::Signature::from_slice(signature)
            .map_err(|e| GitTufError::MalformedSignature(e.to_string()))?;
        self.pk
            .verify(payload, &sig)
            .map_err(|_| GitTufError::BadSignature)
    }
}

/// ECDSA P-256 verifier. Signatures are DER-encoded.
pub struct EcdsaVerifier {
    key_id: String,
    vk: p256::ecdsa::VerifyingKey,
}

impl EcdsaVerifier {
    /// Build a verifier from an ECDSA policy key holding a SEC1 public key.
    pub fn from_key(key: &Key) -> Result<Self, GitTufError> {
        let vk = p256::ecdsa::VerifyingKey::from_sec1_bytes(&public_bytes(key)?)
            .map_err(|e| GitTufError::InvalidMetadata(format!("bad ECDSA key: {e}")))?;
        Ok(EcdsaVerifier {
            key_id: key.key_id.clone(),
            vk,
        })
    }
}

impl Verifier for EcdsaVerifier {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<(), GitTufError> {
        let sig = p256::ecdsa::Signature::from_der(signature)
            .map_err(|e| GitTufError::MalformedSignature(e.to_string()))?;
        self.vk
            .verify(payload, &sig)
            .map_err(|_| GitTufError::BadSignature)
    }
}

/// Ed25519 signer holding the secret key in memory.
pub struct Ed25519Signer {
    key_id: String,
    kp: ed25519_compact::KeyPair,
}

impl Ed25519Signer {
    /// Generate a fresh signing key.
    pub fn generate() -> Result<Self, GitTufError> {
        let kp = ed25519_compact::KeyPair::from_seed(ed25519_compact::Seed::generate());
        Self::from_keypair(kp)
    }

    /// Construct from a 32-byte seed, for deterministic test keys.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, GitTufError> {
        let kp = ed25519_compact::KeyPair::from_seed(ed25519_compact::Seed::new(*seed));
        Self::from_keypair(kp)
    }

    fn from_keypair(kp: ed25519_compact::KeyPair) -> Result<Self, GitTufError> {
        let key = Key::ed25519(kp.pk.as_ref())?;
        Ok(Ed25519Signer {
            key_id: key.key_id,
            kp,
        })
    }

    /// The public half as a policy key.
    pub fn public_key(&self) -> Key {
        // Reconstructing the key this signer was built from cannot fail.
        Key::ed25519(self.kp.pk.as_ref()).expect("valid public key")
    }
}

impl Signer for Ed25519Signer {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, GitTufError> {
        let sig = self.kp.sk.sign(payload, Some(ed25519_compact::Noise::generate()));
        Ok(sig.to_vec())
    }
}
