//! DSSE-compatible signing envelopes.
//!
//! Metadata documents travel inside a signed JSON envelope: the base64
//! payload, its type, and a list of `(keyid, sig)` pairs. The signed bytes
//! are never the payload alone but its pre-authentication encoding
//! ([`pae`]), which binds the payload type.

use crate::error::GitTufError;
use crate::sign::{Signer, Verifier};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Payload type of every gittuf metadata envelope.
pub const PAYLOAD_TYPE: &str = "application/vnd.gittuf+json";

/// A single signature over an envelope's PAE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: String,
    /// Base64-encoded signature bytes.
    pub sig: String,
}

/// A DSSE envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "payloadType")]
    pub payload_type: String,
    /// Base64-encoded payload bytes.
    pub payload: String,
    pub signatures: Vec<Signature>,
}

/// The DSSE pre-authentication encoding:
/// `DSSEv1 <len(type)> <type> <len(payload)> <payload>`.
pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "DSSEv1 {} {} {} ",
        payload_type.len(),
        payload_type,
        payload.len()
    )
    .into_bytes();
    out.extend_from_slice(payload);
    out
}

impl Envelope {
    /// Wrap payload bytes in an unsigned envelope.
    pub fn from_payload(payload: &[u8]) -> Self {
        Envelope {
            payload_type: PAYLOAD_TYPE.to_string(),
            payload: base64::engine::general_purpose::STANDARD.encode(payload),
            signatures: Vec::new(),
        }
    }

    /// Wrap a serializable metadata document in an unsigned envelope.
    pub fn from_metadata<T: Serialize>(metadata: &T) -> Result<Self, GitTufError> {
        Ok(Self::from_payload(&serde_json::to_vec(metadata)?))
    }

    /// Decode the base64 payload.
    pub fn decode_payload(&self) -> Result<Vec<u8>, GitTufError> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.payload)
            .map_err(|e| GitTufError::InvalidMetadata(format!("bad envelope payload: {e}")))
    }

    /// Deserialize the payload as a metadata document.
    pub fn decode_metadata<T: for<'de> Deserialize<'de>>(&self) -> Result<T, GitTufError> {
        Ok(serde_json::from_slice(&self.decode_payload()?)?)
    }

    fn signed_bytes(&self) -> Result<Vec<u8>, GitTufError> {
        Ok(pae(&self.payload_type, &self.decode_payload()?))
    }

    /// Sign the envelope's PAE, replacing any previous signature by the same
    /// key.
    pub fn sign(&mut self, signer: &dyn Signer) -> Result<(), GitTufError> {
        let raw = signer.sign(&self.signed_bytes()?)?;
        let signature = Signature {
            keyid: signer.key_id().to_string(),
            sig: base64::engine::general_purpose::STANDARD.encode(raw),
        };
        self.signatures.retain(|s| s.keyid != signature.keyid);
        self.signatures.push(signature);
        Ok(())
    }

    /// Verify the envelope against a set of trusted verifiers.
    ///
    /// Every signature is tried against every verifier; a signature counts at
    /// most once, duplicate `keyid`s are deduplicated, and acceptance requires
    /// at least `threshold` distinct keys. Signatures that fail to verify are
    /// not errors; they simply do not count.
    pub fn verify(
        &self,
        verifiers: &[Box<dyn Verifier>],
        threshold: usize,
    ) -> Result<(), GitTufError> {
        if threshold < 1 {
            return Err(GitTufError::InvalidMetadata(
                "envelope verification threshold must be at least 1".to_string(),
            ));
        }

        let signed = self.signed_bytes()?;

        let mut seen_keyids = HashSet::new();
        let mut accepted = HashSet::new();
        for signature in &self.signatures {
            if !seen_keyids.insert(signature.keyid.as_str()) {
                continue;
            }
            let raw = match base64::engine::general_purpose::STANDARD.decode(&signature.sig) {
                Ok(raw) => raw,
                Err(_) => {
                    log::debug!("skipping undecodable signature by {}", signature.keyid);
                    continue;
                }
            };
            for verifier in verifiers {
                if verifier.verify(&signed, &raw).is_ok() {
                    accepted.insert(verifier.key_id().to_string());
                    break;
                }
            }
        }

        if accepted.len() < threshold {
            return Err(GitTufError::BelowThreshold {
                have: accepted.len(),
                want: threshold,
            });
        }
        Ok(())
    }
}
