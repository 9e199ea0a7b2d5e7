//! Sigstore-style keyless verification.
//!
//! A Sigstore-style policy key holds no public key material, only an OIDC
//! identity (subject + issuer). The key material arrives with the signature
//! itself: the signature bytes are a JSON bundle carrying the Fulcio-issued
//! leaf certificate, the raw signature, and the timestamp the signature was
//! logged at. Verification binds the certificate to the declared identity,
//! checks the certificate was valid at signing time, and then verifies the
//! raw signature with the certificate key.

use crate::error::GitTufError;
use crate::tuf::Key;
use base64::Engine;
use p256::ecdsa::signature::Verifier as _;
use serde::{Deserialize, Serialize};
use x509_parser::prelude::*;

/// OID of the Fulcio extension carrying the OIDC issuer.
const FULCIO_ISSUER_OID: &str = "1.3.6.1.4.1.57264.1.1";

/// The bundle carried as the signature bytes of a Sigstore-style signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigstoreBundle {
    /// Base64-encoded DER leaf certificate issued by Fulcio.
    pub certificate: String,

    /// Base64-encoded DER ECDSA signature over the payload.
    pub signature: String,

    /// Unix timestamp the signature was witnessed at; certificate validity is
    /// checked against this instant, not the verifier's clock.
    #[serde(rename = "signedTime")]
    pub signed_time: u64,
}

impl SigstoreBundle {
    /// Serialize the bundle into the byte form stored as a signature.
    pub fn to_bytes(&self) -> Result<Vec<u8>, GitTufError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Verifier for Sigstore-style keys: an OIDC identity plus issuer.
pub struct SigstoreVerifier {
    key_id: String,
    identity: String,
    issuer: String,
}

impl SigstoreVerifier {
    /// Build a verifier from a Sigstore-style policy key.
    pub fn from_key(key: &Key) -> Result<Self, GitTufError> {
        let identity = key.key_val.identity.clone().ok_or_else(|| {
            GitTufError::InvalidMetadata(format!("key {} carries no identity", key.key_id))
        })?;
        let issuer = key.key_val.issuer.clone().ok_or_else(|| {
            GitTufError::InvalidMetadata(format!("key {} carries no issuer", key.key_id))
        })?;
        Ok(SigstoreVerifier {
            key_id: key.key_id.clone(),
            identity,
            issuer,
        })
    }

    fn certificate_identity(cert: &X509Certificate<'_>) -> Result<String, GitTufError> {
        let san_ext = cert
            .get_extension_unique(&oid_registry::OID_X509_EXT_SUBJECT_ALT_NAME)
            .map_err(|e| GitTufError::MalformedSignature(format!("bad SAN extension: {e}")))?;
        if let Some(san_ext) = san_ext {
            if let ParsedExtension::SubjectAlternativeName(san) = san_ext.parsed_extension() {
                for name in &san.general_names {
                    match name {
                        GeneralName::RFC822Name(email) => return Ok(email.to_string()),
                        GeneralName::URI(uri) => return Ok(uri.to_string()),
                        _ => continue,
                    }
                }
            }
        }
        Err(GitTufError::MalformedSignature(
            "certificate carries no identity".to_string(),
        ))
    }

    fn certificate_issuer(cert: &X509Certificate<'_>) -> Result<String, GitTufError> {
        for ext in cert.extensions() {
            if ext.oid.to_id_string() == FULCIO_ISSUER_OID {
                let issuer = std::str::from_utf8(ext.value).map_err(|_| {
                    GitTufError::MalformedSignature("non-UTF-8 issuer extension".to_string())
                })?;
                return Ok(issuer.to_string());
            }
        }
        Err(GitTufError::MalformedSignature(
            "certificate carries no issuer extension".to_string(),
        ))
    }
}

impl super::Verifier for SigstoreVerifier {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<(), GitTufError> {
        let bundle: SigstoreBundle = serde_json::from_slice(signature)
            .map_err(|e| GitTufError::MalformedSignature(format!("bad bundle: {e}")))?;

        let cert_der = base64::engine::general_purpose::STANDARD
            .decode(&bundle.certificate)
            .map_err(|e| GitTufError::MalformedSignature(format!("bad certificate: {e}")))?;
        let (_, cert) = parse_x509_certificate(&cert_der)
            .map_err(|e| GitTufError::MalformedSignature(format!("bad certificate: {e}")))?;

        // The certificate must bind the identity the policy trusts.
        if Self::certificate_identity(&cert)? != self.identity {
            log::debug!("certificate identity does not match key {}", self.key_id);
            return Err(GitTufError::BadSignature);
        }
        if Self::certificate_issuer(&cert)? != self.issuer {
            log::debug!("certificate issuer does not match key {}", self.key_id);
            return Err(GitTufError::BadSignature);
        }

        // Validity is checked against the witnessed signing time: Fulcio
        // certificates are short-lived and are long expired by the time a
        // historical entry is re-verified.
        let signed_time = i64::try_from(bundle.signed_time)
            .map_err(|_| GitTufError::MalformedSignature("signed time overflow".to_string()))?;
        let validity = cert.validity();
        if signed_time < validity.not_before.timestamp()
            || signed_time > validity.not_after.timestamp()
        {
            return Err(GitTufError::ExpiredIdentity);
        }

        let sig_der = base64::engine::general_purpose::STANDARD
            .decode(&bundle.signature)
            .map_err(|e| GitTufError::MalformedSignature(format!("bad signature: {e}")))?;
        let sig = p256::ecdsa::Signature::from_der(&sig_der)
            .map_err(|e| GitTufError::MalformedSignature(e.to_string()))?;

        let key_bytes = cert.public_key().subject_public_key.data.to_vec();
        let vk = p256::ecdsa::VerifyingKey::from_sec1_bytes(&key_bytes)
            .map_err(|e| GitTufError::MalformedSignature(format!("bad certificate key: {e}")))?;
        vk.verify(payload, &sig)
            .map_err(|_| GitTufError::BadSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::Verifier as _;
    use p256::ecdsa::signature::Signer as _;
    use p256::pkcs8::DecodePrivateKey;

    const IDENTITY: &str = "jane@example.com";
    const ISSUER: &str = "https://oidc.example.com";

    // A self-signed stand-in for a Fulcio-issued leaf certificate, plus the
    // matching P-256 signing key.
    fn test_certificate(identity: &str, issuer: &str) -> (Vec<u8>, p256::ecdsa::SigningKey) {
        let rcgen_key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();

        let mut params = rcgen::CertificateParams::default();
        params
            .subject_alt_names
            .push(rcgen::SanType::Rfc822Name(identity.try_into().unwrap()));
        params.custom_extensions.push(
            rcgen::CustomExtension::from_oid_content(
                &[1, 3, 6, 1, 4, 1, 57264, 1, 1],
                issuer.as_bytes().to_vec(),
            ),
        );
        let now = ::time::OffsetDateTime::now_utc();
        params.not_before = now - ::time::Duration::minutes(5);
        params.not_after = now + ::time::Duration::minutes(10);

        let cert = params.self_signed(&rcgen_key).unwrap();
        let signing_key =
            p256::ecdsa::SigningKey::from_pkcs8_der(&rcgen_key.serialize_der()).unwrap();
        (cert.der().to_vec(), signing_key)
    }

    fn bundle_for(payload: &[u8], cert_der: &[u8], key: &p256::ecdsa::SigningKey) -> Vec<u8> {
        let signature: p256::ecdsa::Signature = key.sign(payload);
        let bundle = SigstoreBundle {
            certificate: base64::engine::general_purpose::STANDARD.encode(cert_der),
            signature: base64::engine::general_purpose::STANDARD
                .encode(signature.to_der().as_bytes()),
            signed_time: u64::try_from(::time::OffsetDateTime::now_utc().unix_timestamp()).unwrap(),
        };
        bundle.to_bytes().unwrap()
    }

    #[test]
    fn test_sigstore_round_trip() {
        let (cert_der, signing_key) = test_certificate(IDENTITY, ISSUER);
        let key = Key::fulcio(IDENTITY, ISSUER).unwrap();
        let verifier = SigstoreVerifier::from_key(&key).unwrap();

        let payload = b"keyless payload";
        let signature = bundle_for(payload, &cert_der, &signing_key);
        verifier.verify(payload, &signature).unwrap();
    }

    #[test]
    fn test_sigstore_rejects_identity_mismatch() {
        let (cert_der, signing_key) = test_certificate("mallory@example.com", ISSUER);
        let key = Key::fulcio(IDENTITY, ISSUER).unwrap();
        let verifier = SigstoreVerifier::from_key(&key).unwrap();

        let signature = bundle_for(b"payload", &cert_der, &signing_key);
        let result = verifier.verify(b"payload", &signature);
        assert!(matches!(result, Err(GitTufError::BadSignature)));
    }

    #[test]
    fn test_sigstore_rejects_issuer_mismatch() {
        let (cert_der, signing_key) = test_certificate(IDENTITY, "https://rogue.example.com");
        let key = Key::fulcio(IDENTITY, ISSUER).unwrap();
        let verifier = SigstoreVerifier::from_key(&key).unwrap();

        let signature = bundle_for(b"payload", &cert_der, &signing_key);
        let result = verifier.verify(b"payload", &signature);
        assert!(matches!(result, Err(GitTufError::BadSignature)));
    }

    #[test]
    fn test_sigstore_rejects_expired_identity() {
        let (cert_der, signing_key) = test_certificate(IDENTITY, ISSUER);
        let key = Key::fulcio(IDENTITY, ISSUER).unwrap();
        let verifier = SigstoreVerifier::from_key(&key).unwrap();

        let payload = b"payload";
        let signature: p256::ecdsa::Signature = signing_key.sign(payload);
        let bundle = SigstoreBundle {
            certificate: base64::engine::general_purpose::STANDARD.encode(&cert_der),
            signature: base64::engine::general_purpose::STANDARD
                .encode(signature.to_der().as_bytes()),
            // Witnessed long after the certificate lapsed.
            signed_time: u64::try_from(::time::OffsetDateTime::now_utc().unix_timestamp()).unwrap()
                + 86400,
        };

        let result = verifier.verify(payload, &bundle.to_bytes().unwrap());
        assert!(matches!(result, Err(GitTufError::ExpiredIdentity)));
    }

    #[test]
    fn test_sigstore_rejects_tampered_payload() {
        let (cert_der, signing_key) = test_certificate(IDENTITY, ISSUER);
        let key = Key::fulcio(IDENTITY, ISSUER).unwrap();
        let verifier = SigstoreVerifier::from_key(&key).unwrap();

        let signature = bundle_for(b"payload", &cert_der, &signing_key);
        let result = verifier.verify(b"tampered", &signature);
        assert!(matches!(result, Err(GitTufError::BadSignature)));
    }

    #[test]
    fn test_sigstore_rejects_garbage_bundle() {
        let key = Key::fulcio(IDENTITY, ISSUER).unwrap();
        let verifier = SigstoreVerifier::from_key(&key).unwrap();
        let result = verifier.verify(b"payload", b"not a bundle");
        assert!(matches!(result, Err(GitTufError::MalformedSignature(_))));
    }
}
