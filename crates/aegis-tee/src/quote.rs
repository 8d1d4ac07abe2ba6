//! TEE quote wire formats and the manufacturer trust anchors.
//!
//! Quotes travel as bincode envelopes. Each family carries a signed payload
//! and a leaf-first certificate chain of secp256k1 keys; the chain must
//! terminate at a root configured for that family. Signatures are 64-byte
//! fixed-width ECDSA over SHA-256 of the signed bytes.

use k256::ecdsa::signature::Verifier;
use k256::ecdsa::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};

use aegis_core::error::{AegisError, QuoteFailure};
use aegis_core::types::Timestamp;

// ── Certificate chain ────────────────────────────────────────────────────────

/// One link in a quote's certificate chain. `signature` is produced by the
/// parent link's key (or a configured root for the last link) over the
/// subject public key bytes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CertLink {
    /// SEC1-encoded secp256k1 subject key.
    pub subject_public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Verify a 64-byte ECDSA signature over `message` with a SEC1 key.
fn verify_sig(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &sig).is_ok()
}

/// Walk a leaf-first chain: every link must be signed by its parent, and the
/// last link by one of `roots`. Returns the leaf key on success.
pub fn verify_chain<'a>(
    chain: &'a [CertLink],
    roots: &[Vec<u8>],
) -> Result<&'a [u8], AegisError> {
    if chain.is_empty() {
        return Err(AegisError::AttestationFailed(QuoteFailure::BadChain));
    }

    for (i, link) in chain.iter().enumerate() {
        let signer: &[u8] = match chain.get(i + 1) {
            Some(parent) => &parent.subject_public_key,
            None => {
                // Terminal link: accept any configured root as the signer.
                if !roots
                    .iter()
                    .any(|root| verify_sig(root, &link.subject_public_key, &link.signature))
                {
                    return Err(AegisError::AttestationFailed(QuoteFailure::BadChain));
                }
                continue;
            }
        };
        if !verify_sig(signer, &link.subject_public_key, &link.signature) {
            return Err(AegisError::AttestationFailed(QuoteFailure::BadChain));
        }
    }

    Ok(&chain[0].subject_public_key)
}

// ── TrustZone ────────────────────────────────────────────────────────────────

/// The signed body of an ARM TrustZone attestation token.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrustZonePayload {
    /// SEC1-encoded hardware key attested to reside in the TEE.
    pub hardware_public_key: Vec<u8>,
    pub nonce: [u8; 16],
    pub issued_at: Timestamp,
    pub firmware_version: u32,
}

/// ARM TrustZone attestation token: payload, leaf signature over the
/// bincode payload, certificate chain to a manufacturer root.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrustZoneToken {
    pub payload: TrustZonePayload,
    pub payload_signature: Vec<u8>,
    pub cert_chain: Vec<CertLink>,
}

impl TrustZoneToken {
    pub fn decode(bytes: &[u8]) -> Result<Self, AegisError> {
        bincode::deserialize(bytes)
            .map_err(|_| AegisError::AttestationFailed(QuoteFailure::BadFormat))
    }

    pub fn signed_bytes(&self) -> Vec<u8> {
        bincode::serialize(&self.payload).expect("payload serialization is infallible")
    }

    /// Verify the chain and the leaf's signature over the payload.
    pub fn verify_signatures(&self, roots: &[Vec<u8>]) -> Result<(), AegisError> {
        let leaf = verify_chain(&self.cert_chain, roots)?;
        if !verify_sig(leaf, &self.signed_bytes(), &self.payload_signature) {
            return Err(AegisError::AttestationFailed(QuoteFailure::BadChain));
        }
        Ok(())
    }
}

// ── Secure Enclave ───────────────────────────────────────────────────────────

/// The signed body of an Apple App-Attest-style envelope.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SecureEnclavePayload {
    /// Attested key identifier: SHA-256 of the hardware public key.
    pub key_id: [u8; 32],
    pub hardware_public_key: Vec<u8>,
    /// Must equal SHA-256 of the issued challenge nonce.
    pub client_data_hash: [u8; 32],
    pub issued_at: Timestamp,
}

/// Apple Secure Enclave attestation envelope.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SecureEnclaveEnvelope {
    pub payload: SecureEnclavePayload,
    pub payload_signature: Vec<u8>,
    pub cert_chain: Vec<CertLink>,
}

impl SecureEnclaveEnvelope {
    pub fn decode(bytes: &[u8]) -> Result<Self, AegisError> {
        bincode::deserialize(bytes)
            .map_err(|_| AegisError::AttestationFailed(QuoteFailure::BadFormat))
    }

    pub fn signed_bytes(&self) -> Vec<u8> {
        bincode::serialize(&self.payload).expect("payload serialization is infallible")
    }

    pub fn verify_signatures(&self, roots: &[Vec<u8>]) -> Result<(), AegisError> {
        let leaf = verify_chain(&self.cert_chain, roots)?;
        if !verify_sig(leaf, &self.signed_bytes(), &self.payload_signature) {
            return Err(AegisError::AttestationFailed(QuoteFailure::BadChain));
        }
        Ok(())
    }
}

// ── Trusted roots ────────────────────────────────────────────────────────────

/// Manufacturer trust anchors, one set per TEE family. Loaded from the JSON
/// bundle named by `TRUSTED_TEE_ROOTS`:
/// `{"trustzone": ["<hex sec1>", …], "secure_enclave": ["<hex sec1>", …]}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrustedRoots {
    #[serde(default)]
    pub trustzone: Vec<String>,
    #[serde(default)]
    pub secure_enclave: Vec<String>,
}

impl TrustedRoots {
    pub fn load(path: &std::path::Path) -> Result<Self, AegisError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| AegisError::Storage(format!("reading TEE root bundle: {e}")))?;
        serde_json::from_str(&json)
            .map_err(|e| AegisError::Serialization(format!("parsing TEE root bundle: {e}")))
    }

    pub fn trustzone_keys(&self) -> Result<Vec<Vec<u8>>, AegisError> {
        decode_keys(&self.trustzone)
    }

    pub fn secure_enclave_keys(&self) -> Result<Vec<Vec<u8>>, AegisError> {
        decode_keys(&self.secure_enclave)
    }
}

fn decode_keys(hexes: &[String]) -> Result<Vec<Vec<u8>>, AegisError> {
    hexes
        .iter()
        .map(|h| {
            hex::decode(h).map_err(|e| AegisError::Serialization(format!("bad root key hex: {e}")))
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod testkit {
    //! Quote construction helpers for tests: a one-link manufacturer chain.

    use super::*;
    use k256::ecdsa::signature::Signer;
    use k256::ecdsa::SigningKey;

    pub struct TestManufacturer {
        pub root: SigningKey,
        pub leaf: SigningKey,
    }

    impl TestManufacturer {
        pub fn new() -> Self {
            Self {
                root: SigningKey::random(&mut rand::rngs::OsRng),
                leaf: SigningKey::random(&mut rand::rngs::OsRng),
            }
        }

        pub fn root_sec1(&self) -> Vec<u8> {
            self.root.verifying_key().to_encoded_point(true).as_bytes().to_vec()
        }

        pub fn leaf_sec1(&self) -> Vec<u8> {
            self.leaf.verifying_key().to_encoded_point(true).as_bytes().to_vec()
        }

        pub fn chain(&self) -> Vec<CertLink> {
            let leaf_key = self.leaf_sec1();
            let sig: Signature = self.root.sign(&leaf_key);
            vec![CertLink { subject_public_key: leaf_key, signature: sig.to_vec() }]
        }

        pub fn trustzone_token(
            &self,
            hardware_public_key: Vec<u8>,
            nonce: [u8; 16],
            issued_at: Timestamp,
            firmware_version: u32,
        ) -> TrustZoneToken {
            let payload = TrustZonePayload { hardware_public_key, nonce, issued_at, firmware_version };
            let signed = bincode::serialize(&payload).unwrap();
            let sig: Signature = self.leaf.sign(&signed);
            TrustZoneToken {
                payload,
                payload_signature: sig.to_vec(),
                cert_chain: self.chain(),
            }
        }

        pub fn secure_enclave_envelope(
            &self,
            hardware_public_key: Vec<u8>,
            client_data_hash: [u8; 32],
            issued_at: Timestamp,
        ) -> SecureEnclaveEnvelope {
            let payload = SecureEnclavePayload {
                key_id: aegis_crypto::sha256(&hardware_public_key),
                hardware_public_key,
                client_data_hash,
                issued_at,
            };
            let signed = bincode::serialize(&payload).unwrap();
            let sig: Signature = self.leaf.sign(&signed);
            SecureEnclaveEnvelope {
                payload,
                payload_signature: sig.to_vec(),
                cert_chain: self.chain(),
            }
        }
    }
}
