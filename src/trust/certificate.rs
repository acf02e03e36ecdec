// trust/certificate.rs - Registry-Signed Certificates

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;

use super::identity::{Fingerprint, IdentityError, KeyPair, PublicKey};
use crate::directory::{CommunicatorId, UNASSIGNED};

/// Binding of a name and network address to a public key.
///
/// A certificate starts unsigned with `com_id == 0`. The registry attaches an
/// identifier and a signature exactly once; after that it is never mutated.
/// The signature covers the name, public key, address and identifier, so
/// none of them can be rewritten once the registry has signed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Name of the certificate holder
    pub name: String,

    /// Address the holder serves requests on
    pub address: SocketAddr,

    /// Raw public key bytes of the holder
    pub public_key: Vec<u8>,

    /// Registry signature, if issued
    pub signature: Option<Vec<u8>>,

    /// Registry-assigned identifier (0 = unassigned)
    pub com_id: CommunicatorId,
}

impl Certificate {
    /// Create an unsigned certificate for `public_key`
    pub fn new(name: impl Into<String>, address: SocketAddr, public_key: &PublicKey) -> Self {
        Self {
            name: name.into(),
            address,
            public_key: public_key.to_bytes().to_vec(),
            signature: None,
            com_id: UNASSIGNED,
        }
    }

    /// SHA-256 over name, public key bytes, address and big-endian `com_id`
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update(&self.public_key);
        hasher.update(self.address.to_string().as_bytes());
        hasher.update(self.com_id.to_be_bytes());
        hasher.finalize().into()
    }

    /// Sign this certificate's digest
    pub fn sign(&mut self, key: &KeyPair) {
        self.signature = Some(key.sign(&self.digest()));
    }

    /// Verify the signature against `key`. Unsigned certificates never verify.
    pub fn verify(&self, key: &PublicKey) -> Result<(), IdentityError> {
        let signature = self
            .signature
            .as_deref()
            .ok_or(IdentityError::MissingSignature)?;
        key.verify(&self.digest(), signature)
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn is_assigned(&self) -> bool {
        self.com_id != UNASSIGNED
    }

    /// Import the holder's public key
    pub fn public_key(&self) -> Result<PublicKey, IdentityError> {
        PublicKey::from_bytes(&self.public_key)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_public_key(&self.public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:7000".parse().unwrap()
    }

    fn signed_pair() -> (KeyPair, Certificate) {
        let registry = KeyPair::generate();
        let holder = KeyPair::generate();
        let mut cert = Certificate::new("alice", addr(), holder.public_key());
        cert.com_id = 1;
        cert.sign(&registry);
        (registry, cert)
    }

    #[test]
    fn test_new_certificate_is_unassigned() {
        let keys = KeyPair::generate();
        let cert = Certificate::new("alice", addr(), keys.public_key());

        assert!(!cert.is_signed());
        assert!(!cert.is_assigned());
        assert_eq!(cert.public_key().unwrap(), *keys.public_key());
    }

    #[test]
    fn test_registry_signature_verifies() {
        let (registry, cert) = signed_pair();
        assert!(cert.verify(registry.public_key()).is_ok());
    }

    #[test]
    fn test_other_key_does_not_verify() {
        let (_, cert) = signed_pair();
        let other = KeyPair::generate();
        assert!(cert.verify(other.public_key()).is_err());
    }

    #[test]
    fn test_unsigned_never_verifies() {
        let keys = KeyPair::generate();
        let cert = Certificate::new("alice", addr(), keys.public_key());

        assert!(matches!(
            cert.verify(keys.public_key()),
            Err(IdentityError::MissingSignature)
        ));
    }

    #[test]
    fn test_self_signed_does_not_verify_against_registry() {
        let registry = KeyPair::generate();
        let holder = KeyPair::generate();
        let mut cert = Certificate::new("mallory", addr(), holder.public_key());
        cert.sign(&holder);

        assert!(cert.verify(holder.public_key()).is_ok());
        assert!(cert.verify(registry.public_key()).is_err());
    }

    #[test]
    fn test_renamed_certificate_fails() {
        let (registry, mut cert) = signed_pair();
        cert.name.push('x');
        assert!(cert.verify(registry.public_key()).is_err());
    }

    #[test]
    fn test_rewritten_com_id_fails() {
        let (registry, mut cert) = signed_pair();
        cert.com_id = 2;
        assert!(cert.verify(registry.public_key()).is_err());
    }

    #[test]
    fn test_rewritten_address_fails() {
        let (registry, mut cert) = signed_pair();
        cert.address = "127.0.0.1:7001".parse().unwrap();
        assert!(cert.verify(registry.public_key()).is_err());
    }

    proptest! {
        #[test]
        fn prop_any_flipped_key_byte_fails(index in 0usize..32, bit in 0u8..8) {
            let (registry, mut cert) = signed_pair();
            cert.public_key[index] ^= 1 << bit;
            prop_assert!(cert.verify(registry.public_key()).is_err());
        }

        #[test]
        fn prop_any_flipped_signature_byte_fails(index in 0usize..64, bit in 0u8..8) {
            let (registry, mut cert) = signed_pair();
            if let Some(signature) = cert.signature.as_mut() {
                signature[index] ^= 1 << bit;
            }
            prop_assert!(cert.verify(registry.public_key()).is_err());
        }

        #[test]
        fn prop_any_changed_name_fails(suffix in "[a-z]{1,8}") {
            let (registry, mut cert) = signed_pair();
            cert.name.push_str(&suffix);
            prop_assert!(cert.verify(registry.public_key()).is_err());
        }
    }
}
