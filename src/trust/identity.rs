// trust/identity.rs - Node Key Pairs with Ed25519 Keys

use ed25519_dalek::{
    Signature, Signer, SigningKey, Verifier, VerifyingKey,
    PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH, SIGNATURE_LENGTH,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Errors related to key and signature handling
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Invalid public key material")]
    InvalidPublicKey,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Object carries no signature")]
    MissingSignature,

    #[error("Certificate carries no registry-assigned identifier")]
    Unassigned,
}

/// A unique fingerprint derived from a public key
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Create fingerprint from public key bytes
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(public_key);
        Self(hasher.finalize().into())
    }

    /// Short form for logs (first 8 bytes as hex)
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Key pair owned by a registry or communicator. Never leaves the process.
pub struct KeyPair {
    signing_key: SigningKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let mut secret_bytes = [0u8; SECRET_KEY_LENGTH];
        rand::rng().fill_bytes(&mut secret_bytes);

        let signing_key = SigningKey::from_bytes(&secret_bytes);
        let public = PublicKey {
            key: signing_key.verifying_key(),
        };

        Self {
            signing_key,
            public,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Sign arbitrary data
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.signing_key.sign(data).to_bytes().to_vec()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("fingerprint", &self.public.fingerprint().short())
            .finish()
    }
}

/// Imported public key, used to verify signatures
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
}

impl PublicKey {
    /// Import a public key from its raw byte material
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let key_bytes: [u8; PUBLIC_KEY_LENGTH] =
            bytes
                .try_into()
                .map_err(|_| IdentityError::InvalidKeyLength {
                    expected: PUBLIC_KEY_LENGTH,
                    got: bytes.len(),
                })?;

        let key =
            VerifyingKey::from_bytes(&key_bytes).map_err(|_| IdentityError::InvalidPublicKey)?;

        Ok(Self { key })
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.key.to_bytes()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_public_key(self.key.as_bytes())
    }

    /// Verify a signature over `data`
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<(), IdentityError> {
        let sig_bytes: [u8; SIGNATURE_LENGTH] =
            signature
                .try_into()
                .map_err(|_| IdentityError::InvalidKeyLength {
                    expected: SIGNATURE_LENGTH,
                    got: signature.len(),
                })?;

        let sig = Signature::from_bytes(&sig_bytes);

        self.key
            .verify(data, &sig)
            .map_err(|_| IdentityError::InvalidSignature)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint().short())
    }
}
