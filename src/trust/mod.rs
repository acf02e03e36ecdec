// trust/mod.rs - Registry-Anchored Trust

//! Registry-anchored trust for communicators.
//!
//! This module provides the cryptographic primitives of the trust model:
//!
//! - **Identity**: Ed25519 key pairs, imported public keys and fingerprints
//! - **Certificate**: name/address/key binding signed by the registry
//! - **Store**: per-node cache of peers whose certificates verified against
//!   the registry key
//!
//! A certificate is trusted by a third party if and only if it verifies
//! against the registry's public key. Self-signed and unsigned certificates
//! are never admitted.
//!
//! # Example
//!
//! ```ignore
//! use trustshare::trust::*;
//!
//! let registry = KeyPair::generate();
//! let alice = KeyPair::generate();
//!
//! let mut cert = Certificate::new("alice", "127.0.0.1:7000".parse()?, alice.public_key());
//! cert.com_id = 1;
//! cert.sign(&registry);
//!
//! let store = TrustStore::new(*registry.public_key());
//! store.admit(cert)?;
//! ```

mod certificate;
mod identity;
mod store;

pub use certificate::Certificate;

pub use identity::{Fingerprint, IdentityError, KeyPair, PublicKey};

pub use store::{TrustStore, TrustedPeer};
