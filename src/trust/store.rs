// trust/store.rs - In-Memory Peer Trust Cache

use dashmap::DashMap;
use tracing::debug;

use super::certificate::Certificate;
use super::identity::{IdentityError, PublicKey};
use crate::directory::CommunicatorId;

/// A peer whose certificate verified against the trust anchor
#[derive(Clone, Debug)]
pub struct TrustedPeer {
    pub certificate: Certificate,
    pub key: PublicKey,
}

/// Per-node cache of peer certificates and imported keys, keyed by
/// communicator id.
///
/// Entries are only created by [`TrustStore::admit`], which verifies the
/// certificate against the registry key first. Certificate and key live in
/// one entry so a reader never sees one without the other.
pub struct TrustStore {
    /// Registry public key, the only trust anchor
    anchor: PublicKey,

    /// Trusted peers (com_id -> certificate + key)
    peers: DashMap<CommunicatorId, TrustedPeer>,
}

impl TrustStore {
    pub fn new(anchor: PublicKey) -> Self {
        Self {
            anchor,
            peers: DashMap::new(),
        }
    }

    /// Verify `certificate` against the anchor and cache it.
    ///
    /// Nothing is cached on failure. A successful admission replaces any
    /// earlier entry for the same id.
    pub fn admit(&self, certificate: Certificate) -> Result<CommunicatorId, IdentityError> {
        if !certificate.is_assigned() {
            return Err(IdentityError::Unassigned);
        }

        certificate.verify(&self.anchor)?;
        let key = certificate.public_key()?;
        let com_id = certificate.com_id;

        debug!(
            com_id,
            name = %certificate.name,
            fingerprint = %key.fingerprint().short(),
            "Admitted peer certificate"
        );

        self.peers.insert(com_id, TrustedPeer { certificate, key });
        Ok(com_id)
    }

    pub fn contains(&self, com_id: CommunicatorId) -> bool {
        self.peers.contains_key(&com_id)
    }

    pub fn key(&self, com_id: CommunicatorId) -> Option<PublicKey> {
        self.peers.get(&com_id).map(|peer| peer.key)
    }

    pub fn certificate(&self, com_id: CommunicatorId) -> Option<Certificate> {
        self.peers.get(&com_id).map(|peer| peer.certificate.clone())
    }

    /// Ids of all trusted peers, sorted
    pub fn ids(&self) -> Vec<CommunicatorId> {
        let mut ids: Vec<_> = self.peers.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
