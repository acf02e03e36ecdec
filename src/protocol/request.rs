// protocol/request.rs - Signed File Requests

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::message::MessageType;
use crate::directory::{CommunicatorId, FileBuffer};
use crate::trust::{IdentityError, KeyPair, PublicKey};

/// FETCH_FILE payload exchanged between communicators.
///
/// The requester signs the request with an empty buffer; the responder fills
/// the buffer and signs the populated request with its own key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRequest {
    /// Buffer to be filled by the owner of the file
    pub buffer: FileBuffer,

    /// Communicator id of the requester
    pub source_id: CommunicatorId,

    /// Requesting user on the source node
    pub username: String,

    /// Signature of the last party that handled the request
    pub signature: Option<Vec<u8>>,
}

impl FileRequest {
    pub fn new(buffer: FileBuffer, source_id: CommunicatorId, username: impl Into<String>) -> Self {
        Self {
            buffer,
            source_id,
            username: username.into(),
            signature: None,
        }
    }

    /// SHA-256 over username, type tag, buffer lines and the identifier string
    /// `"{owner} {source} {buffer} {file}"`.
    pub fn digest(&self) -> [u8; 32] {
        let descriptor = &self.buffer.descriptor;

        let mut hasher = Sha256::new();
        hasher.update(self.username.as_bytes());
        hasher.update(MessageType::FetchFile.as_str().as_bytes());

        for line in &self.buffer.lines {
            hasher.update(line.as_bytes());
        }

        let ids = format!(
            "{} {} {} {}",
            descriptor.com_id_or_unset(),
            self.source_id,
            self.buffer.id,
            descriptor.file_id_or_unset()
        );
        hasher.update(ids.as_bytes());

        hasher.finalize().into()
    }

    pub fn sign(&mut self, key: &KeyPair) {
        self.signature = Some(key.sign(&self.digest()));
    }

    pub fn verify(&self, key: &PublicKey) -> Result<(), IdentityError> {
        let signature = self
            .signature
            .as_deref()
            .ok_or(IdentityError::MissingSignature)?;
        key.verify(&self.digest(), signature)
    }
}
