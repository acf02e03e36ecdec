// protocol/message.rs - Request/Reply Envelopes

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::request::FileRequest;
use crate::directory::{CommunicatorId, FileDescriptor, FileId, ServiceProviderDescriptor};
use crate::trust::Certificate;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("{kind} request cannot carry {content} content")]
    UnexpectedContent {
        kind: MessageType,
        content: &'static str,
    },

    #[error("{kind} request was refused by the peer")]
    Refused { kind: MessageType },

    #[error("Unknown message type")]
    UnknownType,
}

/// Message types understood by registries and communicators
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[display("CERTIFICATE")]
    Certificate,

    #[display("SIGN")]
    Sign,

    #[display("PUBLISH")]
    Publish,

    #[display("FETCH_SP")]
    FetchSp,

    #[display("FETCH_FILE")]
    FetchFile,

    /// Any type tag this build does not know; always refused
    #[display("UNKNOWN")]
    #[serde(other)]
    Unknown,
}

impl MessageType {
    pub const ALL: [MessageType; 5] = [
        MessageType::Certificate,
        MessageType::Sign,
        MessageType::Publish,
        MessageType::FetchSp,
        MessageType::FetchFile,
    ];

    /// Wire tag, also used as a metrics label
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Certificate => "CERTIFICATE",
            MessageType::Sign => "SIGN",
            MessageType::Publish => "PUBLISH",
            MessageType::FetchSp => "FETCH_SP",
            MessageType::FetchFile => "FETCH_FILE",
            MessageType::Unknown => "UNKNOWN",
        }
    }
}

/// Type-specific message payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Content {
    Empty,
    Certificate(Certificate),
    Descriptors(Vec<FileDescriptor>),
    ServiceProviders(BTreeMap<CommunicatorId, ServiceProviderDescriptor>),
    FileDirectory(BTreeMap<FileId, FileDescriptor>),
    FileRequest(FileRequest),
}

impl Content {
    pub fn name(&self) -> &'static str {
        match self {
            Content::Empty => "empty",
            Content::Certificate(_) => "certificate",
            Content::Descriptors(_) => "descriptors",
            Content::ServiceProviders(_) => "service-providers",
            Content::FileDirectory(_) => "file-directory",
            Content::FileRequest(_) => "file-request",
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Content::Empty)
    }
}

/// Envelope for both calls and replies.
///
/// On a reply, `is_request == false` means accepted and `is_request == true`
/// means refused. It is the only error channel on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageType,
    pub content: Content,
    pub is_request: bool,
}

impl Message {
    pub fn request(kind: MessageType, content: Content) -> Self {
        Self {
            kind,
            content,
            is_request: true,
        }
    }

    /// Turn a received request into an accepted reply carrying `content`
    pub fn reply(mut self, content: Content) -> Self {
        self.content = content;
        self.is_request = false;
        self
    }

    /// Turn a received request into a refusal, leaving its content unchanged
    pub fn refuse(mut self) -> Self {
        self.is_request = true;
        self
    }

    pub fn is_refusal(&self) -> bool {
        self.is_request
    }

    /// Check that a request carries content allowed for its type
    pub fn validate_request(&self) -> Result<(), ProtocolError> {
        if self.kind == MessageType::Unknown {
            return Err(ProtocolError::UnknownType);
        }

        let allowed = match (self.kind, &self.content) {
            (MessageType::Certificate, Content::Empty | Content::Certificate(_)) => true,
            (MessageType::Sign, Content::Certificate(_)) => true,
            (MessageType::Publish, Content::Descriptors(_)) => true,
            (MessageType::FetchSp, Content::Empty) => true,
            (MessageType::FetchFile, Content::Empty | Content::FileRequest(_)) => true,
            _ => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedContent {
                kind: self.kind,
                content: self.content.name(),
            })
        }
    }

    /// Accepted reply content, or `Refused` when the peer answered with a NACK
    pub fn into_accepted(self) -> Result<Content, ProtocolError> {
        if self.is_request {
            Err(ProtocolError::Refused { kind: self.kind })
        } else {
            Ok(self.content)
        }
    }
}
