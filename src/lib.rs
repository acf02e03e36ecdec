// lib.rs - Trust-Anchored Peer File Sharing
//
// A central registry acts as a small certificate authority for a set of
// mutually distrustful communicators that publish and exchange files.

//! Registry-anchored peer-to-peer file sharing.
//!
//! A [`Registry`] signs communicator certificates and brokers discovery.
//! Each node runs a [`Communicator`] that bootstraps a registry-signed
//! identity, trusts peers only through registry signatures, and exchanges
//! files with signed requests over one-shot TCP calls.

pub mod control;
pub mod directory;
pub mod network;
pub mod observability;
pub mod platform;
pub mod protocol;
pub mod settings;
pub mod storage;
pub mod trust;

// Re-export commonly used types
pub use directory::{
    BufferIds, CommunicatorId, FileBuffer, FileDescriptor, FileId, ServiceProviderDescriptor,
};

pub use platform::{Communicator, CommunicatorError, Registry, RegistryError, RegistryService};

pub use protocol::{Content, FileRequest, Message, MessageType, ProtocolError};

pub use trust::{Certificate, Fingerprint, IdentityError, KeyPair, PublicKey, TrustStore};

pub use observability::{
    init_metrics, init_tracing, MetricsConfig, MetricsHandle, TracingConfig, TracingFormat,
};

pub use settings::{CommunicatorConfig, RegistryConfig, Settings, SettingsError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::directory::{FileBuffer, FileDescriptor, ServiceProviderDescriptor};
    pub use crate::platform::{Communicator, Registry};
    pub use crate::protocol::{Content, FileRequest, Message, MessageType};
    pub use crate::settings::{CommunicatorConfig, RegistryConfig, Settings};
    pub use crate::storage::{BufferLoader, HomeDirectories, LocalIndex};
    pub use crate::trust::{Certificate, KeyPair, PublicKey, TrustStore};
}
