// platform/mod.rs - Registry and Communicator
//
//! Trust-anchored file sharing platform
//!
//! This module implements the two roles of the system:
//! - **Registry**: the trust anchor. Signs communicator certificates, allocates
//!   communicator and file ids, keeps the provider and file directories
//! - **Communicator**: per-node middleware. Bootstraps a registry-signed
//!   identity, exchanges certificates with peers, requests and serves files
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use trustshare::platform::{Communicator, Registry};
//! use trustshare::settings::{CommunicatorConfig, RegistryConfig};
//! use trustshare::storage::HomeDirectories;
//!
//! let mut registry = Registry::bind(RegistryConfig::default()).await?;
//! registry.start()?;
//!
//! let homes = Arc::new(HomeDirectories::new());
//! let mut node = Communicator::bootstrap(CommunicatorConfig::default(), homes).await?;
//! node.start()?;
//!
//! let remote = node.fetch_remote().await?;
//! ```

pub mod communicator;
pub mod registry;

pub use communicator::{Communicator, CommunicatorError};
pub use registry::{Registry, RegistryError, RegistryService};
