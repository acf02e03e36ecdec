// platform/registry.rs - Central Registry (Trust Anchor)
//
//! Central Registry
//!
//! The registry is the root of trust for all communicators. It provides:
//! - Its own (unsigned) certificate, whose key is the trust anchor
//! - Certificate signing with communicator id allocation
//! - Service provider directory (communicator id -> name/address)
//! - Public file directory (file id -> descriptor)
//!
//! Id counters and directories live behind one mutex so each SIGN and
//! PUBLISH is a single atomic read-increment-insert.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::directory::{
    CommunicatorId, FileDescriptor, FileId, ServiceProviderDescriptor,
};
use crate::network::{self, NetworkConfig, RequestHandler, ServerError, ServerHandle};
use crate::observability::{record_certificate_signed, record_files_published};
use crate::protocol::{Content, Message, MessageType};
use crate::settings::RegistryConfig;
use crate::trust::{Certificate, KeyPair};

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Registry is already running")]
    AlreadyStarted,

    #[error("Registry is not running")]
    NotStarted,

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Counters and directories, mutated only under the registry lock
#[derive(Debug)]
struct Directories {
    next_com_id: CommunicatorId,
    service_providers: BTreeMap<CommunicatorId, ServiceProviderDescriptor>,
    next_file_id: FileId,
    public_files: BTreeMap<FileId, FileDescriptor>,
}

impl Directories {
    fn new() -> Self {
        Self {
            next_com_id: 1,
            service_providers: BTreeMap::new(),
            next_file_id: 1,
            public_files: BTreeMap::new(),
        }
    }
}

/// Registry state and request handling, independent of any socket
pub struct RegistryService {
    name: String,
    keys: KeyPair,
    certificate: Certificate,
    directories: Mutex<Directories>,
}

impl RegistryService {
    /// Create a registry reachable at `address` with a fresh key pair
    pub fn new(name: impl Into<String>, address: SocketAddr) -> Self {
        let name = name.into();
        let keys = KeyPair::generate();
        let certificate = Certificate::new(name.clone(), address, keys.public_key());

        info!(
            registry = %name,
            address = %address,
            fingerprint = %keys.public_key().fingerprint().short(),
            "Initialized central registry"
        );

        Self {
            name,
            keys,
            certificate,
            directories: Mutex::new(Directories::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The registry's own certificate (unsigned)
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Assign the next communicator id, sign, and record the provider
    pub fn sign_certificate(&self, mut certificate: Certificate) -> Certificate {
        let mut directories = self.directories.lock();

        let com_id = directories.next_com_id;
        directories.next_com_id += 1;

        certificate.com_id = com_id;
        certificate.sign(&self.keys);

        directories.service_providers.insert(
            com_id,
            ServiceProviderDescriptor::new(com_id, certificate.name.clone(), certificate.address),
        );
        drop(directories);

        record_certificate_signed();
        certificate
    }

    /// Assign consecutive file ids and add the files to the public directory
    pub fn publish(&self, mut files: Vec<FileDescriptor>) -> Vec<FileDescriptor> {
        let mut directories = self.directories.lock();

        for descriptor in files.iter_mut() {
            let file_id = directories.next_file_id;
            directories.next_file_id += 1;

            descriptor.file_id = Some(file_id);
            directories.public_files.insert(file_id, descriptor.clone());
        }
        drop(directories);

        record_files_published(files.len());
        files
    }

    /// Snapshot of the communicator directory
    pub fn service_providers(&self) -> BTreeMap<CommunicatorId, ServiceProviderDescriptor> {
        self.directories.lock().service_providers.clone()
    }

    /// Snapshot of the public file directory
    pub fn public_files(&self) -> BTreeMap<FileId, FileDescriptor> {
        self.directories.lock().public_files.clone()
    }

    /// Answer one request
    pub fn dispatch(&self, peer: SocketAddr, message: Message) -> Message {
        if let Err(e) = message.validate_request() {
            warn!(peer = %peer, error = %e, "Refusing malformed request");
            return message.refuse();
        }

        match message.kind {
            MessageType::Certificate => {
                info!(peer = %peer, "Sending certificate");
                message.reply(Content::Certificate(self.certificate.clone()))
            }
            MessageType::Sign => {
                let Content::Certificate(certificate) = message.content.clone() else {
                    return message.refuse();
                };

                info!(peer = %peer, name = %certificate.name, "Signing certificate");
                let signed = self.sign_certificate(certificate);
                info!(peer = %peer, com_id = signed.com_id, name = %signed.name, "Assigned com_id");

                message.reply(Content::Certificate(signed))
            }
            MessageType::Publish => {
                let Content::Descriptors(files) = message.content.clone() else {
                    return message.refuse();
                };

                let owner = files.first().map(FileDescriptor::com_id_or_unset);
                info!(peer = %peer, count = files.len(), com_id = ?owner, "Publishing files");

                message.reply(Content::Descriptors(self.publish(files)))
            }
            MessageType::FetchSp => {
                info!(peer = %peer, "Sending service provider data");
                message.reply(Content::ServiceProviders(self.service_providers()))
            }
            MessageType::FetchFile => {
                if !message.content.is_empty() {
                    warn!(peer = %peer, "Registry does not serve file content");
                    return message.refuse();
                }

                info!(peer = %peer, "Sending files data");
                message.reply(Content::FileDirectory(self.public_files()))
            }
            MessageType::Unknown => message.refuse(),
        }
    }
}

#[async_trait]
impl RequestHandler for RegistryService {
    async fn handle(&self, peer: SocketAddr, message: Message) -> Message {
        self.dispatch(peer, message)
    }
}

/// A registry bound to a listening socket
pub struct Registry {
    service: Arc<RegistryService>,
    network: NetworkConfig,
    listener: Option<TcpListener>,
    server: Option<ServerHandle>,
}

impl Registry {
    /// Bind the listen address and create the registry identity
    pub async fn bind(config: RegistryConfig) -> Result<Self, RegistryError> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| RegistryError::Bind {
                addr: config.listen,
                source,
            })?;
        let address = listener.local_addr().map_err(|source| RegistryError::Bind {
            addr: config.listen,
            source,
        })?;

        Ok(Self {
            service: Arc::new(RegistryService::new(config.name, address)),
            network: config.network,
            listener: Some(listener),
            server: None,
        })
    }

    pub fn service(&self) -> &Arc<RegistryService> {
        &self.service
    }

    pub fn certificate(&self) -> &Certificate {
        self.service.certificate()
    }

    /// Address peers reach the registry on
    pub fn local_addr(&self) -> SocketAddr {
        self.service.certificate().address
    }

    /// Start serving on a background task
    pub fn start(&mut self) -> Result<(), RegistryError> {
        let listener = self.listener.take().ok_or(RegistryError::AlreadyStarted)?;
        let handle = network::spawn(
            self.service.name().to_string(),
            listener,
            self.service.clone(),
            self.network.clone(),
        )?;
        self.server = Some(handle);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.server.is_some()
    }

    /// Stop accepting, let in-flight requests finish, then return
    pub async fn shutdown(&mut self) -> Result<(), RegistryError> {
        let server = self.server.take().ok_or(RegistryError::NotStarted)?;
        server.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::call;
    use std::collections::HashSet;

    fn peer() -> SocketAddr {
        "127.0.0.1:9999".parse().unwrap()
    }

    fn service() -> RegistryService {
        RegistryService::new("cr", "127.0.0.1:5000".parse().unwrap())
    }

    fn candidate(name: &str) -> Certificate {
        let keys = KeyPair::generate();
        Certificate::new(name, "127.0.0.1:7000".parse().unwrap(), keys.public_key())
    }

    fn descriptors(author: &str, count: usize) -> Vec<FileDescriptor> {
        (0..count)
            .map(|i| FileDescriptor::new(format!("{author}-{i}.txt"), author, "d"))
            .collect()
    }

    #[test]
    fn test_sign_assigns_increasing_ids() {
        let registry = service();
        let anchor = *registry.keys.public_key();

        let alice = registry.sign_certificate(candidate("alice"));
        let bob = registry.sign_certificate(candidate("bob"));

        assert_eq!(alice.com_id, 1);
        assert_eq!(bob.com_id, 2);
        assert!(alice.verify(&anchor).is_ok());
        assert!(bob.verify(&anchor).is_ok());

        let providers = registry.service_providers();
        assert_eq!(providers[&1].name, "alice");
        assert_eq!(providers[&2].name, "bob");
    }

    #[test]
    fn test_concurrent_sign_never_repeats_an_id() {
        let registry = Arc::new(service());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .map(|i| registry.sign_certificate(candidate(&format!("n{t}-{i}"))).com_id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            let issued = handle.join().unwrap();
            assert!(issued.windows(2).all(|w| w[0] < w[1]));
            for id in issued {
                assert!(ids.insert(id), "id {id} issued twice");
            }
        }

        assert_eq!(ids.len(), 200);
        assert_eq!(registry.service_providers().len(), 200);
    }

    #[test]
    fn test_publish_assigns_global_ranges() {
        let registry = service();

        let alice = registry.publish(descriptors("alice", 3));
        let bob = registry.publish(descriptors("bob", 2));

        let alice_ids: Vec<_> = alice.iter().map(|d| d.file_id.unwrap()).collect();
        let bob_ids: Vec<_> = bob.iter().map(|d| d.file_id.unwrap()).collect();
        assert_eq!(alice_ids, vec![1, 2, 3]);
        assert_eq!(bob_ids, vec![4, 5]);
        assert_eq!(registry.public_files().len(), 5);
    }

    #[test]
    fn test_concurrent_publish_ranges_do_not_overlap() {
        let registry = Arc::new(service());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.publish(descriptors(&format!("u{t}"), 10)))
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            let published = handle.join().unwrap();
            let range: Vec<_> = published.iter().map(|d| d.file_id.unwrap()).collect();
            assert!(range.windows(2).all(|w| w[1] == w[0] + 1));
            for id in range {
                assert!(ids.insert(id));
            }
        }
        assert_eq!(ids.len(), 80);
    }

    #[test]
    fn test_dispatch_certificate_and_directories() {
        let registry = service();

        let reply = registry.dispatch(peer(), Message::request(MessageType::Certificate, Content::Empty));
        assert!(!reply.is_request);
        assert_eq!(reply.content, Content::Certificate(registry.certificate().clone()));

        let reply = registry.dispatch(peer(), Message::request(MessageType::FetchSp, Content::Empty));
        assert_eq!(reply.content, Content::ServiceProviders(BTreeMap::new()));

        let reply = registry.dispatch(peer(), Message::request(MessageType::FetchFile, Content::Empty));
        assert_eq!(reply.content, Content::FileDirectory(BTreeMap::new()));
    }

    #[test]
    fn test_dispatch_refuses_malformed() {
        let registry = service();

        let reply = registry.dispatch(peer(), Message::request(MessageType::Sign, Content::Empty));
        assert!(reply.is_request);
        assert!(registry.service_providers().is_empty());

        let reply = registry.dispatch(peer(), Message::request(MessageType::Unknown, Content::Empty));
        assert!(reply.is_request);

        let reply = registry.dispatch(
            peer(),
            Message::request(MessageType::Publish, Content::Certificate(candidate("x"))),
        );
        assert!(reply.is_request);
        assert!(registry.public_files().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_type_tag_gets_refusal_over_tcp() {
        use crate::network::codec::{read_frame, DEFAULT_MAX_FRAME_BYTES};
        use tokio::io::AsyncWriteExt;
        use tokio::net::TcpStream;

        let mut registry = Registry::bind(RegistryConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            ..RegistryConfig::default()
        })
        .await
        .unwrap();
        registry.start().unwrap();

        // version 1, type tag 5, empty content, is_request
        let payload = [1u8, 5, 0, 1];
        let mut stream = TcpStream::connect(registry.local_addr()).await.unwrap();
        stream.write_u32(payload.len() as u32).await.unwrap();
        stream.write_all(&payload).await.unwrap();

        let reply = read_frame(&mut stream, DEFAULT_MAX_FRAME_BYTES).await.unwrap();
        assert_eq!(reply.kind, MessageType::Unknown);
        assert!(reply.is_refusal());
        assert!(registry.service().service_providers().is_empty());

        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_registry_over_tcp() {
        let mut registry = Registry::bind(RegistryConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            ..RegistryConfig::default()
        })
        .await
        .unwrap();
        registry.start().unwrap();
        assert!(matches!(registry.start(), Err(RegistryError::AlreadyStarted)));

        let addr = registry.local_addr();
        let config = NetworkConfig::default();

        let reply = call(addr, &Message::request(MessageType::Certificate, Content::Empty), &config)
            .await
            .unwrap();
        let Content::Certificate(anchor_cert) = reply.content else {
            panic!("expected certificate");
        };
        let anchor = anchor_cert.public_key().unwrap();

        let reply = call(
            addr,
            &Message::request(MessageType::Sign, Content::Certificate(candidate("alice"))),
            &config,
        )
        .await
        .unwrap();
        let Content::Certificate(signed) = reply.content else {
            panic!("expected certificate");
        };
        assert_eq!(signed.com_id, 1);
        assert!(signed.verify(&anchor).is_ok());

        registry.shutdown().await.unwrap();
        assert!(!registry.is_running());
        assert!(matches!(registry.shutdown().await, Err(RegistryError::NotStarted)));
    }
}
