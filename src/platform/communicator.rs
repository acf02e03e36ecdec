// platform/communicator.rs - Peer Middleware
//
//! Communicator
//!
//! Each service-provider node runs one communicator. Construction performs
//! the identity bootstrap against the registry; afterwards the node serves
//! peers and issues calls concurrently:
//! - publish files and fetch the registry directories
//! - establish peer trust by certificate exchange
//! - request files from peers with signed FETCH_FILE requests
//! - answer peers' certificate exchanges and file requests
//!
//! Locks guarding the trust cache and directory snapshot are never held
//! across a network call, so the server and client roles cannot block each
//! other.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::directory::{
    BufferIds, CommunicatorId, FileBuffer, FileDescriptor, FileId, ServiceProviderDescriptor,
};
use crate::network::{
    self, call, NetworkConfig, RequestHandler, ServerError, ServerHandle, TransportError,
};
use crate::observability::{record_exchange, record_fetch};
use crate::protocol::{Content, FileRequest, Message, MessageType, ProtocolError};
use crate::settings::CommunicatorConfig;
use crate::storage::BufferLoader;
use crate::trust::{Certificate, IdentityError, KeyPair, PublicKey, TrustStore};

/// Communicator errors
#[derive(Debug, Error)]
pub enum CommunicatorError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Bootstrap failed: {0}")]
    Bootstrap(#[source] Box<CommunicatorError>),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Unexpected {content} reply to {kind}")]
    UnexpectedReply {
        kind: MessageType,
        content: &'static str,
    },

    #[error("Signed certificate does not carry this node's key")]
    KeyMismatch,

    #[error("Communicator is already running")]
    AlreadyStarted,

    #[error("Communicator is not running")]
    NotStarted,

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

impl CommunicatorError {
    fn unexpected(kind: MessageType, content: &Content) -> Self {
        CommunicatorError::UnexpectedReply {
            kind,
            content: content.name(),
        }
    }
}

/// Identity, caches and collaborators shared by the server and client roles
struct NodeState {
    name: String,
    keys: KeyPair,
    certificate: Certificate,
    registry: SocketAddr,
    registry_certificate: Certificate,
    trust: TrustStore,
    providers: RwLock<BTreeMap<CommunicatorId, ServiceProviderDescriptor>>,
    buffers: BufferIds,
    loader: Arc<dyn BufferLoader>,
    network: NetworkConfig,
    strict_reply_verification: bool,
}

impl NodeState {
    fn com_id(&self) -> CommunicatorId {
        self.certificate.com_id
    }

    /// Call the registry and unwrap an accepted reply
    async fn ask_registry(&self, kind: MessageType, content: Content) -> Result<Content, CommunicatorError> {
        let reply = call(self.registry, &Message::request(kind, content), &self.network).await?;
        Ok(reply.into_accepted()?)
    }

    fn register_certificate(&self, certificate: Certificate) -> bool {
        let name = certificate.name.clone();
        match self.trust.admit(certificate) {
            Ok(com_id) => {
                info!(node = %self.name, com_id, peer = %name, "Trusted peer certificate");
                true
            }
            Err(e) => {
                warn!(node = %self.name, peer = %name, error = %e, "Rejected peer certificate");
                false
            }
        }
    }

    async fn exchange_certificates(&self, address: SocketAddr) -> bool {
        let request = Message::request(
            MessageType::Certificate,
            Content::Certificate(self.certificate.clone()),
        );

        let reply = match call(address, &request, &self.network).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(node = %self.name, peer = %address, error = %e, "Certificate exchange failed");
                record_exchange("initiator", false);
                return false;
            }
        };

        let trusted = match reply.into_accepted() {
            Ok(Content::Certificate(certificate)) => self.register_certificate(certificate),
            Ok(_) | Err(_) => {
                warn!(node = %self.name, peer = %address, "Peer did not accept our certificate");
                false
            }
        };

        record_exchange("initiator", trusted);
        trusted
    }

    async fn fetch_file(&self, buffer: FileBuffer, username: &str) -> Option<FileBuffer> {
        let descriptor = &buffer.descriptor;
        let Some(owner) = descriptor.com_id else {
            warn!(node = %self.name, file = %descriptor.name, "File has no owning communicator");
            record_fetch("unknown_provider");
            return None;
        };

        let address = self.providers.read().get(&owner).map(|provider| provider.address);
        let Some(address) = address else {
            warn!(node = %self.name, com_id = owner, "Owner is not in the provider directory");
            record_fetch("unknown_provider");
            return None;
        };

        if !self.trust.contains(owner) {
            debug!(node = %self.name, com_id = owner, "Owner not trusted yet, exchanging certificates");
            if !self.exchange_certificates(address).await || !self.trust.contains(owner) {
                record_fetch("untrusted");
                return None;
            }
        }

        let file_id = descriptor.file_id_or_unset();
        let mut request = FileRequest::new(buffer, self.com_id(), username);
        request.sign(&self.keys);

        let message = Message::request(MessageType::FetchFile, Content::FileRequest(request));
        let reply = match call(address, &message, &self.network).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(node = %self.name, com_id = owner, error = %e, "File request failed");
                record_fetch("unreachable");
                return None;
            }
        };

        let served = match reply.into_accepted() {
            Ok(Content::FileRequest(served)) => served,
            Ok(other) => {
                warn!(node = %self.name, com_id = owner, content = other.name(), "Unexpected file reply");
                record_fetch("refused");
                return None;
            }
            Err(e) => {
                warn!(node = %self.name, com_id = owner, file_id, error = %e, "File request refused");
                record_fetch("refused");
                return None;
            }
        };

        let verified = self
            .trust
            .key(owner)
            .ok_or(IdentityError::Unassigned)
            .and_then(|key| served.verify(&key));

        if let Err(e) = verified {
            warn!(node = %self.name, com_id = owner, file_id, error = %e, "File reply signature did not verify");
            if self.strict_reply_verification {
                record_fetch("unverified");
                return None;
            }
        }

        info!(node = %self.name, com_id = owner, file_id, lines = served.buffer.lines.len(), "Fetched file");
        record_fetch("delivered");
        Some(served.buffer)
    }

    /// Responder side of FETCH_FILE
    async fn serve_file(&self, peer: SocketAddr, message: Message) -> Message {
        let Content::FileRequest(request) = message.content.clone() else {
            warn!(node = %self.name, peer = %peer, "FETCH_FILE without a file request");
            return message.refuse();
        };

        let Some(requester) = self.trust.key(request.source_id) else {
            warn!(
                node = %self.name,
                peer = %peer,
                com_id = request.source_id,
                "File request from a communicator with no cached certificate"
            );
            return message.refuse();
        };

        if let Err(e) = request.verify(&requester) {
            warn!(node = %self.name, peer = %peer, com_id = request.source_id, error = %e, "File request signature did not verify");
            return message.refuse();
        }

        if request.buffer.descriptor.com_id != Some(self.com_id()) {
            warn!(node = %self.name, peer = %peer, file = %request.buffer.descriptor.name, "File is not owned by this node");
            return message.refuse();
        }

        let loader = self.loader.clone();
        let mut buffer = request.buffer.clone();
        let loaded = tokio::task::spawn_blocking(move || loader.load(&mut buffer).map(|_| buffer)).await;

        let buffer = match loaded {
            Ok(Ok(buffer)) => buffer,
            Ok(Err(e)) => {
                warn!(node = %self.name, peer = %peer, error = %e, "Failed to load requested file");
                return message.refuse();
            }
            Err(e) => {
                warn!(node = %self.name, peer = %peer, error = %e, "File loader panicked");
                return message.refuse();
            }
        };

        info!(
            node = %self.name,
            peer = %peer,
            com_id = request.source_id,
            user = %request.username,
            file = %buffer.descriptor.name,
            "Serving file"
        );

        let mut served = FileRequest::new(buffer, request.source_id, request.username);
        served.sign(&self.keys);
        message.reply(Content::FileRequest(served))
    }
}

#[async_trait]
impl RequestHandler for NodeState {
    async fn handle(&self, peer: SocketAddr, message: Message) -> Message {
        if let Err(e) = message.validate_request() {
            warn!(node = %self.name, peer = %peer, error = %e, "Refusing malformed request");
            return message.refuse();
        }

        match message.kind {
            MessageType::Certificate => match message.content.clone() {
                Content::Certificate(certificate) => {
                    let trusted = self.register_certificate(certificate);
                    record_exchange("responder", trusted);
                    if trusted {
                        message.reply(Content::Certificate(self.certificate.clone()))
                    } else {
                        message.reply(Content::Empty)
                    }
                }
                _ => message.reply(Content::Certificate(self.certificate.clone())),
            },
            MessageType::FetchFile => self.serve_file(peer, message).await,
            MessageType::Sign | MessageType::Publish | MessageType::FetchSp | MessageType::Unknown => {
                debug!(node = %self.name, peer = %peer, kind = %message.kind, "Registry request sent to a communicator");
                message.refuse()
            }
        }
    }
}

/// A bootstrapped node: registry-signed identity plus peer caches
pub struct Communicator {
    state: Arc<NodeState>,
    listener: Option<TcpListener>,
    server: Option<ServerHandle>,
}

impl Communicator {
    /// Bind, then obtain a registry-signed identity.
    ///
    /// Fails with [`CommunicatorError::Bootstrap`] if the registry cannot be
    /// reached, refuses to sign, or returns a certificate that does not
    /// verify against its own key.
    pub async fn bootstrap(
        config: CommunicatorConfig,
        loader: Arc<dyn BufferLoader>,
    ) -> Result<Self, CommunicatorError> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| CommunicatorError::Bind {
                addr: config.listen,
                source,
            })?;
        let bound = listener.local_addr().map_err(|source| CommunicatorError::Bind {
            addr: config.listen,
            source,
        })?;
        let address = config.advertise.unwrap_or(bound);

        let keys = KeyPair::generate();
        let unsigned = Certificate::new(config.name.clone(), address, keys.public_key());

        let (registry_certificate, anchor, certificate) =
            Self::obtain_identity(&config, &keys, unsigned)
                .await
                .map_err(|e| CommunicatorError::Bootstrap(Box::new(e)))?;

        info!(
            node = %config.name,
            com_id = certificate.com_id,
            address = %address,
            registry = %config.registry,
            fingerprint = %keys.public_key().fingerprint().short(),
            "Obtained registry-signed certificate"
        );

        let state = NodeState {
            name: config.name,
            keys,
            certificate,
            registry: config.registry,
            registry_certificate,
            trust: TrustStore::new(anchor),
            providers: RwLock::new(BTreeMap::new()),
            buffers: BufferIds::new(),
            loader,
            network: config.network,
            strict_reply_verification: config.strict_reply_verification,
        };

        Ok(Self {
            state: Arc::new(state),
            listener: Some(listener),
            server: None,
        })
    }

    async fn obtain_identity(
        config: &CommunicatorConfig,
        keys: &KeyPair,
        unsigned: Certificate,
    ) -> Result<(Certificate, PublicKey, Certificate), CommunicatorError> {
        let network = &config.network;

        let reply = call(
            config.registry,
            &Message::request(MessageType::Certificate, Content::Empty),
            network,
        )
        .await?;
        let registry_certificate = match reply.into_accepted()? {
            Content::Certificate(certificate) => certificate,
            other => return Err(CommunicatorError::unexpected(MessageType::Certificate, &other)),
        };
        let anchor = registry_certificate.public_key()?;

        let reply = call(
            config.registry,
            &Message::request(MessageType::Sign, Content::Certificate(unsigned)),
            network,
        )
        .await?;
        let signed = match reply.into_accepted()? {
            Content::Certificate(certificate) => certificate,
            other => return Err(CommunicatorError::unexpected(MessageType::Sign, &other)),
        };

        signed.verify(&anchor)?;
        if signed.public_key()? != *keys.public_key() {
            return Err(CommunicatorError::KeyMismatch);
        }
        if !signed.is_assigned() {
            return Err(IdentityError::Unassigned.into());
        }

        Ok((registry_certificate, anchor, signed))
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn com_id(&self) -> CommunicatorId {
        self.state.com_id()
    }

    /// Address advertised in this node's certificate
    pub fn address(&self) -> SocketAddr {
        self.state.certificate.address
    }

    pub fn certificate(&self) -> &Certificate {
        &self.state.certificate
    }

    pub fn registry_certificate(&self) -> &Certificate {
        &self.state.registry_certificate
    }

    pub fn trusts(&self, com_id: CommunicatorId) -> bool {
        self.state.trust.contains(com_id)
    }

    pub fn trusted_peer(&self, com_id: CommunicatorId) -> Option<Certificate> {
        self.state.trust.certificate(com_id)
    }

    pub fn trusted_peers(&self) -> Vec<CommunicatorId> {
        self.state.trust.ids()
    }

    /// Cached provider entry from the last `fetch_remote`
    pub fn provider(&self, com_id: CommunicatorId) -> Option<ServiceProviderDescriptor> {
        self.state.providers.read().get(&com_id).cloned()
    }

    /// Empty buffer with a fresh node-local id
    pub fn new_buffer(&self, descriptor: FileDescriptor) -> FileBuffer {
        self.state.buffers.buffer(descriptor)
    }

    /// Stamp this node's id on `files` and publish them to the registry
    pub async fn publish(&self, mut files: Vec<FileDescriptor>) -> Result<Vec<FileDescriptor>, CommunicatorError> {
        for descriptor in files.iter_mut() {
            descriptor.com_id = Some(self.com_id());
        }

        match self.state.ask_registry(MessageType::Publish, Content::Descriptors(files)).await? {
            Content::Descriptors(published) => {
                info!(node = %self.name(), com_id = self.com_id(), count = published.len(), "Published files");
                Ok(published)
            }
            other => Err(CommunicatorError::unexpected(MessageType::Publish, &other)),
        }
    }

    /// Refresh the provider cache and return every other node's files
    pub async fn fetch_remote(&self) -> Result<BTreeMap<FileId, FileDescriptor>, CommunicatorError> {
        let providers = match self.state.ask_registry(MessageType::FetchSp, Content::Empty).await? {
            Content::ServiceProviders(providers) => providers,
            other => return Err(CommunicatorError::unexpected(MessageType::FetchSp, &other)),
        };
        *self.state.providers.write() = providers;

        let files = match self.state.ask_registry(MessageType::FetchFile, Content::Empty).await? {
            Content::FileDirectory(files) => files,
            other => return Err(CommunicatorError::unexpected(MessageType::FetchFile, &other)),
        };

        let own = Some(self.com_id());
        Ok(files
            .into_iter()
            .filter(|(_, descriptor)| descriptor.com_id != own)
            .collect())
    }

    /// Trust `certificate` only if the registry signed it
    pub fn register_certificate(&self, certificate: Certificate) -> bool {
        self.state.register_certificate(certificate)
    }

    /// Offer our certificate to the node at `address` and trust its answer
    pub async fn exchange_certificates(&self, address: SocketAddr) -> bool {
        self.state.exchange_certificates(address).await
    }

    /// Ask the file's owner for its content
    pub async fn fetch_file(&self, buffer: FileBuffer, username: &str) -> Option<FileBuffer> {
        self.state.fetch_file(buffer, username).await
    }

    /// Start answering peers on a background task
    pub fn start(&mut self) -> Result<(), CommunicatorError> {
        let listener = self.listener.take().ok_or(CommunicatorError::AlreadyStarted)?;
        let handle = network::spawn(
            self.state.name.clone(),
            listener,
            self.state.clone(),
            self.state.network.clone(),
        )?;
        self.server = Some(handle);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.server.is_some()
    }

    /// Stop accepting, let in-flight requests finish, then return
    pub async fn shutdown(&mut self) -> Result<(), CommunicatorError> {
        let server = self.server.take().ok_or(CommunicatorError::NotStarted)?;
        server.shutdown().await?;
        Ok(())
    }
}
