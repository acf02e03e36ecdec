// directory/mod.rs - Directory Entries and File Buffers

//! Data carried by the registry directories and by file transfers.
//!
//! - [`ServiceProviderDescriptor`]: communicator id -> name and address
//! - [`FileDescriptor`]: a published file, identified by a registry-assigned
//!   file id and the id of the communicator that owns it
//! - [`FileBuffer`]: line-oriented staging area for a file during a fetch

mod buffer;
mod descriptor;

pub use buffer::{BufferIds, FileBuffer};
pub use descriptor::{FileDescriptor, ServiceProviderDescriptor};

/// Registry-assigned communicator identifier
pub type CommunicatorId = u64;

/// Registry-assigned file identifier
pub type FileId = u64;

/// Node-local buffer identifier
pub type BufferId = u64;

/// Communicator id carried by certificates the registry has not signed yet
pub const UNASSIGNED: CommunicatorId = 0;
