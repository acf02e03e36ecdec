// network/mod.rs - Network Layer

//! One TCP connection per call: connect, send one frame, read one frame,
//! close. No multiplexing and no persistent sessions.
//!
//! This module provides:
//! - `codec` - versioned, length-prefixed bincode frames
//! - `call` - one-shot client with connect and exchange timeouts
//! - `server` - accept loop on its own task, shut down through a channel,
//!   in-flight connections drained before completion

pub mod codec;
mod server;
mod transport;

pub use codec::{CodecError, DEFAULT_MAX_FRAME_BYTES, WIRE_VERSION};
pub use server::{spawn, RequestHandler, ServerError, ServerHandle};
pub use transport::{call, NetworkConfig, TransportError};
