// protocol/mod.rs - Registry/Communicator Protocol

//! Typed request/reply envelopes.
//!
//! Every call is a single [`Message`] answered by a single [`Message`]. The
//! same envelope is used in both directions: `is_request == false` on a reply
//! signals acceptance, `is_request == true` signals refusal.
//!
//! | Type | Request content | Reply content |
//! |------|-----------------|---------------|
//! | `CERTIFICATE` | empty, or the caller's certificate (peer exchange) | responder certificate, or empty when refused |
//! | `SIGN` | unsigned certificate | certificate with id and signature |
//! | `PUBLISH` | descriptors | descriptors with file ids |
//! | `FETCH_SP` | empty | communicator directory |
//! | `FETCH_FILE` | empty (registry) or [`FileRequest`] (peer) | file directory or populated request |

mod message;
mod request;

pub use message::{Content, Message, MessageType, ProtocolError};
pub use request::FileRequest;
