// directory/buffer.rs - File Buffers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{BufferId, FileDescriptor};

/// In-memory staging area for a file's content.
///
/// Lines keep their line terminators so that writing them back out
/// reproduces the original file byte for byte.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBuffer {
    /// Node-local buffer id
    pub id: BufferId,

    /// Descriptor of the file this buffer holds
    pub descriptor: FileDescriptor,

    /// Loaded lines, empty until loaded
    pub lines: Vec<String>,
}

impl FileBuffer {
    pub fn is_loaded(&self) -> bool {
        !self.lines.is_empty()
    }

    /// Concatenated content
    pub fn content(&self) -> String {
        self.lines.concat()
    }
}

impl fmt::Display for FileBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Buffer {}, {}:\n\t{}",
            self.id,
            self.descriptor.name,
            self.lines.join("\t")
        )
    }
}

/// Monotonic buffer id allocator owned by a node
#[derive(Debug)]
pub struct BufferIds {
    next: AtomicU64,
}

impl BufferIds {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn allocate(&self) -> BufferId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Create an empty buffer for `descriptor` with a fresh id
    pub fn buffer(&self, descriptor: FileDescriptor) -> FileBuffer {
        FileBuffer {
            id: self.allocate(),
            descriptor,
            lines: Vec::new(),
        }
    }
}

impl Default for BufferIds {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_ids_are_monotonic() {
        let ids = BufferIds::new();
        let a = ids.allocate();
        let b = ids.allocate();
        assert_eq!(a, 1);
        assert!(b > a);
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let ids = Arc::new(BufferIds::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..100).map(|_| ids.allocate()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 800);
    }

    #[test]
    fn test_buffer_starts_empty() {
        let ids = BufferIds::new();
        let buffer = ids.buffer(FileDescriptor::new("a.txt", "alice", "a"));

        assert!(!buffer.is_loaded());
        assert_eq!(buffer.content(), "");
    }

    #[test]
    fn test_buffer_display() {
        let buffer = FileBuffer {
            id: 4,
            descriptor: FileDescriptor::new("a.txt", "alice", "a"),
            lines: vec!["one\n".into(), "two\n".into()],
        };

        assert_eq!(buffer.to_string(), "Buffer 4, a.txt:\n\tone\n\ttwo\n");
        assert_eq!(buffer.content(), "one\ntwo\n");
    }
}
