// directory/descriptor.rs - File and Service Provider Descriptors

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

use super::{CommunicatorId, FileId};

const DESCRIPTION_WIDTH: usize = 43;

/// Description of a shareable file.
///
/// `file_id` and `com_id` stay `None` until the registry publishes the file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// File name, relative to the author's home directory
    pub name: String,

    /// Username of the author
    pub author: String,

    /// Short description (first line of the file)
    pub description: String,

    /// Registry-assigned file id
    pub file_id: Option<FileId>,

    /// Id of the communicator owning the file
    pub com_id: Option<CommunicatorId>,
}

impl FileDescriptor {
    pub fn new(
        name: impl Into<String>,
        author: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            author: author.into(),
            description: description.into(),
            file_id: None,
            com_id: None,
        }
    }

    /// Column header matching the `Display` rows
    pub fn header() -> String {
        format!(
            "{:>5} {:>3} {:<15} {:<10} {:<width$}",
            "F_ID",
            "SP",
            "File",
            "Author",
            "Description",
            width = DESCRIPTION_WIDTH
        )
    }

    /// File id as rendered in hashes and listings (-1 when unassigned)
    pub fn file_id_or_unset(&self) -> i64 {
        self.file_id.map_or(-1, |id| id as i64)
    }

    /// Owner id as rendered in hashes and listings (-1 when unassigned)
    pub fn com_id_or_unset(&self) -> i64 {
        self.com_id.map_or(-1, |id| id as i64)
    }
}

impl fmt::Display for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = if self.description.chars().count() > DESCRIPTION_WIDTH {
            let head: String = self.description.chars().take(40).collect();
            format!("{head}...")
        } else {
            self.description.clone()
        };

        write!(
            f,
            "{:>5} {:>3} {:<15} {:<10} {:<width$}",
            self.file_id_or_unset(),
            self.com_id_or_unset(),
            self.name,
            self.author,
            description,
            width = DESCRIPTION_WIDTH
        )
    }
}

/// Directory entry for a communicator, held by the registry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProviderDescriptor {
    pub com_id: CommunicatorId,
    pub name: String,
    pub address: SocketAddr,
}

impl ServiceProviderDescriptor {
    pub fn new(com_id: CommunicatorId, name: impl Into<String>, address: SocketAddr) -> Self {
        Self {
            com_id,
            name: name.into(),
            address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_descriptor_unassigned() {
        let descriptor = FileDescriptor::new("notes.txt", "alice", "Meeting notes");
        assert_eq!(descriptor.file_id, None);
        assert_eq!(descriptor.com_id, None);
        assert_eq!(descriptor.file_id_or_unset(), -1);
        assert_eq!(descriptor.com_id_or_unset(), -1);
    }

    #[test]
    fn test_display_row() {
        let mut descriptor = FileDescriptor::new("notes.txt", "alice", "Meeting notes");
        descriptor.file_id = Some(12);
        descriptor.com_id = Some(3);

        let row = descriptor.to_string();
        assert!(row.starts_with("   12   3 notes.txt"));
        assert!(row.contains("alice"));
        assert_eq!(row.len(), FileDescriptor::header().len());
    }

    #[test]
    fn test_long_description_truncated() {
        let long = "x".repeat(60);
        let descriptor = FileDescriptor::new("big.txt", "bob", long);

        let row = descriptor.to_string();
        assert!(row.ends_with(&format!("{}...", "x".repeat(40))));
    }

    #[test]
    fn test_header_columns() {
        let header = FileDescriptor::header();
        assert!(header.starts_with(" F_ID  SP File"));
        assert!(header.contains("Description"));
    }
}
