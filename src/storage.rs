// storage.rs - Local File Storage

//! Local storage collaborator for a service provider.
//!
//! - [`load_descriptors`] builds descriptors for the files in a home directory
//! - [`HomeDirectories`] resolves an author's home and fills buffers from disk
//!   (the [`BufferLoader`] the communicator calls when serving FETCH_FILE)
//! - [`LocalIndex`] indexes published descriptors by file id and author
//! - [`save_buffer`] writes a fetched buffer back to disk

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::directory::{FileBuffer, FileDescriptor, FileId};

/// Files that are never published
const IGNORED_FILES: &[&str] = &[".DS_Store"];

/// Local storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown author: {0}")]
    UnknownAuthor(String),

    #[error("Refusing file name {0:?}")]
    InvalidFileName(String),
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Fills `buffer.lines` from local storage given `buffer.descriptor`
pub trait BufferLoader: Send + Sync + 'static {
    fn load(&self, buffer: &mut FileBuffer) -> Result<(), StorageError>;
}

/// Build one descriptor per regular file in `dir`; the description is the
/// file's first line without its terminator.
pub fn load_descriptors(author: &str, dir: &Path) -> Result<Vec<FileDescriptor>, StorageError> {
    if !dir.is_dir() {
        return Err(StorageError::NotADirectory(dir.to_path_buf()));
    }

    let mut descriptors = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| StorageError::io(dir, e))? {
        let entry = entry.map_err(|e| StorageError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if IGNORED_FILES.contains(&name.as_str()) {
            continue;
        }

        let file = fs::File::open(&path).map_err(|e| StorageError::io(&path, e))?;
        let mut first_line = String::new();
        BufReader::new(file)
            .read_line(&mut first_line)
            .map_err(|e| StorageError::io(&path, e))?;

        descriptors.push(FileDescriptor::new(
            name,
            author,
            first_line.trim_end(),
        ));
    }

    descriptors.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(author, dir = %dir.display(), count = descriptors.len(), "Loaded descriptors");
    Ok(descriptors)
}

/// Read a file into lines, keeping line terminators
pub fn read_lines(path: &Path) -> Result<Vec<String>, StorageError> {
    let content = fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
    Ok(content.split_inclusive('\n').map(str::to_owned).collect())
}

/// Write a buffer's lines to `dir/name`
pub fn save_buffer(buffer: &FileBuffer, dir: &Path, name: &str) -> Result<PathBuf, StorageError> {
    let file_name = checked_file_name(name)?;
    let path = dir.join(file_name);
    fs::write(&path, buffer.content()).map_err(|e| StorageError::io(&path, e))?;
    Ok(path)
}

/// Only bare file names may be resolved against a home directory
fn checked_file_name(name: &str) -> Result<&str, StorageError> {
    let bare = Path::new(name)
        .file_name()
        .is_some_and(|component| component == name);

    if bare && name != ".." && name != "." {
        Ok(name)
    } else {
        Err(StorageError::InvalidFileName(name.to_string()))
    }
}

/// Home directory per author
#[derive(Clone, Debug, Default)]
pub struct HomeDirectories {
    homes: HashMap<String, PathBuf>,
}

impl HomeDirectories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `author`'s home; a duplicate author keeps its first home
    pub fn add(&mut self, author: impl Into<String>, home: impl Into<PathBuf>) -> bool {
        let author = author.into();
        if self.homes.contains_key(&author) {
            return false;
        }
        self.homes.insert(author, home.into());
        true
    }

    pub fn home_of(&self, author: &str) -> Option<&Path> {
        self.homes.get(author).map(PathBuf::as_path)
    }

    /// Descriptors for every registered author's files
    pub fn load_all(&self) -> Result<Vec<FileDescriptor>, StorageError> {
        let mut authors: Vec<_> = self.homes.iter().collect();
        authors.sort_by(|a, b| a.0.cmp(b.0));

        let mut descriptors = Vec::new();
        for (author, home) in authors {
            descriptors.extend(load_descriptors(author, home)?);
        }
        Ok(descriptors)
    }
}

impl BufferLoader for HomeDirectories {
    fn load(&self, buffer: &mut FileBuffer) -> Result<(), StorageError> {
        let descriptor = &buffer.descriptor;
        let home = self
            .home_of(&descriptor.author)
            .ok_or_else(|| StorageError::UnknownAuthor(descriptor.author.clone()))?;
        let path = home.join(checked_file_name(&descriptor.name)?);

        buffer.lines = read_lines(&path)?;
        Ok(())
    }
}

/// Published descriptors indexed by file id and by author
#[derive(Clone, Debug, Default)]
pub struct LocalIndex {
    by_id: BTreeMap<FileId, FileDescriptor>,
    by_author: HashMap<String, Vec<FileDescriptor>>,
}

impl LocalIndex {
    /// Index descriptors returned by the registry; unpublished ones are skipped
    pub fn build(published: &[FileDescriptor]) -> Self {
        let mut index = Self::default();
        for descriptor in published {
            let Some(file_id) = descriptor.file_id else {
                continue;
            };
            index.by_id.insert(file_id, descriptor.clone());
            index
                .by_author
                .entry(descriptor.author.clone())
                .or_default()
                .push(descriptor.clone());
        }
        index
    }

    pub fn get(&self, file_id: FileId) -> Option<&FileDescriptor> {
        self.by_id.get(&file_id)
    }

    pub fn files_by(&self, author: &str) -> &[FileDescriptor] {
        self.by_author.get(author).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
