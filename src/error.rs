use std::fmt;

/// Failures talking to the persisted word collection.
#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Serde(serde_json::Error),
    Backend(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "storage io error: {err}"),
            StorageError::Serde(err) => write!(f, "storage decode error: {err}"),
            StorageError::Backend(message) => write!(f, "storage backend error: {message}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        StorageError::Io(value)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        StorageError::Serde(value)
    }
}

/// A page edit that could not be applied, usually because a page script
/// removed the node first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    Detached(String),
    NotAnElement(String),
    /// The edit would make a node its own ancestor.
    Hierarchy(String),
}

impl fmt::Display for DomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomError::Detached(node) => write!(f, "node {node} is no longer attached"),
            DomError::NotAnElement(node) => write!(f, "node {node} cannot hold children"),
            DomError::Hierarchy(node) => write!(f, "node {node} cannot be inserted below itself"),
        }
    }
}

impl std::error::Error for DomError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    Transport(String),
    Empty,
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::Transport(message) => write!(f, "dictionary lookup failed: {message}"),
            LookupError::Empty => write!(f, "dictionary returned an empty response"),
        }
    }
}

impl std::error::Error for LookupError {}
