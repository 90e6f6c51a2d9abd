//! Error types for metadata retrieval

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to decode a metadata document
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not a JSON document of the expected shape
    #[error("malformed metadata document: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Document decoded but carries no instance uuid
    #[error("invalid metadata, got empty uuid")]
    MissingIdentity,
}

/// Failure while reading the config drive
#[derive(Debug, Error)]
pub enum ConfigDriveError {
    #[error("config drive with label {label:?} not found")]
    DeviceNotFound {
        label: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("failed to create temporary mount point: {0}")]
    TempDir(#[source] io::Error),

    #[error("failed to mount config drive {device} as {fs_type}: {source}")]
    MountFailed {
        device: PathBuf,
        fs_type: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to open {path} on config drive: {source}")]
    InstanceFileMissing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode config drive metadata: {0}")]
    Decode(#[from] DecodeError),

    #[error("config drive worker failed: {0}")]
    Task(String),
}

/// Failure while querying the metadata service
#[derive(Debug, Error)]
pub enum MetadataServiceError {
    #[error("invalid metadata url {url}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to fetch {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status code when reading metadata from {url}: {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to decode metadata from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: DecodeError,
    },
}

/// Error returned by a single metadata source attempt
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    ConfigDrive(#[from] ConfigDriveError),

    #[error(transparent)]
    MetadataService(#[from] MetadataServiceError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A failed attempt, tagged with the source that produced it
#[derive(Debug)]
pub struct SourceFailure {
    pub source: &'static str,
    pub error: SourceError,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.error)
    }
}

/// Terminal failure of the whole fallback sequence
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("no metadata sources configured")]
    NoSources,

    #[error("all metadata sources failed: {}", join_failures(.failures))]
    AllSourcesFailed { failures: Vec<SourceFailure> },
}

fn join_failures(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
