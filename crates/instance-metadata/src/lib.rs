//! Instance metadata discovery for OpenStack-style virtual machines
//!
//! This crate provides:
//! - Decoding of instance metadata and network topology documents
//! - Config drive discovery, mounting and reading
//! - Metadata service retrieval over HTTP
//! - A process-wide cache populated by the first successful source

pub mod config;
pub mod crossref;
pub mod decode;
pub mod error;
pub mod models;
pub mod observability;
pub mod resolver;
pub mod source;

pub use crate::config::MetadataConfig;
pub use decode::{decode_instance_metadata, decode_network_topology};
pub use error::{
    ConfigDriveError, DecodeError, MetadataServiceError, RetrievalError, SourceError,
    SourceFailure,
};
pub use models::*;
pub use observability::RetrievalMetrics;
pub use resolver::{get_metadata, reset_for_testing, MetadataCache, MetadataResolver};
pub use source::{ConfigDriveSource, MetadataServiceSource, MetadataSource};
