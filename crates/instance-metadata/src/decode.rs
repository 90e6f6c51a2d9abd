//! Decoding of metadata documents
//!
//! Both documents are JSON objects. Unknown fields are ignored so newer
//! schema revisions keep decoding.

use crate::crossref;
use crate::error::DecodeError;
use crate::models::{InstanceMetadata, NetworkTopology};
use std::io::Read;

/// Decode a `meta_data.json` document.
///
/// An empty or missing `uuid` is as fatal as a parse failure: an instance
/// without an id is unusable.
pub fn decode_instance_metadata<R: Read>(reader: R) -> Result<InstanceMetadata, DecodeError> {
    let metadata: InstanceMetadata = serde_json::from_reader(reader)?;

    if metadata.id.is_empty() {
        return Err(DecodeError::MissingIdentity);
    }

    Ok(metadata)
}

/// Decode a `network_data.json` document and resolve each interface's link.
///
/// A document with no links or networks is valid.
pub fn decode_network_topology<R: Read>(reader: R) -> Result<NetworkTopology, DecodeError> {
    let mut topology: NetworkTopology = serde_json::from_reader(reader)?;
    crossref::join(&mut topology.interfaces, &topology.links);
    Ok(topology)
}
