//! Metadata sources
//!
//! Each source retrieves the instance metadata document (required) and the
//! network topology document (best-effort) from one place:
//! - the config drive, a labeled block device mounted read-only
//! - the metadata service at a fixed link-local address

mod config_drive;
mod device;
mod metadata_service;
mod mount;


pub use config_drive::ConfigDriveSource;
pub use device::{BlkidEnumerator, DeviceEnumerator, DeviceLocator};
pub use metadata_service::MetadataServiceSource;
pub use mount::{MountedDrive, Mounter, SystemMounter, FS_TYPES};

use crate::error::SourceError;
use crate::models::ResolvedMetadata;

pub use async_trait::async_trait;

/// Address of the metadata service, as documented in the OpenStack Cloud
/// Administrator Guide (Compute, networking with nova-network)
pub const METADATA_SERVICE_URL: &str = "http://169.254.169.254/";

/// Relative path of the instance metadata document (2012-08-10 format)
pub const INSTANCE_METADATA_PATH: &str = "openstack/2012-08-10/meta_data.json";

/// Relative path of the network topology document (2015-10-15 format)
pub const NETWORK_TOPOLOGY_PATH: &str = "openstack/2015-10-15/network_data.json";

/// Filesystem label of the config drive
pub const CONFIG_DRIVE_LABEL: &str = "config-2";

/// A place instance metadata can be retrieved from
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Short name used in logs, metrics and errors
    fn name(&self) -> &'static str;

    /// Retrieve metadata once. No retries.
    async fn attempt(&self) -> Result<ResolvedMetadata, SourceError>;
}
