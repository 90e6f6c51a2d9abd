//! Config drive metadata source
//!
//! The config drive is an iso9660 (or, deprecated, vfat) block device with
//! the `config-2` label. It is mounted read-only on a temporary directory
//! for the duration of one read and always unmounted afterwards.

use super::device::{BlkidEnumerator, DeviceLocator};
use super::mount::{MountedDrive, Mounter, SystemMounter};
use super::{
    async_trait, MetadataSource, CONFIG_DRIVE_LABEL, INSTANCE_METADATA_PATH,
    NETWORK_TOPOLOGY_PATH,
};
use crate::config::MetadataConfig;
use crate::decode::{decode_instance_metadata, decode_network_topology};
use crate::error::{ConfigDriveError, SourceError};
use crate::models::{NetworkTopology, ResolvedMetadata};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Reads metadata from the config drive
///
/// Clones share one read lock, so at most one blocking read runs at a time
/// even when the future that started an earlier read was dropped.
#[derive(Clone)]
pub struct ConfigDriveSource {
    locator: Arc<DeviceLocator>,
    mounter: Arc<dyn Mounter>,
    mount_parent_dir: Option<PathBuf>,
    read_lock: Arc<Mutex<()>>,
}

impl ConfigDriveSource {
    pub const NAME: &'static str = "config-drive";

    pub fn new(locator: DeviceLocator, mounter: Arc<dyn Mounter>) -> Self {
        Self {
            locator: Arc::new(locator),
            mounter,
            mount_parent_dir: None,
            read_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Build a source using the system `blkid`, `mount` and `umount`
    pub fn from_config(config: &MetadataConfig) -> Self {
        let locator = DeviceLocator::new(
            &config.by_label_dir,
            Arc::new(BlkidEnumerator::new(&config.blkid_program)),
        );
        let mounter = Arc::new(SystemMounter::new(
            &config.mount_program,
            &config.umount_program,
        ));

        let mut source = Self::new(locator, mounter);
        source.mount_parent_dir = config.mount_parent_dir.clone();
        source
    }

    /// Create temporary mount points under `dir` instead of the system temp dir
    pub fn with_mount_parent_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mount_parent_dir = Some(dir.into());
        self
    }

    /// Locate, mount, read and unmount the drive. Blocks.
    pub fn read_blocking(&self) -> Result<ResolvedMetadata, ConfigDriveError> {
        let _read = self.read_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let device = self.locator.locate(CONFIG_DRIVE_LABEL)?;
        let drive = MountedDrive::mount(
            self.mounter.clone(),
            &device,
            self.mount_parent_dir.as_deref(),
        )?;
        debug!(
            device = %device.display(),
            fs_type = drive.fs_type(),
            "Reading config drive"
        );

        let metadata_path = drive.path().join(INSTANCE_METADATA_PATH);
        let metadata_file = File::open(&metadata_path).map_err(|source| {
            warn!(
                path = %INSTANCE_METADATA_PATH,
                error = %source,
                "Error reading instance metadata on config drive"
            );
            ConfigDriveError::InstanceFileMissing {
                path: PathBuf::from(INSTANCE_METADATA_PATH),
                source,
            }
        })?;
        let instance = decode_instance_metadata(BufReader::new(metadata_file))?;

        let network = read_network_topology(drive.path());

        Ok(ResolvedMetadata::new(instance, network, Self::NAME))
    }
}

/// Best-effort read of the network topology document under `mount_point`
fn read_network_topology(mount_point: &Path) -> Option<NetworkTopology> {
    let file = match File::open(mount_point.join(NETWORK_TOPOLOGY_PATH)) {
        Ok(file) => file,
        Err(e) => {
            warn!(
                path = %NETWORK_TOPOLOGY_PATH,
                error = %e,
                "Error reading network data on config drive"
            );
            return None;
        }
    };

    match decode_network_topology(BufReader::new(file)) {
        Ok(topology) => Some(topology),
        Err(e) => {
            debug!(error = %e, "Can't parse network data from config drive");
            None
        }
    }
}

#[async_trait]
impl MetadataSource for ConfigDriveSource {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn attempt(&self) -> Result<ResolvedMetadata, SourceError> {
        let source = self.clone();
        let result = tokio::task::spawn_blocking(move || source.read_blocking())
            .await
            .map_err(|e| ConfigDriveError::Task(e.to_string()))?;

        Ok(result?)
    }
}
