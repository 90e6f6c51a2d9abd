//! Config drive device discovery

use crate::error::ConfigDriveError;
use std::io;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info};

/// Finds block devices by filesystem label
pub trait DeviceEnumerator: Send + Sync {
    /// Path of the device carrying `label`, or `None` when there is none
    fn find_by_label(&self, label: &str) -> io::Result<Option<PathBuf>>;
}

/// [`DeviceEnumerator`] backed by `blkid`
pub struct BlkidEnumerator {
    program: PathBuf,
}

impl BlkidEnumerator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for BlkidEnumerator {
    fn default() -> Self {
        Self::new("blkid")
    }
}

/// blkid exit status when no device matched the search
const BLKID_NOT_FOUND: i32 = 2;

impl DeviceEnumerator for BlkidEnumerator {
    fn find_by_label(&self, label: &str) -> io::Result<Option<PathBuf>> {
        let filter = format!("LABEL={label}");
        let output = Command::new(&self.program)
            .args(["-l", "-t", filter.as_str(), "-o", "device"])
            .output()?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let device = stdout.trim();

        if !output.status.success() {
            if output.status.code() == Some(BLKID_NOT_FOUND) && device.is_empty() {
                return Ok(None);
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "{} exited with {}: {}",
                    self.program.display(),
                    output.status,
                    stderr.trim()
                ),
            ));
        }

        Ok(parse_device_output(device))
    }
}

/// First non-empty line of enumerator output
fn parse_device_output(output: &str) -> Option<PathBuf> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(PathBuf::from)
}

/// Resolves the block device for a label
///
/// The per-label alias (e.g. `/dev/disk/by-label/config-2`) is preferred;
/// the enumerator is only asked when the alias does not exist.
pub struct DeviceLocator {
    by_label_dir: PathBuf,
    enumerator: Arc<dyn DeviceEnumerator>,
}

impl DeviceLocator {
    pub fn new(by_label_dir: impl Into<PathBuf>, enumerator: Arc<dyn DeviceEnumerator>) -> Self {
        Self {
            by_label_dir: by_label_dir.into(),
            enumerator,
        }
    }

    pub fn locate(&self, label: &str) -> Result<PathBuf, ConfigDriveError> {
        let alias = self.by_label_dir.join(label);
        if alias.exists() {
            debug!(device = %alias.display(), "Using config drive label alias");
            return Ok(alias);
        }
        debug!(
            by_label_dir = %self.by_label_dir.display(),
            label = %label,
            "No config drive label alias, enumerating devices"
        );

        match self.enumerator.find_by_label(label) {
            Ok(Some(device)) => {
                info!(device = %device.display(), label = %label, "Found config drive device");
                Ok(device)
            }
            Ok(None) => Err(ConfigDriveError::DeviceNotFound {
                label: label.to_string(),
                source: None,
            }),
            Err(e) => {
                debug!(error = %e, "Unable to run device enumeration");
                Err(ConfigDriveError::DeviceNotFound {
                    label: label.to_string(),
                    source: Some(e),
                })
            }
        }
    }
}
