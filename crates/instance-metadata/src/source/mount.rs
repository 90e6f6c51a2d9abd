//! Read-only mounting of the config drive

use crate::error::ConfigDriveError;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Filesystem types tried in order. vfat is the deprecated config drive format.
pub const FS_TYPES: [&str; 2] = ["iso9660", "vfat"];

/// Mount options for the config drive
const MOUNT_OPTIONS: &[&str] = &["ro"];

/// Prefix of the temporary mount point directory
const MOUNT_DIR_PREFIX: &str = "configdrive";

/// Mounts and unmounts filesystems
pub trait Mounter: Send + Sync {
    fn mount(&self, device: &Path, target: &Path, fs_type: &str, options: &[&str])
        -> io::Result<()>;

    fn unmount(&self, target: &Path) -> io::Result<()>;
}

/// [`Mounter`] backed by the `mount` and `umount` utilities
pub struct SystemMounter {
    mount_program: PathBuf,
    umount_program: PathBuf,
}

impl SystemMounter {
    pub fn new(mount_program: impl Into<PathBuf>, umount_program: impl Into<PathBuf>) -> Self {
        Self {
            mount_program: mount_program.into(),
            umount_program: umount_program.into(),
        }
    }

    fn run(program: &Path, command: &mut Command) -> io::Result<()> {
        let output = command.output()?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!(
                "{} exited with {}: {}",
                program.display(),
                output.status,
                stderr.trim()
            ),
        ))
    }
}

impl Default for SystemMounter {
    fn default() -> Self {
        Self::new("mount", "umount")
    }
}

impl Mounter for SystemMounter {
    fn mount(
        &self,
        device: &Path,
        target: &Path,
        fs_type: &str,
        options: &[&str],
    ) -> io::Result<()> {
        let mut command = Command::new(&self.mount_program);
        command.arg("-t").arg(fs_type);
        if !options.is_empty() {
            command.arg("-o").arg(options.join(","));
        }
        command.arg(device).arg(target);

        Self::run(&self.mount_program, &mut command)
    }

    fn unmount(&self, target: &Path) -> io::Result<()> {
        Self::run(
            &self.umount_program,
            Command::new(&self.umount_program).arg(target),
        )
    }
}

/// A config drive mounted on a temporary directory
///
/// Unmounts when dropped, then removes the mount point. If unmounting
/// fails the directory is left in place so nothing below it is touched.
pub struct MountedDrive {
    mounter: Arc<dyn Mounter>,
    dir: Option<TempDir>,
    fs_type: &'static str,
}

impl MountedDrive {
    /// Mount `device` read-only on a fresh temporary directory, trying each
    /// of [`FS_TYPES`] in turn.
    pub fn mount(
        mounter: Arc<dyn Mounter>,
        device: &Path,
        parent_dir: Option<&Path>,
    ) -> Result<Self, ConfigDriveError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(MOUNT_DIR_PREFIX);
        let dir = match parent_dir {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(ConfigDriveError::TempDir)?;

        debug!(
            device = %device.display(),
            mount_point = %dir.path().display(),
            "Attempting to mount config drive"
        );

        let mut last_error = None;
        for fs_type in FS_TYPES {
            match mounter.mount(device, dir.path(), fs_type, MOUNT_OPTIONS) {
                Ok(()) => {
                    debug!(mount_point = %dir.path().display(), fs_type, "Config drive mounted");
                    return Ok(Self {
                        mounter,
                        dir: Some(dir),
                        fs_type,
                    });
                }
                Err(e) => {
                    debug!(fs_type, error = %e, "Config drive mount attempt failed");
                    last_error = Some((fs_type, e));
                }
            }
        }

        let (fs_type, source) = last_error.unwrap_or_else(|| {
            (
                FS_TYPES[FS_TYPES.len() - 1],
                io::Error::new(io::ErrorKind::Other, "no filesystem types to try"),
            )
        });
        warn!(device = %device.display(), error = %source, "Error mounting config drive");

        Err(ConfigDriveError::MountFailed {
            device: device.to_path_buf(),
            fs_type,
            source,
        })
    }

    /// Mount point of the drive
    pub fn path(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            None => Path::new(""),
        }
    }

    /// Filesystem type the drive was mounted with
    pub fn fs_type(&self) -> &'static str {
        self.fs_type
    }
}

impl Drop for MountedDrive {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        match self.mounter.unmount(dir.path()) {
            Ok(()) => {
                debug!(
                    mount_point = %dir.path().display(),
                    fs_type = self.fs_type,
                    "Config drive unmounted"
                );
                if let Err(e) = dir.close() {
                    warn!(error = %e, "Failed to remove config drive mount point");
                }
            }
            Err(e) => {
                let path = dir.keep();
                warn!(
                    mount_point = %path.display(),
                    fs_type = self.fs_type,
                    error = %e,
                    "Failed to unmount config drive"
                );
            }
        }
    }
}
