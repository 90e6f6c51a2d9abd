//! Collaborator configuration
//!
//! Only the external tools and filesystem locations used by the config
//! drive source are configurable. The metadata service address, document
//! paths and drive label are fixed.

use serde::Deserialize;
use std::path::PathBuf;

/// Metadata retrieval configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    /// Directory holding per-label block device aliases
    #[serde(default = "default_by_label_dir")]
    pub by_label_dir: PathBuf,

    /// Device enumeration utility
    #[serde(default = "default_blkid_program")]
    pub blkid_program: PathBuf,

    #[serde(default = "default_mount_program")]
    pub mount_program: PathBuf,

    #[serde(default = "default_umount_program")]
    pub umount_program: PathBuf,

    /// Parent for temporary mount points (system temp dir when unset)
    #[serde(default)]
    pub mount_parent_dir: Option<PathBuf>,
}

fn default_by_label_dir() -> PathBuf {
    PathBuf::from("/dev/disk/by-label")
}

fn default_blkid_program() -> PathBuf {
    PathBuf::from("blkid")
}

fn default_mount_program() -> PathBuf {
    PathBuf::from("mount")
}

fn default_umount_program() -> PathBuf {
    PathBuf::from("umount")
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            by_label_dir: default_by_label_dir(),
            blkid_program: default_blkid_program(),
            mount_program: default_mount_program(),
            umount_program: default_umount_program(),
            mount_parent_dir: None,
        }
    }
}

impl MetadataConfig {
    /// Load configuration from `METADATA_*` environment variables
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("METADATA"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Like [`MetadataConfig::load`], falling back to defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Invalid metadata configuration, using defaults");
            Self::default()
        })
    }
}
