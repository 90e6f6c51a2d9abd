//! Integration tests for metadata resolution across both sources

use instance_metadata::source::{
    DeviceEnumerator, DeviceLocator, Mounter, INSTANCE_METADATA_PATH,
};
use instance_metadata::{
    ConfigDriveError, ConfigDriveSource, MetadataCache, MetadataResolver, MetadataServiceSource,
    MetadataSource, RetrievalError, SourceError,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const METADATA_URL_PATH: &str = "/openstack/2012-08-10/meta_data.json";
const NETWORK_URL_PATH: &str = "/openstack/2015-10-15/network_data.json";

struct NoDevice {
    calls: AtomicUsize,
}

impl DeviceEnumerator for NoDevice {
    fn find_by_label(&self, _label: &str) -> io::Result<Option<PathBuf>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

/// Mounter serving a config drive that only has the instance metadata file
struct MetadataOnlyDrive {
    mount_delay: Duration,
    mounts: AtomicUsize,
    mounted_now: AtomicUsize,
    max_mounted: AtomicUsize,
}

impl MetadataOnlyDrive {
    fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    fn with_delay(mount_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            mount_delay,
            mounts: AtomicUsize::new(0),
            mounted_now: AtomicUsize::new(0),
            max_mounted: AtomicUsize::new(0),
        })
    }
}

impl Mounter for MetadataOnlyDrive {
    fn mount(
        &self,
        _device: &Path,
        target: &Path,
        _fs_type: &str,
        _options: &[&str],
    ) -> io::Result<()> {
        self.mounts.fetch_add(1, Ordering::SeqCst);
        let mounted = self.mounted_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_mounted.fetch_max(mounted, Ordering::SeqCst);
        std::thread::sleep(self.mount_delay);

        let file = target.join(INSTANCE_METADATA_PATH);
        std::fs::create_dir_all(file.parent().unwrap())?;
        std::fs::write(
            file,
            r#"{"uuid": "drive-uuid", "name": "from-drive", "availability_zone": "az-drive"}"#,
        )
    }

    fn unmount(&self, target: &Path) -> io::Result<()> {
        self.mounted_now.fetch_sub(1, Ordering::SeqCst);
        for entry in std::fs::read_dir(target)? {
            std::fs::remove_dir_all(entry?.path())?;
        }
        Ok(())
    }
}

fn missing_config_drive(by_label: &TempDir, enumerator: Arc<NoDevice>) -> ConfigDriveSource {
    ConfigDriveSource::new(
        DeviceLocator::new(by_label.path(), enumerator),
        MetadataOnlyDrive::new(),
    )
}

#[tokio::test]
async fn test_falls_back_to_metadata_service() {
    let mut server = mockito::Server::new_async().await;
    let metadata_mock = server
        .mock("GET", METADATA_URL_PATH)
        .with_status(200)
        .with_body(r#"{"uuid":"abc-123","name":"vm1","availability_zone":"az1"}"#)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", NETWORK_URL_PATH)
        .with_status(200)
        .with_body(r#"{"links": [], "networks": [], "services": []}"#)
        .create_async()
        .await;

    let by_label = TempDir::new().unwrap();
    let enumerator = Arc::new(NoDevice {
        calls: AtomicUsize::new(0),
    });
    let sources: Vec<Arc<dyn MetadataSource>> = vec![
        Arc::new(missing_config_drive(&by_label, enumerator.clone())),
        Arc::new(MetadataServiceSource::with_base_url(server.url())),
    ];
    let resolver = MetadataResolver::new(sources, Arc::new(MetadataCache::new()));

    let resolved = resolver.resolve().await.unwrap();
    assert_eq!(resolved.source, "metadata-service");
    assert_eq!(resolved.instance.id, "abc-123");
    assert_eq!(resolved.instance.name, "vm1");
    assert_eq!(resolved.instance.availability_zone, "az1");
    assert!(resolved.network.as_ref().unwrap().is_empty());

    // Served from cache: neither source runs again
    for _ in 0..3 {
        let again = resolver.resolve().await.unwrap();
        assert!(Arc::ptr_eq(&resolved, &again));
    }
    assert_eq!(enumerator.calls.load(Ordering::SeqCst), 1);
    metadata_mock.assert_async().await;
}

#[tokio::test]
async fn test_config_drive_without_network_data() {
    let by_label = TempDir::new().unwrap();
    std::fs::write(by_label.path().join("config-2"), "").unwrap();
    let enumerator = Arc::new(NoDevice {
        calls: AtomicUsize::new(0),
    });

    let sources: Vec<Arc<dyn MetadataSource>> = vec![
        Arc::new(missing_config_drive(&by_label, enumerator.clone())),
        Arc::new(MetadataServiceSource::with_base_url("http://127.0.0.1:1/")),
    ];
    let resolver = MetadataResolver::new(sources, Arc::new(MetadataCache::new()));

    let resolved = resolver.resolve().await.unwrap();
    assert_eq!(resolved.source, "config-drive");
    assert_eq!(resolved.instance.id, "drive-uuid");
    assert!(resolved.network.is_none());
    assert_eq!(enumerator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_both_sources_fail() {
    let mut server = mockito::Server::new_async().await;
    let metadata_mock = server
        .mock("GET", METADATA_URL_PATH)
        .with_status(503)
        .expect(2)
        .create_async()
        .await;

    let by_label = TempDir::new().unwrap();
    let enumerator = Arc::new(NoDevice {
        calls: AtomicUsize::new(0),
    });
    let sources: Vec<Arc<dyn MetadataSource>> = vec![
        Arc::new(missing_config_drive(&by_label, enumerator.clone())),
        Arc::new(MetadataServiceSource::with_base_url(server.url())),
    ];
    let resolver = MetadataResolver::new(sources, Arc::new(MetadataCache::new()));

    let err = resolver.resolve().await.unwrap_err();
    match &err {
        RetrievalError::AllSourcesFailed { failures } => {
            assert_eq!(failures.len(), 2);
            assert_eq!(failures[0].source, "config-drive");
            assert!(matches!(
                failures[0].error,
                SourceError::ConfigDrive(ConfigDriveError::DeviceNotFound { .. })
            ));
            assert_eq!(failures[1].source, "metadata-service");
            assert!(matches!(failures[1].error, SourceError::MetadataService(_)));
        }
        other => panic!("expected AllSourcesFailed, got {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("config-drive"));
    assert!(message.contains("503"));
    assert!(!resolver.cache().is_populated());

    // A second call redoes the whole sequence
    assert!(resolver.resolve().await.is_err());
    assert_eq!(enumerator.calls.load(Ordering::SeqCst), 2);
    metadata_mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_resolve_does_not_overlap_retrievals() {
    let by_label = TempDir::new().unwrap();
    std::fs::write(by_label.path().join("config-2"), "").unwrap();
    let mount_parent = TempDir::new().unwrap();
    let drive = MetadataOnlyDrive::with_delay(Duration::from_millis(300));

    let source = ConfigDriveSource::new(
        DeviceLocator::new(
            by_label.path(),
            Arc::new(NoDevice {
                calls: AtomicUsize::new(0),
            }),
        ),
        drive.clone(),
    )
    .with_mount_parent_dir(mount_parent.path());
    let sources: Vec<Arc<dyn MetadataSource>> = vec![Arc::new(source)];
    let resolver = MetadataResolver::new(sources, Arc::new(MetadataCache::new()));

    let cancelled = tokio::time::timeout(Duration::from_millis(50), resolver.resolve()).await;
    assert!(cancelled.is_err());
    assert!(!resolver.cache().is_populated());

    let resolved = resolver.resolve().await.unwrap();
    assert_eq!(resolved.source, "config-drive");
    assert_eq!(resolved.instance.id, "drive-uuid");

    assert_eq!(drive.mounts.load(Ordering::SeqCst), 2);
    assert_eq!(drive.max_mounted.load(Ordering::SeqCst), 1);
    assert_eq!(std::fs::read_dir(mount_parent.path()).unwrap().count(), 0);
}
