//! End-to-end integration tests for volume drivers.
//!
//! These tests verify complete flows work correctly:
//! - Mounting volumes from a configuration file
//! - Listing, creating, reading and removing through hashes
//! - Symlink containment on the local disk
//! - Copies between volumes

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use driver::config::{Backend, Config, StorageConfig};
use driver::files::StorageDriver;
use driver::volumes::{VolumeError, Volumes};
use driver::StorageError;
use protocol::{SortKey, BROKEN_LINK_MIME, DIRECTORY_MIME};
use tempfile::TempDir;

/// Create a test configuration with one local volume over a populated temp directory.
fn create_test_config() -> (Config, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::create_dir(root.join("docs")).unwrap();
    fs::write(root.join("docs/report.txt"), b"quarterly").unwrap();
    fs::write(root.join("photo.png"), b"png").unwrap();
    fs::write(root.join(".env"), b"SECRET=1").unwrap();

    let mut volume = StorageConfig::local("l1", root);
    volume.alias = "Files".to_string();
    volume.url = "https://example.com/files/".to_string();

    let mut config = Config::default();
    config.volumes.push(volume);
    (config, temp_dir)
}

fn mount(config: &Config) -> Volumes {
    config.validate().unwrap();
    Volumes::from_config(config).unwrap()
}

// =============================================================================
// Mounting
// =============================================================================

#[test]
fn test_mount_from_config_file() {
    let (config, temp_dir) = create_test_config();
    let path = temp_dir.path().join(".volumes/config.toml");
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded, config);

    let volumes = mount(&loaded);
    let roots = volumes.roots();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].node.name, "Files");
    assert_eq!(roots[0].rel, "/Files");
    assert_eq!(roots[0].url, "https://example.com/files/");
}

#[test]
fn test_missing_root_is_unavailable() {
    let (mut config, temp_dir) = create_test_config();
    config
        .volumes
        .push(StorageConfig::local("l2", temp_dir.path().join("missing")));

    let volumes = mount(&config);
    assert_eq!(volumes.len(), 2);
    assert_eq!(volumes.roots().len(), 1);

    let missing = volumes.get("l2").unwrap();
    assert!(!missing.available());
    assert!(matches!(missing.root(), Err(StorageError::Unavailable)));
    assert!(matches!(missing.file_exists("l2_"), Err(StorageError::Unavailable)));
}

#[test]
fn test_duplicate_ids_fail_validation() {
    let (mut config, temp_dir) = create_test_config();
    config
        .volumes
        .push(StorageConfig::memory("l1", temp_dir.path()));
    assert!(config.validate().is_err());
    assert!(matches!(
        Volumes::from_config(&config),
        Err(VolumeError::DuplicateId(_))
    ));
}

// =============================================================================
// Browsing
// =============================================================================

#[test]
fn test_listing_hides_excluded_names() {
    let (config, _temp_dir) = create_test_config();
    let volumes = mount(&config);
    let volume = volumes.get("l1").unwrap();
    let root = volume.root().unwrap();

    let files = volume.ls(&root, SortKey::NameDirsFirst).unwrap();
    let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["docs", "photo.png"]);
    assert_eq!(files[0].mime, DIRECTORY_MIME);
    assert_eq!(files[1].mime, "image/png");
    assert_eq!(files[1].size, 3);
}

#[test]
fn test_hashes_round_trip_through_records() {
    let (config, temp_dir) = create_test_config();
    let volumes = mount(&config);
    let volume = volumes.get("l1").unwrap();

    let report = volume
        .hash_of(&temp_dir.path().join("docs/report.txt"))
        .unwrap();
    assert!(report.starts_with("l1_"));
    assert_eq!(volumes.driver_for(&report).unwrap().id(), "l1");

    let info = volume.info(&report).unwrap();
    assert_eq!(info.hash, report);
    assert_eq!(info.name, "report.txt");
    assert!(info.read && info.write && info.rm);

    let docs = volume.dir(&volume.hash_of(&temp_dir.path().join("docs")).unwrap()).unwrap();
    assert_eq!(docs.phash, Some(volume.root().unwrap()));
    assert_eq!(docs.rel, "/Files/docs");
    assert_eq!(docs.url, "https://example.com/files/docs/");
}

#[test]
fn test_excluded_and_outside_paths_have_no_hash() {
    let (config, temp_dir) = create_test_config();
    let volumes = mount(&config);
    let volume = volumes.get("l1").unwrap();

    assert!(volume.hash_of(&temp_dir.path().join(".env")).is_err());
    assert!(volume.hash_of(Path::new("/etc/passwd")).is_err());
    assert!(volume
        .hash_of(&temp_dir.path().join("docs/../../etc"))
        .is_err());
}

#[test]
fn test_start_directory() {
    let (mut config, _temp_dir) = create_test_config();
    config.volumes[0].start_path = "docs".to_string();
    let volumes = mount(&config);
    let volume = volumes.get("l1").unwrap();

    let start = volume.dir(&volume.start().unwrap()).unwrap();
    assert_eq!(start.rel, "/Files/docs");
}

// =============================================================================
// Mutations
// =============================================================================

#[test]
fn test_create_write_read_remove() {
    let (config, temp_dir) = create_test_config();
    let volumes = mount(&config);
    let volume = volumes.get("l1").unwrap();
    let root = volume.root().unwrap();

    let dir = volume.mkdir(&root, "notes").unwrap();
    let file = volume.mkfile(&dir.hash, "todo.txt").unwrap();
    volume.put_contents(&file.hash, b"- ship it").unwrap();

    assert_eq!(
        fs::read(temp_dir.path().join("notes/todo.txt")).unwrap(),
        b"- ship it"
    );
    assert_eq!(volume.get_contents(&file.hash).unwrap(), b"- ship it");

    assert!(matches!(
        volume.mkfile(&dir.hash, "todo.txt"),
        Err(StorageError::AlreadyExists)
    ));

    volume.rm(&file.hash).unwrap();
    volume.rm(&dir.hash).unwrap();
    assert!(!temp_dir.path().join("notes").exists());
}

#[test]
fn test_read_only_volume_rejects_writes() {
    let (mut config, _temp_dir) = create_test_config();
    config.volumes[0].read_only = true;
    let volumes = mount(&config);
    let volume = volumes.get("l1").unwrap();
    let root = volume.root().unwrap();

    assert!(matches!(
        volume.mkdir(&root, "nope"),
        Err(StorageError::AccessDenied)
    ));
    let files = volume.ls(&root, SortKey::Name).unwrap();
    assert!(files.iter().all(|f| !f.write && !f.rm));
}

#[test]
fn test_upload_filter() {
    let (mut config, _temp_dir) = create_test_config();
    config.volumes[0].upload_allow = vec!["image/png".to_string()];
    config.volumes[0].upload_deny = vec!["image/*".to_string()];
    let volumes = mount(&config);
    let volume = volumes.get("l1").unwrap();

    assert!(volume.upload_allowed("image/png").unwrap());
    assert!(!volume.upload_allowed("image/jpeg").unwrap());
    assert!(volume.upload_allowed("text/plain").unwrap());
    assert_eq!(volume.params().upload_order.to_string(), "deny,allow");
}

// =============================================================================
// Symlinks
// =============================================================================

#[cfg(unix)]
#[test]
fn test_symlinks_stay_inside_the_volume() {
    use std::os::unix::fs::symlink;

    let (config, temp_dir) = create_test_config();
    let outside = TempDir::new().unwrap();
    fs::write(outside.path().join("secret.txt"), b"secret").unwrap();

    let root = temp_dir.path();
    symlink("docs/report.txt", root.join("shortcut")).unwrap();
    symlink(outside.path(), root.join("escape")).unwrap();
    symlink("missing.txt", root.join("dangling")).unwrap();

    let volumes = mount(&config);
    let volume = volumes.get("l1").unwrap();

    let shortcut = volume.info(&volume.hash_of(&root.join("shortcut")).unwrap()).unwrap();
    assert_eq!(shortcut.mime, "text/plain");
    assert_eq!(shortcut.link_to.as_deref(), Some("/Files/docs/report.txt"));
    assert_eq!(volume.get_contents(&shortcut.hash).unwrap(), b"quarterly");

    for name in ["escape", "dangling"] {
        let hash = volume.hash_of(&root.join(name)).unwrap();
        let node = volume.info(&hash).unwrap();
        assert_eq!(node.mime, BROKEN_LINK_MIME, "{name}");
        assert!(!node.read && !node.write, "{name}");
        assert!(matches!(volume.dir(&hash), Err(StorageError::BrokenLink)));
    }

    // A path through the escaping link is never reachable
    assert!(volume.hash_of(&root.join("escape/secret.txt")).is_err());
}

/// Hash a client could forge for a root-relative path.
fn forge_hash(id: &str, rel: &str) -> String {
    format!("{id}_{}", URL_SAFE_NO_PAD.encode(rel))
}

#[cfg(unix)]
#[test]
fn test_relative_link_behind_linked_directory_stays_inside() {
    use std::os::unix::fs::symlink;

    let outer = TempDir::new().unwrap();
    let root = outer.path().join("vol");
    fs::create_dir_all(root.join("outside")).unwrap();
    fs::write(root.join("outside/secret.txt"), b"decoy").unwrap();
    fs::create_dir(outer.path().join("outside")).unwrap();
    fs::write(outer.path().join("outside/secret.txt"), b"secret").unwrap();
    symlink(".", root.join("up")).unwrap();
    symlink("../outside", root.join("esc")).unwrap();

    let mut config = Config::default();
    config.volumes.push(StorageConfig::local("l1", &root));
    let volumes = mount(&config);
    let volume = volumes.get("l1").unwrap();

    let sneaky = forge_hash("l1", "up/esc/secret.txt");
    assert!(!volume.file_exists(&sneaky).unwrap());
    assert!(matches!(
        volume.get_contents(&sneaky),
        Err(StorageError::NotFound)
    ));
    assert!(volume.hash_of(&root.join("up/esc/secret.txt")).is_err());

    let esc = volume.info(&forge_hash("l1", "up/esc")).unwrap();
    assert_eq!(esc.mime, BROKEN_LINK_MIME);

    // The decoy is reachable only by its own path
    assert_eq!(
        volume
            .get_contents(&forge_hash("l1", "outside/secret.txt"))
            .unwrap(),
        b"decoy"
    );
}

#[cfg(unix)]
#[test]
fn test_copy_skips_link_back_into_copied_tree() {
    use std::os::unix::fs::symlink;

    let (config, temp_dir) = create_test_config();
    let root = temp_dir.path();
    symlink(root.join("docs"), root.join("docs/again")).unwrap();
    fs::create_dir(root.join("backup")).unwrap();

    let volumes = mount(&config);
    let volume = volumes.get("l1").unwrap();
    let docs = volume.hash_of(&root.join("docs")).unwrap();
    let backup = volume.hash_of(&root.join("backup")).unwrap();

    volume.copy(&docs, &backup).unwrap();
    assert_eq!(
        fs::read(root.join("backup/docs/report.txt")).unwrap(),
        b"quarterly"
    );
    assert!(!root.join("backup/docs/again").exists());
}

// =============================================================================
// Multiple Volumes
// =============================================================================

#[test]
fn test_copy_between_local_and_memory_volumes() {
    let (mut config, temp_dir) = create_test_config();
    let mut scratch = StorageConfig::memory("m1", "/scratch");
    scratch.alias = "Scratch".to_string();
    config.volumes.push(scratch);

    let volumes = mount(&config);
    assert_eq!(volumes.get("m1").unwrap().config().backend, Backend::Memory);

    let local = volumes.get("l1").unwrap();
    let memory = volumes.get("m1").unwrap();
    let report = local
        .hash_of(&temp_dir.path().join("docs/report.txt"))
        .unwrap();

    let copied = volumes.copy(&report, &memory.root().unwrap()).unwrap();
    assert!(copied.hash.starts_with("m1_"));
    assert_eq!(memory.get_contents(&copied.hash).unwrap(), b"quarterly");

    let listing = memory
        .ls(&memory.root().unwrap(), SortKey::NameDirsFirst)
        .unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "report.txt");
}

#[test]
fn test_hash_from_one_volume_is_foreign_to_another() {
    let (mut config, _temp_dir) = create_test_config();
    config
        .volumes
        .push(StorageConfig::memory("m1", "/scratch"));
    let volumes = mount(&config);

    let local_root = volumes.get("l1").unwrap().root().unwrap();
    let memory = volumes.get("m1").unwrap();
    assert!(!memory.file_exists(&local_root).unwrap());
    assert!(matches!(memory.info(&local_root), Err(StorageError::NotFound)));
}

#[test]
fn test_driver_on_explicit_backend() {
    let temp_dir = TempDir::new().unwrap();
    let driver = StorageDriver::from_config(StorageConfig::local("l9", temp_dir.path())).unwrap();
    assert!(driver.available());
    assert!(driver
        .ls(&driver.root().unwrap(), SortKey::Name)
        .unwrap()
        .is_empty());
}
