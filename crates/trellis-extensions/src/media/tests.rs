//! Unit tests for static media installation and locking.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use rstest::{fixture, rstest};

use super::*;
use crate::manifest::{ExtensionManifest, ExtensionMetadata};

struct MediaFixture {
    installer: MediaInstaller,
    source: Utf8PathBuf,
    _tmp: tempfile::TempDir,
}

fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).expect("temp path should be UTF-8")
}

fn manifest(version: &str) -> ExtensionManifest {
    ExtensionManifest::new(ExtensionMetadata::new("reports", "Reports", version, "ACME"))
}

fn write_source_tree(source: &Utf8Path) {
    fs::create_dir_all(source.join("css").as_std_path()).expect("create source css dir");
    fs::write(source.join("css/style.css").as_std_path(), "body {}").expect("write css");
    fs::write(source.join("logo.png").as_std_path(), [0_u8, 1, 2]).expect("write logo");
}

#[fixture]
fn media() -> MediaFixture {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let base = utf8(tmp.path());
    let media_root = base.join("media");
    let lock_dir = base.join("locks");
    fs::create_dir_all(media_root.as_std_path()).expect("create media root");
    fs::create_dir_all(lock_dir.as_std_path()).expect("create lock dir");

    let mut config = trellis_config::Config::default();
    config.set_manage_media(true);
    config.set_media_root(Some(media_root));
    config.set_lock_dir(lock_dir);
    let installer = MediaInstaller::from_config(&config)
        .expect("installer should derive")
        .with_lock_retry(3, Duration::ZERO);

    let source = base.join("pkg-static");
    write_source_tree(&source);

    MediaFixture {
        installer,
        source,
        _tmp: tmp,
    }
}

#[test]
fn disabled_installer_does_nothing() {
    let installer = MediaInstaller::disabled();
    let outcome = installer
        .install(&manifest("1.0.0"), Utf8Path::new("/nonexistent"), false)
        .expect("disabled install succeeds");
    assert_eq!(outcome, MediaInstallOutcome::Disabled);
    assert!(!installer.is_enabled());
    installer.uninstall("reports").expect("no-op uninstall");
}

#[rstest]
fn install_copies_tree_and_writes_stamp(media: MediaFixture) {
    let outcome = media
        .installer
        .install(&manifest("1.0.0"), &media.source, false)
        .expect("install succeeds");
    assert_eq!(outcome, MediaInstallOutcome::Installed);

    let dir = media.installer.install_dir("reports");
    assert!(dir.join("css/style.css").as_std_path().is_file());
    assert!(dir.join("logo.png").as_std_path().is_file());
    assert_eq!(
        media.installer.installed_version("reports").as_deref(),
        Some("1.0.0")
    );
}

#[rstest]
fn second_install_with_same_version_is_a_no_op(media: MediaFixture) {
    media
        .installer
        .install(&manifest("1.0.0"), &media.source, false)
        .expect("first install");
    let outcome = media
        .installer
        .install(&manifest("1.0.0"), &media.source, false)
        .expect("second install");
    assert_eq!(outcome, MediaInstallOutcome::UpToDate);
}

#[rstest]
fn force_reinstalls_current_version(media: MediaFixture) {
    media
        .installer
        .install(&manifest("1.0.0"), &media.source, false)
        .expect("first install");
    let outcome = media
        .installer
        .install(&manifest("1.0.0"), &media.source, true)
        .expect("forced install");
    assert_eq!(outcome, MediaInstallOutcome::Installed);
}

#[rstest]
fn version_bump_replaces_previous_tree(media: MediaFixture) {
    media
        .installer
        .install(&manifest("1.0.0"), &media.source, false)
        .expect("first install");

    // Simulate a package upgrade that drops a file.
    fs::remove_file(media.source.join("logo.png").as_std_path()).expect("drop source file");
    let outcome = media
        .installer
        .install(&manifest("1.1.0"), &media.source, false)
        .expect("upgrade install");
    assert_eq!(outcome, MediaInstallOutcome::Installed);

    let dir = media.installer.install_dir("reports");
    assert!(!dir.join("logo.png").as_std_path().exists());
    assert_eq!(
        media.installer.installed_version("reports").as_deref(),
        Some("1.1.0")
    );
}

#[rstest]
fn held_lock_exhausts_retries(media: MediaFixture) {
    // A young lock file is treated as held by a live installer.
    let lock_path = media.installer.lock_path("reports");
    fs::write(lock_path.as_std_path(), "held").expect("plant lock");

    let error = media
        .installer
        .install(&manifest("1.0.0"), &media.source, false)
        .expect_err("contended install should fail");
    let message = error.to_string();
    assert!(message.contains("could not acquire the install lock"));
    assert!(message.contains(lock_path.as_str()));
}

#[rstest]
fn contention_resolved_by_other_installer_is_up_to_date(media: MediaFixture) {
    // Another process finished the install: the stamp is current even
    // though the lock is still held.
    media
        .installer
        .install(&manifest("1.0.0"), &media.source, false)
        .expect("seed install");
    let lock_path = media.installer.lock_path("reports");
    fs::write(lock_path.as_std_path(), "held").expect("plant lock");

    let outcome = media
        .installer
        .install(&manifest("1.0.0"), &media.source, false)
        .expect("install should observe the fresh stamp");
    assert_eq!(outcome, MediaInstallOutcome::UpToDate);
}

#[rstest]
fn stale_lock_is_recovered(media: MediaFixture) {
    let lock_path = media.installer.lock_path("reports");
    fs::write(lock_path.as_std_path(), "stale").expect("plant lock");
    std::thread::sleep(Duration::from_millis(50));

    let installer = media.installer.clone().with_stale_lock_age(Duration::from_millis(1));
    let outcome = installer
        .install(&manifest("1.0.0"), &media.source, false)
        .expect("stale lock should be recovered");
    assert_eq!(outcome, MediaInstallOutcome::Installed);
    assert!(
        !lock_path.as_std_path().exists(),
        "lock must be released after install"
    );
}

#[rstest]
fn racing_installers_copy_exactly_once(media: MediaFixture) {
    let installer = Arc::new(
        media
            .installer
            .clone()
            .with_lock_retry(50, Duration::from_millis(2)),
    );
    let source = media.source.clone();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let racer = Arc::clone(&installer);
            let racer_source = source.clone();
            std::thread::spawn(move || {
                racer
                    .install(&manifest("1.0.0"), &racer_source, false)
                    .expect("racing install should succeed")
            })
        })
        .collect();

    let outcomes: Vec<MediaInstallOutcome> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread completes"))
        .collect();

    let installed = outcomes
        .iter()
        .filter(|outcome| **outcome == MediaInstallOutcome::Installed)
        .count();
    assert_eq!(installed, 1, "exactly one racer performs the copy");
    assert_eq!(
        media.installer.installed_version("reports").as_deref(),
        Some("1.0.0")
    );
}

#[rstest]
fn uninstall_removes_tree(media: MediaFixture) {
    media
        .installer
        .install(&manifest("1.0.0"), &media.source, false)
        .expect("install");
    media.installer.uninstall("reports").expect("uninstall");
    assert!(!media.installer.install_dir("reports").as_std_path().exists());
    media
        .installer
        .uninstall("reports")
        .expect("second uninstall is a no-op");
}

#[rstest]
fn missing_source_surfaces_offending_path(media: MediaFixture) {
    let missing = media.source.join("nope");
    let error = media
        .installer
        .install(&manifest("1.0.0"), &missing, false)
        .expect_err("missing source should fail");
    assert!(error.to_string().contains("nope"));
}

#[rstest]
fn installed_version_absent_without_stamp(media: MediaFixture) {
    assert!(media.installer.installed_version("reports").is_none());
}
