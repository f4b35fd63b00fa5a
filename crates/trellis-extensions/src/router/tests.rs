//! Unit tests for the dynamic router table.

use super::*;

#[test]
fn install_and_resolve() {
    let mut router = DynamicRouter::new();
    router.install("reports", MountKind::Config, "ext/reports/config/");

    let mount = router
        .resolve("ext/reports/config/general")
        .expect("path should resolve");
    assert_eq!(mount.owner(), "reports");
    assert_eq!(mount.kind(), MountKind::Config);
}

#[test]
fn resolve_prefers_longest_prefix() {
    let mut router = DynamicRouter::new();
    router.install("reports", MountKind::Config, "ext/reports/");
    router.install("reports", MountKind::Admin, "ext/reports/admin/");

    let mount = router
        .resolve("ext/reports/admin/users")
        .expect("path should resolve");
    assert_eq!(mount.kind(), MountKind::Admin);
}

#[test]
fn reinstall_replaces_previous_prefix() {
    let mut router = DynamicRouter::new();
    router.install("reports", MountKind::Config, "ext/reports/v1/");
    router.install("reports", MountKind::Config, "ext/reports/v2/");

    assert_eq!(router.mounts().len(), 1);
    assert!(router.resolve("ext/reports/v1/x").is_none());
    assert!(router.resolve("ext/reports/v2/x").is_some());
}

#[test]
fn remove_owner_clears_all_mounts() {
    let mut router = DynamicRouter::new();
    router.install("reports", MountKind::Config, "ext/reports/config/");
    router.install("reports", MountKind::Admin, "ext/reports/admin/");
    router.install("other", MountKind::Config, "ext/other/config/");

    assert_eq!(router.remove_owner("reports"), 2);
    assert!(router.mounts_for("reports").is_empty());
    assert_eq!(router.mounts().len(), 1);
    assert_eq!(router.remove_owner("reports"), 0);
}

#[test]
fn unmatched_path_resolves_to_none() {
    let router = DynamicRouter::new();
    assert!(router.resolve("ext/unknown/").is_none());
}

#[test]
fn mount_kind_canonical_strings() {
    assert_eq!(MountKind::Config.as_str(), "config");
    assert_eq!(MountKind::Admin.as_str(), "admin");
}
