//! Unit tests for manifest validation and version comparison.

use rstest::rstest;

use super::*;

fn make_manifest(id: &str) -> ExtensionManifest {
    ExtensionManifest::new(ExtensionMetadata::new(id, "Test", "1.0.0", "ACME"))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn valid_manifest_passes() {
    let manifest = make_manifest("reports")
        .with_requirements(vec!["auth".into()])
        .with_apps(vec!["reports.app".into()])
        .with_middleware(vec!["reports.middleware.Audit".into()]);
    manifest.validate().expect("manifest should validate");
}

#[rstest]
#[case::empty("")]
#[case::whitespace("   ")]
#[case::slash("foo/bar")]
#[case::traversal("..;x")]
fn rejects_hostile_ids(#[case] id: &str) {
    let error = make_manifest(id).validate().expect_err("should reject id");
    assert!(matches!(error, ExtensionError::Manifest { .. }));
}

#[test]
fn accepts_dotted_module_style_id() {
    make_manifest("acme.reports-v2_beta")
        .validate()
        .expect("dotted id should validate");
}

#[test]
fn rejects_empty_version() {
    let manifest = ExtensionManifest::new(ExtensionMetadata::new("reports", "Test", " ", "ACME"));
    let error = manifest.validate().expect_err("should reject version");
    assert!(error.to_string().contains("must declare a version"));
}

#[test]
fn rejects_empty_requirement() {
    let manifest = make_manifest("reports").with_requirements(vec![String::new()]);
    let error = manifest.validate().expect_err("should reject requirement");
    assert!(error.to_string().contains("empty requirement"));
}

#[test]
fn rejects_unnamed_bundle() {
    let manifest =
        make_manifest("reports").with_js_bundles(vec![StaticBundle::new("", Vec::new())]);
    let error = manifest.validate().expect_err("should reject bundle");
    assert!(error.to_string().contains("bundle without a name"));
}

// ---------------------------------------------------------------------------
// Bundles
// ---------------------------------------------------------------------------

#[test]
fn bundle_output_is_namespaced_by_extension() {
    let bundle = StaticBundle::new("default", vec!["js/app.js".into()]);
    assert_eq!(
        bundle.namespaced_output("reports", "js"),
        "ext/reports/default.min.js"
    );
}

// ---------------------------------------------------------------------------
// Flags and defaults
// ---------------------------------------------------------------------------

#[test]
fn flags_default_off() {
    let manifest = make_manifest("reports");
    assert!(!manifest.is_configurable());
    assert!(!manifest.has_admin_site());
    assert!(manifest.requirements().is_empty());
    assert!(manifest.middleware().is_empty());
}

#[test]
fn builder_sets_flags() {
    let manifest = make_manifest("reports").configurable().with_admin_site();
    assert!(manifest.is_configurable());
    assert!(manifest.has_admin_site());
}

// ---------------------------------------------------------------------------
// Version comparison
// ---------------------------------------------------------------------------

#[rstest]
#[case::absent(None, "1.0.0", VersionRelation::Upgrade)]
#[case::older(Some("1.0.0"), "1.1.0", VersionRelation::Upgrade)]
#[case::equal(Some("1.1.0"), "1.1.0", VersionRelation::Current)]
#[case::newer(Some("2.0.0"), "1.1.0", VersionRelation::Downgrade)]
#[case::prerelease(Some("1.1.0-alpha.1"), "1.1.0", VersionRelation::Upgrade)]
#[case::unparseable_differs(Some("build-42"), "build-43", VersionRelation::Upgrade)]
#[case::unparseable_equal(Some("build-42"), "build-42", VersionRelation::Current)]
fn version_relation_cases(
    #[case] stored: Option<&str>,
    #[case] current: &str,
    #[case] expected: VersionRelation,
) {
    assert_eq!(version_relation(stored, current), expected);
}
