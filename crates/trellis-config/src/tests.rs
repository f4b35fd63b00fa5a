//! Unit tests for configuration loading and overrides.

use camino::Utf8PathBuf;
use rstest::rstest;

use super::*;

#[test]
fn defaults_are_conservative() {
    let config = Config::default();
    assert!(!config.manage_media());
    assert!(config.media_root().is_none());
    assert_eq!(config.cache_key_prefix(), DEFAULT_CACHE_KEY_PREFIX);
    assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
    assert_eq!(config.log_format(), LogFormat::Json);
    assert!(config.default_enabled().is_empty());
}

#[test]
fn parses_full_document() {
    let config = Config::from_toml(
        r#"
        manage_media = true
        media_root = "/srv/trellis/media"
        lock_dir = "/run/trellis"
        default_enabled = ["reports", "dashboard"]
        cache_key_prefix = "site-1"
        log_filter = "debug"
        log_format = "compact"
        "#,
    )
    .expect("document should parse");

    assert!(config.manage_media());
    assert_eq!(
        config.media_root(),
        Some(Utf8PathBuf::from("/srv/trellis/media").as_path())
    );
    assert_eq!(config.lock_dir(), Utf8PathBuf::from("/run/trellis"));
    assert_eq!(config.default_enabled(), ["reports", "dashboard"]);
    assert_eq!(config.cache_key_prefix(), "site-1");
    assert_eq!(config.log_filter(), "debug");
    assert_eq!(config.log_format(), LogFormat::Compact);
}

#[test]
fn partial_document_keeps_defaults() {
    let config = Config::from_toml("manage_media = true").expect("document should parse");
    assert!(config.manage_media());
    assert_eq!(config.cache_key_prefix(), DEFAULT_CACHE_KEY_PREFIX);
}

#[test]
fn rejects_malformed_document() {
    let error = Config::from_toml("manage_media = maybe").expect_err("should reject");
    assert!(matches!(error, ConfigError::Parse { .. }));
}

#[test]
fn from_file_round_trips() {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let path = Utf8PathBuf::from_path_buf(tmp.path().join("config.toml"))
        .expect("temp path should be UTF-8");
    std::fs::write(&path, "log_filter = \"warn\"\n").expect("write config");

    let config = Config::from_file(&path).expect("file should load");
    assert_eq!(config.log_filter(), "warn");
}

#[test]
fn from_file_reports_missing_file() {
    let error =
        Config::from_file(Utf8PathBuf::from("/nonexistent/trellis.toml").as_path())
            .expect_err("missing file should fail");
    assert!(matches!(error, ConfigError::Read { .. }));
}

#[rstest]
#[case::truthy("yes", true)]
#[case::falsy("0", false)]
fn env_override_parses_manage_media(#[case] value: &str, #[case] expected: bool) {
    let mut config = Config::default();
    config
        .apply_env_overrides(|name| {
            (name == "TRELLIS_MANAGE_MEDIA").then(|| value.to_owned())
        })
        .expect("override should apply");
    assert_eq!(config.manage_media(), expected);
}

#[test]
fn env_override_sets_media_root_and_filter() {
    let mut config = Config::default();
    config
        .apply_env_overrides(|name| match name {
            "TRELLIS_MEDIA_ROOT" => Some("/srv/media".to_owned()),
            "TRELLIS_LOG_FILTER" => Some("trace".to_owned()),
            _ => None,
        })
        .expect("overrides should apply");
    assert_eq!(
        config.media_root(),
        Some(Utf8PathBuf::from("/srv/media").as_path())
    );
    assert_eq!(config.log_filter(), "trace");
}

#[test]
fn env_override_rejects_bad_boolean() {
    let mut config = Config::default();
    let error = config
        .apply_env_overrides(|name| (name == "TRELLIS_MANAGE_MEDIA").then(|| "maybe".to_owned()))
        .expect_err("bad boolean should fail");
    assert!(matches!(error, ConfigError::InvalidOverride { .. }));
}
