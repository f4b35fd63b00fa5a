//! Unit tests for the error taxonomy.

use camino::Utf8PathBuf;

use super::*;

#[test]
fn invalid_extension_names_the_id() {
    let error = ExtensionError::InvalidExtension {
        id: "reports".to_owned(),
    };
    assert_eq!(
        error.to_string(),
        "extension 'reports' is not registered with this manager"
    );
}

#[test]
fn enabling_captures_a_backtrace() {
    let error = ExtensionError::enabling("reports", "admin site failed");
    assert!(error.to_string().contains("failed to enable"));
    assert!(error.to_string().contains("admin site failed"));
    let trace = error.retained_backtrace().expect("backtrace retained");
    assert!(!trace.is_empty());
}

#[test]
fn non_lifecycle_errors_have_no_backtrace() {
    let error = ExtensionError::Manifest {
        message: "empty id".to_owned(),
    };
    assert!(error.retained_backtrace().is_none());
}

#[test]
fn install_media_message_names_the_offending_path() {
    let error = ExtensionError::InstallMedia {
        id: "reports".to_owned(),
        path: Utf8PathBuf::from("/srv/media/ext/reports"),
        message: "could not acquire install lock".to_owned(),
        source: None,
    };
    let message = error.to_string();
    assert!(message.contains("/srv/media/ext/reports"));
    assert!(message.contains("readable and writable"));
}

#[test]
fn install_media_preserves_io_source() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let error = ExtensionError::InstallMedia {
        id: "reports".to_owned(),
        path: Utf8PathBuf::from("/srv/media"),
        message: "copy failed".to_owned(),
        source: Some(std::sync::Arc::new(io)),
    };
    let source = std::error::Error::source(&error).expect("source retained");
    assert!(source.to_string().contains("denied"));
}
