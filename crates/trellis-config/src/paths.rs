//! Derives filesystem paths used by the static-media installer.
//!
//! The media root holds one install tree per extension; the lock directory
//! holds the per-extension lock files that serialise concurrent installs.
//! Both the library and the management command need to agree on this layout
//! so an administrator-invoked install and a worker-startup install target
//! the same files.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::Config;

/// Canonical paths for static-media artefacts written by the installer.
#[derive(Debug, Clone)]
pub struct MediaPaths {
    media_root: Utf8PathBuf,
    lock_dir: Utf8PathBuf,
}

impl MediaPaths {
    /// Derives media paths from the shared configuration, creating the
    /// directories when missing.
    ///
    /// # Errors
    ///
    /// Returns [`MediaPathsError::MediaRootUnset`] when the configuration
    /// does not name a media root, or [`MediaPathsError::Prepare`] when a
    /// directory cannot be created.
    pub fn from_config(config: &Config) -> Result<Self, MediaPathsError> {
        let media_root = config
            .media_root()
            .ok_or(MediaPathsError::MediaRootUnset)?
            .to_path_buf();
        let lock_dir = config.lock_dir().to_path_buf();
        for dir in [&media_root, &lock_dir] {
            fs::create_dir_all(dir).map_err(|source| MediaPathsError::Prepare {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(Self {
            media_root,
            lock_dir,
        })
    }

    /// Directory holding one install tree per extension.
    #[must_use]
    pub fn media_root(&self) -> &Utf8Path {
        self.media_root.as_path()
    }

    /// Directory holding per-extension lock files.
    #[must_use]
    pub fn lock_dir(&self) -> &Utf8Path {
        self.lock_dir.as_path()
    }
}

/// Errors raised while deriving media paths.
#[derive(Debug, Error)]
pub enum MediaPathsError {
    /// The configuration does not name a media root.
    #[error("no media root configured; set `media_root` or disable `manage_media`")]
    MediaRootUnset,
    /// Creating a directory failed.
    #[error("failed to prepare media directory '{path}': {source}")]
    Prepare {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
