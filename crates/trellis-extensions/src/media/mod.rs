//! Static media installation with cross-process locking.
//!
//! An extension's packaged static assets are copied into a shared,
//! served-from-disk media root exactly once per version, even when several
//! worker processes start up and race to install simultaneously. A
//! per-extension version stamp makes repeat installs a no-op; an exclusive
//! create-new lock file serialises the writers while readers serving
//! already-installed files are never blocked.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;
use tracing::{debug, info, warn};

use trellis_config::{Config, MediaPaths, MediaPathsError};

use crate::error::ExtensionError;
use crate::manifest::ExtensionManifest;

/// Tracing target for media-install operations.
const MEDIA_TARGET: &str = "trellis_extensions::media";

/// Name of the per-extension version stamp file.
const VERSION_STAMP_FILE: &str = ".trellis-media-version";

/// Default number of lock-acquisition attempts before giving up.
const DEFAULT_LOCK_ATTEMPTS: u32 = 10;

/// Default sleep between lock-acquisition attempts.
const DEFAULT_LOCK_INTERVAL: Duration = Duration::from_millis(250);

/// Age beyond which a lock file is treated as left behind by a dead
/// process.
const DEFAULT_STALE_LOCK_AGE: Duration = Duration::from_secs(60);

/// Result of one install request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaInstallOutcome {
    /// The host does not manage media on disk; nothing was done.
    Disabled,
    /// The installed version already matches; nothing was copied.
    UpToDate,
    /// The media tree was copied and the stamp updated.
    Installed,
}

/// Copies extension media trees into the shared media root.
#[derive(Debug, Clone)]
pub struct MediaInstaller {
    enabled: bool,
    media_root: Utf8PathBuf,
    lock_dir: Utf8PathBuf,
    lock_attempts: u32,
    lock_interval: Duration,
    stale_lock_age: Duration,
}

impl MediaInstaller {
    /// Creates an installer that performs no work, for hosts serving media
    /// straight from source trees.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            media_root: Utf8PathBuf::new(),
            lock_dir: Utf8PathBuf::new(),
            lock_attempts: DEFAULT_LOCK_ATTEMPTS,
            lock_interval: DEFAULT_LOCK_INTERVAL,
            stale_lock_age: DEFAULT_STALE_LOCK_AGE,
        }
    }

    /// Creates an installer over prepared media paths.
    #[must_use]
    pub fn new(paths: &MediaPaths) -> Self {
        Self {
            enabled: true,
            media_root: paths.media_root().to_path_buf(),
            lock_dir: paths.lock_dir().to_path_buf(),
            lock_attempts: DEFAULT_LOCK_ATTEMPTS,
            lock_interval: DEFAULT_LOCK_INTERVAL,
            stale_lock_age: DEFAULT_STALE_LOCK_AGE,
        }
    }

    /// Derives an installer from the host configuration, disabled when the
    /// host does not manage media.
    ///
    /// # Errors
    ///
    /// Returns a [`MediaPathsError`] when media management is on but the
    /// directories cannot be prepared.
    pub fn from_config(config: &Config) -> Result<Self, MediaPathsError> {
        if !config.manage_media() {
            return Ok(Self::disabled());
        }
        Ok(Self::new(&MediaPaths::from_config(config)?))
    }

    /// Overrides the lock retry schedule; tests shorten it.
    #[must_use]
    pub const fn with_lock_retry(mut self, attempts: u32, interval: Duration) -> Self {
        self.lock_attempts = attempts;
        self.lock_interval = interval;
        self
    }

    /// Overrides the stale-lock age threshold.
    #[must_use]
    pub const fn with_stale_lock_age(mut self, age: Duration) -> Self {
        self.stale_lock_age = age;
        self
    }

    /// Whether this installer manages media at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Directory an extension's media is installed into.
    #[must_use]
    pub fn install_dir(&self, extension_id: &str) -> Utf8PathBuf {
        self.media_root.join("ext").join(extension_id)
    }

    /// Reads the installed version stamp for an extension.
    #[must_use]
    pub fn installed_version(&self, extension_id: &str) -> Option<String> {
        let stamp = self.install_dir(extension_id).join(VERSION_STAMP_FILE);
        let contents = fs::read_to_string(stamp.as_std_path()).ok()?;
        let trimmed = contents.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    }

    /// Installs an extension's media tree from `source`, exactly once per
    /// version.
    ///
    /// With `force`, the stamp check is bypassed and the tree is re-copied
    /// regardless of the recorded version.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::InstallMedia`] when the lock cannot be
    /// acquired within the retry budget or when the copy itself fails; the
    /// message names the path an administrator must make writable.
    pub fn install(
        &self,
        manifest: &ExtensionManifest,
        source: &Utf8Path,
        force: bool,
    ) -> Result<MediaInstallOutcome, ExtensionError> {
        if !self.enabled {
            return Ok(MediaInstallOutcome::Disabled);
        }
        let id = manifest.id();
        let version = manifest.version();

        if !force && self.installed_version(id).as_deref() == Some(version) {
            debug!(
                target: MEDIA_TARGET,
                extension = id,
                version,
                "media already current"
            );
            return Ok(MediaInstallOutcome::UpToDate);
        }

        let lock_path = self.lock_path(id);
        let mut attempts_left = self.lock_attempts;
        while attempts_left > 0 {
            match LockFile::acquire(&lock_path, self.stale_lock_age) {
                Ok(_lock) => {
                    // Another process may have completed the install while
                    // this one was waiting on the lock.
                    if !force && self.installed_version(id).as_deref() == Some(version) {
                        return Ok(MediaInstallOutcome::UpToDate);
                    }
                    self.copy_media(manifest, source)?;
                    info!(
                        target: MEDIA_TARGET,
                        extension = id,
                        version,
                        "media installed"
                    );
                    return Ok(MediaInstallOutcome::Installed);
                }
                Err(LockError::Contended) => {
                    if !force && self.installed_version(id).as_deref() == Some(version) {
                        return Ok(MediaInstallOutcome::UpToDate);
                    }
                    debug!(
                        target: MEDIA_TARGET,
                        extension = id,
                        lock = %lock_path,
                        "install lock contended; retrying"
                    );
                    attempts_left -= 1;
                    if attempts_left > 0 {
                        std::thread::sleep(self.lock_interval);
                    }
                }
                Err(LockError::Io(source_err)) => {
                    return Err(ExtensionError::InstallMedia {
                        id: id.to_owned(),
                        path: lock_path,
                        message: String::from("could not create the install lock file"),
                        source: Some(Arc::new(source_err)),
                    });
                }
            }
        }

        Err(ExtensionError::InstallMedia {
            id: id.to_owned(),
            path: lock_path,
            message: format!(
                "could not acquire the install lock after {} attempts",
                self.lock_attempts
            ),
            source: None,
        })
    }

    /// Removes an extension's installed media tree, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::InstallMedia`] when the tree exists but
    /// cannot be removed.
    pub fn uninstall(&self, extension_id: &str) -> Result<(), ExtensionError> {
        if !self.enabled {
            return Ok(());
        }
        let dir = self.install_dir(extension_id);
        match fs::remove_dir_all(dir.as_std_path()) {
            Ok(()) => {
                info!(
                    target: MEDIA_TARGET,
                    extension = extension_id,
                    "media uninstalled"
                );
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(ExtensionError::InstallMedia {
                id: extension_id.to_owned(),
                path: dir,
                message: String::from("could not remove the installed media tree"),
                source: Some(Arc::new(error)),
            }),
        }
    }

    /// Path of the per-extension lock file.
    fn lock_path(&self, extension_id: &str) -> Utf8PathBuf {
        self.lock_dir
            .join(format!("trellis-media-{extension_id}.lock"))
    }

    /// Replaces the install tree and writes the new version stamp, all
    /// while the caller holds the lock.
    fn copy_media(
        &self,
        manifest: &ExtensionManifest,
        source: &Utf8Path,
    ) -> Result<(), ExtensionError> {
        let id = manifest.id();
        let dest = self.install_dir(id);

        if let Err(error) = fs::remove_dir_all(dest.as_std_path())
            && error.kind() != io::ErrorKind::NotFound
        {
            return Err(media_io_error(
                id,
                dest,
                "could not remove the previous media tree",
                error,
            ));
        }
        fs::create_dir_all(dest.as_std_path())
            .map_err(|error| media_io_error(id, dest.clone(), "could not create the media directory", error))?;

        copy_tree(id, source, &dest)?;
        write_stamp(id, &dest, manifest.version())
    }
}

/// Builds an [`ExtensionError::InstallMedia`] from an I/O failure.
fn media_io_error(
    id: &str,
    path: Utf8PathBuf,
    message: &str,
    source: io::Error,
) -> ExtensionError {
    ExtensionError::InstallMedia {
        id: id.to_owned(),
        path,
        message: message.to_owned(),
        source: Some(Arc::new(source)),
    }
}

/// Recursively copies the packaged media tree into the install directory.
fn copy_tree(id: &str, source: &Utf8Path, dest: &Utf8Path) -> Result<(), ExtensionError> {
    let entries = fs::read_dir(source.as_std_path())
        .map_err(|error| media_io_error(id, source.to_path_buf(), "could not read the media source", error))?;
    for read in entries {
        let entry = read.map_err(|error| {
            media_io_error(id, source.to_path_buf(), "could not read the media source", error)
        })?;
        let raw_name = entry.file_name();
        let Some(name) = raw_name.to_str() else {
            // Non-UTF-8 names cannot be namespaced into bundle URLs.
            warn!(
                target: MEDIA_TARGET,
                extension = id,
                "skipping media entry with non-UTF-8 name"
            );
            continue;
        };
        let from = source.join(name);
        let to = dest.join(name);
        let file_type = entry.file_type().map_err(|error| {
            media_io_error(id, from.clone(), "could not inspect a media source entry", error)
        })?;
        if file_type.is_dir() {
            fs::create_dir_all(to.as_std_path()).map_err(|error| {
                media_io_error(id, to.clone(), "could not create a media subdirectory", error)
            })?;
            copy_tree(id, &from, &to)?;
        } else {
            fs::copy(from.as_std_path(), to.as_std_path()).map_err(|error| {
                media_io_error(id, to.clone(), "could not copy a media file", error)
            })?;
        }
    }
    Ok(())
}

/// Atomically writes the version stamp so readers never observe a torn
/// stamp.
fn write_stamp(id: &str, dest: &Utf8Path, version: &str) -> Result<(), ExtensionError> {
    let stamp_path = dest.join(VERSION_STAMP_FILE);
    let mut stamp = Builder::new()
        .prefix(VERSION_STAMP_FILE)
        .tempfile_in(dest.as_std_path())
        .map_err(|error| media_io_error(id, stamp_path.clone(), "could not stage the version stamp", error))?;
    writeln!(stamp, "{version}")
        .map_err(|error| media_io_error(id, stamp_path.clone(), "could not write the version stamp", error))?;
    stamp
        .as_file()
        .sync_all()
        .map_err(|error| media_io_error(id, stamp_path.clone(), "could not flush the version stamp", error))?;
    stamp
        .persist(stamp_path.as_std_path())
        .map_err(|error| media_io_error(id, stamp_path, "could not persist the version stamp", error.error))?;
    Ok(())
}

/// Error raised while acquiring the install lock.
enum LockError {
    /// Another installer holds the lock.
    Contended,
    /// The lock file could not be created for another reason.
    Io(io::Error),
}

/// Exclusive create-new lock file, removed on drop.
struct LockFile {
    path: Utf8PathBuf,
    _file: File,
}

impl LockFile {
    /// Attempts to acquire the lock without blocking.
    ///
    /// A lock file older than `stale_age` is treated as left behind by a
    /// dead process: it is removed and acquisition retried once.
    fn acquire(path: &Utf8Path, stale_age: Duration) -> Result<Self, LockError> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        match options.open(path.as_std_path()) {
            Ok(mut file) => {
                // Recorded for debugging; never read back programmatically.
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Self {
                    path: path.to_path_buf(),
                    _file: file,
                })
            }
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                if lock_is_stale(path, stale_age) {
                    warn!(
                        target: MEDIA_TARGET,
                        lock = %path,
                        "removing stale install lock"
                    );
                    match fs::remove_file(path.as_std_path()) {
                        Ok(()) => {}
                        Err(remove_error) if remove_error.kind() == io::ErrorKind::NotFound => {}
                        Err(remove_error) => return Err(LockError::Io(remove_error)),
                    }
                    return Self::acquire_fresh(path);
                }
                Err(LockError::Contended)
            }
            Err(error) => Err(LockError::Io(error)),
        }
    }

    /// Single acquisition attempt after stale-lock cleanup; a loss here is
    /// plain contention.
    fn acquire_fresh(path: &Utf8Path) -> Result<Self, LockError> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        match options.open(path.as_std_path()) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Self {
                    path: path.to_path_buf(),
                    _file: file,
                })
            }
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => Err(LockError::Contended),
            Err(error) => Err(LockError::Io(error)),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        match fs::remove_file(self.path.as_std_path()) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => {
                warn!(
                    target: MEDIA_TARGET,
                    lock = %self.path,
                    error = %error,
                    "failed to remove install lock"
                );
            }
            _ => {}
        }
    }
}

/// Whether a lock file is old enough to be considered abandoned.
fn lock_is_stale(path: &Utf8Path, stale_age: Duration) -> bool {
    let Ok(metadata) = fs::metadata(path.as_std_path()) else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .is_ok_and(|age| age > stale_age)
}

#[cfg(test)]
mod tests;
