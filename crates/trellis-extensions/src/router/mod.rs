//! Mutable process-wide table of extension-owned URL mounts.
//!
//! The host's routing table is shared across the process and changes as
//! extensions enable and disable: a configuration page mount for
//! configurable extensions and an admin-site mount for extensions shipping
//! one. The router only tracks ownership and prefixes; request dispatch
//! stays with the host framework.

use serde::{Deserialize, Serialize};

/// Kind of mount an extension owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountKind {
    /// The extension's configuration page.
    Config,
    /// The extension's admin site.
    Admin,
}

impl MountKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Admin => "admin",
        }
    }
}

/// One mounted URL prefix owned by an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    owner: String,
    kind: MountKind,
    prefix: String,
}

impl Mount {
    /// Extension id owning the mount.
    #[must_use]
    pub const fn owner(&self) -> &str {
        self.owner.as_str()
    }

    /// Kind of the mount.
    #[must_use]
    pub const fn kind(&self) -> MountKind {
        self.kind
    }

    /// URL prefix the mount claims.
    #[must_use]
    pub const fn prefix(&self) -> &str {
        self.prefix.as_str()
    }
}

/// Process-wide table of extension-owned mounts.
#[derive(Debug, Clone, Default)]
pub struct DynamicRouter {
    mounts: Vec<Mount>,
}

impl DynamicRouter {
    /// Creates an empty router table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a mount for an extension. Reinstalling the same owner/kind
    /// pair replaces the previous prefix.
    pub fn install(&mut self, owner: impl Into<String>, kind: MountKind, prefix: impl Into<String>) {
        let claimant = owner.into();
        self.mounts
            .retain(|mount| !(mount.owner == claimant && mount.kind == kind));
        self.mounts.push(Mount {
            owner: claimant,
            kind,
            prefix: prefix.into(),
        });
    }

    /// Removes every mount owned by an extension, returning how many were
    /// removed.
    pub fn remove_owner(&mut self, owner: &str) -> usize {
        let before = self.mounts.len();
        self.mounts.retain(|mount| mount.owner != owner);
        before - self.mounts.len()
    }

    /// Returns all current mounts.
    #[must_use]
    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    /// Returns the mounts owned by one extension.
    #[must_use]
    pub fn mounts_for(&self, owner: &str) -> Vec<&Mount> {
        self.mounts
            .iter()
            .filter(|mount| mount.owner == owner)
            .collect()
    }

    /// Resolves a path to the longest matching mounted prefix.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&Mount> {
        self.mounts
            .iter()
            .filter(|mount| path.starts_with(mount.prefix()))
            .max_by_key(|mount| mount.prefix().len())
    }
}

#[cfg(test)]
mod tests;
