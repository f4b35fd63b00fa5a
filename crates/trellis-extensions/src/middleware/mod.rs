//! Effective middleware chain recomputation.
//!
//! The host's middleware chain is not static: whenever the enabled set
//! changes, the chain is recomputed from the enabled extensions' manifests.
//! A depth-first walk of each extension's requirement graph visits every
//! extension at most once, dependencies before dependents, so a
//! dependency's middleware always precedes its dependent's in the final
//! ordering.

use std::collections::{HashMap, HashSet};

use crate::manifest::ExtensionManifest;

/// Computes the ordered middleware chain for the given enabled extensions.
///
/// `enabled_order` lists enabled extension ids in enable order; `manifests`
/// maps ids to their manifests. Ids without a manifest entry are skipped
/// (they can appear transiently during a reload). Requirement cycles are
/// tolerated here — the visited set terminates the walk — because enable
/// rejects them before they can reach this point.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
/// use trellis_extensions::middleware::effective_middleware;
/// use trellis_extensions::{ExtensionManifest, ExtensionMetadata};
///
/// let parent = ExtensionManifest::new(ExtensionMetadata::new("parent", "P", "1.0.0", "ACME"))
///     .with_middleware(vec!["M1".into()]);
/// let child = ExtensionManifest::new(ExtensionMetadata::new("child", "C", "1.0.0", "ACME"))
///     .with_requirements(vec!["parent".into()])
///     .with_middleware(vec!["M2".into()]);
/// let manifests: HashMap<String, ExtensionManifest> = [
///     ("parent".to_owned(), parent),
///     ("child".to_owned(), child),
/// ]
/// .into();
///
/// let chain = effective_middleware(
///     &["child".to_owned(), "parent".to_owned()],
///     &manifests,
/// );
/// assert_eq!(chain, ["M1", "M2"]);
/// ```
#[must_use]
pub fn effective_middleware(
    enabled_order: &[String],
    manifests: &HashMap<String, ExtensionManifest>,
) -> Vec<String> {
    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    for id in enabled_order {
        visit(id, manifests, &mut visited, &mut chain);
    }
    chain
}

/// Appends `id`'s middleware after its requirements', once per id.
fn visit(
    id: &str,
    manifests: &HashMap<String, ExtensionManifest>,
    visited: &mut HashSet<String>,
    chain: &mut Vec<String>,
) {
    if !visited.insert(id.to_owned()) {
        return;
    }
    let Some(manifest) = manifests.get(id) else {
        return;
    };
    for requirement in manifest.requirements() {
        visit(requirement, manifests, visited, chain);
    }
    chain.extend(manifest.middleware().iter().cloned());
}
