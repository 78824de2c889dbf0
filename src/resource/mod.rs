//! Resource model
//!
//! This module describes the resources the engine manages, independent of
//! how they are created.
//!
//! # Architecture
//!
//! - [`kind`] - Resource kinds, their Compute collections and scopes
//! - [`spec`] - Descriptors and typed creation parameters
//!
//! Resource self links are compared in canonical form, see [`canonical_link`].

mod kind;
mod spec;

pub use kind::{ResourceKind, Scope, ScopeClass};
pub use spec::*;

use crate::gcp::client::SELF_LINK_PREFIX;

/// Strip the API host prefix from a Compute self link
///
/// Compute returns fully qualified `https://www.googleapis.com/compute/v1/...`
/// links but accepts and sometimes echoes the relative `projects/...` form.
/// Canonical links are compared with plain equality, never containment.
pub fn canonical_link(link: &str) -> &str {
    let link = link
        .strip_prefix(SELF_LINK_PREFIX)
        .or_else(|| link.strip_prefix("https://compute.googleapis.com/compute/v1/"))
        .unwrap_or(link);
    link.trim_start_matches('/')
}

/// Extract the last path segment of a self link
/// e.g. `.../regions/us-central1/addresses/ip` -> `ip`
pub fn short_name(link: &str) -> &str {
    link.rsplit('/').next().unwrap_or(link)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_link_forms_are_equal() {
        let full = "https://www.googleapis.com/compute/v1/projects/p/zones/z/instanceGroups/g";
        let relative = "projects/p/zones/z/instanceGroups/g";
        assert_eq!(canonical_link(full), canonical_link(relative));
    }

    #[test]
    fn test_canonical_link_is_not_containment() {
        let a = canonical_link("projects/p/zones/z/instanceGroups/group");
        let b = canonical_link("projects/p/zones/z/instanceGroups/group-2");
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("projects/p/regions/r/addresses/ip"), "ip");
        assert_eq!(short_name("plain"), "plain");
    }
}
