//! Resource kinds and scopes
//!
//! Every kind the engine manages maps onto one Compute Engine collection. The
//! table here is the single source of truth for collection names and the
//! scope each kind lives in.

use serde::Serialize;
use std::fmt;

/// Where a resource (and its operations) live
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    Regional(String),
    Zonal(String),
}

/// Scope without the location, used to validate descriptors against their kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeClass {
    Global,
    Regional,
    Zonal,
}

impl Scope {
    /// URL path segment (`global`, `regions/us-central1`, `zones/us-central1-a`)
    pub fn path(&self) -> String {
        match self {
            Scope::Global => "global".to_string(),
            Scope::Regional(region) => format!("regions/{}", region),
            Scope::Zonal(zone) => format!("zones/{}", zone),
        }
    }

    pub fn class(&self) -> ScopeClass {
        match self {
            Scope::Global => ScopeClass::Global,
            Scope::Regional(_) => ScopeClass::Regional,
            Scope::Zonal(_) => ScopeClass::Zonal,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Regional(region) => write!(f, "region {}", region),
            Scope::Zonal(zone) => write!(f, "zone {}", zone),
        }
    }
}

/// Resource kinds managed by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    Subnetwork,
    Firewall,
    HealthCheck,
    InstanceGroup,
    BackendService,
    ForwardingRule,
    ServiceAttachment,
    Address,
}

struct KindDef {
    kind: ResourceKind,
    collection: &'static str,
    display_name: &'static str,
    scope: ScopeClass,
}

const KINDS: &[KindDef] = &[
    KindDef {
        kind: ResourceKind::Network,
        collection: "networks",
        display_name: "network",
        scope: ScopeClass::Global,
    },
    KindDef {
        kind: ResourceKind::Subnetwork,
        collection: "subnetworks",
        display_name: "subnetwork",
        scope: ScopeClass::Regional,
    },
    KindDef {
        kind: ResourceKind::Firewall,
        collection: "firewalls",
        display_name: "firewall rule",
        scope: ScopeClass::Global,
    },
    KindDef {
        kind: ResourceKind::HealthCheck,
        collection: "healthChecks",
        display_name: "health check",
        scope: ScopeClass::Global,
    },
    KindDef {
        kind: ResourceKind::InstanceGroup,
        collection: "instanceGroups",
        display_name: "instance group",
        scope: ScopeClass::Zonal,
    },
    KindDef {
        kind: ResourceKind::BackendService,
        collection: "backendServices",
        display_name: "backend service",
        scope: ScopeClass::Regional,
    },
    KindDef {
        kind: ResourceKind::ForwardingRule,
        collection: "forwardingRules",
        display_name: "forwarding rule",
        scope: ScopeClass::Regional,
    },
    KindDef {
        kind: ResourceKind::ServiceAttachment,
        collection: "serviceAttachments",
        display_name: "service attachment",
        scope: ScopeClass::Regional,
    },
    KindDef {
        kind: ResourceKind::Address,
        collection: "addresses",
        display_name: "address",
        scope: ScopeClass::Regional,
    },
];

impl ResourceKind {
    fn def(self) -> &'static KindDef {
        // KINDS is declared in enum order
        &KINDS[self as usize]
    }

    /// Compute Engine collection name used in URLs
    pub fn collection(self) -> &'static str {
        self.def().collection
    }

    pub fn display_name(self) -> &'static str {
        self.def().display_name
    }

    /// Scope class the Compute API exposes this kind under
    pub fn scope_class(self) -> ScopeClass {
        self.def().scope
    }

    pub fn all() -> impl Iterator<Item = ResourceKind> {
        KINDS.iter().map(|d| d.kind)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_table_matches_enum_order() {
        for (idx, kind) in ResourceKind::all().enumerate() {
            assert_eq!(kind as usize, idx);
            assert_eq!(kind.def().kind, kind);
        }
    }

    #[test]
    fn test_scope_paths() {
        assert_eq!(Scope::Global.path(), "global");
        assert_eq!(Scope::Regional("us-east1".into()).path(), "regions/us-east1");
        assert_eq!(Scope::Zonal("us-east1-b".into()).path(), "zones/us-east1-b");
        assert_eq!(ResourceKind::ServiceAttachment.collection(), "serviceAttachments");
        assert_eq!(ResourceKind::InstanceGroup.scope_class(), ScopeClass::Zonal);
    }
}
