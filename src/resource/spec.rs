//! Resource descriptors
//!
//! A [`ResourceDescriptor`] is the immutable declaration of one resource in a
//! plan: what kind it is, what it is called, where it lives, and the typed
//! parameters needed to create it. Parameters that point at other plan
//! members are [`ResourceRef`]s; the dependency graph is derived from them.

use super::kind::{ResourceKind, Scope};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Reference to another descriptor in the same plan, by id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceRef(String);

impl ResourceRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceRef {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ingress,
    Egress,
}

impl Direction {
    pub fn as_api_str(self) -> &'static str {
        match self {
            Direction::Ingress => "INGRESS",
            Direction::Egress => "EGRESS",
        }
    }
}

/// One `allowed` entry of a firewall rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallAllow {
    pub protocol: String,
    pub ports: Vec<String>,
}

impl FirewallAllow {
    pub fn all() -> Self {
        Self {
            protocol: "all".to_string(),
            ports: Vec::new(),
        }
    }

    pub fn tcp(ports: &[&str]) -> Self {
        Self {
            protocol: "tcp".to_string(),
            ports: ports.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedPort {
    pub name: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct NetworkSpec {
    pub routing_mode: String,
}

#[derive(Debug, Clone)]
pub struct SubnetworkSpec {
    pub network: ResourceRef,
    pub ip_cidr_range: String,
    /// e.g. `PRIVATE_SERVICE_CONNECT` for a service attachment NAT subnet
    pub purpose: Option<String>,
    pub private_ip_google_access: bool,
}

#[derive(Debug, Clone)]
pub struct FirewallSpec {
    pub network: ResourceRef,
    pub description: String,
    pub direction: Direction,
    /// Source ranges for ingress rules, destination ranges for egress rules
    pub ranges: Vec<String>,
    pub allowed: Vec<FirewallAllow>,
    pub target_tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HealthCheckSpec {
    pub port: u16,
    pub check_interval_sec: u32,
    pub timeout_sec: u32,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

#[derive(Debug, Clone)]
pub struct InstanceGroupSpec {
    /// Self links of VM instances; the VMs themselves are managed elsewhere
    pub instances: Vec<String>,
    pub named_ports: Vec<NamedPort>,
}

#[derive(Debug, Clone)]
pub struct BackendServiceSpec {
    pub health_check: ResourceRef,
    pub backends: Vec<ResourceRef>,
    pub protocol: String,
    pub load_balancing_scheme: String,
    pub network: Option<ResourceRef>,
}

/// Producer-side internal load balancer frontend
#[derive(Debug, Clone)]
pub struct InternalForwardingRuleSpec {
    pub backend_service: ResourceRef,
    pub network: Option<ResourceRef>,
    pub subnetwork: ResourceRef,
    pub ports: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ServiceAttachmentSpec {
    pub producer_forwarding_rule: ResourceRef,
    pub nat_subnets: Vec<ResourceRef>,
    pub connection_preference: String,
    pub enable_proxy_protocol: bool,
}

#[derive(Debug, Clone)]
pub struct AddressSpec {
    pub subnetwork: ResourceRef,
    pub address_type: String,
    /// Pin a specific IP instead of letting the provider allocate one
    pub address: Option<String>,
}

/// Consumer-side forwarding rule that tunnels to a service attachment
#[derive(Debug, Clone)]
pub struct ConsumerEndpointSpec {
    pub address: ResourceRef,
    pub service_attachment: ResourceRef,
    pub network: ResourceRef,
    pub subnetwork: Option<ResourceRef>,
}

/// Typed creation parameters
#[derive(Debug, Clone)]
pub enum ResourceSpec {
    Network(NetworkSpec),
    Subnetwork(SubnetworkSpec),
    Firewall(FirewallSpec),
    HealthCheck(HealthCheckSpec),
    InstanceGroup(InstanceGroupSpec),
    BackendService(BackendServiceSpec),
    InternalForwardingRule(InternalForwardingRuleSpec),
    ServiceAttachment(ServiceAttachmentSpec),
    Address(AddressSpec),
    ConsumerEndpoint(ConsumerEndpointSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Network(_) => ResourceKind::Network,
            ResourceSpec::Subnetwork(_) => ResourceKind::Subnetwork,
            ResourceSpec::Firewall(_) => ResourceKind::Firewall,
            ResourceSpec::HealthCheck(_) => ResourceKind::HealthCheck,
            ResourceSpec::InstanceGroup(_) => ResourceKind::InstanceGroup,
            ResourceSpec::BackendService(_) => ResourceKind::BackendService,
            ResourceSpec::InternalForwardingRule(_) | ResourceSpec::ConsumerEndpoint(_) => {
                ResourceKind::ForwardingRule
            }
            ResourceSpec::ServiceAttachment(_) => ResourceKind::ServiceAttachment,
            ResourceSpec::Address(_) => ResourceKind::Address,
        }
    }

    /// Every plan member these parameters point at
    pub fn references(&self) -> Vec<&ResourceRef> {
        match self {
            ResourceSpec::Network(_) | ResourceSpec::HealthCheck(_) | ResourceSpec::InstanceGroup(_) => {
                Vec::new()
            }
            ResourceSpec::Subnetwork(s) => vec![&s.network],
            ResourceSpec::Firewall(f) => vec![&f.network],
            ResourceSpec::BackendService(b) => {
                let mut refs = vec![&b.health_check];
                refs.extend(b.backends.iter());
                refs.extend(b.network.iter());
                refs
            }
            ResourceSpec::InternalForwardingRule(r) => {
                let mut refs = vec![&r.backend_service, &r.subnetwork];
                refs.extend(r.network.iter());
                refs
            }
            ResourceSpec::ServiceAttachment(s) => {
                let mut refs = vec![&s.producer_forwarding_rule];
                refs.extend(s.nat_subnets.iter());
                refs
            }
            ResourceSpec::Address(a) => vec![&a.subnetwork],
            ResourceSpec::ConsumerEndpoint(c) => {
                let mut refs = vec![&c.address, &c.service_attachment, &c.network];
                refs.extend(c.subnetwork.iter());
                refs
            }
        }
    }
}

/// Immutable declaration of one resource in a plan
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    id: String,
    name: String,
    scope: Scope,
    spec: ResourceSpec,
    depends_on: Vec<ResourceRef>,
}

impl ResourceDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, scope: Scope, spec: ResourceSpec) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            scope,
            spec,
            depends_on: Vec::new(),
        }
    }

    /// Add an ordering edge that is not expressed by a parameter reference
    pub fn depends_on(mut self, dependency: impl Into<ResourceRef>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }

    /// Ids of every descriptor that must be DONE before this one
    pub fn dependencies(&self) -> BTreeSet<&str> {
        self.spec
            .references()
            .into_iter()
            .chain(self.depends_on.iter())
            .map(ResourceRef::id)
            .collect()
    }
}
