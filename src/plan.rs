//! Provisioning plans
//!
//! A [`ProvisioningPlan`] is a validated, topologically ordered list of
//! descriptors. The order only depends on the dependency graph, never on the
//! order descriptors were added: among descriptors that are ready at the same
//! time, the one with the lower kind (then id) goes first.

use crate::error::{ProvisionError, Result};
use crate::resource::{ResourceDescriptor, ResourceKind, Scope};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Ordered, validated set of descriptors
#[derive(Debug, Clone)]
pub struct ProvisioningPlan {
    steps: Vec<ResourceDescriptor>,
}

impl ProvisioningPlan {
    /// Descriptors in creation order
    pub fn steps(&self) -> &[ResourceDescriptor] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ResourceDescriptor> {
        self.steps.iter().find(|d| d.id() == id)
    }

    /// Ids in creation order
    pub fn ids(&self) -> Vec<&str> {
        self.steps.iter().map(ResourceDescriptor::id).collect()
    }

    /// Descriptors in teardown order, the exact reverse of creation order
    pub fn teardown_order(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.steps.iter().rev()
    }
}

#[derive(Debug, Default)]
pub struct PlanBuilder {
    descriptors: Vec<ResourceDescriptor>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, descriptor: ResourceDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn extend(mut self, descriptors: impl IntoIterator<Item = ResourceDescriptor>) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    /// Validate the descriptors and order them
    ///
    /// Rejects duplicate ids, two descriptors for the same provider resource,
    /// scopes that do not fit the kind, missing dependencies and cycles.
    pub fn build(self) -> Result<ProvisioningPlan> {
        let mut by_id: HashMap<&str, &ResourceDescriptor> = HashMap::new();
        let mut resources: HashMap<(ResourceKind, &Scope, &str), &str> = HashMap::new();

        for desc in &self.descriptors {
            if by_id.insert(desc.id(), desc).is_some() {
                return Err(invalid(format!("duplicate descriptor id '{}'", desc.id())));
            }
            if let Some(other) = resources.insert((desc.kind(), desc.scope(), desc.name()), desc.id()) {
                return Err(invalid(format!(
                    "'{}' and '{}' both declare {} '{}' in {}",
                    other,
                    desc.id(),
                    desc.kind(),
                    desc.name(),
                    desc.scope()
                )));
            }
            if desc.scope().class() != desc.kind().scope_class() {
                return Err(invalid(format!(
                    "'{}': a {} cannot live in {}",
                    desc.id(),
                    desc.kind(),
                    desc.scope()
                )));
            }
        }

        // Kahn's algorithm; in-degree counts unmet dependencies
        let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for desc in &self.descriptors {
            let deps = desc.dependencies();
            for dep in &deps {
                if *dep == desc.id() {
                    return Err(invalid(format!("'{}' depends on itself", desc.id())));
                }
                if !by_id.contains_key(dep) {
                    return Err(invalid(format!(
                        "'{}' depends on '{}', which is not in the plan",
                        desc.id(),
                        dep
                    )));
                }
                dependents.entry(*dep).or_default().push(desc.id());
            }
            pending.insert(desc.id(), deps.len());
        }

        let rank = |id: &str| by_id.get(id).map(|d| d.kind());
        let mut ready: BTreeSet<(Option<ResourceKind>, &str)> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| (rank(*id), *id))
            .collect();

        let mut order = Vec::with_capacity(self.descriptors.len());
        while let Some(next) = ready.pop_first() {
            let id = next.1;
            order.push(id);
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(n) = pending.get_mut(dependent) {
                    *n -= 1;
                    if *n == 0 {
                        ready.insert((rank(*dependent), *dependent));
                    }
                }
            }
        }

        if order.len() != self.descriptors.len() {
            let stuck: Vec<&str> = pending
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(id, _)| *id)
                .collect();
            return Err(invalid(format!("dependency cycle among {}", stuck.join(", "))));
        }

        let steps = order
            .into_iter()
            .filter_map(|id| by_id.get(id).map(|d| (*d).clone()))
            .collect();
        Ok(ProvisioningPlan { steps })
    }
}

fn invalid(message: String) -> ProvisionError {
    ProvisionError::InvalidPlan(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{HealthCheckSpec, NetworkSpec, ResourceSpec, SubnetworkSpec};

    fn network(id: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(
            id,
            id,
            Scope::Global,
            ResourceSpec::Network(NetworkSpec {
                routing_mode: "REGIONAL".to_string(),
            }),
        )
    }

    fn subnet(id: &str, network: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(
            id,
            id,
            Scope::Regional("us-central1".to_string()),
            ResourceSpec::Subnetwork(SubnetworkSpec {
                network: network.into(),
                ip_cidr_range: "10.0.0.0/24".to_string(),
                purpose: None,
                private_ip_google_access: true,
            }),
        )
    }

    fn health_check(id: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(
            id,
            id,
            Scope::Global,
            ResourceSpec::HealthCheck(HealthCheckSpec {
                port: 8080,
                check_interval_sec: 10,
                timeout_sec: 5,
                healthy_threshold: 2,
                unhealthy_threshold: 3,
            }),
        )
    }

    #[test]
    fn test_dependencies_come_first() {
        let plan = PlanBuilder::new()
            .add(subnet("subnet", "net"))
            .add(network("net"))
            .build()
            .unwrap();
        assert_eq!(plan.ids(), vec!["net", "subnet"]);
        let teardown: Vec<_> = plan.teardown_order().map(|d| d.id()).collect();
        assert_eq!(teardown, vec!["subnet", "net"]);
    }

    #[test]
    fn test_missing_dependency_is_rejected() {
        let err = PlanBuilder::new().add(subnet("subnet", "net")).build().unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidPlan(msg) if msg.contains("'net'")));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let err = PlanBuilder::new()
            .add(health_check("a").depends_on("b"))
            .add(health_check("b").depends_on("a"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidPlan(msg) if msg.contains("cycle")));
    }

    #[test]
    fn test_self_dependency_is_rejected() {
        let err = PlanBuilder::new()
            .add(health_check("a").depends_on("a"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidPlan(_)));
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let err = PlanBuilder::new()
            .add(network("net"))
            .add(health_check("net"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidPlan(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn test_same_resource_twice_is_rejected() {
        let twin = ResourceDescriptor::new(
            "other",
            "net",
            Scope::Global,
            ResourceSpec::Network(NetworkSpec {
                routing_mode: "GLOBAL".to_string(),
            }),
        );
        assert!(PlanBuilder::new().add(network("net")).add(twin).build().is_err());
    }

    #[test]
    fn test_scope_must_match_kind() {
        let zonal_network = ResourceDescriptor::new(
            "net",
            "net",
            Scope::Zonal("us-central1-a".to_string()),
            ResourceSpec::Network(NetworkSpec {
                routing_mode: "REGIONAL".to_string(),
            }),
        );
        assert!(PlanBuilder::new().add(zonal_network).build().is_err());
    }

    #[test]
    fn test_independent_descriptors_order_by_kind_then_id() {
        let plan = PlanBuilder::new()
            .add(health_check("hc-b"))
            .add(network("net"))
            .add(health_check("hc-a"))
            .build()
            .unwrap();
        assert_eq!(plan.ids(), vec!["net", "hc-a", "hc-b"]);
    }
}
