//! Unmanaged instance group convergence
//!
//! After the group exists, every configured VM must be a member and the named
//! ports must match. Both steps are additive: members are never removed and
//! ports are only written when they differ.

use super::Provisioner;
use crate::error::{ProvisionError, Result};
use crate::probe;
use crate::resource::{canonical_link, InstanceGroupSpec, NamedPort, ResourceDescriptor, ResourceKind};
use serde_json::{json, Value};

const KIND: ResourceKind = ResourceKind::InstanceGroup;

/// Instances from `wanted` that are not already members, compared by exact
/// canonical self link
pub fn missing_members<'w>(wanted: &'w [String], members: &[String]) -> Vec<&'w str> {
    wanted
        .iter()
        .map(String::as_str)
        .filter(|w| !members.iter().any(|m| canonical_link(m) == canonical_link(w)))
        .collect()
}

fn named_ports_of(group: &Value) -> Vec<NamedPort> {
    group
        .get("namedPorts")
        .and_then(|v| v.as_array())
        .map(|ports| {
            ports
                .iter()
                .filter_map(|p| {
                    let name = p.get("name")?.as_str()?.to_string();
                    let port = u16::try_from(p.get("port")?.as_u64()?).ok()?;
                    Some(NamedPort { name, port })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn same_ports(current: &[NamedPort], wanted: &[NamedPort]) -> bool {
    current.len() == wanted.len() && wanted.iter().all(|w| current.contains(w))
}

pub(super) async fn converge(
    provisioner: &Provisioner<'_>,
    descriptor: &ResourceDescriptor,
    spec: &InstanceGroupSpec,
) -> Result<()> {
    let api = provisioner.api;
    let scope = descriptor.scope();
    let name = descriptor.name();

    if !spec.instances.is_empty() {
        let members = api
            .list_group_instances(scope, name)
            .await
            .map_err(|e| ProvisionError::from_api(KIND, name, e))?;
        let missing = missing_members(&spec.instances, &members);

        if missing.is_empty() {
            tracing::debug!("All instances already in group {}", name);
        } else {
            tracing::info!("Adding {} instance(s) to group {}", missing.len(), name);
            let body = json!({
                "instances": missing.iter().map(|i| json!({ "instance": i })).collect::<Vec<_>>(),
            });
            let operation = api
                .invoke(KIND, scope, name, "addInstances", &body)
                .await
                .map_err(|e| ProvisionError::from_api(KIND, name, e))?;
            provisioner.waiter().settle(KIND, name, &operation).await?;
        }
    }

    if spec.named_ports.is_empty() {
        return Ok(());
    }

    let group = probe::fetch(api, KIND, scope, name)
        .await?
        .ok_or_else(|| ProvisionError::NotFound {
            kind: KIND,
            name: name.to_string(),
        })?;
    if same_ports(&named_ports_of(&group), &spec.named_ports) {
        return Ok(());
    }

    tracing::info!("Setting named ports on group {}", name);
    let mut body = json!({
        "namedPorts": spec
            .named_ports
            .iter()
            .map(|p| json!({ "name": p.name, "port": p.port }))
            .collect::<Vec<_>>(),
    });
    if let Some(fingerprint) = group.get("fingerprint") {
        body["fingerprint"] = fingerprint.clone();
    }
    let operation = api
        .invoke(KIND, scope, name, "setNamedPorts", &body)
        .await
        .map_err(|e| ProvisionError::from_api(KIND, name, e))?;
    provisioner.waiter().settle(KIND, name, &operation).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Backoff;
    use crate::provider::{InMemoryCompute, Verb};
    use crate::provision::Completed;
    use crate::resource::{ResourceSpec, Scope};

    #[test]
    fn test_missing_members_uses_exact_match() {
        let wanted = vec![
            "projects/p/zones/z/instances/vm".to_string(),
            "projects/p/zones/z/instances/vm-2".to_string(),
        ];
        let members = vec!["https://www.googleapis.com/compute/v1/projects/p/zones/z/instances/vm-2".to_string()];

        assert_eq!(missing_members(&wanted, &members), vec!["projects/p/zones/z/instances/vm"]);
    }

    #[test]
    fn test_named_port_order_is_irrelevant() {
        let a = vec![
            NamedPort { name: "http".into(), port: 8080 },
            NamedPort { name: "admin".into(), port: 9000 },
        ];
        let b = vec![a[1].clone(), a[0].clone()];
        assert!(same_ports(&a, &b));
        assert!(!same_ports(&a, &b[..1]));
    }

    #[tokio::test]
    async fn test_converge_is_idempotent() {
        let api = InMemoryCompute::new("test-project");
        let provisioner = Provisioner::new(&api, Backoff::default());
        let desc = ResourceDescriptor::new(
            "group",
            "redhat-service-group",
            Scope::Zonal("us-central1-a".to_string()),
            ResourceSpec::InstanceGroup(InstanceGroupSpec {
                instances: vec!["projects/test-project/zones/us-central1-a/instances/redhat-service-vm".to_string()],
                named_ports: vec![NamedPort {
                    name: "http".to_string(),
                    port: 8080,
                }],
            }),
        );

        provisioner.provision(&desc, &Completed::new()).await.unwrap();
        provisioner.provision(&desc, &Completed::new()).await.unwrap();

        let verbs: Vec<Verb> = api.mutations().await.into_iter().map(|c| c.verb).collect();
        assert_eq!(
            verbs,
            vec![
                Verb::Insert,
                Verb::Invoke("addInstances".to_string()),
                Verb::Invoke("setNamedPorts".to_string()),
            ]
        );
    }
}
