//! Compute request bodies per resource kind

use super::Resolver;
use crate::error::Result;
use crate::resource::{Direction, ResourceDescriptor, ResourceSpec};
use serde_json::{json, Map, Value};

/// Insert body for `descriptor`, with plan references resolved to self links
pub(super) fn creation_body(descriptor: &ResourceDescriptor, resolver: &Resolver<'_>) -> Result<Value> {
    let name = descriptor.name();

    let body = match descriptor.spec() {
        ResourceSpec::Network(spec) => json!({
            "name": name,
            "autoCreateSubnetworks": false,
            "routingConfig": { "routingMode": spec.routing_mode },
        }),

        ResourceSpec::Subnetwork(spec) => {
            let mut body = json!({
                "name": name,
                "network": resolver.link(&spec.network)?,
                "ipCidrRange": spec.ip_cidr_range,
                "privateIpGoogleAccess": spec.private_ip_google_access,
            });
            if let Some(purpose) = &spec.purpose {
                body["purpose"] = json!(purpose);
            }
            body
        }

        ResourceSpec::Firewall(spec) => {
            let allowed: Vec<Value> = spec
                .allowed
                .iter()
                .map(|a| {
                    let mut entry = Map::new();
                    entry.insert("IPProtocol".to_string(), json!(a.protocol));
                    if !a.ports.is_empty() {
                        entry.insert("ports".to_string(), json!(a.ports));
                    }
                    Value::Object(entry)
                })
                .collect();
            let ranges_field = match spec.direction {
                Direction::Ingress => "sourceRanges",
                Direction::Egress => "destinationRanges",
            };
            let mut body = json!({
                "name": name,
                "network": resolver.link(&spec.network)?,
                "description": spec.description,
                "direction": spec.direction.as_api_str(),
                "allowed": allowed,
            });
            body[ranges_field] = json!(spec.ranges);
            if !spec.target_tags.is_empty() {
                body["targetTags"] = json!(spec.target_tags);
            }
            body
        }

        ResourceSpec::HealthCheck(spec) => json!({
            "name": name,
            "type": "TCP",
            "tcpHealthCheck": { "port": spec.port },
            "checkIntervalSec": spec.check_interval_sec,
            "timeoutSec": spec.timeout_sec,
            "healthyThreshold": spec.healthy_threshold,
            "unhealthyThreshold": spec.unhealthy_threshold,
        }),

        // Members and named ports are converged after creation
        ResourceSpec::InstanceGroup(_) => json!({ "name": name }),

        // Backends are attached after creation by read-modify-write
        ResourceSpec::BackendService(spec) => {
            let mut body = json!({
                "name": name,
                "protocol": spec.protocol,
                "loadBalancingScheme": spec.load_balancing_scheme,
                "healthChecks": [resolver.link(&spec.health_check)?],
            });
            if let Some(network) = &spec.network {
                body["network"] = json!(resolver.link(network)?);
            }
            body
        }

        ResourceSpec::InternalForwardingRule(spec) => {
            let mut body = json!({
                "name": name,
                "loadBalancingScheme": "INTERNAL",
                "IPProtocol": "TCP",
                "backendService": resolver.link(&spec.backend_service)?,
                "subnetwork": resolver.link(&spec.subnetwork)?,
                "ports": spec.ports,
            });
            if let Some(network) = &spec.network {
                body["network"] = json!(resolver.link(network)?);
            }
            body
        }

        ResourceSpec::ServiceAttachment(spec) => {
            let nat_subnets = spec
                .nat_subnets
                .iter()
                .map(|s| resolver.link(s))
                .collect::<Result<Vec<_>>>()?;
            json!({
                "name": name,
                "producerForwardingRule": resolver.link(&spec.producer_forwarding_rule)?,
                "connectionPreference": spec.connection_preference,
                "natSubnets": nat_subnets,
                "enableProxyProtocol": spec.enable_proxy_protocol,
            })
        }

        ResourceSpec::Address(spec) => {
            let mut body = json!({
                "name": name,
                "addressType": spec.address_type,
                "subnetwork": resolver.link(&spec.subnetwork)?,
            });
            if let Some(address) = &spec.address {
                body["address"] = json!(address);
            }
            body
        }

        ResourceSpec::ConsumerEndpoint(spec) => {
            let mut body = json!({
                "name": name,
                "IPAddress": resolver.link(&spec.address)?,
                "target": resolver.link(&spec.service_attachment)?,
                "network": resolver.link(&spec.network)?,
            });
            if let Some(subnetwork) = &spec.subnetwork {
                body["subnetwork"] = json!(resolver.link(subnetwork)?);
            }
            body
        }
    };

    Ok(body)
}
