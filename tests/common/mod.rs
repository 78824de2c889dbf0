//! Shared fixtures for integration tests

#![allow(dead_code)]

use psclink::config::Config;
use psclink::resource::{HealthCheckSpec, NetworkSpec, ResourceDescriptor, ResourceSpec, Scope, SubnetworkSpec};

pub const PROJECT: &str = "test-project";

pub fn config() -> Config {
    Config {
        project_id: Some(PROJECT.to_string()),
        ..Config::default()
    }
}

pub fn region() -> Scope {
    Scope::Regional("us-central1".to_string())
}

pub fn network(id: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(
        id,
        format!("{}-net", id),
        Scope::Global,
        ResourceSpec::Network(NetworkSpec {
            routing_mode: "REGIONAL".to_string(),
        }),
    )
}

pub fn subnet(id: &str, network: &str, range: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(
        id,
        format!("{}-subnet", id),
        region(),
        ResourceSpec::Subnetwork(SubnetworkSpec {
            network: network.into(),
            ip_cidr_range: range.to_string(),
            purpose: None,
            private_ip_google_access: true,
        }),
    )
}

pub fn health_check(id: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(
        id,
        format!("{}-hc", id),
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
