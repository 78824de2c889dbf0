//! The standard Private Service Connect topology
//!
//! Two isolated networks. The provider network hosts a health-checked
//! backend behind an internal load balancer, published through a service
//! attachment. The consumer network reaches it through a reserved internal
//! address and a forwarding rule that targets the attachment.

use crate::config::Config;
use crate::error::Result;
use crate::plan::{PlanBuilder, ProvisioningPlan};
use crate::resource::{
    AddressSpec, BackendServiceSpec, ConsumerEndpointSpec, Direction, FirewallAllow, FirewallSpec,
    HealthCheckSpec, InstanceGroupSpec, InternalForwardingRuleSpec, NamedPort, NetworkSpec,
    ResourceDescriptor, ResourceSpec, Scope, ServiceAttachmentSpec, SubnetworkSpec,
};

/// Source ranges of Google's load balancer health checkers
pub const HEALTH_CHECK_RANGES: &[&str] = &["130.211.0.0/22", "35.191.0.0/16"];

const PROVIDER_VPC: &str = "provider-vpc";
const PROVIDER_SUBNET: &str = "provider-subnet";
const PSC_NAT_SUBNET: &str = "psc-nat-subnet";
const CONSUMER_VPC: &str = "consumer-vpc";
const CONSUMER_SUBNET: &str = "consumer-subnet";
const HEALTH_CHECK: &str = "health-check";
const INSTANCE_GROUP: &str = "instance-group";
const BACKEND_SERVICE: &str = "backend-service";
const FORWARDING_RULE: &str = "forwarding-rule";
const SERVICE_ATTACHMENT: &str = "service-attachment";
const ENDPOINT_ADDRESS: &str = "endpoint-address";
const ENDPOINT_RULE: &str = "endpoint-rule";

struct Rule<'a> {
    suffix: &'a str,
    description: &'a str,
    direction: Direction,
    ranges: Vec<String>,
    allowed: Vec<FirewallAllow>,
}

fn network(id: &str, name: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(
        id,
        name,
        Scope::Global,
        ResourceSpec::Network(NetworkSpec {
            routing_mode: "REGIONAL".to_string(),
        }),
    )
}

fn subnet(id: &str, name: &str, region: &Scope, network: &str, range: &str, purpose: Option<&str>) -> ResourceDescriptor {
    ResourceDescriptor::new(
        id,
        name,
        region.clone(),
        ResourceSpec::Subnetwork(SubnetworkSpec {
            network: network.into(),
            ip_cidr_range: range.to_string(),
            purpose: purpose.map(str::to_string),
            // Not allowed on PRIVATE_SERVICE_CONNECT subnets
            private_ip_google_access: purpose.is_none(),
        }),
    )
}

fn firewalls<'a>(network_id: &'a str, vpc: &'a str, rules: Vec<Rule<'a>>) -> impl Iterator<Item = ResourceDescriptor> + 'a {
    rules.into_iter().map(move |rule| {
        let name = format!("{}-{}", vpc, rule.suffix);
        ResourceDescriptor::new(
            format!("{}-fw-{}", network_id, rule.suffix),
            name,
            Scope::Global,
            ResourceSpec::Firewall(FirewallSpec {
                network: network_id.into(),
                description: rule.description.to_string(),
                direction: rule.direction,
                ranges: rule.ranges,
                allowed: rule.allowed,
                target_tags: Vec::new(),
            }),
        )
    })
}

fn ingress<'a>(suffix: &'a str, description: &'a str, ranges: &[&str], allowed: FirewallAllow) -> Rule<'a> {
    Rule {
        suffix,
        description,
        direction: Direction::Ingress,
        ranges: ranges.iter().map(|r| r.to_string()).collect(),
        allowed: vec![allowed],
    }
}

fn allow_egress<'a>() -> Rule<'a> {
    Rule {
        suffix: "allow-egress",
        description: "Allow all egress traffic",
        direction: Direction::Egress,
        ranges: vec!["0.0.0.0/0".to_string()],
        allowed: vec![FirewallAllow::all()],
    }
}

/// Build the plan for `config`
pub fn psc_plan(config: &Config) -> Result<ProvisioningPlan> {
    let region = Scope::Regional(config.region().to_string());
    let zone = Scope::Zonal(config.zone().to_string());
    let provider = &config.provider;
    let consumer = &config.consumer;
    let service = &config.service;
    let port = service.port.to_string();

    let provider_rules = vec![
        ingress(
            "allow-health-checks",
            "Allow health checks from Google's health check ranges",
            HEALTH_CHECK_RANGES,
            FirewallAllow::tcp(&[]),
        ),
        ingress(
            "allow-http",
            "Allow HTTP traffic for the service",
            &[provider.subnet_range.as_str()],
            FirewallAllow::tcp(&["80", port.as_str()]),
        ),
        ingress(
            "allow-ssh",
            "Allow SSH for management",
            &["0.0.0.0/0"],
            FirewallAllow::tcp(&["22"]),
        ),
        ingress(
            "allow-psc-nat",
            "Allow PSC NAT subnet traffic to reach the service",
            &[provider.psc_nat_subnet_range.as_str()],
            FirewallAllow::tcp(&[port.as_str()]),
        ),
        allow_egress(),
    ];
    let consumer_rules = vec![
        ingress(
            "allow-internal",
            "Allow internal communication within the consumer network",
            &[consumer.subnet_range.as_str()],
            FirewallAllow::all(),
        ),
        ingress(
            "allow-ssh",
            "Allow SSH for management",
            &["0.0.0.0/0"],
            FirewallAllow::tcp(&["22"]),
        ),
        allow_egress(),
    ];

    let instances = if provider.vm.is_empty() {
        Vec::new()
    } else {
        vec![format!(
            "projects/{}/zones/{}/instances/{}",
            config.project(),
            config.zone(),
            provider.vm
        )]
    };

    PlanBuilder::new()
        .add(network(PROVIDER_VPC, &provider.vpc))
        .add(subnet(
            PROVIDER_SUBNET,
            &provider.subnet,
            &region,
            PROVIDER_VPC,
            &provider.subnet_range,
            None,
        ))
        .add(subnet(
            PSC_NAT_SUBNET,
            &provider.psc_nat_subnet,
            &region,
            PROVIDER_VPC,
            &provider.psc_nat_subnet_range,
            Some("PRIVATE_SERVICE_CONNECT"),
        ))
        .extend(firewalls(PROVIDER_VPC, &provider.vpc, provider_rules))
        .add(network(CONSUMER_VPC, &consumer.vpc))
        .add(subnet(
            CONSUMER_SUBNET,
            &consumer.subnet,
            &region,
            CONSUMER_VPC,
            &consumer.subnet_range,
            None,
        ))
        .extend(firewalls(CONSUMER_VPC, &consumer.vpc, consumer_rules))
        .add(ResourceDescriptor::new(
            HEALTH_CHECK,
            &service.health_check,
            Scope::Global,
            ResourceSpec::HealthCheck(HealthCheckSpec {
                port: service.port,
                check_interval_sec: 10,
                timeout_sec: 5,
                healthy_threshold: 2,
                unhealthy_threshold: 3,
            }),
        ))
        .add(ResourceDescriptor::new(
            INSTANCE_GROUP,
            &service.instance_group,
            zone,
            ResourceSpec::InstanceGroup(InstanceGroupSpec {
                instances,
                named_ports: vec![NamedPort {
                    name: "http".to_string(),
                    port: service.port,
                }],
            }),
        ))
        .add(ResourceDescriptor::new(
            BACKEND_SERVICE,
            &service.backend_service,
            region.clone(),
            ResourceSpec::BackendService(BackendServiceSpec {
                health_check: HEALTH_CHECK.into(),
                backends: vec![INSTANCE_GROUP.into()],
                protocol: "TCP".to_string(),
                load_balancing_scheme: "INTERNAL".to_string(),
                network: None,
            }),
        ))
        .add(ResourceDescriptor::new(
            FORWARDING_RULE,
            &service.forwarding_rule,
            region.clone(),
            ResourceSpec::InternalForwardingRule(InternalForwardingRuleSpec {
                backend_service: BACKEND_SERVICE.into(),
                network: None,
                subnetwork: PROVIDER_SUBNET.into(),
                ports: vec![port.clone()],
            }),
        ))
        .add(ResourceDescriptor::new(
            SERVICE_ATTACHMENT,
            &service.service_attachment,
            region.clone(),
            ResourceSpec::ServiceAttachment(ServiceAttachmentSpec {
                producer_forwarding_rule: FORWARDING_RULE.into(),
                nat_subnets: vec![PSC_NAT_SUBNET.into()],
                connection_preference: "ACCEPT_AUTOMATIC".to_string(),
                enable_proxy_protocol: false,
            }),
        ))
        .add(ResourceDescriptor::new(
            ENDPOINT_ADDRESS,
            config.endpoint.address_name(),
            region.clone(),
            ResourceSpec::Address(AddressSpec {
                subnetwork: CONSUMER_SUBNET.into(),
                address_type: "INTERNAL".to_string(),
                address: None,
            }),
        ))
        .add(ResourceDescriptor::new(
            ENDPOINT_RULE,
            &config.endpoint.forwarding_rule,
            region,
            ResourceSpec::ConsumerEndpoint(ConsumerEndpointSpec {
                address: ENDPOINT_ADDRESS.into(),
                service_attachment: SERVICE_ATTACHMENT.into(),
                network: CONSUMER_VPC.into(),
                subnetwork: Some(CONSUMER_SUBNET.into()),
            }),
        ))
        .build()
}
