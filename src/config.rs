//! Configuration Management
//!
//! Settings come from, highest precedence first: command-line flags, the
//! environment, the YAML config file, the active gcloud configuration, and
//! the built-in defaults below.

use crate::gcp::auth;
use crate::plan::ProvisioningPlan;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_REGION: &str = "us-central1";
pub const DEFAULT_ZONE: &str = "us-central1-a";

/// Provider (service producer) network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderNetwork {
    pub vpc: String,
    pub subnet: String,
    pub subnet_range: String,
    /// Subnet the service attachment NATs consumer traffic into
    pub psc_nat_subnet: String,
    pub psc_nat_subnet_range: String,
    /// Backend VM; created outside this tool. Empty for no group members.
    pub vm: String,
}

impl Default for ProviderNetwork {
    fn default() -> Self {
        Self {
            vpc: "hypershift-redhat".to_string(),
            subnet: "hypershift-redhat-subnet".to_string(),
            subnet_range: "10.1.0.0/24".to_string(),
            psc_nat_subnet: "hypershift-redhat-psc-nat".to_string(),
            psc_nat_subnet_range: "10.1.1.0/24".to_string(),
            vm: "redhat-service-vm".to_string(),
        }
    }
}

/// Consumer (customer) network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerNetwork {
    pub vpc: String,
    pub subnet: String,
    pub subnet_range: String,
}

impl Default for ConsumerNetwork {
    fn default() -> Self {
        Self {
            vpc: "hypershift-customer".to_string(),
            subnet: "hypershift-customer-subnet".to_string(),
            subnet_range: "10.2.0.0/24".to_string(),
        }
    }
}

/// Published service: health check, backend and internal load balancer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub port: u16,
    pub health_check: String,
    pub instance_group: String,
    pub backend_service: String,
    pub forwarding_rule: String,
    pub service_attachment: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            health_check: "redhat-service-health-check".to_string(),
            instance_group: "redhat-service-group".to_string(),
            backend_service: "redhat-backend-service".to_string(),
            forwarding_rule: "redhat-forwarding-rule".to_string(),
            service_attachment: "redhat-service-attachment".to_string(),
        }
    }
}

/// Consumer-side private endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// The reserved address is named `<name>-ip`
    pub name: String,
    pub forwarding_rule: String,
}

impl EndpointConfig {
    pub fn address_name(&self) -> String {
        format!("{}-ip", self.name)
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            name: "customer-psc-endpoint".to_string(),
            forwarding_rule: "customer-psc-forwarding-rule".to_string(),
        }
    }
}

/// User configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub project_id: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
    /// Give up watching a single operation after this many seconds
    pub operation_timeout_secs: Option<u64>,
    pub provider: ProviderNetwork,
    pub consumer: ConsumerNetwork,
    pub service: ServiceConfig,
    pub endpoint: EndpointConfig,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub project_id: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub operation_timeout_secs: Option<u64>,
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("psclink").join("config.yaml"))
    }

    /// Load configuration from `path`, or from the default location
    ///
    /// An explicit path must exist; a missing default file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply `PROJECT_ID`, `REGION` and `ZONE` as read by `lookup`
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(project) = non_empty("PROJECT_ID") {
            self.project_id = Some(project);
        }
        if let Some(region) = non_empty("REGION") {
            self.region = Some(region);
        }
        if let Some(zone) = non_empty("ZONE") {
            self.zone = Some(zone);
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(project) = &overrides.project_id {
            self.project_id = Some(project.clone());
        }
        if let Some(region) = &overrides.region {
            self.region = Some(region.clone());
        }
        if let Some(zone) = &overrides.zone {
            self.zone = Some(zone.clone());
        }
        if overrides.operation_timeout_secs.is_some() {
            self.operation_timeout_secs = overrides.operation_timeout_secs;
        }
    }

    /// Fill unset project, region and zone from the gcloud configuration
    ///
    /// A region not configured anywhere follows the zone.
    pub fn fill_from_gcloud(&mut self) {
        if self.project_id.is_none() {
            self.project_id = auth::get_default_project();
        }
        if self.zone.is_none() {
            self.zone = auth::get_default_zone();
        }
        if self.region.is_none() {
            self.region = auth::get_default_region()
                .or_else(|| self.zone.as_deref().map(auth::region_of_zone));
        }
    }

    /// File, environment, flags and gcloud combined, then validated
    pub fn resolve(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env();
        config.apply_overrides(overrides);
        config.fill_from_gcloud();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let Some(project) = self.project_id.as_deref() else {
            bail!("No GCP project configured. Set PROJECT_ID or use --project");
        };
        if !auth::validate_project_id(project) {
            bail!("Invalid project ID '{}'", project);
        }
        if !self.zone().starts_with(self.region()) {
            bail!("Zone '{}' is not in region '{}'", self.zone(), self.region());
        }
        if self.service.port == 0 {
            bail!("Service port must not be 0");
        }
        Ok(())
    }

    pub fn project(&self) -> &str {
        self.project_id.as_deref().unwrap_or_default()
    }

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    pub fn zone(&self) -> &str {
        self.zone.as_deref().unwrap_or(DEFAULT_ZONE)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }

    /// The standard provider + consumer plan
    pub fn plan(&self) -> Result<ProvisioningPlan> {
        crate::topology::psc_plan(self).context("Failed to build provisioning plan")
    }
}
