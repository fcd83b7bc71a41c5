//! Project-Config Projection
//!
//! Maps the untyped project configuration object handed over by the
//! external CLI layer onto a strongly typed intermediate, then onto engine
//! create-parameters. Each recognized key has its own typed projection
//! function; unrecognized keys are logged at `debug!`, never rejected.

use crate::errors::Result;
use crate::gpu::parse_gpu_spec;
use crate::island::{HealthCheck, Island};
use crate::mount::parse_volume_spec;
use crate::ports::parse_port_specs;
use crate::security::normalize_capabilities;
use indexmap::IndexMap;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const KNOWN_KEYS: &[&str] = &[
    "restart",
    "environment",
    "ports",
    "volumes",
    "dotfiles",
    "working_dir",
    "user",
    "capabilities",
    "labels",
    "network",
    "resources",
    "gpus",
    "health_check",
];

/// Typed projection of the project configuration mapping.
#[derive(Debug, Clone, Default)]
pub struct ProjectConfig {
    /// Restart policy name.
    pub restart: Option<String>,
    /// Environment variable overlay.
    pub environment: IndexMap<String, String>,
    /// Raw `host:container[/proto]` port specs, in declared order.
    pub ports: Vec<String>,
    /// Raw `src:dst[:mode]` volume specs, in declared order.
    pub volumes: Vec<String>,
    /// Host dotfile paths, in declared order.
    pub dotfiles: Vec<String>,
    /// Working directory override.
    pub working_dir: Option<String>,
    /// User override.
    pub user: Option<String>,
    /// Requested kernel capabilities.
    pub capabilities: Vec<String>,
    /// Label overlay.
    pub labels: IndexMap<String, String>,
    /// Network mode.
    pub network: Option<String>,
    /// CPU allotment, fractional cores.
    pub cpus: Option<f64>,
    /// Memory limit, human-readable (`512M`, `2G`).
    pub memory: Option<String>,
    /// Raw `gpus` value.
    pub gpus: Option<String>,
    /// Health-check projection.
    pub health_check: Option<HealthCheckSpec>,
}

/// Typed `health_check.*` projection.
#[derive(Debug, Clone, Default)]
pub struct HealthCheckSpec {
    /// Health-check command.
    pub test: Vec<String>,
    /// Interval between checks, in seconds.
    pub interval: Option<f64>,
    /// Per-check timeout, in seconds.
    pub timeout: Option<f64>,
    /// Retries before unhealthy.
    pub retries: Option<u32>,
}

impl ProjectConfig {
    /// Parse a project configuration from an untyped JSON mapping.
    /// Unrecognized keys are logged and otherwise ignored.
    pub fn from_json(value: &Value) -> Result<Self> {
        let mut config = ProjectConfig::default();

        let Some(map) = value.as_object() else {
            return Ok(config);
        };

        for key in map.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                debug!(key, "unrecognized project configuration key, ignoring");
            }
        }

        if let Some(v) = map.get("restart").and_then(Value::as_str) {
            config.restart = Some(v.to_string());
        }

        if let Some(env) = map.get("environment").and_then(Value::as_object) {
            for (k, v) in env {
                if let Some(s) = v.as_str() {
                    config.environment.insert(k.clone(), s.to_string());
                }
            }
        }

        config.ports = string_array(map.get("ports"));
        config.volumes = string_array(map.get("volumes"));
        config.dotfiles = string_array(map.get("dotfiles"));
        config.capabilities = string_array(map.get("capabilities"));

        if let Some(v) = map.get("working_dir").and_then(Value::as_str) {
            config.working_dir = Some(v.to_string());
        }
        if let Some(v) = map.get("user").and_then(Value::as_str) {
            config.user = Some(v.to_string());
        }
        if let Some(v) = map.get("network").and_then(Value::as_str) {
            config.network = Some(v.to_string());
        }

        if let Some(labels) = map.get("labels").and_then(Value::as_object) {
            for (k, v) in labels {
                if let Some(s) = v.as_str() {
                    config.labels.insert(k.clone(), s.to_string());
                }
            }
        }

        if let Some(resources) = map.get("resources").and_then(Value::as_object) {
            config.cpus = resources.get("cpus").and_then(numeric_reflect);
            config.memory = resources
                .get("memory")
                .and_then(Value::as_str)
                .map(String::from);
        }

        if let Some(v) = map.get("gpus") {
            config.gpus = match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            };
        }

        if let Some(hc) = map.get("health_check").and_then(Value::as_object) {
            config.health_check = Some(HealthCheckSpec {
                test: string_array(hc.get("test")),
                interval: hc.get("interval").and_then(numeric_reflect),
                timeout: hc.get("timeout").and_then(numeric_reflect),
                retries: hc
                    .get("retries")
                    .and_then(numeric_reflect)
                    .map(|r| r as u32),
            });
        }

        Ok(config)
    }

    /// Apply this configuration onto a mutable [`Island`], per the
    /// volume/port/dotfile/GPU/capability parsing rules.
    pub fn apply_to_island(&self, island: &mut Island) {
        if let Some(restart) = &self.restart {
            island.restart_policy = restart.clone();
        }

        for (k, v) in &self.environment {
            island.env.insert(k.clone(), v.clone());
        }

        for (k, v) in &self.labels {
            island.labels.insert(k.clone(), v.clone());
        }

        island.ports = parse_port_specs(&self.ports);

        for spec in &self.volumes {
            if let Some(mount) = parse_volume_spec(spec) {
                island.mounts.push(mount);
            }
        }

        island.mounts.extend(crate::dotfiles::resolve_dotfile_mounts(&self.dotfiles));

        if let Some(working_dir) = &self.working_dir {
            island.working_dir = working_dir.clone();
        }
        if let Some(user) = &self.user {
            island.user = Some(user.clone());
        }
        if let Some(network) = &self.network {
            island.network_mode = network.clone();
        }

        island.cap_add = normalize_capabilities(&self.capabilities);

        let mut resources = island.resources;
        if let Some(cpus) = self.cpus {
            resources.nano_cpus = (cpus * 1_000_000_000.0).round() as i64;
        }
        if let Some(memory) = &self.memory {
            if let Ok(bytes) = memory.parse::<bytesize::ByteSize>() {
                resources.memory_bytes = bytes.as_u64() as i64;
            }
        }
        island.resources = resources;

        if let Some(gpus) = &self.gpus {
            island.gpu = Some(parse_gpu_spec(gpus));
        }

        if let Some(hc) = &self.health_check {
            island.health = Some(HealthCheck {
                test: hc.test.clone(),
                interval: hc.interval.map(Duration::from_secs_f64),
                timeout: hc.timeout.map(Duration::from_secs_f64),
                retries: hc.retries,
            });
        }
    }
}

/// Accept either a JSON number or a numeric string (§9 reflection rule).
fn numeric_reflect(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::GpuRequest;
    use serde_json::json;

    #[test]
    fn test_from_json_full_mapping() {
        let value = json!({
            "restart": "always",
            "environment": {"FOO": "bar"},
            "ports": ["8080:80"],
            "volumes": ["/host:/container:ro"],
            "dotfiles": ["~/dotfiles"],
            "working_dir": "/app",
            "user": "dev",
            "capabilities": ["net_admin"],
            "labels": {"team": "platform"},
            "network": "bridge",
            "resources": {"cpus": "2", "memory": "512M"},
            "gpus": "all",
            "health_check": {"test": ["CMD", "true"], "interval": 5, "retries": "3"},
            "unknown_key": "ignored",
        });

        let config = ProjectConfig::from_json(&value).unwrap();
        assert_eq!(config.restart.as_deref(), Some("always"));
        assert_eq!(config.cpus, Some(2.0));
        assert_eq!(config.memory.as_deref(), Some("512M"));
        assert_eq!(config.gpus.as_deref(), Some("all"));
        assert_eq!(config.health_check.as_ref().unwrap().retries, Some(3));
    }

    #[test]
    fn test_numeric_reflection_accepts_number_or_string() {
        assert_eq!(numeric_reflect(&json!(3)), Some(3.0));
        assert_eq!(numeric_reflect(&json!("3")), Some(3.0));
        assert_eq!(numeric_reflect(&json!("not-a-number")), None);
    }

    #[test]
    fn test_apply_to_island_sets_resources_and_gpu() {
        let mut island = crate::island::Island {
            name: "coderaft_demo".to_string(),
            image: "coderaft-cache/demo:abc".to_string(),
            workspace_host: "/host".to_string(),
            workspace_island: "/island".to_string(),
            env: IndexMap::new(),
            labels: IndexMap::new(),
            resources: crate::island::Resources::default(),
            restart_policy: "unless-stopped".to_string(),
            mounts: Vec::new(),
            ports: Vec::new(),
            health: None,
            gpu: None,
            network_mode: "bridge".to_string(),
            cap_add: Vec::new(),
            working_dir: "/island".to_string(),
            user: None,
        };

        let config = ProjectConfig {
            cpus: Some(2.0),
            memory: Some("1G".to_string()),
            gpus: Some("all".to_string()),
            ..Default::default()
        };
        config.apply_to_island(&mut island);

        assert_eq!(island.resources.nano_cpus, 2_000_000_000);
        assert_eq!(island.resources.memory_bytes, 1_073_741_824);
        assert_eq!(island.gpu, Some(GpuRequest::All));
    }

    #[test]
    fn test_empty_json_produces_default_config() {
        let config = ProjectConfig::from_json(&json!({})).unwrap();
        assert!(config.environment.is_empty());
        assert!(config.ports.is_empty());
    }
}
