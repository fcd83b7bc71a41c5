//! Projection from bollard's raw inspect response to [`ContainerInfo`]

use super::ContainerInfo;
use crate::mount::{Mount, MountMode};
use crate::ports::PortBinding;
use bollard::models::ContainerInspectResponse;
use indexmap::IndexMap;

/// Project a raw container inspect response onto the engine-neutral
/// [`ContainerInfo`] shape described in the external-interfaces contract.
pub fn project_container_info(details: ContainerInspectResponse) -> ContainerInfo {
    let state = details.state.as_ref();
    let config = details.config.as_ref();
    let host_config = details.host_config.as_ref();

    let name = details
        .name
        .unwrap_or_default()
        .trim_start_matches('/')
        .to_string();

    let env = config
        .and_then(|c| c.env.as_ref())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<IndexMap<_, _>>()
        })
        .unwrap_or_default();

    let labels = config
        .and_then(|c| c.labels.clone())
        .map(|m| m.into_iter().collect::<IndexMap<_, _>>())
        .unwrap_or_default();

    let port_mappings = details
        .network_settings
        .as_ref()
        .and_then(|ns| ns.ports.as_ref())
        .map(|ports| {
            let mut out = Vec::new();
            for (cport_proto, bindings) in ports {
                let Some(bindings) = bindings else { continue };
                let Some((cport, proto)) = cport_proto.split_once('/') else {
                    continue;
                };
                let Ok(container_port) = cport.parse::<u16>() else {
                    continue;
                };
                for binding in bindings {
                    let host_ip = binding.host_ip.clone().unwrap_or_default();
                    let host_port = binding
                        .host_port
                        .as_ref()
                        .and_then(|p| p.parse::<u16>().ok())
                        .unwrap_or(0);
                    out.push((
                        PortBinding {
                            host_port,
                            container_port,
                            protocol: proto.to_string(),
                        },
                        host_ip,
                        host_port,
                    ));
                }
            }
            out
        })
        .unwrap_or_default();

    let mounts = details
        .mounts
        .as_ref()
        .map(|mounts| {
            mounts
                .iter()
                .filter_map(|m| {
                    Some(Mount {
                        source: m.source.clone()?,
                        target: m.destination.clone()?,
                        mode: if m.rw.unwrap_or(true) {
                            MountMode::ReadWrite
                        } else {
                            MountMode::ReadOnly
                        },
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    ContainerInfo {
        id: details.id.unwrap_or_default(),
        name,
        image: config.and_then(|c| c.image.clone()).unwrap_or_default(),
        status: state.and_then(|s| s.status).map(|s| s.to_string()).unwrap_or_default(),
        started_at: state.and_then(|s| s.started_at.clone()),
        port_mappings,
        mounts,
        env,
        working_dir: config.and_then(|c| c.working_dir.clone()).unwrap_or_default(),
        user: config.and_then(|c| c.user.clone()).unwrap_or_default(),
        labels,
        nano_cpus: host_config.and_then(|h| h.nano_cpus).unwrap_or(0),
        memory_bytes: host_config.and_then(|h| h.memory).unwrap_or(0),
        restart_policy: host_config
            .and_then(|h| h.restart_policy.as_ref())
            .and_then(|r| r.name)
            .map(|n| format!("{n:?}").to_lowercase().replace('_', "-"))
            .unwrap_or_default(),
        cap_add: host_config.and_then(|h| h.cap_add.clone()).unwrap_or_default(),
        network_mode: host_config.and_then(|h| h.network_mode.clone()).unwrap_or_default(),
        pids: 0,
    }
}
