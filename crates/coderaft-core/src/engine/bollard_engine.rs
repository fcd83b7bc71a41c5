//! Bollard-backed [`Engine`] implementation
//!
//! Talks to the container engine daemon's HTTP API directly via `bollard`,
//! following the `Command`-wrapper-around-`CreateExecOptions` and
//! `LogOutput` demuxing pattern used for Docker exec streaming in
//! `pantsbuild/pants`'s remote-execution runner.

use super::{ContainerInfo, Engine, ExecResult, PullProgress};
use crate::engine::stats::{self, ContainerStatsSummary};
use crate::errors::{CoderaftError, Result};
use crate::gpu::GpuRequest;
use crate::island::{HealthCheck, Island, TMPFS_SIZE_BYTES};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StatsOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{BuildImageOptions, CreateImageOptions, ImportImageOptions, ListImagesOptions};
use bollard::models::{DeviceRequest, HealthConfig, HostConfig, Mount as BollardMount, MountTypeEnum, PortBinding as BollardPortBinding, RestartPolicy, RestartPolicyNameEnum, TmpfsOptions};
use bollard::Docker;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// Engine adapter backed by a live daemon connection.
pub struct BollardEngine {
    docker: Docker,
}

impl BollardEngine {
    /// Connect to the daemon using the platform's default socket/pipe.
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            CoderaftError::EngineUnavailable {
                message: e.to_string(),
            }
        })?;
        Ok(Self { docker })
    }

    fn not_found(err: &bollard::errors::Error) -> bool {
        matches!(
            err,
            bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == 404
        )
    }
}

#[async_trait]
impl Engine for BollardEngine {
    #[instrument(skip(self))]
    async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| CoderaftError::EngineUnavailable {
                message: e.to_string(),
            })
    }

    #[instrument(skip(self))]
    async fn image_exists(&self, reference: &str) -> Result<bool> {
        let mut filters = HashMap::new();
        filters.insert("reference".to_string(), vec![reference.to_string()]);
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|e| CoderaftError::EngineUnavailable {
                message: e.to_string(),
            })?;
        Ok(!images.is_empty())
    }

    #[instrument(skip(self))]
    async fn image_list(&self, repository_prefix: &str) -> Result<Vec<String>> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await
            .map_err(|e| CoderaftError::EngineUnavailable {
                message: e.to_string(),
            })?;

        let mut matching = Vec::new();
        for image in images {
            for repo_tag in image.repo_tags {
                if repo_tag.starts_with(repository_prefix) {
                    matching.push(repo_tag);
                }
            }
        }
        Ok(matching)
    }

    #[instrument(skip(self))]
    async fn image_remove(&self, reference: &str) -> Result<()> {
        self.docker
            .remove_image(reference, None, None)
            .await
            .map(|_| ())
            .map_err(|e| CoderaftError::EngineUnavailable {
                message: e.to_string(),
            })
    }

    #[instrument(skip(self))]
    async fn image_pull(&self, reference: &str) -> Result<BoxStream<'static, PullProgress>> {
        let options = CreateImageOptions::<String> {
            from_image: reference.to_string(),
            ..Default::default()
        };
        let stream = self.docker.create_image(Some(options), None, None);
        let progress = stream.map(|item| match item {
            Ok(info) => {
                if let Some(error) = info.error {
                    PullProgress::Error(error)
                } else {
                    PullProgress::Status(info.status.unwrap_or_default())
                }
            }
            Err(e) => PullProgress::Error(e.to_string()),
        });
        Ok(progress.boxed())
    }

    #[instrument(skip(self))]
    async fn image_save(&self, reference: &str) -> Result<BoxStream<'static, Result<Bytes>>> {
        let stream = self.docker.export_image(reference).map(|item| {
            item.map_err(|e| CoderaftError::PullFailed {
                reference: String::new(),
                message: e.to_string(),
            })
        });
        Ok(stream.boxed())
    }

    #[instrument(skip(self, archive))]
    async fn image_load(&self, archive: Vec<u8>) -> Result<String> {
        let body = stream::once(async move { Ok::<_, std::io::Error>(Bytes::from(archive)) }).boxed();
        let mut results = self
            .docker
            .import_image(ImportImageOptions { quiet: true }, body, None);

        let mut last_id = None;
        while let Some(item) = results.next().await {
            let info = item.map_err(|e| CoderaftError::BuildFailed {
                stderr: e.to_string(),
            })?;
            if let Some(id) = info.stream {
                last_id = Some(id.trim().to_string());
            }
        }
        last_id.ok_or_else(|| CoderaftError::BuildFailed {
            stderr: "image load produced no id".to_string(),
        })
    }

    #[instrument(skip(self, context))]
    async fn image_build(
        &self,
        context: Vec<u8>,
        dockerfile_name: &str,
        tag: &str,
        env: &IndexMap<String, String>,
    ) -> Result<()> {
        let _ = env;
        let options = BuildImageOptions::<String> {
            dockerfile: dockerfile_name.to_string(),
            t: tag.to_string(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let mut stream = self
            .docker
            .build_image(options, None, Some(context.into()));

        let mut stderr = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(info) => {
                    if let Some(error) = info.error {
                        stderr.push_str(&error);
                        stderr.push('\n');
                    }
                }
                Err(e) => {
                    stderr.push_str(&e.to_string());
                    stderr.push('\n');
                }
            }
        }

        if stderr.is_empty() {
            Ok(())
        } else {
            Err(CoderaftError::BuildFailed { stderr })
        }
    }

    #[instrument(skip(self, island))]
    async fn container_create(&self, island: &Island) -> Result<String> {
        let env: Vec<String> = island
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let mut port_bindings: HashMap<String, Option<Vec<BollardPortBinding>>> = HashMap::new();
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        for binding in &island.ports {
            let key = format!("{}/{}", binding.container_port, binding.protocol);
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings.insert(
                key,
                Some(vec![BollardPortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some(binding.host_port.to_string()),
                }]),
            );
        }

        let mut mounts: Vec<BollardMount> = island
            .mounts
            .iter()
            .map(|m| BollardMount {
                target: Some(m.target.clone()),
                source: Some(m.source.clone()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(matches!(m.mode, crate::mount::MountMode::ReadOnly)),
                ..Default::default()
            })
            .collect();
        mounts.push(BollardMount {
            target: Some(island.workspace_island.clone()),
            source: Some(island.workspace_host.clone()),
            typ: Some(MountTypeEnum::BIND),
            read_only: Some(false),
            ..Default::default()
        });
        mounts.push(BollardMount {
            target: Some("/tmp".to_string()),
            typ: Some(MountTypeEnum::TMPFS),
            tmpfs_size: Some(TMPFS_SIZE_BYTES as i64),
            tmpfs_options: Some(TmpfsOptions {
                size_bytes: Some(TMPFS_SIZE_BYTES as i64),
                options: Some(vec![vec!["nosuid".into()], vec!["nodev".into()]]),
                ..Default::default()
            }),
            ..Default::default()
        });

        let healthcheck = island.health.as_ref().map(health_to_bollard);
        let device_requests = island.gpu.as_ref().map(|gpu| vec![gpu_to_device_request(gpu)]);

        let host_config = HostConfig {
            mounts: Some(mounts),
            port_bindings: Some(port_bindings),
            nano_cpus: Some(island.resources.nano_cpus),
            memory: Some(island.resources.memory_bytes),
            shm_size: Some(TMPFS_SIZE_BYTES as i64),
            restart_policy: Some(RestartPolicy {
                name: restart_policy_enum(&island.restart_policy),
                maximum_retry_count: None,
            }),
            cap_add: Some(island.cap_add.clone()),
            network_mode: Some(island.network_mode.clone()),
            init: Some(true),
            device_requests,
            ..Default::default()
        };

        let config = Config {
            image: Some(island.image.clone()),
            env: Some(env),
            labels: Some(island.labels_with_project(&island.name).into_iter().collect()),
            working_dir: Some(island.working_dir.clone()),
            user: island.user.clone(),
            tty: Some(true),
            open_stdin: Some(true),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            exposed_ports: Some(exposed_ports),
            healthcheck,
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: island.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| CoderaftError::CreateFailed {
                name: island.name.clone(),
                message: e.to_string(),
            })?;
        Ok(response.id)
    }

    #[instrument(skip(self))]
    async fn container_start(&self, id: &str) -> Result<()> {
        self.docker
            .start_container::<String>(id, None)
            .await
            .map_err(|e| CoderaftError::StartFailed {
                name: id.to_string(),
                message: e.to_string(),
            })
    }

    #[instrument(skip(self))]
    async fn container_stop(&self, id: &str, timeout_sec: i64) -> Result<()> {
        let timeout_sec = timeout_sec.max(0);
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: timeout_sec }))
            .await
            .map_err(|e| CoderaftError::StopFailed {
                name: id.to_string(),
                message: e.to_string(),
            })
    }

    #[instrument(skip(self))]
    async fn container_remove(&self, id: &str) -> Result<()> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| CoderaftError::RemoveFailed {
                name: id.to_string(),
                message: e.to_string(),
            })
    }

    #[instrument(skip(self))]
    async fn container_inspect(&self, id_or_name: &str) -> Result<Option<ContainerInfo>> {
        match self
            .docker
            .inspect_container(id_or_name, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => Ok(Some(super::projection::project_container_info(details))),
            Err(e) if Self::not_found(&e) => Ok(None),
            Err(e) => Err(CoderaftError::ContainerNotFound {
                name: format!("{id_or_name}: {e}"),
            }),
        }
    }

    #[instrument(skip(self))]
    async fn container_list(&self, all: bool) -> Result<Vec<ContainerInfo>> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec!["coderaft_".to_string()]);
        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|e| CoderaftError::EngineUnavailable {
                message: e.to_string(),
            })?;

        let mut containers = Vec::new();
        for summary in summaries {
            if let Some(id) = &summary.id {
                if let Some(info) = self.container_inspect(id).await? {
                    containers.push(info);
                }
            }
        }
        Ok(containers)
    }

    #[instrument(skip(self, argv))]
    async fn exec(&self, id: &str, argv: &[String], show_output: bool) -> Result<ExecResult> {
        let create_options = CreateExecOptions {
            cmd: Some(argv.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(id, create_options)
            .await
            .map_err(|e| CoderaftError::ExecFailed {
                exit_code: -1,
                stderr: e.to_string(),
            })?;

        let start_result =
            self.docker
                .start_exec(&exec.id, None)
                .await
                .map_err(|e| CoderaftError::ExecFailed {
                    exit_code: -1,
                    stderr: e.to_string(),
                })?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = start_result {
            while let Some(item) = output.next().await {
                match item {
                    Ok(bollard::container::LogOutput::StdOut { message }) => {
                        let text = String::from_utf8_lossy(&message);
                        if show_output {
                            print!("{text}");
                        }
                        stdout.push_str(&text);
                    }
                    Ok(bollard::container::LogOutput::StdErr { message }) => {
                        let text = String::from_utf8_lossy(&message);
                        if show_output {
                            eprint!("{text}");
                        }
                        stderr.push_str(&text);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "error reading exec output");
                    }
                }
            }
        }

        let inspected = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| CoderaftError::ExecFailed {
                exit_code: -1,
                stderr: e.to_string(),
            })?;
        let exit_code = inspected.exit_code.unwrap_or(-1);

        debug!(%id, exit_code, "exec completed");

        Ok(ExecResult {
            stdout,
            stderr,
            exit_code,
        })
    }

    #[instrument(skip(self))]
    async fn stats(&self, id: &str) -> Result<ContainerStatsSummary> {
        let mut stream = self.docker.stats(
            id,
            Some(StatsOptions {
                stream: false,
                one_shot: true,
            }),
        );
        let sample = stream
            .next()
            .await
            .ok_or_else(|| CoderaftError::ContainerNotFound {
                name: id.to_string(),
            })?
            .map_err(|e| CoderaftError::EngineUnavailable {
                message: e.to_string(),
            })?;
        Ok(stats::summarize(&sample))
    }

    #[instrument(skip(self))]
    async fn commit(&self, id: &str, tag: &str) -> Result<String> {
        let (repo, commit_tag) = tag.rsplit_once(':').unwrap_or((tag, "latest"));
        let options = bollard::image::CommitContainerOptions {
            container: id.to_string(),
            repo: repo.to_string(),
            tag: commit_tag.to_string(),
            ..Default::default()
        };
        let response = self
            .docker
            .commit_container(options, Config::<String>::default())
            .await
            .map_err(|e| CoderaftError::BuildFailed {
                stderr: e.to_string(),
            })?;
        Ok(response.id)
    }
}

fn health_to_bollard(health: &HealthCheck) -> HealthConfig {
    HealthConfig {
        test: if health.test.is_empty() {
            None
        } else {
            Some(health.test.clone())
        },
        interval: health.interval.map(|d| d.as_nanos() as i64),
        timeout: health.timeout.map(|d| d.as_nanos() as i64),
        retries: health.retries.map(|r| r as i64),
        start_period: None,
        start_interval: None,
    }
}

fn gpu_to_device_request(gpu: &GpuRequest) -> DeviceRequest {
    let mut request = DeviceRequest {
        driver: Some("nvidia".to_string()),
        capabilities: Some(vec![vec!["gpu".to_string()]]),
        ..Default::default()
    };
    match gpu {
        GpuRequest::All => request.count = Some(-1),
        GpuRequest::Count(n) => request.count = Some(*n),
        GpuRequest::Devices(ids) => request.device_ids = Some(ids.clone()),
    }
    request
}

fn restart_policy_enum(name: &str) -> Option<RestartPolicyNameEnum> {
    match name {
        "no" => Some(RestartPolicyNameEnum::NO),
        "always" => Some(RestartPolicyNameEnum::ALWAYS),
        "on-failure" => Some(RestartPolicyNameEnum::ON_FAILURE),
        "unless-stopped" => Some(RestartPolicyNameEnum::UNLESS_STOPPED),
        _ => Some(RestartPolicyNameEnum::UNLESS_STOPPED),
    }
}
