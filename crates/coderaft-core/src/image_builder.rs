//! Image Builder & Fingerprint Cache
//!
//! Computes a build plan's fingerprint, checks the engine for a cache hit,
//! and otherwise synthesizes a build context and invokes the engine's
//! build. Build-file synthesis consolidates package-manager setup commands
//! into a single, cache-stable apt layer.

use crate::engine::Engine;
use crate::errors::{CoderaftError, Result};
use crate::fingerprint::{BuildPlan, CACHE_TAG_PREFIX};
use crate::retry::{retry_async, RetryConfig, RetryDecision};
use tracing::{debug, info, instrument};

const APT_UPDATE_COMMANDS: &[&str] = &["apt update -y", "apt update", "apt-get update -y", "apt-get update"];
const APT_UPGRADE_COMMANDS: &[&str] = &[
    "apt full-upgrade -y",
    "apt-get full-upgrade -y",
    "apt dist-upgrade -y",
    "apt-get dist-upgrade -y",
    "apt-get upgrade -y",
];
const APT_INSTALL_PREFIXES: &[&str] = &["apt install ", "apt-get install "];
const NONINTERACTIVE_PREFIX: &str = "debian_frontend=noninteractive ";

/// Builds and caches content-addressed images for a project.
pub struct ImageBuilder<'a> {
    engine: &'a dyn Engine,
}

impl<'a> ImageBuilder<'a> {
    /// Create a new builder over the given engine.
    pub fn new(engine: &'a dyn Engine) -> Self {
        Self { engine }
    }

    /// Build (or reuse) a cached image for `plan`, returning its tag.
    #[instrument(skip(self, plan))]
    pub async fn build(&self, plan: &BuildPlan) -> Result<String> {
        let tag = plan.cache_tag();

        if self.engine.image_exists(&tag).await? {
            info!(%tag, "cache hit, skipping build");
            return Ok(tag);
        }

        debug!(%tag, "cache miss, synthesizing build context");
        let dockerfile = synthesize_dockerfile(plan);
        let context = build_context_tar(&dockerfile)
            .map_err(|e| CoderaftError::BuildContextError {
                message: e.to_string(),
            })?;

        let config = RetryConfig::default();
        retry_async(
            &config,
            || self.engine.image_build(context.clone(), "Dockerfile", &tag, &plan.env),
            classify_build_error,
        )
        .await?;

        Ok(tag)
    }

    /// Remove every image whose repository begins with
    /// `coderaft-cache/<project>`.
    #[instrument(skip(self))]
    pub async fn cleanup(&self, project: &str) -> Result<()> {
        let prefix = format!("{CACHE_TAG_PREFIX}/{project}");
        let matching = self.engine.image_list(&prefix).await?;
        debug!(%prefix, count = matching.len(), "cleaning up cached images");
        for reference in matching {
            self.engine.image_remove(&reference).await?;
        }
        Ok(())
    }
}

/// Only `EngineUnavailable` (a transient daemon-connection hiccup) is worth
/// retrying; a bad Dockerfile or build-context failure will not heal itself.
fn classify_build_error(error: &CoderaftError) -> RetryDecision {
    match error {
        CoderaftError::EngineUnavailable { .. } => RetryDecision::Retry,
        _ => RetryDecision::Stop,
    }
}

/// Synthesize a Dockerfile per the build-file synthesis rules: base image,
/// env assignments, label assignments, one consolidated apt layer,
/// remaining setup commands batched by 5, working dir, and the default
/// terminal command.
pub fn synthesize_dockerfile(plan: &BuildPlan) -> String {
    let mut lines = Vec::new();

    lines.push(format!("FROM {}", plan.base_image));

    for (key, value) in &plan.env {
        lines.push(format!("ENV {key}=\"{value}\""));
    }

    for (key, value) in &plan.labels {
        lines.push(format!("LABEL {key}=\"{value}\""));
    }

    let (apt_layer, remaining) = consolidate_apt(&plan.setup_commands);
    if let Some(layer) = apt_layer {
        lines.push(format!("RUN {layer}"));
    }

    for batch in remaining.chunks(5) {
        lines.push(format!("RUN {}", batch.join(" && ")));
    }

    lines.push(format!(
        "WORKDIR {}",
        if plan.working_dir.is_empty() {
            "/workspace"
        } else {
            &plan.working_dir
        }
    ));
    lines.push("CMD [\"sleep\", \"infinity\"]".to_string());

    lines.join("\n") + "\n"
}

/// Consolidate apt/apt-get commands into a single layer per the
/// system-package consolidation rules, returning it plus any remaining
/// non-package setup commands in original order.
fn consolidate_apt(commands: &[String]) -> (Option<String>, Vec<String>) {
    let mut update_flag = false;
    let mut packages: Vec<String> = Vec::new();
    let mut remaining = Vec::new();

    for cmd in commands {
        let normalized = cmd.trim().to_lowercase();

        if APT_UPDATE_COMMANDS.contains(&normalized.as_str()) {
            update_flag = true;
            continue;
        }

        if APT_UPGRADE_COMMANDS.contains(&normalized.as_str()) {
            continue;
        }

        let without_noninteractive = normalized
            .strip_prefix(NONINTERACTIVE_PREFIX)
            .unwrap_or(&normalized);

        if let Some(prefix) = APT_INSTALL_PREFIXES
            .iter()
            .find(|p| without_noninteractive.starts_with(*p))
        {
            update_flag = true;
            let rest = &without_noninteractive[prefix.len()..];
            for token in rest.split_whitespace() {
                if !token.starts_with('-') {
                    packages.push(token.to_string());
                }
            }
            continue;
        }

        remaining.push(cmd.clone());
    }

    if !update_flag && packages.is_empty() {
        return (None, remaining);
    }

    packages.sort();
    packages.dedup();

    let layer = format!(
        "apt-get update -y && DEBIAN_FRONTEND=noninteractive apt-get install -y --no-install-recommends {} && apt-get clean && rm -rf /var/lib/apt/lists/* /tmp/* /var/tmp/*",
        packages.join(" ")
    );

    (Some(layer), remaining)
}

/// Write a tar archive containing only the synthesized Dockerfile — the
/// minimal build context this builder ever needs, since setup commands are
/// baked into `RUN` instructions rather than copied in from the host.
fn build_context_tar(dockerfile: &str) -> std::io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(dockerfile.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, "Dockerfile", dockerfile.as_bytes())?;
    builder.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn plan_with_commands(commands: Vec<&str>) -> BuildPlan {
        let mut env = IndexMap::new();
        env.insert("FOO".to_string(), "bar".to_string());
        BuildPlan {
            base_image: "ubuntu:22.04".to_string(),
            setup_commands: commands.into_iter().map(String::from).collect(),
            env,
            labels: IndexMap::new(),
            working_dir: "/workspace".to_string(),
            shell: String::new(),
            user: String::new(),
            project: "demo".to_string(),
        }
    }

    #[test]
    fn test_dockerfile_starts_with_from_and_env() {
        let plan = plan_with_commands(vec!["apt update -y", "apt install -y git"]);
        let dockerfile = synthesize_dockerfile(&plan);
        let lines: Vec<&str> = dockerfile.lines().collect();
        assert_eq!(lines[0], "FROM ubuntu:22.04");
        assert_eq!(lines[1], "ENV FOO=\"bar\"");
    }

    #[test]
    fn test_single_apt_layer_sorted_and_clean() {
        let plan = plan_with_commands(vec!["apt update -y", "apt install -y zsh git"]);
        let dockerfile = synthesize_dockerfile(&plan);
        let apt_lines: Vec<&str> = dockerfile
            .lines()
            .filter(|l| l.starts_with("RUN") && l.contains("apt-get install"))
            .collect();
        assert_eq!(apt_lines.len(), 1);
        let layer = apt_lines[0];
        assert!(layer.contains("--no-install-recommends"));
        assert!(layer.ends_with("rm -rf /var/lib/apt/lists/* /tmp/* /var/tmp/*"));
        assert!(layer.contains("git zsh"));
        assert!(!layer.contains("full-upgrade"));
        assert!(!layer.contains("dist-upgrade"));
    }

    #[test]
    fn test_upgrade_commands_dropped() {
        let plan = plan_with_commands(vec!["apt-get upgrade -y", "apt install -y git"]);
        let dockerfile = synthesize_dockerfile(&plan);
        assert!(!dockerfile.contains("upgrade -y"));
    }

    #[test]
    fn test_dockerfile_ends_with_workdir_and_cmd() {
        let plan = plan_with_commands(vec!["echo hi"]);
        let dockerfile = synthesize_dockerfile(&plan);
        let lines: Vec<&str> = dockerfile.lines().collect();
        assert_eq!(lines[lines.len() - 2], "WORKDIR /workspace");
        assert_eq!(lines[lines.len() - 1], "CMD [\"sleep\", \"infinity\"]");
    }

    #[test]
    fn test_non_package_commands_batched_by_five() {
        let commands: Vec<&str> = vec![
            "echo 1", "echo 2", "echo 3", "echo 4", "echo 5", "echo 6",
        ];
        let plan = plan_with_commands(commands);
        let dockerfile = synthesize_dockerfile(&plan);
        let run_lines: Vec<&str> = dockerfile
            .lines()
            .filter(|l| l.starts_with("RUN echo"))
            .collect();
        assert_eq!(run_lines.len(), 2);
        assert_eq!(run_lines[0].matches("&&").count(), 4);
        assert_eq!(run_lines[1].matches("&&").count(), 0);
    }

    #[test]
    fn test_no_apt_layer_when_no_packages_or_update() {
        let plan = plan_with_commands(vec!["echo hi"]);
        let (layer, remaining) = consolidate_apt(&plan.setup_commands);
        assert!(layer.is_none());
        assert_eq!(remaining, vec!["echo hi".to_string()]);
    }
}
