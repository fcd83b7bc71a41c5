//! Build-plan fingerprinting
//!
//! Computes the stable 16-hex-character content hash used as a cached
//! image's tag suffix.

use indexmap::IndexMap;

/// The deterministic inputs that uniquely identify a cached image.
///
/// `project` and `labels` are intentionally excluded from the fingerprint:
/// they do not alter build semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    /// Base image reference, e.g. `ubuntu:22.04`.
    pub base_image: String,
    /// Ordered setup commands baked into the image.
    pub setup_commands: Vec<String>,
    /// Environment variables (order does not affect the fingerprint).
    pub env: IndexMap<String, String>,
    /// Labels applied to the built image (excluded from the fingerprint).
    pub labels: IndexMap<String, String>,
    /// Working directory baked into the image.
    pub working_dir: String,
    /// Shell used to run setup commands.
    pub shell: String,
    /// User the image runs as.
    pub user: String,
    /// Project name (excluded from the fingerprint).
    pub project: String,
}

/// Tag prefix for every image the builder produces.
pub const CACHE_TAG_PREFIX: &str = "coderaft-cache";

impl BuildPlan {
    /// Canonical byte encoding fed to the hash: base image, ordered setup
    /// commands, environment entries sorted by key as `K=V`, working dir,
    /// shell, user — each on its own line, each section prefixed with a
    /// marker so e.g. an empty env can't collide with an empty label set.
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = String::new();
        buf.push_str("base:");
        buf.push_str(&self.base_image);
        buf.push('\n');

        buf.push_str("cmds:\n");
        for cmd in &self.setup_commands {
            buf.push_str(cmd);
            buf.push('\n');
        }

        let mut env_entries: Vec<(&String, &String)> = self.env.iter().collect();
        env_entries.sort_by(|a, b| a.0.cmp(b.0));
        buf.push_str("env:\n");
        for (k, v) in env_entries {
            buf.push_str(k);
            buf.push('=');
            buf.push_str(v);
            buf.push('\n');
        }

        buf.push_str("workdir:");
        buf.push_str(&self.working_dir);
        buf.push('\n');
        buf.push_str("shell:");
        buf.push_str(&self.shell);
        buf.push('\n');
        buf.push_str("user:");
        buf.push_str(&self.user);
        buf.push('\n');

        buf.into_bytes()
    }

    /// Stable 16-hex-character fingerprint of this plan.
    pub fn fingerprint(&self) -> String {
        let digest = blake3::hash(&self.canonical_bytes());
        digest.to_hex()[..16].to_string()
    }

    /// The full cache tag this plan would produce: `coderaft-cache/<project>:<fp>`.
    pub fn cache_tag(&self) -> String {
        format!("{CACHE_TAG_PREFIX}/{}:{}", self.project, self.fingerprint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_plan() -> BuildPlan {
        let mut env = IndexMap::new();
        env.insert("FOO".to_string(), "bar".to_string());
        BuildPlan {
            base_image: "ubuntu:22.04".to_string(),
            setup_commands: vec!["apt update -y".to_string(), "apt install -y git".to_string()],
            env,
            labels: IndexMap::new(),
            working_dir: "/workspace".to_string(),
            shell: String::new(),
            user: String::new(),
            project: "demo".to_string(),
        }
    }

    #[test]
    fn test_fingerprint_format() {
        let fp = base_plan().fingerprint();
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_fingerprint_stable_across_env_order_and_project_and_labels() {
        let plan_a = base_plan();

        let mut env_b = IndexMap::new();
        env_b.insert("FOO".to_string(), "bar".to_string());
        let mut plan_b = base_plan();
        plan_b.env = env_b;
        plan_b.project = "other-project".to_string();
        plan_b
            .labels
            .insert("owner".to_string(), "someone".to_string());

        assert_eq!(plan_a.fingerprint(), plan_b.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_command_order() {
        let plan_a = base_plan();
        let mut plan_b = base_plan();
        plan_b.setup_commands.reverse();
        assert_ne!(plan_a.fingerprint(), plan_b.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_env_value() {
        let plan_a = base_plan();
        let mut plan_b = base_plan();
        plan_b.env.insert("FOO".to_string(), "baz".to_string());
        assert_ne!(plan_a.fingerprint(), plan_b.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_base_image() {
        let plan_a = base_plan();
        let mut plan_b = base_plan();
        plan_b.base_image = "ubuntu:24.04".to_string();
        assert_ne!(plan_a.fingerprint(), plan_b.fingerprint());
    }

    #[test]
    fn test_cache_tag_format() {
        let plan = base_plan();
        let tag = plan.cache_tag();
        assert!(tag.starts_with("coderaft-cache/demo:"));
        assert_eq!(tag.len(), "coderaft-cache/demo:".len() + 16);
    }
}
