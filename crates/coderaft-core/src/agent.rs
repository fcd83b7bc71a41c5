//! In-Container Agent
//!
//! Bootstraps the island with a marker file, a `coderaft` helper dispatcher,
//! and a `.bashrc` block providing dotfile symlinking, an `exit` shell
//! function, and package-manager wrappers that record mutating invocations
//! to the history file.

use crate::engine::Engine;
use crate::errors::Result;
use tracing::{debug, instrument};

/// Idempotence sentinel written once bootstrap has completed.
pub const MARKER_PATH: &str = "/etc/coderaft-initialized";
/// Dispatcher command installed on the island's `PATH`.
pub const DISPATCHER_PATH: &str = "/usr/local/bin/coderaft";
/// Default history file path, overridable via `CODERAFT_HISTORY`.
pub const DEFAULT_HISTORY_PATH: &str = "/island/coderaft.history";
/// Marker line bracketing the appended `.bashrc` block, used to detect a
/// prior bootstrap and avoid double-appending.
const BASHRC_BLOCK_MARKER: &str = "# >>> coderaft agent >>>";

/// A wrapped binary and the exact argv-prefix verbs that count as a
/// mutating invocation. `"*"` matches every invocation of the binary.
pub struct WrapperSpec {
    /// The real binary name being wrapped.
    pub binary: &'static str,
    /// Verbs (possibly multi-word, e.g. `"global add"`) that mutate state.
    pub verbs: &'static [&'static str],
}

/// The full wrapper table, matching the history recording policy exactly.
pub const WRAPPERS: &[WrapperSpec] = &[
    WrapperSpec { binary: "apt", verbs: &["install", "remove", "purge", "autoremove"] },
    WrapperSpec { binary: "apt-get", verbs: &["install", "remove", "purge", "autoremove"] },
    WrapperSpec { binary: "pip", verbs: &["install", "uninstall"] },
    WrapperSpec { binary: "pip3", verbs: &["install", "uninstall"] },
    WrapperSpec { binary: "pipx", verbs: &["install", "uninstall"] },
    WrapperSpec {
        binary: "npm",
        verbs: &["install", "i", "add", "uninstall", "remove", "rm", "r", "un"],
    },
    WrapperSpec { binary: "yarn", verbs: &["add", "remove", "global add", "global remove"] },
    WrapperSpec {
        binary: "pnpm",
        verbs: &["add", "install", "i", "remove", "rm", "uninstall", "un"],
    },
    WrapperSpec { binary: "bun", verbs: &["add", "install", "i", "remove", "rm", "uninstall"] },
    WrapperSpec { binary: "cargo", verbs: &["install", "uninstall"] },
    WrapperSpec { binary: "go", verbs: &["install"] },
    WrapperSpec { binary: "gem", verbs: &["install", "uninstall"] },
    WrapperSpec {
        binary: "composer",
        verbs: &["require", "remove", "global require", "global remove"],
    },
    WrapperSpec { binary: "brew", verbs: &["install", "uninstall", "remove", "reinstall"] },
    WrapperSpec { binary: "snap", verbs: &["install", "remove"] },
    WrapperSpec { binary: "flatpak", verbs: &["install", "uninstall"] },
    WrapperSpec { binary: "apk", verbs: &["add", "del"] },
    WrapperSpec { binary: "dnf", verbs: &["install", "remove", "erase", "groupinstall"] },
    WrapperSpec { binary: "pacman", verbs: &["-S", "-R", "-U"] },
    WrapperSpec { binary: "zypper", verbs: &["install", "in", "remove", "rm"] },
    WrapperSpec { binary: "dpkg", verbs: &["-i", "-r", "-P"] },
    WrapperSpec { binary: "rpm", verbs: &["-i", "-U", "-e"] },
    WrapperSpec { binary: "wget", verbs: &["*"] },
    WrapperSpec { binary: "curl", verbs: &["*"] },
    WrapperSpec { binary: "make", verbs: &["install"] },
    WrapperSpec { binary: "nvm", verbs: &["install", "uninstall"] },
    WrapperSpec { binary: "pyenv", verbs: &["install", "uninstall"] },
    WrapperSpec { binary: "rustup", verbs: &["install", "uninstall"] },
    WrapperSpec { binary: "sdk", verbs: &["install", "uninstall"] },
    WrapperSpec { binary: "asdf", verbs: &["install", "uninstall"] },
];

/// Dotfiles symlinked from `/dotfiles` into `$HOME` when present and not
/// already there.
const SYMLINKED_DOTFILES: &[&str] = &[".gitconfig", ".vimrc", ".zshrc", ".bash_profile"];

/// Whether invoking `binary` with `args` counts as a mutating command,
/// per the wrapper table. `corepack yarn`/`corepack pnpm` pass through to
/// the yarn/pnpm rules against their remaining args.
pub fn is_mutating_invocation(binary: &str, args: &[String]) -> bool {
    if binary == "corepack" {
        let Some((sub, rest)) = args.split_first() else {
            return false;
        };
        if sub == "yarn" || sub == "pnpm" {
            return is_mutating_invocation(sub, rest);
        }
        return false;
    }

    let Some(spec) = WRAPPERS.iter().find(|w| w.binary == binary) else {
        return false;
    };

    for verb in spec.verbs {
        if *verb == "*" {
            return true;
        }
        let verb_tokens: Vec<&str> = verb.split_whitespace().collect();
        if args.len() >= verb_tokens.len()
            && args[..verb_tokens.len()]
                .iter()
                .map(String::as_str)
                .eq(verb_tokens.iter().copied())
        {
            return true;
        }
    }
    false
}

/// Bootstraps the in-container agent: marker, dispatcher, and bashrc block.
pub struct Agent<'a> {
    engine: &'a dyn Engine,
}

impl<'a> Agent<'a> {
    /// Create a new agent bootstrapper over the given engine.
    pub fn new(engine: &'a dyn Engine) -> Self {
        Self { engine }
    }

    /// Bootstrap the island at `id`, skipping entirely if the marker file
    /// already exists.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self, id: &str, history_path: &str) -> Result<()> {
        let check = self
            .engine
            .exec(id, &["test".to_string(), "-f".to_string(), MARKER_PATH.to_string()], false)
            .await?;
        if check.success() {
            debug!("agent already bootstrapped, skipping");
            return Ok(());
        }

        let script = bootstrap_script(history_path);
        let argv = vec!["bash".to_string(), "-lc".to_string(), script];
        let result = self.engine.exec(id, &argv, false).await?;
        if !result.success() {
            return Err(crate::errors::CoderaftError::ExecFailed {
                exit_code: result.exit_code,
                stderr: result.stderr,
            });
        }
        Ok(())
    }
}

/// Build the full bootstrap script: writes the dispatcher, appends the
/// bashrc block (guarded by the block marker for idempotence), and
/// finally writes the marker file.
fn bootstrap_script(history_path: &str) -> String {
    format!(
        r#"set -e
mkdir -p {dispatcher_dir}
cat > {dispatcher} <<'CODERAFT_DISPATCHER_EOF'
{dispatcher_script}
CODERAFT_DISPATCHER_EOF
chmod +x {dispatcher}
if ! grep -q '{block_marker}' /root/.bashrc 2>/dev/null; then
cat >> /root/.bashrc <<'CODERAFT_BASHRC_EOF'
{bashrc_block}
CODERAFT_BASHRC_EOF
fi
touch {marker}
"#,
        dispatcher_dir = "/usr/local/bin",
        dispatcher = DISPATCHER_PATH,
        dispatcher_script = dispatcher_script(),
        block_marker = BASHRC_BLOCK_MARKER,
        bashrc_block = bashrc_block(history_path),
        marker = MARKER_PATH,
    )
}

/// The `coderaft` dispatcher script: `status|info`, `help`, `history|log`,
/// `files|ls`, `disk|usage`, `env`, `version`. Unknown/missing args exit 1
/// with a usage hint.
fn dispatcher_script() -> String {
    r#"#!/usr/bin/env bash
set -u
case "${1:-}" in
  status|info)
    echo "coderaft island: ${CODERAFT_ISLAND_NAME:-unknown}"
    ;;
  help|--help|-h)
    echo "usage: coderaft {status|info|help|history|log|files|ls|disk|usage|env|version}"
    ;;
  history|log)
    cat "${CODERAFT_HISTORY:-/island/coderaft.history}" 2>/dev/null || true
    ;;
  files|ls)
    ls -la "${PWD}"
    ;;
  disk|usage)
    df -h "${PWD}"
    ;;
  env)
    env | sort
    ;;
  version)
    echo "coderaft-agent"
    ;;
  "")
    echo "coderaft: missing subcommand" >&2
    exit 1
    ;;
  *)
    echo "coderaft: unknown subcommand '${1}'" >&2
    exit 1
    ;;
esac
"#
    .to_string()
}

/// The appended `.bashrc` block: welcome banner, dotfile symlinking,
/// `coderaft exit` shell function, and package-manager wrappers.
fn bashrc_block(history_path: &str) -> String {
    let mut lines = Vec::new();
    lines.push(BASHRC_BLOCK_MARKER.to_string());
    lines.push("if [ -n \"$PS1\" ]; then echo \"Welcome to your coderaft island.\"; fi".to_string());
    lines.push("[ -f /dotfiles/.bashrc ] && source /dotfiles/.bashrc".to_string());

    for name in SYMLINKED_DOTFILES {
        lines.push(format!(
            "[ -f /dotfiles/{name} ] && [ ! -e \"$HOME/{name}\" ] && ln -s /dotfiles/{name} \"$HOME/{name}\""
        ));
    }
    lines.push(
        "if [ -d /dotfiles/.config ]; then mkdir -p \"$HOME/.config\"; for f in /dotfiles/.config/*; do \
         base=\"$(basename \"$f\")\"; [ -e \"$HOME/.config/$base\" ] || ln -s \"$f\" \"$HOME/.config/$base\"; done; fi"
            .to_string(),
    );

    lines.push(format!("export CODERAFT_HISTORY=\"${{CODERAFT_HISTORY:-{history_path}}}\""));
    lines.push(
        "__coderaft_record() { \
         local line=\"$*\"; \
         [ -n \"$CODERAFT_LOCKFILE\" ] && [ -e \"$CODERAFT_LOCKFILE\" ] && return 0; \
         local dir; dir=\"$(dirname \"$CODERAFT_HISTORY\")\"; \
         [ -w \"$dir\" ] || return 0; \
         grep -qxF \"$line\" \"$CODERAFT_HISTORY\" 2>/dev/null && return 0; \
         echo \"$line\" >> \"$CODERAFT_HISTORY\"; \
         }"
            .to_string(),
    );

    lines.push("coderaft() { if [ \"${1:-}\" = \"exit\" ]; then echo \"Farewell.\"; builtin exit 0; fi; command coderaft \"$@\"; }".to_string());

    for spec in WRAPPERS {
        lines.push(wrapper_function(spec));
    }

    lines.join("\n") + "\n"
}

/// Render a single wrapper function: call the real binary, and on success
/// record history when the invoked verb is mutating.
fn wrapper_function(spec: &WrapperSpec) -> String {
    let fn_name = spec.binary.replace('-', "_");
    let always = spec.verbs.contains(&"*");
    let guard = if always {
        "true".to_string()
    } else {
        format!(
            "__coderaft_is_mutating_{fn_name} \"$@\""
        )
    };

    let mut out = String::new();
    if !always {
        out.push_str(&format!(
            "__coderaft_is_mutating_{fn_name}() {{ case \"$*\" in {patterns}) return 0 ;; *) return 1 ;; esac; }}\n",
            patterns = spec
                .verbs
                .iter()
                .map(|v| format!("{v}*"))
                .collect::<Vec<_>>()
                .join("|")
        ));
    }
    out.push_str(&format!(
        "{fn_name}() {{ command {binary} \"$@\"; local rc=$?; if [ $rc -eq 0 ] && {guard}; then __coderaft_record {binary} \"$@\"; fi; return $rc; }}\n",
        fn_name = fn_name,
        binary = spec.binary,
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_mutating_invocation_exact_verbs() {
        assert!(is_mutating_invocation("apt", &["install".to_string(), "git".to_string()]));
        assert!(!is_mutating_invocation("apt", &["list".to_string()]));
    }

    #[test]
    fn test_is_mutating_invocation_multi_word_verb() {
        assert!(is_mutating_invocation(
            "yarn",
            &["global".to_string(), "add".to_string(), "left-pad".to_string()]
        ));
        assert!(!is_mutating_invocation("yarn", &["info".to_string()]));
    }

    #[test]
    fn test_is_mutating_invocation_always_true_binaries() {
        assert!(is_mutating_invocation("wget", &["https://example.com".to_string()]));
        assert!(is_mutating_invocation("curl", &[]));
    }

    #[test]
    fn test_is_mutating_invocation_corepack_passthrough() {
        assert!(is_mutating_invocation(
            "corepack",
            &["yarn".to_string(), "add".to_string(), "left-pad".to_string()]
        ));
        assert!(!is_mutating_invocation("corepack", &["yarn".to_string(), "info".to_string()]));
        assert!(!is_mutating_invocation("corepack", &["npm".to_string(), "install".to_string()]));
    }

    #[test]
    fn test_is_mutating_invocation_unknown_binary() {
        assert!(!is_mutating_invocation("ghost-pm", &["install".to_string()]));
    }

    #[test]
    fn test_bashrc_block_contains_marker_and_history_export() {
        let block = bashrc_block(DEFAULT_HISTORY_PATH);
        assert!(block.contains(BASHRC_BLOCK_MARKER));
        assert!(block.contains("CODERAFT_HISTORY"));
        assert!(block.contains("coderaft() {"));
    }

    #[test]
    fn test_bashrc_block_honors_legacy_lockfile_conditionally() {
        let block = bashrc_block(DEFAULT_HISTORY_PATH);
        assert!(block.contains("CODERAFT_LOCKFILE"));
    }

    #[test]
    fn test_bootstrap_script_is_idempotence_guarded() {
        let script = bootstrap_script(DEFAULT_HISTORY_PATH);
        assert!(script.contains(MARKER_PATH));
        assert!(script.contains(BASHRC_BLOCK_MARKER));
    }
}
