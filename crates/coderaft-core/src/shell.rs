//! Shell Integration
//!
//! Attaches an interactive shell inside an island, runs a single sanitized
//! command, or captures a non-interactive command's output.

use crate::engine::{Engine, ExecResult};
use crate::errors::{CoderaftError, Result};
use crate::island::island_name_for_project;
use tracing::instrument;

/// Characters that force single-quote wrapping of a shell argument. A bare
/// single quote is included — left unquoted it would itself open a quoted
/// string, so it must trigger wrapping even with no other special chars.
const SPECIAL_CHARS: &str = ";&|$`\\<>(){}[]!#*?~^'";

/// Exit codes treated as a normal interactive-shell exit.
const NORMAL_ATTACH_EXIT_CODES: &[i64] = &[0, 130, 137];

/// Drives interactive and one-off shell sessions inside an island.
pub struct ShellIntegration<'a> {
    engine: &'a dyn Engine,
}

impl<'a> ShellIntegration<'a> {
    /// Create a new shell integration over the given engine.
    pub fn new(engine: &'a dyn Engine) -> Self {
        Self { engine }
    }

    /// Attach an interactive shell, with `CODERAFT_ISLAND_NAME`,
    /// `PROJECT_NAME`, and a project-scoped prompt exported. Exit codes 0,
    /// 130 (Ctrl-C), and 137 (SIGKILL) are treated as a normal exit.
    #[instrument(skip(self))]
    pub async fn attach(&self, id: &str, project: &str) -> Result<ExecResult> {
        let island_name = island_name_for_project(project);
        let prompt = format!("[{project}] \\w $ ");
        let script = format!(
            "export CODERAFT_ISLAND_NAME={island_name}; export PROJECT_NAME={project}; export PS1='{prompt}'; exec bash -l"
        );
        let argv = vec!["bash".to_string(), "-lc".to_string(), script];

        let result = self.engine.exec(id, &argv, true).await?;
        if NORMAL_ATTACH_EXIT_CODES.contains(&result.exit_code) {
            Ok(result)
        } else {
            Err(CoderaftError::ExecFailed {
                exit_code: result.exit_code,
                stderr: result.stderr,
            })
        }
    }

    /// Validate and sanitize `argv`, then run it as a login-shell command.
    #[instrument(skip(self, argv))]
    pub async fn run(&self, id: &str, argv: &[String]) -> Result<ExecResult> {
        validate_argv(argv)?;
        let sanitized: Vec<String> = argv.iter().map(|a| sanitize_shell_arg(a)).collect();
        let wrapped = sanitized.join(" ");
        let exec_argv = vec!["bash".to_string(), "-lc".to_string(), wrapped];

        let result = self.engine.exec(id, &exec_argv, true).await?;
        if result.success() {
            Ok(result)
        } else {
            Err(CoderaftError::ExecFailed {
                exit_code: result.exit_code,
                stderr: result.stderr,
            })
        }
    }

    /// Run `command` non-interactively under `set -o pipefail`, capturing
    /// its streams. A non-zero exit surfaces as an error with the captured
    /// stderr.
    #[instrument(skip(self))]
    pub async fn exec_capture(&self, id: &str, command: &str) -> Result<ExecResult> {
        let wrapped = format!("set -o pipefail; {command}");
        let argv = vec!["bash".to_string(), "-lc".to_string(), wrapped];

        let result = self.engine.exec(id, &argv, false).await?;
        if result.exit_code != 0 {
            return Err(CoderaftError::ExecFailed {
                exit_code: result.exit_code,
                stderr: result.stderr,
            });
        }
        Ok(result)
    }
}

/// Reject argv whose leading command begins with command substitution.
fn validate_argv(argv: &[String]) -> Result<()> {
    let Some(first) = argv.first() else {
        return Err(CoderaftError::InvalidCommand {
            message: "empty command".to_string(),
        });
    };
    if first.starts_with("$(") || first.starts_with('`') {
        return Err(CoderaftError::InvalidCommand {
            message: format!("command substitution is not allowed: {first}"),
        });
    }
    Ok(())
}

/// Single-quote-wrap `arg` when it contains a shell-special character,
/// escaping any embedded single quotes as `'"'"'`. Plain arguments pass
/// through unchanged.
pub fn sanitize_shell_arg(arg: &str) -> String {
    if !arg.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        return arg.to_string();
    }
    let escaped = arg.replace('\'', "'\"'\"'");
    format!("'{escaped}'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_plain_arg_unchanged() {
        assert_eq!(sanitize_shell_arg("abc"), "abc");
    }

    #[test]
    fn test_sanitize_wraps_semicolon() {
        assert_eq!(sanitize_shell_arg("x;y"), "'x;y'");
    }

    #[test]
    fn test_sanitize_wraps_dollar_sign() {
        assert_eq!(sanitize_shell_arg("$x"), "'$x'");
    }

    #[test]
    fn test_sanitize_escapes_embedded_single_quote() {
        assert_eq!(sanitize_shell_arg("it's"), "'it'\"'\"'s'");
    }

    #[test]
    fn test_validate_argv_rejects_command_substitution() {
        assert!(validate_argv(&["$(rm -rf /)".to_string()]).is_err());
        assert!(validate_argv(&["`whoami`".to_string()]).is_err());
        assert!(validate_argv(&["echo".to_string(), "hi".to_string()]).is_ok());
    }

    #[test]
    fn test_validate_argv_rejects_empty() {
        assert!(validate_argv(&[]).is_err());
    }
}
