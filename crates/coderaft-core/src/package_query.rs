//! Package Query Executor
//!
//! Runs a fixed catalog of small, best-effort shell programs inside an
//! island, in parallel, and parses each manager's stdout into a sorted
//! package list. A manager with empty or unparseable output is omitted
//! from the result rather than treated as an error.

use crate::engine::Engine;
use crate::errors::Result;
use crate::tunables::Tunables;
use crate::worker_pool::{Task, TaskError, WorkerPool};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

/// Timeout applied to each query's login-shell exec, matching the
/// general container-exec default.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parser {
    LineList,
    JsonPackageList,
}

struct QueryDef {
    manager: &'static str,
    command: &'static str,
    parser: Parser,
}

const CATALOG: &[QueryDef] = &[
    QueryDef {
        manager: "apt",
        command: "dpkg-query -W -f='${Package}=${Version}\\n' 2>/dev/null",
        parser: Parser::LineList,
    },
    QueryDef {
        manager: "pip",
        command: "pip list --format=freeze 2>/dev/null",
        parser: Parser::LineList,
    },
    QueryDef {
        manager: "npm",
        command: "npm ls --json --depth=0 2>/dev/null",
        parser: Parser::JsonPackageList,
    },
    QueryDef {
        manager: "yarn",
        command: "yarn list --json --depth=0 2>/dev/null",
        parser: Parser::JsonPackageList,
    },
    QueryDef {
        manager: "pnpm",
        command: "pnpm list --json --depth=0 2>/dev/null",
        parser: Parser::JsonPackageList,
    },
    QueryDef {
        manager: "apk",
        command: "apk info -v 2>/dev/null",
        parser: Parser::LineList,
    },
    QueryDef {
        manager: "dnf",
        command: "dnf list installed 2>/dev/null",
        parser: Parser::LineList,
    },
    QueryDef {
        manager: "pacman",
        command: "pacman -Q 2>/dev/null",
        parser: Parser::LineList,
    },
    QueryDef {
        manager: "brew",
        command: "brew list --versions 2>/dev/null",
        parser: Parser::LineList,
    },
    QueryDef {
        manager: "snap",
        command: "snap list 2>/dev/null",
        parser: Parser::LineList,
    },
    QueryDef {
        manager: "pipx",
        command: "pipx list --short 2>/dev/null",
        parser: Parser::LineList,
    },
    QueryDef {
        manager: "conda",
        command: "conda list 2>/dev/null",
        parser: Parser::LineList,
    },
    QueryDef {
        manager: "poetry",
        command: "poetry show 2>/dev/null",
        parser: Parser::LineList,
    },
    QueryDef {
        manager: "bun",
        command: "bun pm ls 2>/dev/null",
        parser: Parser::LineList,
    },
    QueryDef {
        manager: "cargo",
        command: "cargo install --list 2>/dev/null",
        parser: Parser::LineList,
    },
    QueryDef {
        manager: "go",
        command: "go list -m all 2>/dev/null",
        parser: Parser::LineList,
    },
    QueryDef {
        manager: "gem",
        command: "gem list 2>/dev/null",
        parser: Parser::LineList,
    },
    QueryDef {
        manager: "composer",
        command: "composer show 2>/dev/null",
        parser: Parser::LineList,
    },
];

/// Queries package managers installed inside an island.
pub struct PackageQueryExecutor {
    engine: Arc<dyn Engine>,
    tunables: Tunables,
}

impl PackageQueryExecutor {
    /// Create a new executor over the given engine and tunables.
    pub fn new(engine: Arc<dyn Engine>, tunables: Tunables) -> Self {
        Self { engine, tunables }
    }

    /// Run the full catalog against `id` through the worker pool, in
    /// parallel, returning only the managers that produced a non-empty,
    /// parseable package list. A single manager's failure is recorded as a
    /// warning and omitted rather than aborting the whole inventory.
    #[instrument(skip(self))]
    pub async fn query_all(&self, id: &str) -> Result<IndexMap<String, Vec<String>>> {
        let concurrency = if self.tunables.disable_parallel {
            1
        } else {
            self.tunables.query_workers.max(1)
        };

        let tasks: Vec<Task<Option<Vec<String>>>> = CATALOG
            .iter()
            .map(|def| {
                let engine = self.engine.clone();
                let id = id.to_string();
                Box::pin(async move {
                    run_one(&engine, &id, def)
                        .await
                        .map_err(|e| TaskError(e.to_string()))
                }) as Task<Option<Vec<String>>>
            })
            .collect();

        let pool = WorkerPool::new(concurrency, QUERY_TIMEOUT);
        let outcomes = pool.execute_batch(tasks).await;

        let mut out = IndexMap::new();
        for (def, outcome) in CATALOG.iter().zip(outcomes) {
            match outcome {
                Ok(Some(packages)) => {
                    out.insert(def.manager.to_string(), packages);
                }
                Ok(None) => {}
                Err(e) => warn!(manager = def.manager, error = %e, "package query failed, omitting manager"),
            }
        }
        Ok(out)
    }
}

/// Run one catalog query, returning `None` for empty stdout. Free function
/// so it can be boxed into a `'static` worker-pool task without borrowing
/// from the executor.
async fn run_one(engine: &Arc<dyn Engine>, id: &str, def: &QueryDef) -> Result<Option<Vec<String>>> {
    let argv = vec!["bash".to_string(), "-lc".to_string(), def.command.to_string()];
    let result = tokio::time::timeout(QUERY_TIMEOUT, engine.exec(id, &argv, false))
        .await
        .map_err(|_| crate::errors::CoderaftError::ExecFailed {
            exit_code: -1,
            stderr: "package query timed out".to_string(),
        })??;

    if result.stdout.trim().is_empty() {
        return Ok(None);
    }

    Ok(match def.parser {
        Parser::LineList => Some(parse_line_list(&result.stdout)),
        Parser::JsonPackageList => parse_json_package_list(&result.stdout),
    })
}

/// Split on newlines, trim, and drop empty lines.
pub fn parse_line_list(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Parse an `npm ls`-style JSON document: either `{dependencies: {name:
/// {version}}}`, or an array of nodes each carrying a `dependencies` map.
/// Entries are unioned across nodes and emitted as `name@version`, sorted
/// ascending. Anything else yields `None`.
pub fn parse_json_package_list(input: &str) -> Option<Vec<String>> {
    let value: Value = serde_json::from_str(input).ok()?;

    let mut entries = BTreeSet::new();

    match &value {
        Value::Object(obj) => {
            if let Some(deps) = obj.get("dependencies").and_then(Value::as_object) {
                collect_dependency_entries(deps, &mut entries);
            } else {
                return None;
            }
        }
        Value::Array(nodes) => {
            let mut found_any = false;
            for node in nodes {
                if let Some(deps) = node.as_object().and_then(|o| o.get("dependencies")).and_then(Value::as_object) {
                    found_any = true;
                    collect_dependency_entries(deps, &mut entries);
                }
            }
            if !found_any {
                return None;
            }
        }
        _ => return None,
    }

    if entries.is_empty() {
        None
    } else {
        Some(entries.into_iter().collect())
    }
}

fn collect_dependency_entries(
    deps: &serde_json::Map<String, Value>,
    entries: &mut BTreeSet<String>,
) {
    for (name, info) in deps {
        let version = info
            .as_object()
            .and_then(|o| o.get("version"))
            .and_then(Value::as_str)
            .unwrap_or("");
        entries.insert(format!("{name}@{version}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_list_trims_and_drops_empties() {
        let input = "  foo==1.0  \n\nbar==2.0\n";
        assert_eq!(parse_line_list(input), vec!["foo==1.0", "bar==2.0"]);
    }

    #[test]
    fn test_parse_json_package_list_object_shape() {
        let input = r#"{"dependencies": {"left-pad": {"version": "1.3.0"}, "chalk": {"version": "4.1.0"}}}"#;
        let parsed = parse_json_package_list(input).unwrap();
        assert_eq!(parsed, vec!["chalk@4.1.0".to_string(), "left-pad@1.3.0".to_string()]);
    }

    #[test]
    fn test_parse_json_package_list_array_of_nodes_shape() {
        let input = r#"[{"dependencies": {"a": {"version": "1"}}}, {"dependencies": {"b": {"version": "2"}}}]"#;
        let parsed = parse_json_package_list(input).unwrap();
        assert_eq!(parsed, vec!["a@1".to_string(), "b@2".to_string()]);
    }

    #[test]
    fn test_parse_json_package_list_rejects_unknown_shape() {
        assert!(parse_json_package_list(r#"{"not_dependencies": {}}"#).is_none());
        assert!(parse_json_package_list("not json at all").is_none());
    }
}
