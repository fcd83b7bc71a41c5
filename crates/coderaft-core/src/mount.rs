//! Volume mount parsing
//!
//! Parses the `volumes` entries of a project configuration
//! (`src:dst[:mode]`) into structured [`Mount`]s, following the engine's
//! bind-mount semantics.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Read/write mode for a bind mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountMode {
    /// Read-write access (default)
    ReadWrite,
    /// Read-only access
    ReadOnly,
}

impl FromStr for MountMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ro" => Ok(MountMode::ReadOnly),
            "rw" => Ok(MountMode::ReadWrite),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MountMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountMode::ReadWrite => write!(f, "rw"),
            MountMode::ReadOnly => write!(f, "ro"),
        }
    }
}

/// A single bind mount from a host path into the island.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Host-side source path (already home-expanded).
    pub source: String,
    /// Island-side target path.
    pub target: String,
    /// Read/write mode.
    pub mode: MountMode,
}

/// Expand a leading `~` to the current user's home directory.
pub fn expand_home(path: &str) -> String {
    if path == "~" {
        return home_dir();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        let mut home = PathBuf::from(home_dir());
        home.push(rest);
        return home.to_string_lossy().into_owned();
    }
    path.to_string()
}

fn home_dir() -> String {
    directories_next::UserDirs::new()
        .map(|u| u.home_dir().to_string_lossy().into_owned())
        .unwrap_or_else(|| "/root".to_string())
}

/// Parse a `src:dst[:mode]` volume specification per the project-config
/// projection rules: split on `:` into at most 3 parts; when the first part
/// is a single ASCII letter, treat it as a Windows drive letter and fold it
/// back into the source (`parts[0]:parts[1]` is the source, `parts[2]` the
/// target); otherwise `parts[0]`/`parts[1]` are source/target and an
/// optional third part is the mode.
pub fn parse_volume_spec(spec: &str) -> Option<Mount> {
    let parts: Vec<&str> = spec.splitn(3, ':').collect();
    if parts.is_empty() || parts[0].is_empty() {
        return None;
    }

    let is_drive_letter = parts[0].len() == 1 && parts[0].chars().next().unwrap().is_ascii_alphabetic();

    if is_drive_letter {
        let source = format!("{}:{}", parts[0], parts.get(1).copied().unwrap_or(""));
        let target = parts.get(2).copied().unwrap_or("").to_string();
        if target.is_empty() {
            return None;
        }
        Some(Mount {
            source: expand_home(&source),
            target,
            mode: MountMode::ReadWrite,
        })
    } else {
        let target = parts.get(1).copied().unwrap_or("").to_string();
        if target.is_empty() {
            return None;
        }
        let mode = parts
            .get(2)
            .and_then(|m| MountMode::from_str(m).ok())
            .unwrap_or(MountMode::ReadWrite);
        Some(Mount {
            source: expand_home(parts[0]),
            target,
            mode,
        })
    }
}
