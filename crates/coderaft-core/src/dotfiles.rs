//! Dotfiles mount resolution
//!
//! Maps the ordered `dotfiles` entries of a project configuration onto
//! bind mounts: the first path lands at `/dotfiles`, every subsequent path
//! at `/dotfiles/<index>`.

use crate::mount::{expand_home, Mount, MountMode};

/// Resolve a list of host dotfile paths into ordered bind mounts.
pub fn resolve_dotfile_mounts(paths: &[String]) -> Vec<Mount> {
    paths
        .iter()
        .enumerate()
        .map(|(index, path)| Mount {
            source: expand_home(path),
            target: if index == 0 {
                "/dotfiles".to_string()
            } else {
                format!("/dotfiles/{index}")
            },
            mode: MountMode::ReadWrite,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_path_mounts_at_dotfiles_root() {
        let mounts = resolve_dotfile_mounts(&["/host/dot1".to_string()]);
        assert_eq!(mounts[0].target, "/dotfiles");
    }

    #[test]
    fn test_subsequent_paths_are_indexed() {
        let mounts = resolve_dotfile_mounts(&[
            "/host/dot1".to_string(),
            "/host/dot2".to_string(),
            "/host/dot3".to_string(),
        ]);
        assert_eq!(mounts[0].target, "/dotfiles");
        assert_eq!(mounts[1].target, "/dotfiles/1");
        assert_eq!(mounts[2].target, "/dotfiles/2");
    }

    #[test]
    fn test_empty_list() {
        assert!(resolve_dotfile_mounts(&[]).is_empty());
    }
}
