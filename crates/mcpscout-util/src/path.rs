//! Path utilities.

use std::path::{Path, PathBuf};

/// Get the current user's home directory.
pub fn home_dir() -> Option<PathBuf> {
    dirs::home_dir()
}

/// Expand a leading `~/` (or `~\` on Windows-style paths) to the home directory.
///
/// Paths without the prefix, or when no home directory can be resolved, are
/// returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    let stripped = path
        .strip_prefix("~/")
        .or_else(|| path.strip_prefix("~\\"));

    if let (Some(rest), Some(home)) = (stripped, home_dir()) {
        return home.join(rest);
    }
    if path == "~" {
        if let Some(home) = home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Join relative segments onto the home directory.
pub fn home_join(segments: &[&str]) -> Option<PathBuf> {
    home_dir().map(|home| segments.iter().fold(home, |acc, s| acc.join(s)))
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve_against(base: &Path, path: &str) -> PathBuf {
    let expanded = expand_home(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_home_without_prefix() {
        assert_eq!(expand_home("/etc/hosts"), PathBuf::from("/etc/hosts"));
        assert_eq!(expand_home("relative/dir"), PathBuf::from("relative/dir"));
    }

    #[test]
    fn test_expand_home_with_prefix() {
        if let Some(home) = home_dir() {
            assert_eq!(expand_home("~/.mcp.json"), home.join(".mcp.json"));
            assert_eq!(expand_home("~"), home);
        }
    }

    #[test]
    fn test_home_join() {
        if let Some(home) = home_dir() {
            assert_eq!(
                home_join(&[".cargo", "bin"]),
                Some(home.join(".cargo").join("bin"))
            );
        }
    }

    #[test]
    fn test_resolve_against() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_against(dir.path(), "extra.json"),
            dir.path().join("extra.json")
        );
        assert_eq!(
            resolve_against(dir.path(), "/abs/extra.json"),
            PathBuf::from("/abs/extra.json")
        );
    }
}
