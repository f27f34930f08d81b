//! Path resolution for cirrus
//!
//! # Environment Variables
//!
//! - `CIRRUS_STATE_DIR` - Override the directory holding state snapshots
//!
//! # Path Resolution Priority
//!
//! For state_dir():
//! 1. `CIRRUS_STATE_DIR` environment variable
//! 2. `.cirrus/` next to the project file

use std::path::{Path, PathBuf};

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "CIRRUS_STATE_DIR";

/// Default project file name
pub const PROJECT_FILE: &str = "cirrus.toml";

/// Directory created next to the project file when no override is set
const LOCAL_STATE_DIR: &str = ".cirrus";

/// Get the state directory for a project
pub fn state_dir(project_dir: &Path) -> PathBuf {
    resolve_state_dir(std::env::var(ENV_STATE_DIR).ok().as_deref(), project_dir)
}

fn resolve_state_dir(override_dir: Option<&str>, project_dir: &Path) -> PathBuf {
    if let Some(dir) = override_dir.filter(|d| !d.is_empty()) {
        let path = expand(dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return path;
    }

    let path = project_dir.join(LOCAL_STATE_DIR);
    log::debug!("Using project state dir: {}", path.display());
    path
}

/// State file for a deployment: `<state dir>/<deployment>.json`
pub fn state_file(project_dir: &Path, deployment: &str) -> PathBuf {
    state_dir(project_dir).join(format!("{deployment}.json"))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_dir_override() {
        let result = resolve_state_dir(Some("/custom/state"), Path::new("/project"));
        assert_eq!(result, PathBuf::from("/custom/state"));
    }

    #[test]
    fn test_state_dir_empty_override_is_ignored() {
        let result = resolve_state_dir(Some(""), Path::new("/project"));
        assert_eq!(result, PathBuf::from("/project/.cirrus"));
    }

    #[test]
    fn test_state_dir_defaults_to_project() {
        let result = resolve_state_dir(None, Path::new("/project"));
        assert_eq!(result, PathBuf::from("/project/.cirrus"));
    }

    #[test]
    fn test_expand_absolute() {
        assert_eq!(expand("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$NONEXISTENT_CIRRUS_VAR_12345/file");
        assert_eq!(
            result,
            PathBuf::from("/path/$NONEXISTENT_CIRRUS_VAR_12345/file")
        );
    }
}
