pub mod generate;
pub mod parse;
pub mod types;

use regex::Regex;
use std::path::{Path, PathBuf};

pub use parse::{load_config, parse_config, ConfigError};
pub use types::{Config, WebConfig};

/// Expands `$env{VAR_NAME}` references in a string.
/// Variables that are not set are left unchanged.
pub fn expand_env_vars(text: &str) -> String {
    let re = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();

    re.replace_all(text, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .to_string()
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(rest);
        }
    } else if path_str == "~" {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir;
        }
    }

    path.to_path_buf()
}

/// Resolves the config file path. Returns the first existing path from:
/// 1. Explicit path (with tilde expansion)
/// 2. ~/.config/footfall/config.yml
/// 3. /etc/footfall/config.yml
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(expand_tilde(path));
    }

    if let Some(home_dir) = dirs::home_dir() {
        let user_config = home_dir.join(".config/footfall/config.yml");
        if user_config.exists() {
            return Some(user_config);
        }
    }

    let system_config = PathBuf::from("/etc/footfall/config.yml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars_single() {
        std::env::set_var("FOOTFALL_TEST_VAR", "test_value");
        let result = expand_env_vars("path/$env{FOOTFALL_TEST_VAR}/file");
        assert_eq!(result, "path/test_value/file");
        std::env::remove_var("FOOTFALL_TEST_VAR");
    }

    #[test]
    fn test_expand_env_vars_partial() {
        std::env::set_var("FOOTFALL_SET_VAR", "exists");
        let result = expand_env_vars("$env{FOOTFALL_SET_VAR}/$env{FOOTFALL_UNSET_VAR}");
        assert_eq!(result, "exists/$env{FOOTFALL_UNSET_VAR}");
        std::env::remove_var("FOOTFALL_SET_VAR");
    }

    #[test]
    fn test_expand_env_vars_no_expansion() {
        assert_eq!(expand_env_vars("plain/${not_env}"), "plain/${not_env}");
    }

    #[test]
    fn test_expand_tilde_with_path() {
        let expanded = expand_tilde(Path::new("~/videos"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("videos"));
        }
    }

    #[test]
    fn test_expand_tilde_no_expansion() {
        assert_eq!(expand_tilde(Path::new("/data/videos")), Path::new("/data/videos"));
        assert_eq!(expand_tilde(Path::new("videos/~")), Path::new("videos/~"));
    }

    #[test]
    fn test_resolve_explicit_path() {
        let resolved = resolve_config_path(Some(Path::new("/etc/custom.yml")));
        assert_eq!(resolved, Some(PathBuf::from("/etc/custom.yml")));
    }
}
