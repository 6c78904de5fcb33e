use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Get the XDG config directory for devrc
///
/// Returns `$XDG_CONFIG_HOME/devrc` or `~/.config/devrc` if not set
pub fn config_dir() -> Result<PathBuf> {
    let base = match env::var_os("XDG_CONFIG_HOME").filter(|value| !value.is_empty()) {
        Some(base) => PathBuf::from(base),
        None => home_dir()?.join(".config"),
    };

    Ok(base.join("devrc"))
}

/// Get the home directory
pub fn home_dir() -> Result<PathBuf> {
    directories::BaseDirs::new()
        .context("Failed to get home directory")
        .map(|bd| bd.home_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_dir() {
        let dir = config_dir().unwrap();
        assert!(dir.ends_with("devrc"));
    }

    #[test]
    #[serial]
    fn test_config_dir_honours_xdg() {
        let original = env::var_os("XDG_CONFIG_HOME");
        env::set_var("XDG_CONFIG_HOME", "/tmp/devrc-xdg");
        assert_eq!(config_dir().unwrap(), PathBuf::from("/tmp/devrc-xdg/devrc"));

        env::set_var("XDG_CONFIG_HOME", "");
        assert!(config_dir().unwrap().ends_with(".config/devrc"));

        match original {
            Some(value) => env::set_var("XDG_CONFIG_HOME", value),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }
    }

    #[test]
    fn test_home_dir() {
        let dir = home_dir().unwrap();
        assert!(dir.is_absolute());
    }
}
