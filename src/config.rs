use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::credentials::CredentialBinding;
use crate::navigate::BrowserCommand;

/// Interactive browser launched by `devrc navigate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrowserConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Name of the shell function that wraps `devrc navigate`.
    #[serde(default = "default_function")]
    pub function: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            function: default_function(),
        }
    }
}

impl BrowserConfig {
    pub fn command(&self) -> BrowserCommand {
        BrowserCommand {
            program: self.program.clone(),
            args: self.args.clone(),
        }
    }
}

/// Bundle file locations. Relative paths are taken from the bundle root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesConfig {
    #[serde(default = "default_manifest")]
    pub manifest: String,
    #[serde(default = "default_startup")]
    pub startup: String,
    #[serde(default = "default_aliases")]
    pub aliases: String,
    #[serde(default = "default_netrc")]
    pub netrc: String,
    /// `source` targets left for the shell to load itself.
    #[serde(default = "default_skip_sources")]
    pub skip_sources: Vec<String>,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            startup: default_startup(),
            aliases: default_aliases(),
            netrc: default_netrc(),
            skip_sources: default_skip_sources(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<CredentialBinding>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {:?}", path))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let contents =
            toml::to_string_pretty(self).context("Failed to serialize devrc config file")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {:?}", path))?;
        Ok(())
    }
}

/// Expand `~` and `$VARS` in a configured path and anchor it at `root`.
pub fn resolve_path(root: &Path, value: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(value)
        .with_context(|| format!("Failed to expand path '{}'", value))?;
    Ok(root.join(expanded.as_ref()))
}

fn default_program() -> String {
    "lf".to_string()
}

fn default_args() -> Vec<String> {
    vec!["-print-last-dir".to_string()]
}

fn default_function() -> String {
    "nav".to_string()
}

fn default_manifest() -> String {
    "Brewfile".to_string()
}

fn default_startup() -> String {
    "zshrc".to_string()
}

fn default_aliases() -> String {
    "alias".to_string()
}

fn default_netrc() -> String {
    "~/.netrc".to_string()
}

fn default_skip_sources() -> Vec<String> {
    vec!["$ZSH/oh-my-zsh.sh".to_string()]
}
