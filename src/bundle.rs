use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::{resolve_path, Config};
use crate::credentials::{
    CredentialBinding, EnvProvider, NetrcProvider, ProviderKind, ProviderRegistry,
};
use crate::environment::Shell;
use crate::session::Session;
use crate::util::xdg;

const INTEGRATION_MARKER: &str = "# devrc shell integration";

/// Template file definition for bundle initialization
struct TemplateFile {
    /// Path relative to the bundle root
    path: &'static str,
    /// File content embedded at compile time
    content: &'static str,
}

/// All template files embedded at compile time
const TEMPLATE_FILES: &[TemplateFile] = &[
    TemplateFile {
        path: "config.toml",
        content: include_str!("../templates/bundle/config.toml"),
    },
    TemplateFile {
        path: "Brewfile",
        content: include_str!("../templates/bundle/Brewfile"),
    },
    TemplateFile {
        path: "zshrc",
        content: include_str!("../templates/bundle/zshrc"),
    },
    TemplateFile {
        path: "alias",
        content: include_str!("../templates/bundle/alias"),
    },
];

/// Bundle path types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundlePath {
    /// Bundle root: $XDG_CONFIG_HOME/devrc
    Root,
    /// Config file: bundle/config.toml
    Config,
    /// Package manifest, `files.manifest`
    Manifest,
    /// Shell startup file, `files.startup`
    Startup,
    /// Alias file, `files.aliases`
    Aliases,
    /// Credentials file, `files.netrc`
    Netrc,
}

/// The devrc bundle: configuration plus the files it points at.
#[derive(Debug)]
pub struct Bundle {
    root: PathBuf,
    config: Config,
    manifest: PathBuf,
    startup: PathBuf,
    aliases: PathBuf,
    netrc: PathBuf,
}

impl Bundle {
    /// Open the bundle at `$XDG_CONFIG_HOME/devrc`
    pub fn open() -> Result<Self> {
        Self::open_at(xdg::config_dir()?)
    }

    pub fn open_at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config = Config::load(&root.join("config.toml"))?;

        Ok(Self {
            manifest: resolve_path(&root, &config.files.manifest)?,
            startup: resolve_path(&root, &config.files.startup)?,
            aliases: resolve_path(&root, &config.files.aliases)?,
            netrc: resolve_path(&root, &config.files.netrc)?,
            config,
            root,
        })
    }

    /// Get path for a specific bundle location
    pub fn path(&self, path_type: BundlePath) -> PathBuf {
        match path_type {
            BundlePath::Root => self.root.clone(),
            BundlePath::Config => self.root.join("config.toml"),
            BundlePath::Manifest => self.manifest.clone(),
            BundlePath::Startup => self.startup.clone(),
            BundlePath::Aliases => self.aliases.clone(),
            BundlePath::Netrc => self.netrc.clone(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check if bundle exists (has been initialized)
    pub fn exists(&self) -> bool {
        self.root.exists()
    }

    /// Write template files that are missing. Existing files are left alone.
    ///
    /// Returns the files that were written.
    pub fn create(&self) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create bundle directory {:?}", self.root))?;

        let mut created = Vec::new();
        for template in TEMPLATE_FILES {
            let file_path = self.root.join(template.path);
            if file_path.exists() {
                debug!(path = %file_path.display(), "keeping existing file");
                continue;
            }

            fs::write(&file_path, template.content)
                .with_context(|| format!("Failed to write template file {:?}", file_path))?;
            created.push(file_path);
        }

        Ok(created)
    }

    /// Setup shell integration by adding devrc env to the shell's rc file
    ///
    /// Returns the rc file and whether it was changed.
    pub fn setup(&self, shell: Shell) -> Result<(PathBuf, bool)> {
        let home = xdg::home_dir()?;

        let (rc_file, line) = match shell {
            Shell::Zsh => (home.join(".zshrc"), "eval \"$(devrc env --shell zsh)\""),
            Shell::Bash => (home.join(".bashrc"), "eval \"$(devrc env --shell bash)\""),
            Shell::Fish => (
                home.join(".config/fish/config.fish"),
                "devrc env --shell fish | source",
            ),
        };

        let added = add_shell_integration(&rc_file, line)?;
        Ok((rc_file, added))
    }

    /// Credential providers configured for this bundle.
    pub fn providers(&self) -> ProviderRegistry {
        ProviderRegistry::new()
            .with(ProviderKind::Netrc, NetrcProvider::new(&self.netrc))
            .with(ProviderKind::Env, EnvProvider)
    }

    /// Build a session from the startup and alias files.
    ///
    /// The alias file is only sourced here when the startup file did not
    /// already source it. Credentials are bound last; bindings that could not
    /// be resolved are returned.
    pub fn load_session(&self, mut session: Session) -> Result<(Session, Vec<&CredentialBinding>)> {
        for pattern in &self.config.files.skip_sources {
            session.skip_source(pattern.clone());
        }

        if self.startup.exists() {
            session
                .source(&self.startup)
                .with_context(|| format!("Failed to load startup file {:?}", self.startup))?;
        } else {
            debug!(path = %self.startup.display(), "no startup file");
        }

        if self.aliases.exists() && !session.has_sourced(&self.aliases) {
            session
                .source(&self.aliases)
                .with_context(|| format!("Failed to load alias file {:?}", self.aliases))?;
        }

        let unresolved = session.apply_credentials(&self.config.credentials, &self.providers());
        Ok((session, unresolved))
    }
}

/// Add integration line to shell rc file (idempotent)
fn add_shell_integration(rc_file: &Path, integration_line: &str) -> Result<bool> {
    let existing_content = if rc_file.exists() {
        fs::read_to_string(rc_file).with_context(|| format!("Failed to read {:?}", rc_file))?
    } else {
        String::new()
    };

    if existing_content.contains(integration_line) {
        return Ok(false);
    }

    let new_content = if existing_content.is_empty() || existing_content.ends_with('\n') {
        format!("{existing_content}{INTEGRATION_MARKER}\n{integration_line}\n")
    } else {
        format!("{existing_content}\n{INTEGRATION_MARKER}\n{integration_line}\n")
    };

    if let Some(parent) = rc_file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    fs::write(rc_file, new_content).with_context(|| format!("Failed to write {:?}", rc_file))?;

    Ok(true)
}
