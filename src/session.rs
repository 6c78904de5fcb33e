//! Explicit session state built by interpreting startup and alias files.

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::alias::AliasTable;
use crate::credentials::{CredentialBinding, ProviderRegistry};
use crate::script::{Part, Script, Statement, Word};
use crate::util::xdg;

/// Deepest chain of nested `source` statements that will be followed.
pub const MAX_SOURCE_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub value: String,
    pub exported: bool,
}

/// Working directory, variables, arrays, and aliases of one shell session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    cwd: PathBuf,
    home: Option<PathBuf>,
    vars: BTreeMap<String, Variable>,
    arrays: BTreeMap<String, Vec<String>>,
    aliases: AliasTable,
    sourced: Vec<PathBuf>,
    skip_sources: Vec<String>,
    external: Vec<String>,
}

impl Session {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            ..Self::default()
        }
    }

    /// Session rooted at the process working directory and home.
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir()?;
        let mut session = Self::new(cwd);
        session.home = xdg::home_dir().ok();
        Ok(session)
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Change the working directory. On error the current directory is kept.
    pub fn change_dir(&mut self, path: impl AsRef<Path>) -> io::Result<()> {
        let target = self.cwd.join(path.as_ref());
        let metadata = fs::metadata(&target)?;
        if !metadata.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", target.display()),
            ));
        }
        debug!(from = %self.cwd.display(), to = %target.display(), "changing directory");
        self.cwd = target;
        Ok(())
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|var| var.value.as_str())
    }

    /// Assigning to an exported variable keeps it exported.
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>, exported: bool) {
        let name = name.into();
        let exported = exported || self.vars.get(&name).is_some_and(|var| var.exported);
        self.vars.insert(
            name,
            Variable {
                value: value.into(),
                exported,
            },
        );
    }

    /// Mark an existing session variable as exported.
    pub fn export(&mut self, name: &str) {
        if let Some(var) = self.vars.get_mut(name) {
            var.exported = true;
        }
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.vars.iter().map(|(name, var)| (name.as_str(), var))
    }

    pub fn exported(&self) -> impl Iterator<Item = (&str, &str)> {
        self.variables()
            .filter(|(_, var)| var.exported)
            .map(|(name, var)| (name, var.value.as_str()))
    }

    pub fn locals(&self) -> impl Iterator<Item = (&str, &str)> {
        self.variables()
            .filter(|(_, var)| !var.exported)
            .map(|(name, var)| (name, var.value.as_str()))
    }

    pub fn set_array(&mut self, name: impl Into<String>, items: Vec<String>) {
        self.arrays.insert(name.into(), items);
    }

    pub fn array(&self, name: &str) -> Option<&[String]> {
        self.arrays.get(name).map(Vec::as_slice)
    }

    pub fn arrays(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.arrays
            .iter()
            .map(|(name, items)| (name.as_str(), items.as_slice()))
    }

    pub fn theme(&self) -> Option<&str> {
        self.var("ZSH_THEME")
    }

    pub fn plugins(&self) -> &[String] {
        self.array("plugins").unwrap_or_default()
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Files read so far, canonicalized, in order.
    pub fn sourced(&self) -> &[PathBuf] {
        &self.sourced
    }

    pub fn has_sourced(&self, path: &Path) -> bool {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.sourced.contains(&path)
    }

    /// Leave `source` statements matching `pattern` to the real shell.
    ///
    /// The pattern is expanded against the session when a `source` statement
    /// is reached, so `$ZSH/oh-my-zsh.sh` matches once `ZSH` is assigned.
    pub fn skip_source(&mut self, pattern: impl Into<String>) {
        self.skip_sources.push(pattern.into());
    }

    /// Skipped `source` paths, expanded, in the order they were reached.
    pub fn external_sources(&self) -> &[String] {
        &self.external
    }

    /// Interpret a file relative to the working directory.
    pub fn source(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = self.cwd.join(path.as_ref());
        let script = Script::load(&path)?;
        self.apply_script(&script)
    }

    /// Apply a parsed script in file order.
    pub fn apply_script(&mut self, script: &Script) -> Result<()> {
        self.apply_at_depth(script, 0)
    }

    fn apply_at_depth(&mut self, script: &Script, depth: usize) -> Result<()> {
        let base = match &script.path {
            Some(path) => {
                self.sourced
                    .push(path.canonicalize().unwrap_or_else(|_| path.clone()));
                path.parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.cwd.clone())
            }
            None => self.cwd.clone(),
        };

        for located in script.statements() {
            match &located.statement {
                Statement::Assign {
                    name,
                    value,
                    exported,
                } => {
                    let value = self.expand(value);
                    self.set_var(name.clone(), value, *exported);
                }
                Statement::Export { name } => self.export(name),
                Statement::Array { name, items } => {
                    let items = items.iter().map(|item| self.expand(item)).collect();
                    self.set_array(name.clone(), items);
                }
                Statement::Alias {
                    name,
                    value,
                    global: false,
                } => {
                    self.aliases.define(name.clone(), value.clone());
                }
                Statement::Alias { name, value, .. } => {
                    self.aliases.define_global(name.clone(), value.clone());
                }
                Statement::Source { path } => self.source_nested(path, &base, depth + 1)?,
                Statement::Unsupported { reason, .. } => {
                    debug!(line = located.line, reason, "skipping unsupported statement");
                }
            }
        }

        Ok(())
    }

    fn source_nested(&mut self, path: &Word, base: &Path, depth: usize) -> Result<()> {
        let expanded = self.expand(path);
        if self.is_skipped(&expanded) {
            debug!(path = %expanded, "leaving source to the shell");
            if !self.external.contains(&expanded) {
                self.external.push(expanded);
            }
            return Ok(());
        }

        let target = base.join(&expanded);
        if depth > MAX_SOURCE_DEPTH {
            bail!(
                "Sourcing {:?} exceeds the maximum nesting depth of {}",
                target,
                MAX_SOURCE_DEPTH
            );
        }

        let contents = match fs::read_to_string(&target) {
            Ok(contents) => contents,
            Err(err) => {
                warn!(path = %target.display(), error = %err, "skipping unreadable source");
                return Ok(());
            }
        };

        match Script::parse(&contents) {
            Ok(mut script) => {
                script.path = Some(target);
                self.apply_at_depth(&script, depth)
            }
            Err(err) => {
                warn!(path = %target.display(), error = %err, "skipping unparseable source");
                Ok(())
            }
        }
    }

    fn is_skipped(&self, expanded: &str) -> bool {
        self.skip_sources
            .iter()
            .any(|pattern| self.expand(&Word::bare(pattern.as_str())) == expanded)
    }

    /// Bind credentials to exported variables.
    ///
    /// Returns the bindings that could not be resolved; their variables are
    /// left untouched.
    pub fn apply_credentials<'a>(
        &mut self,
        bindings: &'a [CredentialBinding],
        registry: &ProviderRegistry,
    ) -> Vec<&'a CredentialBinding> {
        let mut unresolved = Vec::new();

        for binding in bindings {
            match registry.resolve(binding) {
                Ok(Some(value)) => {
                    debug!(variable = %binding.variable, key = %binding.key(), "credential bound");
                    self.set_var(binding.variable.clone(), value, true);
                }
                Ok(None) => {
                    warn!(variable = %binding.variable, key = %binding.key(), "credential not found");
                    unresolved.push(binding);
                }
                Err(err) => {
                    warn!(variable = %binding.variable, error = %err, "credential lookup failed");
                    unresolved.push(binding);
                }
            }
        }

        unresolved
    }

    /// Expand `$NAME` and `${NAME}` outside single quotes, and a `~` that
    /// starts the word unquoted.
    ///
    /// Session variables shadow the process environment. Undefined variables
    /// expand to the empty string.
    pub fn expand(&self, word: &Word) -> String {
        let home = self
            .home
            .as_ref()
            .map(|home| home.to_string_lossy().into_owned())
            .or_else(|| self.lookup("HOME"));
        let context = |name: &str| Some(self.lookup(name).unwrap_or_default());

        let mut out = String::new();
        for (idx, part) in word.parts().iter().enumerate() {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Expand(text) if idx == 0 => out.push_str(
                    &shellexpand::full_with_context_no_errors(text.as_str(), || home.as_deref(), context),
                ),
                Part::Expand(text) | Part::Quoted(text) => {
                    out.push_str(&shellexpand::env_with_context_no_errors(text.as_str(), context))
                }
            }
        }
        out
    }

    fn lookup(&self, name: &str) -> Option<String> {
        if name == "HOME" {
            if let Some(home) = &self.home {
                return Some(home.to_string_lossy().into_owned());
            }
        }
        self.var(name)
            .map(str::to_string)
            .or_else(|| env::var(name).ok())
    }
}
