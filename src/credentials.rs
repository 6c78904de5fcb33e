//! Credential lookup for session variables.
//!
//! Credentials are fetched by key through a [`CredentialProvider`] rather than
//! scraped out of files by the startup script. Values are never logged and
//! never appear in error messages.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read credentials from {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The message never contains token values.
    #[error("malformed credentials file {path:?}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("credential provider '{0}' is not configured")]
    ProviderNotAvailable(ProviderKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialField {
    Login,
    Password,
    Account,
}

impl CredentialField {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialField::Login => "login",
            CredentialField::Password => "password",
            CredentialField::Account => "account",
        }
    }
}

/// Which field of which machine entry to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialKey {
    pub machine: String,
    pub field: CredentialField,
}

impl CredentialKey {
    pub fn new(machine: impl Into<String>, field: CredentialField) -> Self {
        Self {
            machine: machine.into(),
            field,
        }
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.machine, self.field.as_str())
    }
}

/// Source of credential values.
pub trait CredentialProvider {
    /// `Ok(None)` when the key is simply absent.
    fn get(&self, key: &CredentialKey) -> Result<Option<String>, CredentialError>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Netrc,
    Env,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Netrc => write!(f, "netrc"),
            ProviderKind::Env => write!(f, "env"),
        }
    }
}

/// `[[credentials]]` entry binding a session variable to a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialBinding {
    pub variable: String,
    pub machine: String,
    pub field: CredentialField,
    #[serde(default)]
    pub provider: ProviderKind,
}

impl CredentialBinding {
    pub fn key(&self) -> CredentialKey {
        CredentialKey::new(self.machine.clone(), self.field)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct NetrcEntry {
    login: Option<String>,
    password: Option<String>,
    account: Option<String>,
}

impl NetrcEntry {
    fn field(&self, field: CredentialField) -> Option<&String> {
        match field {
            CredentialField::Login => self.login.as_ref(),
            CredentialField::Password => self.password.as_ref(),
            CredentialField::Account => self.account.as_ref(),
        }
    }
}

/// Reads a `~/.netrc` style file.
#[derive(Debug, Clone)]
pub struct NetrcProvider {
    path: PathBuf,
}

impl NetrcProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file is unreadable by group and others.
    #[cfg(unix)]
    pub fn is_private(&self) -> io::Result<bool> {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&self.path)?.permissions().mode();
        Ok(mode & 0o077 == 0)
    }

    #[cfg(not(unix))]
    pub fn is_private(&self) -> io::Result<bool> {
        fs::metadata(&self.path).map(|_| true)
    }

    fn entries(&self) -> Result<(HashMap<String, NetrcEntry>, Option<NetrcEntry>), CredentialError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok((HashMap::new(), None));
            }
            Err(source) => {
                return Err(CredentialError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        parse_netrc(&contents).map_err(|message| CredentialError::Malformed {
            path: self.path.clone(),
            message,
        })
    }
}

impl CredentialProvider for NetrcProvider {
    fn get(&self, key: &CredentialKey) -> Result<Option<String>, CredentialError> {
        let (machines, default) = self.entries()?;
        let entry = machines.get(&key.machine).or(default.as_ref());
        Ok(entry.and_then(|entry| entry.field(key.field)).cloned())
    }

    fn name(&self) -> &'static str {
        "netrc"
    }
}

fn parse_netrc(contents: &str) -> Result<(HashMap<String, NetrcEntry>, Option<NetrcEntry>), String> {
    enum Target {
        None,
        Machine(String),
        Default,
    }

    let mut machines: HashMap<String, NetrcEntry> = HashMap::new();
    let mut default = None;
    let mut current = Target::None;
    let mut entry = NetrcEntry::default();

    let mut finish = |target: &Target, entry: NetrcEntry| match target {
        Target::Machine(name) => {
            machines.entry(name.clone()).or_insert(entry);
        }
        Target::Default => default = Some(entry),
        Target::None => {}
    };

    let mut lines = contents.lines();
    while let Some(line) = lines.next() {
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            if token.starts_with('#') {
                break;
            }

            match token {
                "machine" => {
                    let name = tokens
                        .next()
                        .ok_or_else(|| "'machine' without a host name".to_string())?;
                    finish(&current, std::mem::take(&mut entry));
                    current = Target::Machine(name.to_string());
                }
                "default" => {
                    finish(&current, std::mem::take(&mut entry));
                    current = Target::Default;
                }
                "login" | "password" | "account" => {
                    let value = tokens
                        .next()
                        .ok_or_else(|| format!("'{token}' without a value"))?;
                    if matches!(current, Target::None) {
                        return Err(format!("'{token}' appears before any machine"));
                    }
                    let slot = match token {
                        "login" => &mut entry.login,
                        "password" => &mut entry.password,
                        _ => &mut entry.account,
                    };
                    *slot = Some(value.to_string());
                }
                "macdef" => {
                    // Macro bodies run until the next blank line.
                    for body in lines.by_ref() {
                        if body.trim().is_empty() {
                            break;
                        }
                    }
                    break;
                }
                other => return Err(format!("unexpected token '{other}'")),
            }
        }
    }
    finish(&current, entry);

    Ok((machines, default))
}

/// Reads `DEVRC_CRED_<MACHINE>_<FIELD>` from the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvProvider;

impl EnvProvider {
    pub fn variable_name(key: &CredentialKey) -> String {
        let machine: String = key
            .machine
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() {
                    ch.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!(
            "DEVRC_CRED_{}_{}",
            machine,
            key.field.as_str().to_ascii_uppercase()
        )
    }
}

impl CredentialProvider for EnvProvider {
    fn get(&self, key: &CredentialKey) -> Result<Option<String>, CredentialError> {
        Ok(std::env::var(Self::variable_name(key)).ok())
    }

    fn name(&self) -> &'static str {
        "env"
    }
}

/// Fixed credentials held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    values: BTreeMap<(String, CredentialField), String>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        machine: impl Into<String>,
        field: CredentialField,
        value: impl Into<String>,
    ) -> Self {
        self.values.insert((machine.into(), field), value.into());
        self
    }
}

impl CredentialProvider for MemoryProvider {
    fn get(&self, key: &CredentialKey) -> Result<Option<String>, CredentialError> {
        Ok(self
            .values
            .get(&(key.machine.clone(), key.field))
            .cloned())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Providers available to a session, by kind.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Box<dyn CredentialProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: ProviderKind, provider: impl CredentialProvider + 'static) -> Self {
        self.providers.insert(kind, Box::new(provider));
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&dyn CredentialProvider> {
        self.providers.get(&kind).map(|provider| provider.as_ref())
    }

    pub fn resolve(&self, binding: &CredentialBinding) -> Result<Option<String>, CredentialError> {
        let provider = self
            .get(binding.provider)
            .ok_or(CredentialError::ProviderNotAvailable(binding.provider))?;
        provider.get(&binding.key())
    }
}
