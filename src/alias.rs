use std::collections::BTreeMap;

use crate::script::{Script, Statement};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub command: String,
    /// zsh global alias (`alias -g`), expanded anywhere on a command line.
    pub global: bool,
}

/// Token → command mapping built by folding alias definitions in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    entries: BTreeMap<String, Alias>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or redefine an alias, returning the previous command.
    pub fn define(&mut self, name: impl Into<String>, command: impl Into<String>) -> Option<String> {
        self.insert(name, command, false)
    }

    pub fn define_global(
        &mut self,
        name: impl Into<String>,
        command: impl Into<String>,
    ) -> Option<String> {
        self.insert(name, command, true)
    }

    fn insert(
        &mut self,
        name: impl Into<String>,
        command: impl Into<String>,
        global: bool,
    ) -> Option<String> {
        let alias = Alias {
            command: command.into(),
            global,
        };
        self.entries
            .insert(name.into(), alias)
            .map(|previous| previous.command)
    }

    /// Apply definitions in order; later keys overwrite earlier ones.
    pub fn apply<I, K, V>(&mut self, definitions: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, command) in definitions {
            self.define(name, command);
        }
    }

    /// Apply every alias statement in a script.
    pub fn apply_script(&mut self, script: &Script) {
        for located in script.statements() {
            if let Statement::Alias {
                name,
                value,
                global,
            } = &located.statement
            {
                self.insert(name.clone(), value.clone(), *global);
            }
        }
    }

    pub fn from_script(script: &Script) -> Self {
        let mut table = Self::new();
        table.apply_script(script);
        table
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|alias| alias.command.as_str())
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|alias| alias.global)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, alias)| (name.as_str(), alias.command.as_str()))
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Alias)> {
        self.entries.iter().map(|(name, alias)| (name.as_str(), alias))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Alias defined more than once within a single script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasOverride {
    pub name: String,
    /// Lines of every definition, in order. The last one wins.
    pub lines: Vec<usize>,
    /// Whether any redefinition changed the command.
    pub changed: bool,
}

pub fn overrides(script: &Script) -> Vec<AliasOverride> {
    let mut seen: BTreeMap<&str, (Vec<usize>, Vec<&str>)> = BTreeMap::new();

    for located in script.statements() {
        if let Statement::Alias { name, value, .. } = &located.statement {
            let (lines, values) = seen.entry(name.as_str()).or_default();
            lines.push(located.line);
            values.push(value.as_str());
        }
    }

    seen.into_iter()
        .filter(|(_, (lines, _))| lines.len() > 1)
        .map(|(name, (lines, values))| AliasOverride {
            name: name.to_string(),
            lines,
            changed: values.windows(2).any(|pair| pair[0] != pair[1]),
        })
        .collect()
}
