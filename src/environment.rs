use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;

use crate::alias::Alias;
use crate::script::is_identifier;
use crate::session::Session;

const BIN_NAME: &str = env!("CARGO_PKG_NAME");

/// Shell type for environment generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    Zsh,
    Bash,
    Fish,
}

impl Shell {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "zsh" => Some(Shell::Zsh),
            "bash" => Some(Shell::Bash),
            "fish" => Some(Shell::Fish),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Shell::Zsh => "zsh",
            Shell::Bash => "bash",
            Shell::Fish => "fish",
        }
    }

    /// Shell named by `$SHELL`.
    pub fn detect() -> Result<Self> {
        let shell = env::var("SHELL").context("SHELL environment variable not set")?;
        let name = Path::new(&shell)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        match Self::from_name(name) {
            Some(shell) => Ok(shell),
            None => bail!("Unsupported shell '{}'", shell),
        }
    }
}

/// Quote for zsh and bash.
pub fn quote_posix(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Quote for fish.
pub fn quote_fish(value: &str) -> String {
    format!("'{}'", value.replace('\\', r"\\").replace('\'', r"\'"))
}

/// Shell environment produced from a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub exports: Vec<(String, String)>,
    pub locals: Vec<(String, String)>,
    pub arrays: Vec<(String, Vec<String>)>,
    pub sources: Vec<String>,
    pub aliases: Vec<(String, Alias)>,
    /// Name of the navigate wrapper function, if any.
    pub function: Option<String>,
}

impl Environment {
    pub fn from_session(session: &Session, function: Option<&str>) -> Self {
        let owned = |(name, value): (&str, &str)| (name.to_string(), value.to_string());
        Self {
            exports: session.exported().map(owned).collect(),
            locals: session.locals().map(owned).collect(),
            arrays: session
                .arrays()
                .map(|(name, items)| (name.to_string(), items.to_vec()))
                .collect(),
            sources: session.external_sources().to_vec(),
            aliases: session
                .aliases()
                .entries()
                .map(|(name, alias)| (name.to_string(), alias.clone()))
                .collect(),
            function: function
                .filter(|name| is_identifier(name))
                .map(str::to_string),
        }
    }

    /// Format the environment for the given shell
    pub fn format_for_shell(&self, shell: Shell) -> String {
        let lines = match shell {
            Shell::Zsh | Shell::Bash => self.format_posix(shell),
            Shell::Fish => self.format_fish(),
        };
        let mut output = lines.join("\n");
        if !output.is_empty() {
            output.push('\n');
        }
        output
    }

    fn format_posix(&self, shell: Shell) -> Vec<String> {
        let mut lines = Vec::new();
        for (name, value) in &self.exports {
            lines.push(format!("export {}={}", name, quote_posix(value)));
        }
        for (name, value) in &self.locals {
            lines.push(format!("{}={}", name, quote_posix(value)));
        }
        for (name, items) in &self.arrays {
            let items: Vec<_> = items.iter().map(|item| quote_posix(item)).collect();
            lines.push(format!("{}=({})", name, items.join(" ")));
        }
        for path in &self.sources {
            lines.push(format!("source {}", quote_posix(path)));
        }
        for (name, alias) in &self.aliases {
            let flag = match (alias.global, shell) {
                (false, _) => "",
                (true, Shell::Zsh) => "-g ",
                // Only zsh has global aliases.
                (true, _) => continue,
            };
            lines.push(format!(
                "alias {flag}{}={}",
                quote_posix(name),
                quote_posix(&alias.command)
            ));
        }
        if let Some(function) = &self.function {
            lines.push(format!(
                "{function}() {{ local dest; dest=\"$(command {BIN_NAME} navigate -- \"$@\")\" || return; if [[ -n \"$dest\" ]]; then cd -- \"$dest\"; fi }}"
            ));
        }
        lines
    }

    fn format_fish(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (name, value) in &self.exports {
            lines.push(format!("set -gx {} {}", name, quote_fish(value)));
        }
        for (name, value) in &self.locals {
            lines.push(format!("set -g {} {}", name, quote_fish(value)));
        }
        for (name, items) in &self.arrays {
            let mut line = format!("set -g {}", name);
            for item in items {
                line.push(' ');
                line.push_str(&quote_fish(item));
            }
            lines.push(line);
        }
        // zsh scripts cannot be sourced from fish.
        for (name, alias) in self.aliases.iter().filter(|(_, alias)| !alias.global) {
            lines.push(format!(
                "alias {} {}",
                quote_fish(name),
                quote_fish(&alias.command)
            ));
        }
        if let Some(function) = &self.function {
            lines.push(format!(
                "function {function}; set -l dest (command {BIN_NAME} navigate -- $argv); or return; if test -n \"$dest\"; cd -- $dest; end; end"
            ));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::script::Script;
    use serial_test::serial;
    use tempfile::TempDir;

    const STARTUP: &str = r#"
export ZSH="$HOME/.oh-my-zsh"
ZSH_THEME="agnoster"
plugins=(git docker)
export GREETING='it'\''s here'
source $ZSH/oh-my-zsh.sh
alias ll='ls -la'
alias gs="git status"
alias -g G='| grep'
"#;

    fn environment(function: Option<&str>) -> Environment {
        let temp = TempDir::new().unwrap();
        let mut session = Session::new(temp.path()).with_home("/home/dev");
        session.skip_source("$ZSH/oh-my-zsh.sh");
        session
            .apply_script(&Script::parse(STARTUP).unwrap())
            .unwrap();
        Environment::from_session(&session, function)
    }

    #[test]
    fn test_environment_from_session() {
        let env = environment(Some("nav"));

        assert_eq!(
            env.exports,
            vec![
                ("GREETING".to_string(), "it's here".to_string()),
                ("ZSH".to_string(), "/home/dev/.oh-my-zsh".to_string()),
            ]
        );
        assert_eq!(
            env.locals,
            vec![("ZSH_THEME".to_string(), "agnoster".to_string())]
        );
        assert_eq!(
            env.sources,
            vec!["/home/dev/.oh-my-zsh/oh-my-zsh.sh".to_string()]
        );
        assert_eq!(env.aliases.len(), 3);
        assert!(env.aliases.iter().any(|(name, alias)| name == "G" && alias.global));
        assert_eq!(env.function.as_deref(), Some("nav"));
    }

    #[test]
    fn test_environment_format_zsh() {
        let output = environment(Some("nav")).format_for_shell(Shell::Zsh);
        let lines: Vec<_> = output.lines().collect();

        assert_eq!(
            lines,
            vec![
                r"export GREETING='it'\''s here'",
                "export ZSH='/home/dev/.oh-my-zsh'",
                "ZSH_THEME='agnoster'",
                "plugins=('git' 'docker')",
                "source '/home/dev/.oh-my-zsh/oh-my-zsh.sh'",
                "alias -g 'G'='| grep'",
                "alias 'gs'='git status'",
                "alias 'll'='ls -la'",
                r#"nav() { local dest; dest="$(command devrc navigate -- "$@")" || return; if [[ -n "$dest" ]]; then cd -- "$dest"; fi }"#,
            ]
        );
    }

    #[test]
    fn test_environment_format_bash() {
        let output = environment(Some("nav")).format_for_shell(Shell::Bash);

        assert!(output.contains("export ZSH='/home/dev/.oh-my-zsh'\n"));
        assert!(output.contains("plugins=('git' 'docker')\n"));
        assert!(output.contains("nav() {"));
        assert!(output.contains("alias 'gs'='git status'\n"));
        assert!(!output.contains("grep"));
    }

    #[test]
    fn test_environment_format_fish() {
        let output = environment(Some("nav")).format_for_shell(Shell::Fish);

        assert!(output.contains(r"set -gx GREETING 'it\'s here'"));
        assert!(output.contains("set -g ZSH_THEME 'agnoster'"));
        assert!(output.contains("set -g plugins 'git' 'docker'"));
        assert!(output.contains("alias 'll' 'ls -la'"));
        assert!(output.contains("function nav; set -l dest (command devrc navigate -- $argv)"));
        assert!(!output.contains("export")); // fish uses set -gx
        assert!(!output.contains("source"));
        assert!(!output.contains("grep"));
    }

    #[test]
    fn test_invalid_function_name_is_dropped() {
        let env = environment(Some("not a name"));
        assert_eq!(env.function, None);
        assert!(!env.format_for_shell(Shell::Zsh).contains("navigate"));
    }

    #[test]
    fn test_empty_environment_is_empty() {
        assert_eq!(Environment::default().format_for_shell(Shell::Zsh), "");
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_posix("plain"), "'plain'");
        assert_eq!(quote_posix("a'b"), r"'a'\''b'");
        assert_eq!(quote_posix("$HOME"), "'$HOME'");
        assert_eq!(quote_fish(r"a'b\c"), r"'a\'b\\c'");
    }

    #[test]
    fn test_shell_from_name() {
        assert_eq!(Shell::from_name("zsh"), Some(Shell::Zsh));
        assert_eq!(Shell::from_name("BASH"), Some(Shell::Bash));
        assert_eq!(Shell::from_name("Fish"), Some(Shell::Fish));
        assert_eq!(Shell::from_name("powershell"), None);
    }

    #[test]
    fn test_shell_as_str() {
        assert_eq!(Shell::Zsh.as_str(), "zsh");
        assert_eq!(Shell::Bash.as_str(), "bash");
        assert_eq!(Shell::Fish.as_str(), "fish");
    }

    #[test]
    #[serial]
    fn test_shell_detect() {
        let original = env::var("SHELL").ok();

        env::set_var("SHELL", "/usr/local/bin/fish");
        assert_eq!(Shell::detect().unwrap(), Shell::Fish);

        env::set_var("SHELL", "/bin/tcsh");
        assert!(Shell::detect().is_err());

        env::remove_var("SHELL");
        let error = Shell::detect().unwrap_err();
        assert!(error.to_string().contains("SHELL environment variable not set"));

        if let Some(shell) = original {
            env::set_var("SHELL", shell);
        }
    }
}
