use clap::{Parser, Subcommand};

/// Development environment bundle manager
///
/// devrc owns a Brewfile, a zsh startup file, and an alias file under
/// `$XDG_CONFIG_HOME/devrc`. It interprets the declarative parts of those
/// files into a shell environment, validates them, and wraps an interactive
/// directory browser so picking a directory changes the shell's cwd.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the bundle from templates and add shell integration
    ///
    /// Existing bundle files are never overwritten.
    Init {
        /// Shell type (auto-detects from $SHELL if not specified)
        #[arg(short, long, value_name = "SHELL")]
        shell: Option<String>,
    },

    /// Output environment setup (used in shell init)
    Env {
        /// Shell type (zsh, bash, fish)
        #[arg(short, long, value_name = "SHELL", default_value = "zsh")]
        shell: String,
    },

    /// Run the directory browser and print the selected directory
    ///
    /// Prints nothing when the browser exits without a selection. Arguments
    /// are passed to the browser unchanged.
    Navigate {
        #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Validate the manifest, shell files, config, and credentials
    Check,

    /// Inspect or format the package manifest
    #[command(subcommand)]
    Bundle(BundleAction),

    /// Print the resolved alias table
    Aliases,

    /// Show bundle status
    Status,
}

#[derive(Subcommand, Debug)]
pub enum BundleAction {
    /// List manifest directives
    List {
        /// Only show one directive kind (tap, brew, cask, mas, vscode)
        #[arg(short, long, value_name = "KIND")]
        kind: Option<String>,
    },

    /// Rewrite the manifest in canonical form
    Fmt {
        /// Report whether formatting would change the file without writing it
        #[arg(long)]
        check: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn navigate_keeps_hyphenated_arguments() {
        let cli = Cli::parse_from(["devrc", "navigate", "-single", "/tmp"]);
        match cli.command {
            Commands::Navigate { args } => assert_eq!(args, vec!["-single", "/tmp"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn navigate_accepts_separator() {
        let cli = Cli::parse_from(["devrc", "navigate", "--", "-x"]);
        match cli.command {
            Commands::Navigate { args } => assert_eq!(args, vec!["-x"]),
            other => panic!("unexpected {other:?}"),
        }
    }
}
