use crate::bundle::Bundle;
use crate::cli::{BundleAction, Cli, Commands};
use anyhow::Result;

mod aliases;
mod bundle;
mod check;
mod env;
mod init;
mod navigate;
mod status;

pub fn execute(cli: Cli) -> Result<()> {
    // Open the bundle - this is the root entry point
    let bundle = Bundle::open()?;

    match cli.command {
        Commands::Init { shell } => init::execute(bundle, shell),

        Commands::Env { shell } => env::execute(&bundle, shell),

        Commands::Navigate { args } => navigate::execute(&bundle, args),

        Commands::Check => check::execute(&bundle),

        Commands::Bundle(BundleAction::List { kind }) => bundle::list(&bundle, kind),

        Commands::Bundle(BundleAction::Fmt { check }) => bundle::fmt(&bundle, check),

        Commands::Aliases => aliases::execute(&bundle),

        Commands::Status => status::execute(&bundle),
    }
}
