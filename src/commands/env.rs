use crate::bundle::Bundle;
use crate::environment::{Environment, Shell};
use crate::session::Session;
use anyhow::Result;

pub fn execute(bundle: &Bundle, shell: String) -> Result<()> {
    let resolved = Shell::from_name(&shell).unwrap_or_else(|| {
        eprintln!("Unknown shell '{}'; defaulting to {}.", shell, Shell::Zsh.as_str());
        Shell::Zsh
    });

    let (session, _) = bundle.load_session(Session::from_process()?)?;
    let environment =
        Environment::from_session(&session, Some(bundle.config().browser.function.as_str()));
    print!("{}", environment.format_for_shell(resolved));

    Ok(())
}
