use crate::bundle::Bundle;
use crate::environment::quote_posix;
use crate::session::Session;
use anyhow::Result;

pub fn execute(bundle: &Bundle) -> Result<()> {
    let (session, _) = bundle.load_session(Session::from_process()?)?;

    for (name, alias) in session.aliases().entries() {
        let flag = if alias.global { "-g " } else { "" };
        println!("{flag}{name}={}", quote_posix(&alias.command));
    }

    Ok(())
}
