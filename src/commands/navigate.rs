use crate::bundle::Bundle;
use crate::navigate::{Navigation, Navigator};
use crate::session::Session;
use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::Path;

pub fn execute(bundle: &Bundle, args: Vec<String>) -> Result<()> {
    let mut session = Session::from_process()?;
    let mut navigator = Navigator::new(bundle.config().browser.command());

    match navigator.navigate(&mut session, &args)? {
        Navigation::Moved { to, .. } => {
            print_path(&to).context("Failed to write the selected directory")?
        }
        Navigation::Unchanged { .. } => {}
    }

    Ok(())
}

/// The shell function `cd`s to exactly these bytes.
#[cfg(unix)]
fn print_path(path: &Path) -> io::Result<()> {
    use std::os::unix::ffi::OsStrExt;

    let mut stdout = io::stdout().lock();
    stdout.write_all(path.as_os_str().as_bytes())?;
    stdout.write_all(b"\n")?;
    stdout.flush()
}

#[cfg(not(unix))]
fn print_path(path: &Path) -> io::Result<()> {
    writeln!(io::stdout(), "{}", path.display())
}
