use crate::bundle::{Bundle, BundlePath};
use crate::environment::Shell;
use crate::ui;
use anyhow::{Context, Result};

pub fn execute(bundle: Bundle, shell: Option<String>) -> Result<()> {
    let shell = match shell {
        Some(name) => Shell::from_name(&name)
            .with_context(|| format!("Unsupported shell '{}' (expected zsh, bash, or fish)", name))?,
        None => Shell::detect()?,
    };

    let root = bundle.path(BundlePath::Root);
    if bundle.exists() {
        ui::status("Using", format!("existing bundle at {}", root.display()));
    } else {
        ui::status("Creating", format!("bundle at {}", root.display()));
    }

    for path in bundle.create()? {
        ui::success("Created", path.display());
    }

    // Re-read the config in case it was just written.
    let bundle = Bundle::open_at(root)?;
    let (rc_file, added) = bundle
        .setup(shell)
        .with_context(|| format!("Failed to setup shell integration for {}", shell.as_str()))?;

    if added {
        ui::success("Integrated", format!("{} ({})", rc_file.display(), shell.as_str()));
    } else {
        ui::status("Unchanged", format!("shell integration already present in {}", rc_file.display()));
    }

    ui::info("Run 'exec $SHELL' to reload your shell.");
    Ok(())
}
