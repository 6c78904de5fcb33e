use crate::bundle::{Bundle, BundlePath};
use crate::manifest::{DirectiveKind, Manifest};
use crate::ui;
use anyhow::{bail, Context, Result};
use std::fs;

pub fn list(bundle: &Bundle, kind: Option<String>) -> Result<()> {
    let kind = kind
        .map(|name| {
            DirectiveKind::from_name(&name).with_context(|| {
                format!("Unknown directive kind '{}' (expected tap, brew, cask, mas, or vscode)", name)
            })
        })
        .transpose()?;

    let manifest = Manifest::load(&bundle.path(BundlePath::Manifest))?;
    for (_, directive) in manifest.directives() {
        if kind.map_or(true, |kind| directive.kind == kind) {
            println!("{directive}");
        }
    }

    Ok(())
}

pub fn fmt(bundle: &Bundle, check: bool) -> Result<()> {
    let path = bundle.path(BundlePath::Manifest);
    let original =
        fs::read_to_string(&path).with_context(|| format!("Failed to read manifest {:?}", path))?;
    let manifest = Manifest::load(&path)?;

    if manifest.to_string() == original {
        ui::success("Formatted", format!("{} is already canonical", path.display()));
        return Ok(());
    }

    if check {
        bail!("{} is not canonically formatted", path.display());
    }

    manifest.save(&path)?;
    ui::success("Formatted", path.display());
    Ok(())
}
