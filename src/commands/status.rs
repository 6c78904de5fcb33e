use crate::bundle::{Bundle, BundlePath};
use crate::manifest::{DirectiveKind, Manifest};
use crate::session::Session;
use crate::ui;
use anyhow::Result;

pub fn execute(bundle: &Bundle) -> Result<()> {
    let root = bundle.path(BundlePath::Root);
    if !bundle.exists() {
        ui::info(format!(
            "No bundle at {}. Run 'devrc init' to create one.",
            root.display()
        ));
        return Ok(());
    }

    ui::status("Bundle", root.display());
    for (label, path_type) in [
        ("Manifest", BundlePath::Manifest),
        ("Startup", BundlePath::Startup),
        ("Aliases", BundlePath::Aliases),
    ] {
        let path = bundle.path(path_type);
        let state = if path.exists() { "" } else { " (missing)" };
        ui::status(label, format!("{}{state}", path.display()));
    }

    let manifest_path = bundle.path(BundlePath::Manifest);
    if manifest_path.exists() {
        let manifest = Manifest::load(&manifest_path)?;
        let counts: Vec<String> = [
            DirectiveKind::Tap,
            DirectiveKind::Brew,
            DirectiveKind::Cask,
            DirectiveKind::Mas,
            DirectiveKind::Vscode,
        ]
        .into_iter()
        .filter_map(|kind| {
            let count = manifest.of_kind(kind).count();
            (count > 0).then(|| format!("{count} {kind}"))
        })
        .collect();
        ui::status("Packages", counts.join(", "));
    }

    let (session, unresolved) = bundle.load_session(Session::from_process()?)?;
    ui::status(
        "Session",
        format!(
            "{} exported, {} local, {} aliases",
            session.exported().count(),
            session.locals().count(),
            session.aliases().len()
        ),
    );
    if let Some(theme) = session.theme() {
        ui::status("Theme", theme);
    }
    if !session.plugins().is_empty() {
        ui::status("Plugins", session.plugins().join(" "));
    }
    let credentials = &bundle.config().credentials;
    if !credentials.is_empty() {
        ui::status(
            "Credentials",
            format!(
                "{} of {} resolved",
                credentials.len() - unresolved.len(),
                credentials.len()
            ),
        );
    }

    let browser = &bundle.config().browser;
    let location = match which::which(&browser.program) {
        Ok(path) => path.display().to_string(),
        Err(_) => "not found".to_string(),
    };
    ui::status(
        "Browser",
        format!("{} ({location}), function '{}'", browser.program, browser.function),
    );

    Ok(())
}
