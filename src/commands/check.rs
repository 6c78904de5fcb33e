use crate::alias;
use crate::bundle::{Bundle, BundlePath};
use crate::credentials::{NetrcProvider, ProviderKind};
use crate::manifest::{Manifest, Severity};
use crate::script::{is_identifier, Script};
use crate::session::Session;
use crate::ui;
use anyhow::Result;
use std::path::Path;

#[derive(Default)]
struct Report {
    errors: usize,
    warnings: usize,
}

impl Report {
    fn error(&mut self, location: &Path, line: Option<usize>, message: impl AsRef<str>) {
        self.errors += 1;
        ui::error(format!("{}: {}", format_location(location, line), message.as_ref()));
    }

    fn warn(&mut self, location: &Path, line: Option<usize>, message: impl AsRef<str>) {
        self.warnings += 1;
        ui::warn(format!("{}: {}", format_location(location, line), message.as_ref()));
    }
}

fn format_location(path: &Path, line: Option<usize>) -> String {
    match line {
        Some(line) => format!("{}:{line}", path.display()),
        None => path.display().to_string(),
    }
}

pub fn execute(bundle: &Bundle) -> Result<()> {
    let mut report = Report::default();
    let mut checked = 0usize;

    let manifest_path = bundle.path(BundlePath::Manifest);
    if manifest_path.exists() {
        checked += 1;
        match Manifest::load(&manifest_path) {
            Ok(manifest) => {
                for issue in manifest.validate() {
                    match issue.severity {
                        Severity::Error => {
                            report.error(&manifest_path, Some(issue.line), &issue.message)
                        }
                        Severity::Warning => {
                            report.warn(&manifest_path, Some(issue.line), &issue.message)
                        }
                    }
                }
            }
            Err(err) => report.error(&manifest_path, None, format!("{err:#}")),
        }
    }

    for path_type in [BundlePath::Startup, BundlePath::Aliases] {
        let path = bundle.path(path_type);
        if !path.exists() {
            continue;
        }
        checked += 1;

        let script = match Script::load(&path) {
            Ok(script) => script,
            Err(err) => {
                report.error(&path, None, format!("{err:#}"));
                continue;
            }
        };

        for (line, text, reason) in script.unsupported() {
            let first = text.lines().next().unwrap_or_default();
            report.warn(&path, Some(line), format!("{reason} is not applied: {first}"));
        }

        for found in alias::overrides(&script) {
            if found.changed {
                let lines: Vec<String> = found.lines.iter().map(ToString::to_string).collect();
                report.warn(
                    &path,
                    found.lines.last().copied(),
                    format!(
                        "alias '{}' is redefined with a different command (lines {})",
                        found.name,
                        lines.join(", ")
                    ),
                );
            }
        }
    }

    let config_path = bundle.path(BundlePath::Config);
    let config = bundle.config();

    if report.errors == 0 {
        match bundle.load_session(Session::from_process()?) {
            Ok((_, unresolved)) => {
                for binding in unresolved {
                    report.warn(
                        &config_path,
                        None,
                        format!(
                            "credential {} for '{}' not found via {}",
                            binding.key(),
                            binding.variable,
                            binding.provider
                        ),
                    );
                }
            }
            Err(err) => report.error(&config_path, None, format!("{err:#}")),
        }
    }

    for binding in &config.credentials {
        if !is_identifier(&binding.variable) {
            report.error(
                &config_path,
                None,
                format!("credential variable '{}' is not a valid name", binding.variable),
            );
        }
    }

    let netrc_path = bundle.path(BundlePath::Netrc);
    let uses_netrc = config
        .credentials
        .iter()
        .any(|binding| binding.provider == ProviderKind::Netrc);
    if uses_netrc && netrc_path.exists() {
        if let Ok(false) = NetrcProvider::new(&netrc_path).is_private() {
            report.warn(&netrc_path, None, "readable by other users; run 'chmod 600' on it");
        }
    }

    if !is_identifier(&config.browser.function) {
        report.error(
            &config_path,
            None,
            format!("browser function '{}' is not a valid name", config.browser.function),
        );
    }
    if which::which(&config.browser.program).is_err() {
        report.error(
            &config_path,
            None,
            format!("browser '{}' not found on PATH", config.browser.program),
        );
    }

    if report.errors > 0 {
        anyhow::bail!(
            "Bundle check failed ({} error(s), {} warning(s)).",
            report.errors,
            report.warnings
        );
    }

    if checked == 0 {
        ui::info("No bundle files found to validate.");
    } else if report.warnings == 0 {
        ui::success("Check", format!("Validated {checked} file(s) without issues."));
    } else {
        ui::success(
            "Check",
            format!("Validated {checked} file(s) with {} warning(s).", report.warnings),
        );
    }
    Ok(())
}
