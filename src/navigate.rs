//! Interactive directory selection through an external terminal browser.
//!
//! The browser owns the terminal while it runs. Whatever it prints as the
//! first line of stdout becomes the new working directory of the session;
//! empty output means the user cancelled.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;
use tracing::debug;

use crate::session::Session;

#[derive(Debug, Error)]
pub enum NavigateError {
    #[error("browser '{0}' not found on PATH")]
    BrowserNotFound(String),

    #[error("failed to run browser '{program}'")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("selected path {path:?} is not an accessible directory")]
    InvalidSelection {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Program and leading arguments used to launch the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl BrowserCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigatorState {
    Idle,
    Browsing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Moved { from: PathBuf, to: PathBuf },
    /// Nothing was selected. `status` is how the browser exited.
    Unchanged { status: ExitStatus },
}

#[derive(Debug)]
pub struct Navigator {
    browser: BrowserCommand,
    state: NavigatorState,
}

impl Navigator {
    pub fn new(browser: BrowserCommand) -> Self {
        Self {
            browser,
            state: NavigatorState::Idle,
        }
    }

    pub fn browser(&self) -> &BrowserCommand {
        &self.browser
    }

    pub fn state(&self) -> NavigatorState {
        self.state
    }

    /// Run the browser from the session's directory and move to its selection.
    ///
    /// `args` are appended to the configured arguments unchanged. The
    /// session's directory is only replaced when the selection names an
    /// existing directory.
    pub fn navigate(
        &mut self,
        session: &mut Session,
        args: &[String],
    ) -> Result<Navigation, NavigateError> {
        self.state = NavigatorState::Browsing;
        let result = self.browse(session, args);
        self.state = NavigatorState::Idle;

        let (status, stdout) = result?;
        let selection = first_line(&stdout);

        if selection.as_os_str().is_empty() {
            debug!(%status, "browser exited without a selection");
            return Ok(Navigation::Unchanged { status });
        }

        let from = session.cwd().to_path_buf();
        session
            .change_dir(&selection)
            .map_err(|source| NavigateError::InvalidSelection {
                path: selection.clone(),
                source,
            })?;

        Ok(Navigation::Moved {
            from,
            to: session.cwd().to_path_buf(),
        })
    }

    fn browse(
        &self,
        session: &Session,
        args: &[String],
    ) -> Result<(ExitStatus, Vec<u8>), NavigateError> {
        let program = &self.browser.program;
        debug!(
            program = %program,
            args = ?self.browser.args.iter().chain(args).collect::<Vec<_>>(),
            cwd = %session.cwd().display(),
            "launching browser"
        );

        let child = Command::new(program)
            .args(&self.browser.args)
            .args(args)
            .current_dir(session.cwd())
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => NavigateError::BrowserNotFound(program.clone()),
                _ => NavigateError::Io {
                    program: program.clone(),
                    source,
                },
            })?;

        let output = child.wait_with_output().map_err(|source| NavigateError::Io {
            program: program.clone(),
            source,
        })?;

        Ok((output.status, output.stdout))
    }
}

/// First line of the browser's output as a path. Directory names are not
/// required to be UTF-8.
fn first_line(stdout: &[u8]) -> PathBuf {
    let line = stdout.split(|byte| *byte == b'\n').next().unwrap_or_default();
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    path_from_bytes(line)
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Browser that runs `script` under `sh`; caller arguments become `$1...`.
    fn stub(script: &str) -> Navigator {
        Navigator::new(
            BrowserCommand::new("sh")
                .arg("-c")
                .arg(script)
                .arg("stub-browser"),
        )
    }

    fn start(temp: &TempDir) -> Session {
        Session::new(temp.path())
    }

    #[test]
    fn empty_selection_leaves_directory_unchanged() {
        let temp = TempDir::new().unwrap();
        let mut session = start(&temp);
        let mut navigator = stub("exit 0");

        let outcome = navigator.navigate(&mut session, &[]).unwrap();

        assert!(matches!(outcome, Navigation::Unchanged { status } if status.success()));
        assert_eq!(session.cwd(), temp.path());
        assert_eq!(navigator.state(), NavigatorState::Idle);
    }

    #[test]
    fn interrupted_browser_leaves_directory_unchanged() {
        let temp = TempDir::new().unwrap();
        let mut session = start(&temp);

        let outcome = stub("exit 130").navigate(&mut session, &[]).unwrap();

        match outcome {
            Navigation::Unchanged { status } => assert_eq!(status.code(), Some(130)),
            other => panic!("expected no change, got {other:?}"),
        }
        assert_eq!(session.cwd(), temp.path());
    }

    #[test]
    fn moves_to_absolute_selection() {
        let temp = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let mut session = start(&temp);
        let script = format!("printf '%s\\n' '{}'", target.path().display());

        let outcome = stub(&script).navigate(&mut session, &[]).unwrap();

        assert_eq!(
            outcome,
            Navigation::Moved {
                from: temp.path().to_path_buf(),
                to: target.path().to_path_buf(),
            }
        );
        assert_eq!(session.cwd(), target.path());
    }

    #[test]
    fn forwards_arguments_to_browser() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("starting");
        fs::create_dir(&target).unwrap();
        let mut session = start(&temp);

        let args = vec![target.display().to_string()];
        stub("printf '%s\\n' \"$1\"")
            .navigate(&mut session, &args)
            .unwrap();

        assert_eq!(session.cwd(), target);
    }

    #[test]
    fn only_first_line_is_used() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("first")).unwrap();
        let mut session = start(&temp);

        stub("printf 'first\\nsecond\\n'")
            .navigate(&mut session, &[])
            .unwrap();

        assert_eq!(session.cwd(), temp.path().join("first"));
    }

    #[test]
    fn first_line_keeps_raw_bytes() {
        use std::os::unix::ffi::OsStrExt;

        assert_eq!(first_line(b""), PathBuf::new());
        assert_eq!(first_line(b"/tmp\r\nnext\n"), PathBuf::from("/tmp"));
        assert_eq!(first_line(b"caf\xe9\n").as_os_str().as_bytes(), b"caf\xe9");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn moves_to_non_utf8_selection() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        let target = temp.path().join(OsStr::from_bytes(b"caf\xe9"));
        fs::create_dir(&target).unwrap();
        let mut session = start(&temp);

        let outcome = stub("printf 'caf\\351\\n'")
            .navigate(&mut session, &[])
            .unwrap();

        assert!(matches!(outcome, Navigation::Moved { ref to, .. } if *to == target));
        assert_eq!(session.cwd(), target);
    }

    #[test]
    fn browser_runs_in_session_directory() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("marker")).unwrap();
        fs::create_dir(temp.path().join("found")).unwrap();
        let mut session = start(&temp);

        stub("test -d marker && echo found")
            .navigate(&mut session, &[])
            .unwrap();

        assert_eq!(session.cwd(), temp.path().join("found"));
    }

    #[test]
    fn invalid_selection_is_an_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("plain-file"), "").unwrap();
        let mut session = start(&temp);

        for script in ["echo does-not-exist", "echo plain-file"] {
            let mut navigator = stub(script);
            let error = navigator.navigate(&mut session, &[]).unwrap_err();
            assert!(matches!(error, NavigateError::InvalidSelection { .. }));
            assert_eq!(navigator.state(), NavigatorState::Idle);
            assert_eq!(session.cwd(), temp.path());
        }
    }

    #[test]
    fn missing_browser_is_reported() {
        let temp = TempDir::new().unwrap();
        let mut session = start(&temp);
        let mut navigator = Navigator::new(BrowserCommand::new("devrc-test-no-such-browser"));

        let error = navigator.navigate(&mut session, &[]).unwrap_err();

        assert!(matches!(
            &error,
            NavigateError::BrowserNotFound(program) if program == "devrc-test-no-such-browser"
        ));
        assert_eq!(navigator.state(), NavigatorState::Idle);
        assert_eq!(session.cwd(), temp.path());
    }
}
