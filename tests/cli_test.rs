use assert_cmd::Command;
use predicates::prelude::*;
use rstest::rstest;
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn devrc(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("devrc").unwrap();
    cmd.current_dir(temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join("config"))
        .env("HOME", temp.path().join("home"))
        .env("SHELL", "/bin/zsh")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

fn bundle_dir(temp: &TempDir) -> PathBuf {
    temp.path().join("config/devrc")
}

fn init(temp: &TempDir) {
    fs::create_dir_all(temp.path().join("home")).unwrap();
    devrc(temp).arg("init").assert().success();
}

/// Point the browser at `sh -c <script>`; navigate arguments become `$1...`.
fn use_stub_browser(temp: &TempDir, script: &str) {
    let dir = bundle_dir(temp);
    fs::create_dir_all(&dir).unwrap();
    let config = format!(
        "[browser]\nprogram = \"sh\"\nargs = [\"-c\", {}, \"stub-browser\"]\n",
        toml_string(script)
    );
    fs::write(dir.join("config.toml"), config).unwrap();
}

fn toml_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn write_bundle_file(temp: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = bundle_dir(temp).join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn test_help_output() {
    let mut cmd = Command::cargo_bin("devrc").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("navigate"));
}

#[test]
#[serial]
fn test_init_creates_bundle() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("home")).unwrap();

    devrc(&temp)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"))
        .stdout(predicate::str::contains("Integrated"));

    let dir = bundle_dir(&temp);
    for name in ["config.toml", "Brewfile", "zshrc", "alias"] {
        assert!(dir.join(name).exists(), "{name} missing");
    }
    assert!(read(&temp.path().join("home/.zshrc")).contains("eval \"$(devrc env --shell zsh)\""));
}

#[test]
#[serial]
fn test_init_keeps_existing_files() {
    let temp = TempDir::new().unwrap();
    init(&temp);
    let aliases = write_bundle_file(&temp, "alias", "alias mine='kept'\n");

    devrc(&temp)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already present"));

    assert_eq!(read(&aliases), "alias mine='kept'\n");
    let zshrc = read(&temp.path().join("home/.zshrc"));
    assert_eq!(zshrc.matches("# devrc shell integration").count(), 1);
}

#[rstest]
#[case("bash", ".bashrc", "eval \"$(devrc env --shell bash)\"")]
#[case("fish", ".config/fish/config.fish", "devrc env --shell fish | source")]
#[serial]
fn test_init_with_explicit_shell(#[case] shell: &str, #[case] rc: &str, #[case] line: &str) {
    let temp = TempDir::new().unwrap();

    devrc(&temp)
        .args(["init", "--shell", shell])
        .assert()
        .success();

    assert!(read(&temp.path().join("home").join(rc)).contains(line));
}

#[test]
#[serial]
fn test_init_without_shell_env_fails() {
    let temp = TempDir::new().unwrap();

    devrc(&temp)
        .env_remove("SHELL")
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "SHELL environment variable not set",
        ));
}

#[test]
#[serial]
fn test_init_rejects_unknown_shell() {
    let temp = TempDir::new().unwrap();

    devrc(&temp)
        .args(["init", "-s", "tcsh"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported shell 'tcsh'"));
}

#[test]
#[serial]
fn test_env_renders_session() {
    let temp = TempDir::new().unwrap();
    init(&temp);
    let home = temp.path().join("home");

    devrc(&temp)
        .args(["env", "--shell", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "export ZSH='{}/.oh-my-zsh'",
            home.display()
        )))
        .stdout(predicate::str::contains("ZSH_THEME='robbyrussell'"))
        .stdout(predicate::str::contains("plugins=('git' 'docker')"))
        .stdout(predicate::str::contains(format!(
            "source '{}/.oh-my-zsh/oh-my-zsh.sh'",
            home.display()
        )))
        .stdout(predicate::str::contains(
            "alias 'kp'='kafka-console-producer --bootstrap-server $KAFKA_BROKERS'",
        ))
        .stdout(predicate::str::contains("nav() {"));
}

#[test]
#[serial]
fn test_env_skips_blocks_and_heredocs() {
    let temp = TempDir::new().unwrap();
    write_bundle_file(
        &temp,
        "zshrc",
        r#"if [ -d "$HOME/bin" ]; then
  # add to PATH only if present
  PATH="$HOME/bin:$PATH"
fi
cat <<EOF > /dev/null
export LEAKED=1
EOF
export NOTES="~/notes"
export AFTER=1
"#,
    );

    devrc(&temp)
        .args(["env", "--shell", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("export AFTER='1'\n"))
        .stdout(predicate::str::contains("export NOTES='~/notes'\n"))
        .stdout(predicate::str::contains("LEAKED").not());
}

#[test]
#[serial]
fn test_env_fish() {
    let temp = TempDir::new().unwrap();
    init(&temp);

    devrc(&temp)
        .args(["env", "-s", "fish"])
        .assert()
        .success()
        .stdout(predicate::str::contains("set -g ZSH_THEME 'robbyrussell'"))
        .stdout(predicate::str::contains("function nav;"))
        .stdout(predicate::str::contains("export").not());
}

#[test]
#[serial]
fn test_env_unknown_shell_defaults_to_zsh() {
    let temp = TempDir::new().unwrap();
    init(&temp);

    devrc(&temp)
        .args(["env", "--shell", "tcsh"])
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "Unknown shell 'tcsh'; defaulting to zsh.",
        ))
        .stdout(predicate::str::contains("nav() {"));
}

#[test]
#[serial]
fn test_env_without_bundle_emits_wrapper_only() {
    let temp = TempDir::new().unwrap();

    devrc(&temp)
        .arg("env")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("nav() {"));
}

#[test]
#[serial]
fn test_env_binds_credentials_from_environment() {
    let temp = TempDir::new().unwrap();
    write_bundle_file(
        &temp,
        "config.toml",
        "[[credentials]]\nvariable = \"REGISTRY_TOKEN\"\nmachine = \"registry.local\"\nfield = \"password\"\nprovider = \"env\"\n",
    );

    devrc(&temp)
        .env("DEVRC_CRED_REGISTRY_LOCAL_PASSWORD", "t0k3n")
        .arg("env")
        .assert()
        .success()
        .stdout(predicate::str::contains("export REGISTRY_TOKEN='t0k3n'"));
}

#[test]
#[serial]
fn test_navigate_forwards_arguments_and_prints_selection() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("projects");
    fs::create_dir(&target).unwrap();
    use_stub_browser(&temp, "printf '%s\\n' \"$1\"");

    devrc(&temp)
        .arg("navigate")
        .arg(&target)
        .assert()
        .success()
        .stdout(format!("{}\n", target.display()));
}

#[test]
#[serial]
fn test_navigate_resolves_relative_selection() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("relative")).unwrap();
    use_stub_browser(&temp, "echo relative");

    devrc(&temp)
        .arg("navigate")
        .assert()
        .success()
        .stdout(predicate::str::ends_with("relative\n"));
}

#[rstest]
#[case("exit 0")]
#[case("exit 130")]
#[serial]
fn test_navigate_cancel_prints_nothing(#[case] script: &str) {
    let temp = TempDir::new().unwrap();
    use_stub_browser(&temp, script);

    devrc(&temp)
        .arg("navigate")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
#[serial]
fn test_navigate_invalid_selection_fails() {
    let temp = TempDir::new().unwrap();
    use_stub_browser(&temp, "echo /devrc/does/not/exist");

    devrc(&temp)
        .arg("navigate")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("not an accessible directory"));
}

#[test]
#[serial]
fn test_navigate_missing_browser_fails() {
    let temp = TempDir::new().unwrap();
    write_bundle_file(
        &temp,
        "config.toml",
        "[browser]\nprogram = \"devrc-test-no-such-browser\"\n",
    );

    devrc(&temp)
        .arg("navigate")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "browser 'devrc-test-no-such-browser' not found on PATH",
        ));
}

#[test]
#[serial]
fn test_check_passes_for_template_bundle() {
    let temp = TempDir::new().unwrap();
    init(&temp);
    // `sh` is always on PATH, unlike the default browser.
    use_stub_browser(&temp, "exit 0");

    devrc(&temp)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Validated 3 file(s)"));
}

#[test]
#[serial]
fn test_check_reports_manifest_errors() {
    let temp = TempDir::new().unwrap();
    use_stub_browser(&temp, "exit 0");
    write_bundle_file(
        &temp,
        "Brewfile",
        "brew \"hashicorp/tap/terraform\"\ntap \"hashicorp/tap\"\n",
    );

    devrc(&temp)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Brewfile:1"))
        .stderr(predicate::str::contains("declared later"));
}

#[test]
#[serial]
fn test_check_warns_about_unsupported_statements() {
    let temp = TempDir::new().unwrap();
    use_stub_browser(&temp, "exit 0");
    write_bundle_file(
        &temp,
        "zshrc",
        "export TOKEN=$(grep password ~/.netrc | awk '{print $2}')\nalias k=kubectl\nalias k=kubecolor\n",
    );

    devrc(&temp)
        .arg("check")
        .assert()
        .success()
        .stderr(predicate::str::contains("zshrc:1"))
        .stderr(predicate::str::contains("is not applied"))
        .stderr(predicate::str::contains("alias 'k' is redefined"));
}

#[test]
#[serial]
fn test_check_fails_when_browser_missing() {
    let temp = TempDir::new().unwrap();
    write_bundle_file(
        &temp,
        "config.toml",
        "[browser]\nprogram = \"devrc-test-no-such-browser\"\n",
    );

    devrc(&temp)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found on PATH"));
}

#[test]
#[serial]
fn test_bundle_list_filters_by_kind() {
    let temp = TempDir::new().unwrap();
    init(&temp);

    devrc(&temp)
        .args(["bundle", "list", "--kind", "cask"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cask \"iterm2\""))
        .stdout(predicate::str::contains("brew").not());
}

#[test]
#[serial]
fn test_bundle_list_rejects_unknown_kind() {
    let temp = TempDir::new().unwrap();
    init(&temp);

    devrc(&temp)
        .args(["bundle", "list", "--kind", "formula"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown directive kind 'formula'"));
}

#[test]
#[serial]
fn test_bundle_fmt() {
    let temp = TempDir::new().unwrap();
    let brewfile = write_bundle_file(
        &temp,
        "Brewfile",
        "# services\nbrew \"mysql\",restart_service:true,   link: false\n",
    );

    devrc(&temp)
        .args(["bundle", "fmt", "--check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not canonically formatted"));

    devrc(&temp).args(["bundle", "fmt"]).assert().success();
    assert_eq!(
        read(&brewfile),
        "# services\nbrew \"mysql\", restart_service: true, link: false\n"
    );

    devrc(&temp)
        .args(["bundle", "fmt", "--check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already canonical"));
}

#[test]
#[serial]
fn test_aliases_prints_resolved_table() {
    let temp = TempDir::new().unwrap();
    write_bundle_file(
        &temp,
        "alias",
        "alias ll='ls -la'\nalias gs='git status'\nalias ll='ls -lah'\nalias -g G='| grep'\n",
    );

    devrc(&temp)
        .arg("aliases")
        .assert()
        .success()
        .stdout("-g G='| grep'\ngs='git status'\nll='ls -lah'\n");
}

#[test]
#[serial]
fn test_status_without_bundle() {
    let temp = TempDir::new().unwrap();

    devrc(&temp)
        .arg("status")
        .assert()
        .success()
        .stderr(predicate::str::contains("devrc init"));
}

#[test]
#[serial]
fn test_status_reports_bundle() {
    let temp = TempDir::new().unwrap();
    init(&temp);

    devrc(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("robbyrussell"))
        .stdout(predicate::str::contains("git docker"))
        .stdout(predicate::str::contains("6 brew"));
}
