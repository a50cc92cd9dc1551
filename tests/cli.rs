use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn cli(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("mobile_release").unwrap();
    cmd.arg("--config").arg(config).env_remove("MOBILE_RELEASE_CONFIG");
    cmd
}

fn write_config(dir: &Path, toml: &str) -> std::path::PathBuf {
    let path = dir.join("release.toml");
    std::fs::write(&path, toml).unwrap();
    path
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("mobile_release")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("cache"));
}

#[test]
fn no_enabled_destination_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "[destinations.local]\nenabled = false\n");

    cli(&config)
        .arg("run")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no destinations enabled"));
}

#[test]
fn unknown_destination_table_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "[destinations.appcenter]\n");

    cli(&config)
        .arg("plan")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("appcenter"));
}

#[test]
fn missing_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    cli(&dir.path().join("absent.toml"))
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.toml"));
}

#[test]
fn plan_builds_shared_kind_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
[destinations.firebase]
app_id = "1:1234567890:android:abc"
project_number = "1234567890"
artifact = "aab"

[destinations.play]
package_name = "com.example.app"
"#,
    );

    cli(&config)
        .arg("plan")
        .assert()
        .success()
        .stderr(predicate::str::contains("play (store) needs signed AppBundle"))
        .stderr(predicate::str::contains("PackageArchive").not());
}

#[test]
fn cache_status_on_fresh_project_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");

    cli(&config)
        .args(["cache", "status"])
        .assert()
        .success()
        .stderr(predicate::str::contains("empty"));
}

#[cfg(unix)]
#[test]
fn local_release_end_to_end() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("app/src/main")).unwrap();
    std::fs::write(dir.path().join("app/src/main/Main.kt"), "fun main() {}").unwrap();

    let gradlew = dir.path().join("gradlew");
    std::fs::write(
        &gradlew,
        "#!/bin/sh\nmkdir -p app/build/outputs/apk/release\nprintf apk > app/build/outputs/apk/release/app-release-unsigned.apk\n",
    )
    .unwrap();
    std::fs::set_permissions(&gradlew, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = write_config(dir.path(), "[destinations.local]\noutput_dir = \"dist\"\n");

    cli(&config)
        .args(["run", "--yes", "--json"])
        .env_remove("ANDROID_HOME")
        .env_remove("ANDROID_SDK_ROOT")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"success\": true"))
        .stdout(predicate::str::contains("\"destination\": \"local\""));

    assert!(dir.path().join("dist/app-release-unsigned.apk").is_file());
    assert!(dir.path().join("dist/app-release-unsigned.apk.sha256").is_file());

    cli(&config)
        .args(["cache", "status"])
        .assert()
        .success()
        .stderr(predicate::str::contains("default-release-"));
}
