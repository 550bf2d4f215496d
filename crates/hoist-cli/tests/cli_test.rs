use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn hoist() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("hoist");
    cmd.env_remove("HOIST_REGISTRY_CREDENTIALS");
    cmd
}

// ── Help / Version ──

#[test]
fn shows_help() {
    hoist()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Build, publish and deploy apps"))
        .stdout(predicate::str::contains("up"))
        .stdout(predicate::str::contains("down"));
}

#[test]
fn shows_version() {
    hoist()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("hoist"));
}

#[test]
fn deploy_help_lists_value_flags() {
    hoist()
        .args(["deploy", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--set"))
        .stdout(predicate::str::contains("--reinstall-on-error"));
}

// ── Argument errors ──

#[test]
fn publish_requires_images() {
    hoist().arg("publish").assert().failure();
}

#[test]
fn unknown_environment_is_rejected() {
    let tmp = TempDir::new().unwrap();
    hoist()
        .current_dir(tmp.path())
        .args(["--env", "qa", "down"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("qa"));
}

// ── Failures before any external call ──

#[test]
fn malformed_config_is_reported() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("hoist.toml"), "[project\nname = 1").unwrap();

    hoist()
        .current_dir(tmp.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load hoist.toml"));
}

#[test]
fn publish_without_repository_explains_setting() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("hoist.toml"), "[project]\nname = \"shop\"\n").unwrap();

    hoist()
        .current_dir(tmp.path())
        .args(["publish", "shop:dev-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("image_repository not set"));
}

#[test]
fn malformed_registry_credentials_are_reported() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("hoist.toml"), "[project]\nname = \"shop\"\n").unwrap();

    hoist()
        .current_dir(tmp.path())
        .env("HOIST_REGISTRY_CREDENTIALS", "not base64!")
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "failed to decode HOIST_REGISTRY_CREDENTIALS",
        ));
}

#[test]
fn build_without_dockerfile_prints_user_message() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("hoist.toml"), "[project]\nname = \"shop\"\n").unwrap();

    hoist()
        .current_dir(tmp.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Dockerfile missing."))
        .stderr(predicate::str::contains("Please add a Dockerfile manually"));
}

#[test]
fn debug_prints_the_error_chain() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("hoist.toml"), "[project]\nname = \"shop\"\n").unwrap();

    hoist()
        .current_dir(tmp.path())
        .args(["--debug", "build"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("Dockerfile"));
}

#[test]
fn project_dir_flag_selects_config() {
    let tmp = TempDir::new().unwrap();
    let app = tmp.path().join("app");
    std::fs::create_dir(&app).unwrap();
    std::fs::write(app.join("hoist.toml"), "[project]\nname = \"shop\"\n").unwrap();

    hoist()
        .current_dir(tmp.path())
        .args(["-C", "app", "publish", "shop:dev-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("image_repository not set"));
}
