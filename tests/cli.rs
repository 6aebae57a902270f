use assert_cmd::prelude::*;
use predicates::str::contains;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn bundled_assets() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("assets")
}

fn summary(scene: &str) -> Command {
    let mut cmd = Command::cargo_bin("caribbean-gl").expect("binary exists");
    cmd.arg("--summary-only")
        .arg("--scene")
        .arg(scene)
        .arg("--assets")
        .arg(bundled_assets());
    cmd
}

fn write_scene(dir: &TempDir, xml: &str) -> PathBuf {
    let path = dir.path().join("scene.xml");
    fs::write(&path, xml).expect("write scene");
    path
}

#[test]
fn caribbean_summary_lists_draws_and_animations() {
    summary("caribbean")
        .arg("--frames")
        .arg("30")
        .assert()
        .success()
        .stdout(contains("Scene caribbean:"))
        .stdout(contains("1 textures"))
        .stdout(contains("(phong mode)"))
        .stdout(contains(" - sea_level = "))
        .stdout(contains(" - fire = "));
}

#[test]
fn clouds_summary_in_flat_mode() {
    summary("clouds")
        .arg("--mode")
        .arg("flat")
        .assert()
        .success()
        .stdout(contains("Scene clouds:"))
        .stdout(contains("(flat mode)"))
        .stdout(contains("0 lines"));
}

#[test]
fn scene_file_with_missing_model_fails() {
    let dir = TempDir::new().expect("temp dir");
    let scene = write_scene(
        &dir,
        r#"<scene name="broken">
            <model name="boat" path="models/boat.obj"/>
            <item name="boat" mesh="boat"/>
        </scene>"#,
    );
    summary(scene.to_str().expect("utf-8 path"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("boat"));
}

#[test]
fn malformed_scene_fails() {
    let dir = TempDir::new().expect("temp dir");
    let scene = write_scene(&dir, "<scene><item name=\"x\" mesh=\"cube\"></scene>");
    summary(scene.to_str().expect("utf-8 path"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("Error:"));
}

#[test]
fn unknown_mesh_reference_fails() {
    let dir = TempDir::new().expect("temp dir");
    let scene = write_scene(&dir, r#"<scene><item name="x" mesh="teapot"/></scene>"#);
    summary(scene.to_str().expect("utf-8 path"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("teapot"));
}

#[test]
fn bad_binding_fails() {
    summary("caribbean")
        .arg("--bind")
        .arg("Q=fly")
        .assert()
        .failure()
        .code(1)
        .stderr(contains("invalid --bind"));
}

#[test]
fn missing_assets_directory_fails() {
    let dir = TempDir::new().expect("temp dir");
    Command::cargo_bin("caribbean-gl")
        .expect("binary exists")
        .arg("--summary-only")
        .arg("--assets")
        .arg(dir.path().join("nowhere"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("lighthouse"));
}
