use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/input")
        .join(name)
}

#[test]
fn renders_svg_from_architecture_file() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let output_path = tmp.path().join("diagram.svg");

    let mut cmd = Command::cargo_bin("cloudiverse")?;
    cmd.arg("render")
        .arg("--input")
        .arg(fixture("architecture.json"))
        .arg("--output")
        .arg(&output_path);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("diagram"));

    let svg_contents = fs::read_to_string(&output_path)?;
    assert!(svg_contents.contains("<svg"), "output should contain an <svg> element");
    assert!(svg_contents.contains("Redis"));

    Ok(())
}

#[test]
fn renders_png_to_stdout() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("cloudiverse")?;
    cmd.arg("render")
        .arg("-i")
        .arg(fixture("architecture.json"))
        .arg("-o")
        .arg("-")
        .arg("--output-format")
        .arg("png")
        .arg("--scale")
        .arg("1");

    let output = cmd.assert().success().get_output().stdout.clone();
    assert!(output.starts_with(b"\x89PNG\r\n\x1a\n"));
    Ok(())
}

#[test]
fn renders_from_stdin() -> Result<(), Box<dyn std::error::Error>> {
    let source = fs::read_to_string(fixture("architecture.json"))?;

    let mut cmd = Command::cargo_bin("cloudiverse")?;
    cmd.args(["render", "-i", "-", "-o", "-", "--rank-dir", "TB"])
        .write_stdin(source);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("<svg").and(predicate::str::contains("API Service")));
    Ok(())
}

#[test]
fn empty_architecture_fails_to_render() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("cloudiverse")?;
    cmd.args(["render", "-o", "-"]).write_stdin(r#"{"nodes": [], "edges": []}"#);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("no nodes"));
    Ok(())
}

#[test]
fn export_writes_timestamped_png() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;

    let mut cmd = Command::cargo_bin("cloudiverse")?;
    cmd.arg("export")
        .arg("-i")
        .arg(fixture("response.json"))
        .arg("--dir")
        .arg(tmp.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("cloudiverse-aws-three-tier-web-"));

    let written: Vec<_> = fs::read_dir(tmp.path())?.collect::<Result<_, _>>()?;
    assert_eq!(written.len(), 1);
    let name = written[0].file_name().to_string_lossy().into_owned();
    assert!(name.starts_with("cloudiverse-aws-three-tier-web-") && name.ends_with(".png"));
    Ok(())
}

#[test]
fn report_writes_pdf_with_captured_diagram() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let output_path = tmp.path().join("report.pdf");

    let mut cmd = Command::cargo_bin("cloudiverse")?;
    cmd.arg("report")
        .arg("-i")
        .arg(fixture("response.json"))
        .arg("-o")
        .arg(&output_path)
        .arg("--capture")
        .arg("--strict");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Generated report"));

    let pdf = fs::read(&output_path)?;
    assert!(pdf.starts_with(b"%PDF"));
    Ok(())
}

#[test]
fn strict_report_rejects_legacy_shape() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let input = tmp.path().join("legacy.json");
    fs::write(&input, r#"{"infraSpec": {"provider": "aws"}}"#)?;

    let mut cmd = Command::cargo_bin("cloudiverse")?;
    cmd.arg("report")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(tmp.path().join("out.pdf"))
        .arg("--strict");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("canonical"));
    Ok(())
}

#[test]
fn lookup_falls_back_to_generic_record() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("cloudiverse")?;
    cmd.args(["lookup", "quantum flux capacitor"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("No description available"));

    let mut cmd = Command::cargo_bin("cloudiverse")?;
    cmd.args(["lookup", "S3", "--json"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"canonical\": \"object_storage\""));
    Ok(())
}
