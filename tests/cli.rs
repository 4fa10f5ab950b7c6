use std::fs;
use std::process::Command;

use tempfile::tempdir;

fn records() -> String {
    let mut text = String::new();
    for i in 0..40 {
        let birth = format!("{}-01-20", 1960 + i % 30);
        let marker = 10 + i % 10;
        text.push_str(&format!("ALB\t2021-02-03\t{birth}\t{marker}\tid{i}\n"));
        if i % 2 == 1 {
            let label = if marker >= 15 { 3 } else { 1 };
            text.push_str(&format!("VITD\t2021-02-04\t{birth}\t{label}\tid{i}\n"));
        }
    }
    text
}

#[test]
fn predict_prints_report() {
    let tmp = tempdir().expect("temporary directory");
    let data_path = tmp.path().join("tests.tsv");
    fs::write(&data_path, records()).expect("write records");

    let output = Command::new(env!("CARGO_BIN_EXE_rarepred"))
        .args([
            "predict",
            data_path.to_str().expect("path str"),
            "--rareness",
            "20",
            "--seed",
            "7",
        ])
        .output()
        .expect("run rarepred");

    assert!(output.status.success(), "CLI exited with {:?}", output.status);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Rare test: 'VITD' (20 records)"), "{stdout}");
    assert!(stdout.contains("Tracked tests: {'ALB': 40}"), "{stdout}");
    assert!(stdout.contains("Model: logistic regression"), "{stdout}");
}

#[test]
fn predict_reads_settings_file() {
    let tmp = tempdir().expect("temporary directory");
    let data_path = tmp.path().join("tests.tsv");
    let config_path = tmp.path().join("settings.toml");
    fs::write(&data_path, records()).expect("write records");
    fs::write(&config_path, "rareness = 20\nmodel = \"linear\"\n").expect("write config");

    let output = Command::new(env!("CARGO_BIN_EXE_rarepred"))
        .args([
            "predict",
            data_path.to_str().expect("path str"),
            "--config",
            config_path.to_str().expect("path str"),
        ])
        .output()
        .expect("run rarepred");

    assert!(output.status.success(), "CLI exited with {:?}", output.status);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Model: linear regression"), "{stdout}");
}

#[test]
fn describe_lists_most_common_tests() {
    let tmp = tempdir().expect("temporary directory");
    let data_path = tmp.path().join("tests.tsv");
    fs::write(&data_path, records()).expect("write records");

    let output = Command::new(env!("CARGO_BIN_EXE_rarepred"))
        .args(["describe", data_path.to_str().expect("path str"), "--top", "1"])
        .output()
        .expect("run rarepred");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Distinct tests: 2"), "{stdout}");
    assert!(stdout.contains("ALB\t40"), "{stdout}");
    assert!(!stdout.contains("VITD\t20"), "{stdout}");
}

#[test]
fn errors_exit_with_status_one() {
    let tmp = tempdir().expect("temporary directory");
    let data_path = tmp.path().join("tests.tsv");
    fs::write(&data_path, records()).expect("write records");

    let output = Command::new(env!("CARGO_BIN_EXE_rarepred"))
        .args(["predict", data_path.to_str().expect("path str")])
        .output()
        .expect("run rarepred");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error: No test was taken at least 1000 times"), "{stderr}");
}

#[test]
fn describe_help_names_the_top_tests_option() {
    let output = Command::new(env!("CARGO_BIN_EXE_rarepred"))
        .args(["describe", "--help"])
        .output()
        .expect("run rarepred");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Number of most common tests to list"), "{stdout}");
    assert!(!stdout.contains("per column"), "{stdout}");
}
