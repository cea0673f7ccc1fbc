//! Integration tests for the CLI application
//!
//! These tests run the compiled binary against small EMNIST-style CSV files.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const PIXELS: usize = 784;

/// Digits 0 and 1, letters 'A' and 'C', plus the ambiguous 'O'
const CLASSES: [usize; 5] = [0, 1, 10, 12, 24];

fn write_csv(path: &Path, per_class: usize) {
    let mut file = File::create(path).unwrap();
    for (slot, &class) in CLASSES.iter().enumerate() {
        for v in 0..per_class {
            let mut pixels = vec![0u32; PIXELS];
            let start = slot * 150 + v % 4;
            for p in &mut pixels[start..start + 70] {
                *p = 160 + (v as u32 * 7) % 90;
            }
            let row: Vec<String> = pixels.iter().map(|p| p.to_string()).collect();
            writeln!(file, "{},{}", class, row.join(",")).unwrap();
        }
    }
}

/// Training and test files in a scratch directory
struct Workspace {
    dir: TempDir,
    train: PathBuf,
    test: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let train = dir.path().join("train.csv");
        let test = dir.path().join("test.csv");
        write_csv(&train, 8);
        write_csv(&test, 3);
        Self { dir, train, test }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Data flags shared by train, tune and run
    fn data_args(&self) -> Vec<String> {
        vec![
            "--train".into(),
            self.train.display().to_string(),
            "--test".into(),
            self.test.display().to_string(),
            "--per-digit".into(),
            "6".into(),
            "--non-digit".into(),
            "6".into(),
        ]
    }
}

fn run(args: &[String]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_emnist-svm"))
        .args(args)
        .output()
        .expect("Failed to execute CLI")
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "command failed\nstdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn train_model(ws: &Workspace) -> PathBuf {
    let model = ws.path("model.json");
    let mut cmd = args(&["train", "-o", model.to_str().unwrap(), "-C", "10"]);
    cmd.extend(ws.data_args());
    let output = run(&cmd);
    assert_success(&output);
    model
}

#[test]
fn test_cli_help() {
    let output = run(&args(&["--help"]));
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["download", "train", "evaluate", "predict", "tune", "run", "info", "show"] {
        assert!(stdout.contains(command), "help is missing {command}");
    }
}

#[test]
fn test_cli_version() {
    let output = run(&args(&["--version"]));
    assert_success(&output);
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_train_writes_model() {
    let ws = Workspace::new();
    let model = train_model(&ws);

    let json: serde_json::Value =
        serde_json::from_reader(File::open(&model).unwrap()).unwrap();
    assert_eq!(json["classes"], serde_json::json!([0, 1, 10]));
    assert_eq!(json["n_features"], 784);
    assert_eq!(json["scaling"]["method"]["method"], "divide");
}

#[test]
fn test_cli_evaluate() {
    let ws = Workspace::new();
    let model = train_model(&ws);
    let report = ws.path("eval.json");

    let output = run(&args(&[
        "evaluate",
        "-m",
        model.to_str().unwrap(),
        "--data",
        ws.test.to_str().unwrap(),
        "--all",
        "--detailed",
        "--report",
        report.to_str().unwrap(),
    ]));
    assert_success(&output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Accuracy"));
    assert!(stdout.contains("Confusion Matrix"));
    assert!(stdout.contains("non-digit"));
    assert!(stdout.contains("Per-class Metrics"));

    // 'O' rows are dropped, the rest are all evaluated
    let json: serde_json::Value = serde_json::from_reader(File::open(&report).unwrap()).unwrap();
    assert_eq!(json["detection"]["true_positives"].as_u64().unwrap()
        + json["detection"]["false_negatives"].as_u64().unwrap(), 6);
    assert!(json["accuracy"].as_f64().unwrap() >= 0.9);
}

#[test]
fn test_cli_predict_to_file_and_stdout() {
    let ws = Workspace::new();
    let model = train_model(&ws);
    let predictions = ws.path("predictions.txt");

    let output = run(&args(&[
        "predict",
        "-m",
        model.to_str().unwrap(),
        "--data",
        ws.test.to_str().unwrap(),
        "-o",
        predictions.to_str().unwrap(),
    ]));
    assert_success(&output);

    let content = fs::read_to_string(&predictions).unwrap();
    let lines: Vec<&str> = content.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(lines.len(), 15);
    assert!(content.starts_with("# Predictions for 15 samples"));
    // First rows are zeros
    assert!(lines[0].starts_with("0 0 0"));

    let output = run(&args(&[
        "predict",
        "-m",
        model.to_str().unwrap(),
        "--data",
        ws.test.to_str().unwrap(),
        "--votes",
    ]));
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("# Format: sample_index predicted_class name votes"));
    assert_eq!(stdout.lines().filter(|l| !l.starts_with('#')).count(), 15);
}

#[test]
fn test_cli_info() {
    let ws = Workspace::new();
    let model = train_model(&ws);

    let output = run(&args(&["info", model.to_str().unwrap()]));
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Pairwise Models"));
    assert!(stdout.contains("non-digit"));
}

#[test]
fn test_cli_tune_saves_best_model() {
    let ws = Workspace::new();
    let model = ws.path("best.json");
    let report = ws.path("search.json");

    let mut cmd = args(&[
        "tune",
        "--c-values",
        "1,10",
        "--gamma-values",
        "scale,0.01",
        "-o",
        model.to_str().unwrap(),
        "--report",
        report.to_str().unwrap(),
    ]);
    cmd.extend(ws.data_args());
    let output = run(&cmd);
    assert_success(&output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Grid Search Results"));
    assert!(stdout.contains("Best: C="));
    assert!(model.exists());

    let json: serde_json::Value = serde_json::from_reader(File::open(&report).unwrap()).unwrap();
    assert_eq!(json["results"].as_array().unwrap().len(), 4);
    assert_eq!(json["n_splits"], 1);
}

#[test]
fn test_cli_tune_kfold() {
    let ws = Workspace::new();
    let mut cmd = args(&["tune", "--c-values", "1", "--cv", "kfold", "--folds", "3"]);
    cmd.extend(ws.data_args());
    let output = run(&cmd);
    assert_success(&output);
    assert!(String::from_utf8_lossy(&output.stdout).contains("Folds: 3"));
}

#[test]
fn test_cli_run_with_config_file() {
    let ws = Workspace::new();
    let config = ws.path("config.json");
    let report = ws.path("report.json");
    fs::write(
        &config,
        format!(
            r#"{{
                "train": {{"format": "csv", "path": {:?}}},
                "test": {{"format": "csv", "path": {:?}}},
                "train_quota": {{"per_digit": 6, "non_digit_total": 6}},
                "test_quota": {{"per_digit": 3, "non_digit_total": 4}},
                "grid": {{"c": [1.0, 10.0], "gamma": ["scale"]}},
                "tune": true
            }}"#,
            ws.train.display().to_string(),
            ws.test.display().to_string()
        ),
    )
    .unwrap();

    let output = run(&args(&[
        "--config",
        config.to_str().unwrap(),
        "run",
        "--report",
        report.to_str().unwrap(),
    ]));
    assert_success(&output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Pipeline Summary"));
    assert!(stdout.contains("Tuned test accuracy"));

    let json: serde_json::Value = serde_json::from_reader(File::open(&report).unwrap()).unwrap();
    assert_eq!(json["preparation"]["loaded_train"], 40);
    assert_eq!(json["baseline"]["confusion"]["classes"], serde_json::json!([0, 1, 10]));
}

#[test]
fn test_cli_show() {
    let ws = Workspace::new();
    let output = run(&args(&["show", ws.test.to_str().unwrap(), "--images", "1"]));
    assert_success(&output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Samples: 15"));
    assert!(stdout.contains("'O'"));
    assert!(stdout.contains("class 0 '0':"));
    assert!(stdout.contains('#'));
}

#[test]
fn test_cli_download_without_urls_fails() {
    let ws = Workspace::new();
    let output = run(&args(&["download", "--data-dir", ws.path("data").to_str().unwrap()]));
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no download URL"));
}

#[test]
fn test_cli_download_skips_present_files() {
    let ws = Workspace::new();
    let output = run(&args(&[
        "download",
        "--data-dir",
        ws.dir.path().to_str().unwrap(),
        "--train-url",
        "http://127.0.0.1:9/files/train.csv",
    ]));
    assert_success(&output);
    assert!(String::from_utf8_lossy(&output.stdout).contains("present"));
}

#[test]
fn test_cli_error_handling() {
    let ws = Workspace::new();

    let output = run(&args(&["info", ws.path("missing.json").to_str().unwrap()]));
    assert!(!output.status.success());

    let garbage = ws.path("garbage.json");
    fs::write(&garbage, "not a model").unwrap();
    let output = run(&args(&["info", garbage.to_str().unwrap()]));
    assert!(!output.status.success());

    let output = run(&args(&["train", "-o", ws.path("m.json").to_str().unwrap(), "--gamma", "wide"]));
    assert!(!output.status.success());

    let output = run(&args(&["train", "-o", ws.path("m.json").to_str().unwrap(), "-C", "-1"]));
    assert!(!output.status.success());
}
