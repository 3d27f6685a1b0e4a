//! Integration tests for the rlwsd CLI.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const VECTORS: &str = "7 2
money 1.0 0.0
loan 0.9 0.1
deposit 0.95 0.05
river 0.0 1.0
water 0.1 0.9
shore 0.05 0.95
lent 0.85 0.15
";

const BANK: &str = "\tfinancial institution\t1
\tland beside a river\t2
took a loan from the\tbank\ttoday\t1
deposit money at the\tbank\t\t1
the\tbank\tlent money\t1
money from the\tbank\tloan\t1
a\tbank\tdeposit\t1
sat on the river\tbank\t\t2
the\tbank\tof the river\t2
water reached the\tbank\t\t2
";

const INVENTORY: &str = r#"{"word": "bank", "meanings": [
  {"id": "1", "name": "financial institution", "contexts": ["money in the bank"]},
  {"id": "2", "name": "land beside a river", "contexts": ["the bank of the river"]}
]}"#;

const CORPUS: &str = "money bank loan
bank deposit money
river bank water
bank shore river
";

/// Write the embeddings and a config pointing at them; returns the config path.
fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let vectors = dir.join("vectors.txt");
    fs::write(&vectors, VECTORS).expect("Failed to write vectors");
    let config = format!(
        "resources:\n  embeddings: '{}'\n  weights_dir: '{}'\nvectors:\n  weighting: uniform\n{extra}",
        vectors.display(),
        dir.join("cdict").display()
    );
    let path = dir.join("config.yaml");
    fs::write(&path, config).expect("Failed to write config");
    path
}

fn run_cli(args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("rlwsd").expect("Failed to find rlwsd binary");
    cmd.args(args);
    cmd
}

#[test]
fn test_cli_help() {
    run_cli(&["--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("evaluate"))
        .stdout(predicates::str::contains("dictionary-eval"))
        .stdout(predicates::str::contains("build-vectors"))
        .stdout(predicates::str::contains("cluster"))
        .stdout(predicates::str::contains("build-weights"))
        .stdout(predicates::str::contains("init"));
}

#[test]
fn test_init_then_validate() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let output = temp_dir.path().join("config.yaml");
    let output = output.to_str().unwrap();

    run_cli(&["init", output]).assert().success();
    let content = fs::read_to_string(output).expect("Failed to read generated config");
    assert!(content.contains("classifier"));
    assert!(content.contains("clustering"));

    run_cli(&["validate", output])
        .assert()
        .success()
        .stdout(predicates::str::contains("Configuration is valid"));
}

#[test]
fn test_validate_rejects_bad_settings() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("config.yaml");
    fs::write(&path, "classifier:\n  kind: knn\n  knn:\n    k: 0\n").unwrap();
    run_cli(&["validate", path.to_str().unwrap()]).assert().failure();

    fs::write(&path, "classifier:\n  kind: svm\n").unwrap();
    run_cli(&["validate", path.to_str().unwrap()]).assert().failure();

    run_cli(&["validate", "/nonexistent/config.yaml"]).assert().failure();
}

#[test]
fn test_evaluate_prints_table_and_errors() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_config(temp_dir.path(), "evaluation:\n  n_train: 6\n  n_runs: 2\n");
    let data = temp_dir.path().join("bank.txt");
    fs::write(&data, BANK).unwrap();

    run_cli(&[
        "evaluate",
        "--config",
        config.to_str().unwrap(),
        "--classifier",
        "knn",
        "--write-errors",
        data.to_str().unwrap(),
    ])
    .assert()
    .success()
    .stdout(predicates::str::contains("word\tsenses\tb-line"))
    .stdout(predicates::str::contains("bank\t2\t"));

    assert!(temp_dir.path().join("bank.errors1.tsv").exists());
    assert!(temp_dir.path().join("bank.errors2.tsv").exists());
}

#[test]
fn test_evaluate_unknown_classifier_fails() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_config(temp_dir.path(), "");
    let data = temp_dir.path().join("bank.txt");
    fs::write(&data, BANK).unwrap();
    run_cli(&[
        "evaluate",
        "--config",
        config.to_str().unwrap(),
        "--classifier",
        "svm",
        data.to_str().unwrap(),
    ])
    .assert()
    .failure();
}

#[test]
fn test_dictionary_eval() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_config(temp_dir.path(), "");
    let data = temp_dir.path().join("bank.txt");
    fs::write(&data, BANK).unwrap();
    let inventory = temp_dir.path().join("bank.json");
    fs::write(&inventory, INVENTORY).unwrap();

    run_cli(&[
        "dictionary-eval",
        "--config",
        config.to_str().unwrap(),
        "--inventory",
        inventory.to_str().unwrap(),
        data.to_str().unwrap(),
    ])
    .assert()
    .success()
    .stdout(predicates::str::contains("bank\t2\t2\t"))
    .stdout(predicates::str::contains("\t1.00\t"));
}

#[test]
fn test_build_vectors_then_cluster() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_config(temp_dir.path(), "");
    let corpus = temp_dir.path().join("corpus.txt");
    fs::write(&corpus, CORPUS).unwrap();
    let inventory = temp_dir.path().join("inventory.json");
    fs::write(&inventory, INVENTORY).unwrap();
    let data = temp_dir.path().join("bank.txt");
    fs::write(&data, BANK).unwrap();
    let artifact = temp_dir.path().join("bank.artifact.json");

    run_cli(&[
        "build-vectors",
        "--config",
        config.to_str().unwrap(),
        "--word",
        "bank",
        "--output",
        artifact.to_str().unwrap(),
        corpus.to_str().unwrap(),
    ])
    .assert()
    .success()
    .stdout(predicates::str::contains("4 contexts"));

    // dictionary methods need an inventory
    run_cli(&[
        "cluster",
        "--config",
        config.to_str().unwrap(),
        "--method",
        "skmeans-dict-init",
        artifact.to_str().unwrap(),
    ])
    .assert()
    .failure();

    run_cli(&[
        "cluster",
        "--config",
        config.to_str().unwrap(),
        "--method",
        "skmeans-dict-init",
        "--inventory",
        inventory.to_str().unwrap(),
        "--labeled",
        data.to_str().unwrap(),
        artifact.to_str().unwrap(),
    ])
    .assert()
    .success()
    .stdout(predicates::str::contains("#1: 0.50 -> 1"))
    .stdout(predicates::str::contains("accuracy 1.00"));

    let saved = fs::read_to_string(&artifact).unwrap();
    assert!(saved.contains("skmeans-dict-init"));
}

#[test]
fn test_build_weights_writes_default_path() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_config(temp_dir.path(), "");
    let corpus = temp_dir.path().join("corpus.txt");
    fs::write(&corpus, CORPUS).unwrap();

    run_cli(&[
        "build-weights",
        "--config",
        config.to_str().unwrap(),
        "--word",
        "bank",
        "--min-count",
        "1",
        corpus.to_str().unwrap(),
    ])
    .assert()
    .success()
    .stdout(predicates::str::contains("weights written"));

    assert!(temp_dir.path().join("cdict").join("bank.txt").exists());
}

/// Labeled file with a header and `n` alternating money/river rows.
fn labeled_rows(n: usize) -> String {
    let mut text = String::from("\tfinancial institution\t1\n\tland beside a river\t2\n");
    for i in 0..n {
        if i % 2 == 0 {
            text.push_str(&format!("loan {i} from the\tbank\tmoney\t1\n"));
        } else {
            text.push_str(&format!("water {i} by the river\tbank\tshore\t2\n"));
        }
    }
    text
}

#[test]
fn test_evaluate_skips_words_too_small_to_split() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_config(temp_dir.path(), "evaluation:\n  n_train: 50\n  n_runs: 2\n");
    let small = temp_dir.path().join("shore.txt");
    fs::write(&small, labeled_rows(10)).unwrap();
    let exact = temp_dir.path().join("brink.txt");
    fs::write(&exact, labeled_rows(50)).unwrap();
    let large = temp_dir.path().join("bank.txt");
    fs::write(&large, labeled_rows(60)).unwrap();

    run_cli(&[
        "evaluate",
        "--config",
        config.to_str().unwrap(),
        small.to_str().unwrap(),
        exact.to_str().unwrap(),
        large.to_str().unwrap(),
    ])
    .assert()
    .success()
    .stdout(predicates::str::contains("bank\t2\t0.50\t"))
    .stdout(predicates::str::contains("shore\t").not())
    .stdout(predicates::str::contains("brink\t").not());
}

#[test]
fn test_dictionary_eval_validates_classifier_override() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_config(temp_dir.path(), "classifier:\n  ensemble:\n    members: 0\n");
    let data = temp_dir.path().join("bank.txt");
    fs::write(&data, BANK).unwrap();
    let inventory = temp_dir.path().join("bank.json");
    fs::write(&inventory, INVENTORY).unwrap();

    run_cli(&[
        "dictionary-eval",
        "--config",
        config.to_str().unwrap(),
        "--classifier",
        "ensemble",
        "--inventory",
        inventory.to_str().unwrap(),
        data.to_str().unwrap(),
    ])
    .assert()
    .failure();
}
