use rarepred::config::{AnalysisConfig, ModelChoice};
use rarepred::data::{CleaningSummary, DataError, cleaned_data, describe, load_raw_records};
use rarepred::features::FeatureError;
use rarepred::model::{LabelKind, ModelKind};
use rarepred::pipeline::{PipelineError, run_pipeline};
use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};

/// Sixty patients take HBA and GLU; every other patient also takes RARE, whose
/// result is 2 when HBA is at least 50 and 1 otherwise. Six noisy rows follow,
/// each failing a different cleaning step.
fn write_records(dir: &Path) -> PathBuf {
    let mut text = String::new();
    for i in 0..60 {
        let patient = format!("p{i:03}");
        let birth = format!("{}-03-15", 1950 + i % 40);
        let hba = 40 + i % 20;
        writeln!(text, "HBA\t2020-06-01 09:30:00\t{birth}\t{hba}\t{patient}").unwrap();
        writeln!(text, "GLU\t2020-06-01 09:30:00\t{birth}\t90\t{patient}").unwrap();
        if i % 2 == 0 {
            let label = if hba >= 50 { 2 } else { 1 };
            writeln!(text, "RARE\t2020-07-01\t{birth}\t{label}\t{patient}").unwrap();
        }
    }
    text.push_str("HBA\t2020-06-01\t1980-01-01\t\tp900\n");
    text.push_str("HBA\tnot a date\t1980-01-01\t50\tp901\n");
    text.push_str("HBA\t2020-06-01\t2021-01-01\t50\tp902\n");
    text.push_str("HBA\t2020-06-01\t1980-01-01\t5.5\tp903\n");
    text.push_str("HBA\t2020-06-01\t1980-01-01\t0\tp904\n");
    text.push_str("HBA\t2020-06-01\t1980-01-01\n");

    let path = dir.join("records.tsv");
    fs::write(&path, text).unwrap();
    path
}

fn fixture() -> (TempDir, PathBuf) {
    let dir = tempdir().expect("temporary directory");
    let path = write_records(dir.path());
    (dir, path)
}

fn config(rareness: usize) -> AnalysisConfig {
    AnalysisConfig {
        rareness,
        ..AnalysisConfig::default()
    }
}

#[test]
fn cleaning_counts_every_dropped_row() {
    let (dir, path) = fixture();
    let cleaned = cleaned_data(&path).unwrap();

    assert_eq!(
        cleaned.summary,
        CleaningSummary {
            input_rows: 156,
            malformed_rows: 1,
            bad_dates: 1,
            non_positive_ages: 1,
            missing_fields: 1,
            non_digit_results: 1,
            zero_results: 1,
            kept_rows: 150,
        }
    );
    assert!(cleaned.records.iter().all(|r| r.age > 0.0 && r.result > 0.0));
    drop(dir);
}

#[test]
fn describe_reports_raw_table() {
    let (dir, path) = fixture();
    let table = load_raw_records(&path).unwrap();
    let description = describe(&table, 2);

    assert_eq!(description.rows, 155);
    assert_eq!(description.malformed_rows, 1);
    assert_eq!(description.distinct_tests, 3);
    assert_eq!(description.distinct_patients, 65);
    assert_eq!(
        description.test_counts,
        vec![("HBA".to_string(), 65), ("GLU".to_string(), 60)]
    );
    drop(dir);
}

#[test]
fn predicts_rare_test_with_logistic_regression() {
    let (dir, path) = fixture();
    let report = run_pipeline(&path, &config(30)).unwrap();

    assert_eq!(report.cleaning.map(|c| c.kept_rows), Some(150));
    assert_eq!(report.selection.rare_test, ("RARE".to_string(), 30));
    assert_eq!(
        report.selection.tracked_tests,
        vec![("GLU".to_string(), 60), ("HBA".to_string(), 60)]
    );
    assert_eq!(report.feature_names, vec!["age", "GLU", "HBA"]);
    assert_eq!(report.patients, 30);
    assert_eq!(report.model, ModelKind::Logistic);
    assert_eq!(
        report.label_kind,
        LabelKind::Discrete {
            classes: vec![1.0, 2.0]
        }
    );
    assert_eq!(report.train.rows, 24);
    assert_eq!(report.test.rows, 6);
    assert!(report.train.error <= 0.1, "training error {}", report.train.error);

    let printed = report.to_string();
    assert!(printed.contains("Tracked tests: {'GLU': 60, 'HBA': 60}"));
    assert!(printed.contains("Training error:"));
    assert!(printed.contains("Test error:"));
    drop(dir);
}

#[test]
fn same_seed_gives_same_report() {
    let (dir, path) = fixture();
    let first = run_pipeline(&path, &config(30)).unwrap();
    let second = run_pipeline(&path, &config(30)).unwrap();
    assert_eq!(first.train, second.train);
    assert_eq!(first.test, second.test);
    drop(dir);
}

#[test]
fn regression_models_can_be_forced() {
    let (dir, path) = fixture();
    for (choice, kind) in [
        (ModelChoice::Linear, ModelKind::Linear),
        (ModelChoice::Lasso, ModelKind::Lasso),
    ] {
        let settings = AnalysisConfig {
            model: choice,
            lasso_alpha: 0.01,
            ..config(30)
        };
        let report = run_pipeline(&path, &settings).unwrap();
        assert_eq!(report.model, kind);
        assert!((0.0..=1.0).contains(&report.test.error));
        assert!(report.train.mean_squared_error.is_finite());
    }
    drop(dir);
}

#[test]
fn default_rareness_finds_no_test_in_small_file() {
    let (dir, path) = fixture();
    let err = run_pipeline(&path, &AnalysisConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Feature(FeatureError::NoEligibleTest {
            rareness: 1000,
            most_common: 60
        })
    ));
    drop(dir);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = run_pipeline(&dir.path().join("absent.tsv"), &config(30)).unwrap_err();
    assert!(matches!(err, PipelineError::Data(DataError::IoError(_))));
}
