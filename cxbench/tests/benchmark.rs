use std::fs;

use assert_approx_eq::assert_approx_eq;
use cxbench::Error;
use cxbench::benchmark::{Benchmark, COLUMNS, METRIC_KINDS, ResultsTable};
use cxbench::cohort::{CohortSpec, LabelField, Record, RxFilter};
use cxbench::config::{Architecture, BenchmarkConfig, Pretrain, RunIdentity, TrainMode};
use cxbench::data::InMemoryDataSource;
use cxbench::eval::evaluate;
use cxbench::loss::Criterion;
use cxbench::model::{Checkpoint, LinearClassifier};
use cxbench::serde_utils::JSONReadWrite;
use ndarray::{Array1, ArrayView2, array};
use tempfile::TempDir;

fn identity() -> RunIdentity {
    RunIdentity {
        arch: Architecture::Resnet18,
        pretrain: Pretrain::Rsna,
        train: TrainMode::Corda,
    }
}

fn record(id: &str, covid: u8, rx: u8) -> Record {
    Record {
        id: id.to_owned(),
        features: vec![covid as f32, rx as f32],
        covid,
        rx,
    }
}

/// Data and model directories for a two-feature classifier that reads off the covid flag.
fn workspace(n_weights: usize) -> (TempDir, BenchmarkConfig) {
    let dir = TempDir::new().unwrap();
    let config = BenchmarkConfig {
        data_dir: dir.path().join("data"),
        models_dir: dir.path().join("models"),
        logs_dir: dir.path().join("logs"),
        batch_size: 2,
        plots: false,
        cohorts: Some(vec![
            CohortSpec::new("CORDA", "CORDA", "corda", &["corda"]),
            CohortSpec::new("CORDA RX+", "CORDA RX+", "corda-rx+", &["corda"]).with_rx(RxFilter::Positive),
            CohortSpec::new("RSNA", "RSNA", "rsna", &["rsna"]).with_label(LabelField::Rx),
        ]),
        ..Default::default()
    };

    fs::create_dir_all(&config.data_dir).unwrap();
    let corda = vec![
        record("c0", 0, 0),
        record("c1", 1, 1),
        record("c2", 1, 0),
        record("c3", 0, 0),
        record("c4", 1, 1),
    ];
    corda.write_json(config.data_dir.join("corda.json")).unwrap();
    let rsna = vec![record("r0", 0, 1), record("r1", 0, 0), record("r2", 0, 1)];
    rsna.write_json(config.data_dir.join("rsna.json")).unwrap();

    let mut weights = vec![0.0; n_weights];
    weights[0] = 4.0;
    let checkpoint = Checkpoint {
        epoch: 12,
        model: LinearClassifier::new(weights, -2.0),
    };
    let path = config.checkpoint_path(&identity());
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    checkpoint.write_json(&path).unwrap();

    (dir, config)
}

#[test]
fn run_writes_table_and_per_cohort_artifacts() {
    let (dir, config) = workspace(2);
    let out_dir = dir.path().join("out");
    fs::create_dir_all(&out_dir).unwrap();

    let benchmark = Benchmark::prepare(identity(), config).unwrap();
    let mut table = ResultsTable::new();
    let summary = benchmark.run(&out_dir, &mut table).unwrap();

    assert_eq!(summary.n_cohorts, 3);
    assert_eq!(summary.n_examples, 5 + 2 + 3);
    assert_eq!(table.len(), 3);

    let corda = &table.rows()[0];
    assert_eq!(corda.train_cohort, "CORDA");
    assert_eq!(corda.accuracy, 1.0);
    assert_approx_eq!(corda.auc, 1.0);
    assert_eq!(corda.sensitivity, 1.0);

    // Every RX+ record in CORDA is covid positive.
    let rx_pos = &table.rows()[1];
    assert!(rx_pos.specificity.is_nan());
    assert!(rx_pos.auc.is_nan());
    assert_eq!(rx_pos.sensitivity, 1.0);
    assert_eq!(rx_pos.missrate, 0.0);

    let csv_path = out_dir.join("benchmark.csv");
    table.write_csv(&csv_path).unwrap();
    let csv = fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], COLUMNS.join(","));
    assert!(lines[1].starts_with("resnet18,rsna,CORDA,CORDA,"));
    assert!(lines[2].contains("NaN"));

    for stem in ["corda", "corda-rx+", "rsna"] {
        let text = fs::read_to_string(out_dir.join(format!("{stem}-metric.txt"))).unwrap();
        assert!(text.starts_with(&format!("{stem}: loss=")));
        assert!(!out_dir.join(format!("{stem}.png")).exists());
    }
}

#[test]
fn missing_checkpoint_fails_before_evaluation() {
    let (_dir, mut config) = workspace(2);
    config.version = "v9".to_owned();

    let res = Benchmark::prepare(identity(), config);
    assert!(matches!(res, Err(Error::MissingFile { kind: "checkpoint", .. })));
}

#[test]
fn missing_manifest_fails_before_evaluation() {
    let (_dir, config) = workspace(2);
    fs::remove_file(config.data_dir.join("rsna.json")).unwrap();

    let res = Benchmark::prepare(identity(), config);
    assert!(matches!(res, Err(Error::MissingFile { kind: "manifest", .. })));
}

#[test]
fn feature_width_must_match_the_checkpoint() {
    let (_dir, config) = workspace(3);

    let res = Benchmark::prepare(identity(), config);
    assert!(matches!(res, Err(Error::InvalidConfig(_))));
}

fn passthrough(inputs: ArrayView2<f32>) -> Array1<f32> {
    inputs.column(0).to_owned()
}

#[test]
fn batching_does_not_change_results() {
    let inputs = array![[0.9f32], [0.1], [0.8], [0.3], [0.6], [0.2]];
    let labels = array![1.0f32, 0.0, 1.0, 1.0, 0.0, 0.0];
    let criterion = Criterion::BinaryCrossEntropy;

    let split = InMemoryDataSource::new(inputs.clone(), labels.clone(), 2).unwrap();
    let whole = InMemoryDataSource::new(inputs, labels, 6).unwrap();

    let a = evaluate(&passthrough, &split, &criterion, &METRIC_KINDS, 0.5).unwrap();
    let b = evaluate(&passthrough, &whole, &criterion, &METRIC_KINDS, 0.5).unwrap();

    assert_eq!(a.n_batches, 3);
    assert_eq!(b.n_batches, 1);
    assert_approx_eq!(a.logs.loss, b.logs.loss);
    for (name, value) in &b.logs.metrics {
        assert_approx_eq!(a.logs.get(name).unwrap(), *value);
    }
    assert_eq!(a.confusion_matrix.unwrap().counts(), array![[2u64, 1], [1, 2]]);

    let again = evaluate(&passthrough, &split, &criterion, &METRIC_KINDS, 0.5).unwrap();
    assert_eq!(again.logs.summary(), a.logs.summary());
}

#[test]
fn config_round_trips_through_json() {
    let (dir, config) = workspace(2);
    let path = dir.path().join("config.json");
    config.write_json(&path).unwrap();

    let loaded = BenchmarkConfig::read_json(&path).unwrap();
    assert_eq!(loaded.batch_size, 2);
    assert_eq!(loaded.cohorts.unwrap().len(), 3);
}
