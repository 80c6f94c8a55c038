/*! Cohort-by-cohort benchmark of a trained classifier.
 *
 * [`Benchmark::prepare`] resolves everything that can fail for configuration reasons
 * (checkpoint, manifests, cohort construction, feature dimensions) before any cohort is
 * evaluated. [`Benchmark::run`] then evaluates each cohort with a fresh accumulator set,
 * writes its artifacts and appends one row to the caller's [`ResultsTable`].
 */

use std::fs;
use std::path::Path;
use std::time::Instant;

use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::clinical::ClinicalMetrics;
use crate::cohort::{Cohort, Sources, referenced_sources};
use crate::config::{BenchmarkConfig, RunIdentity};
use crate::error::{Error, Result};
use crate::eval::{Evaluation, evaluate};
use crate::metrics::{Accumulator, MetricKind};
use crate::model::{Checkpoint, LinearClassifier, Model};
use crate::plotting::{plot_confusion_matrix, plot_roc};

/// Accumulators registered for every cohort.
pub const METRIC_KINDS: [MetricKind; 4] = [
    MetricKind::Accuracy,
    MetricKind::RocAuc,
    MetricKind::FScore,
    MetricKind::ConfusionMatrix,
];

/// Header of `benchmark.csv`, in field order of [`BenchmarkRow`].
pub const COLUMNS: [&str; 12] = [
    "architecture",
    "pretrain_source",
    "train_cohort",
    "test_cohort",
    "accuracy",
    "auc",
    "sensitivity",
    "specificity",
    "fscore",
    "balanced_accuracy",
    "missrate",
    "diagnostic_odds_ratio",
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRow {
    pub architecture: String,
    pub pretrain_source: String,
    pub train_cohort: String,
    pub test_cohort: String,
    pub accuracy: f64,
    pub auc: f64,
    pub sensitivity: f64,
    pub specificity: f64,
    pub fscore: f64,
    pub balanced_accuracy: f64,
    pub missrate: f64,
    pub diagnostic_odds_ratio: f64,
}

/// Rows in evaluation order. Re-running a cohort appends another row.
#[derive(Clone, Debug, Default)]
pub struct ResultsTable {
    rows: Vec<BenchmarkRow>,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: BenchmarkRow) {
        self.rows.push(row);
    }

    #[inline]
    pub fn rows(&self) -> &[BenchmarkRow] {
        &self.rows
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header plus one line per row. NaN and infinite values are written as `NaN` / `inf`.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
        writer.write_record(COLUMNS)?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct CohortReport {
    pub row: BenchmarkRow,
    pub clinical: ClinicalMetrics,
    pub evaluation: Evaluation,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub identity: RunIdentity,
    pub n_cohorts: usize,
    pub n_examples: usize,
    pub elapsed_ms: u128,
    pub seed: u64,
    pub finished_at: String,
}

/// Evaluate one cohort and append its row to `table`.
///
/// A cohort missing a ground-truth class still yields a row. Rates that depend on the
/// missing class are NaN; the present class keeps its own.
pub fn benchmark_cohort<M: Model + ?Sized>(
    model: &M,
    cohort: &Cohort,
    identity: &RunIdentity,
    config: &BenchmarkConfig,
    table: &mut ResultsTable,
) -> Result<CohortReport> {
    let data = cohort.data_source(config.batch_size)?;
    let evaluation = evaluate(model, &data, &config.criterion, &METRIC_KINDS, config.threshold)?;

    let clinical = match &evaluation.confusion_matrix {
        Some(cm) => {
            if let Some(class) = cm.empty_class() {
                warn!(
                    "Cohort '{}' has no examples of class {}; its rates are undefined",
                    cohort.spec.name, class
                );
            }
            ClinicalMetrics::from_confusion_matrix(cm)
        }
        None => ClinicalMetrics::undefined(),
    };

    let scalar = |kind: MetricKind| evaluation.metric(kind).map_or(f64::NAN, |m| m.get());

    let row = BenchmarkRow {
        architecture: identity.arch.to_string(),
        pretrain_source: identity.pretrain.to_string(),
        train_cohort: identity.train.as_str().to_uppercase(),
        test_cohort: cohort.spec.name.clone(),
        accuracy: scalar(MetricKind::Accuracy),
        auc: scalar(MetricKind::RocAuc),
        sensitivity: clinical.sensitivity,
        specificity: clinical.specificity,
        fscore: scalar(MetricKind::FScore),
        balanced_accuracy: clinical.balanced_accuracy(),
        missrate: clinical.missrate(),
        diagnostic_odds_ratio: clinical.diagnostic_odds_ratio(),
    };

    table.push(row.clone());

    Ok(CohortReport {
        row,
        clinical,
        evaluation,
    })
}

/// `<stem>-metric.txt`, and when `plots` is set `<stem>.png` and `<stem>-roc.png`.
///
/// Plot failures are logged and skipped.
pub fn write_artifacts(report: &CohortReport, cohort: &Cohort, out_dir: &Path, plots: bool) -> Result<()> {
    let stem = &cohort.spec.file_stem;
    let summary = report.evaluation.logs.summary();
    fs::write(out_dir.join(format!("{stem}-metric.txt")), format!("{stem}: {summary}\n"))?;

    if !plots {
        return Ok(());
    }

    if let Some(cm) = &report.evaluation.confusion_matrix {
        let path = out_dir.join(format!("{stem}.png"));
        let x_labels = ["covid-", "covid+"];
        let y_labels = cohort.spec.label.class_names();
        let rows = cm.row_normalized();
        if let Err(e) = plot_confusion_matrix(rows.view(), &cohort.spec.title, x_labels, y_labels, &path) {
            warn!("Failed to plot confusion matrix for '{}': {}", stem, e);
        }
    }

    if let Some(roc) = report.evaluation.roc_auc() {
        let curve = roc.get_curve();
        if !curve.is_empty() {
            let path = out_dir.join(format!("{stem}-roc.png"));
            if let Err(e) = plot_roc(&curve, roc.get(), &cohort.spec.title, &path) {
                warn!("Failed to plot ROC curve for '{}': {}", stem, e);
            }
        }
    }

    Ok(())
}

pub struct Benchmark<M> {
    pub identity: RunIdentity,
    pub config: BenchmarkConfig,
    pub model: M,
    pub cohorts: Vec<Cohort>,
}

impl Benchmark<LinearClassifier> {
    /// Load the checkpoint and every referenced manifest, and build all cohorts.
    pub fn prepare(identity: RunIdentity, config: BenchmarkConfig) -> Result<Self> {
        config.validate()?;

        let checkpoint = Checkpoint::load(&config.checkpoint_path(&identity))?;
        info!("Loaded {} from epoch {}", identity.name(), checkpoint.epoch);

        let specs = config.cohorts_for(identity.train);
        let sources = Sources::load(&config.data_dir, referenced_sources(&specs))?;
        let cohorts = specs
            .par_iter()
            .map(|spec| Cohort::build(spec, &sources, config.seed))
            .collect::<Result<Vec<_>>>()?;

        let n_features = checkpoint.model.n_features();
        if let Some(cohort) = cohorts.iter().find(|c| c.n_features() != n_features) {
            return Err(Error::InvalidConfig(format!(
                "cohort '{}' has {} features but the model expects {}",
                cohort.spec.name,
                cohort.n_features(),
                n_features
            )));
        }

        Self::new(identity, config, checkpoint.model, cohorts)
    }
}

impl<M: Model> Benchmark<M> {
    pub fn new(identity: RunIdentity, config: BenchmarkConfig, model: M, cohorts: Vec<Cohort>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            identity,
            config,
            model,
            cohorts,
        })
    }

    /// Evaluate every cohort in order, writing artifacts into `out_dir`.
    pub fn run(&self, out_dir: &Path, table: &mut ResultsTable) -> Result<RunSummary> {
        let start = Instant::now();

        let pb = ProgressBar::new(self.cohorts.len() as u64);
        pb.set_style(
            ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );

        let mut n_examples = 0;
        for cohort in &self.cohorts {
            pb.set_message(cohort.spec.title.clone());
            info!("Benchmarking {}.. examples={}", cohort.spec.title, cohort.len());

            let report = benchmark_cohort(&self.model, cohort, &self.identity, &self.config, table)?;
            write_artifacts(&report, cohort, out_dir, self.config.plots)?;
            info!("{}: {}", cohort.spec.file_stem, report.evaluation.logs);

            n_examples += report.evaluation.n_examples;
            pb.inc(1);
        }
        pb.finish();

        Ok(RunSummary {
            identity: self.identity,
            n_cohorts: self.cohorts.len(),
            n_examples,
            elapsed_ms: start.elapsed().as_millis(),
            seed: self.config.seed,
            finished_at: Local::now().to_rfc3339(),
        })
    }
}
