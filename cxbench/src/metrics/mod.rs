/*! Streaming binary-classification metrics.
 *
 * Every accumulator ingests `(predictions, labels)` batches through [`Accumulator::update`]
 * and can be reduced to a scalar with [`Accumulator::get`] at any time. Predictions are
 * sigmoid scores in [0, 1]; labels are `0.0` or `1.0`.
 */

mod accuracy;
mod confusion;
mod fscore;
mod roc_auc;

pub use accuracy::Accuracy;
pub use confusion::ConfusionMatrix;
pub use fscore::FScore;
pub use roc_auc::{RocAuc, RocCurve};

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Scores at or above this value are assigned to the positive class.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

pub trait Accumulator {
    /// Ingest one batch. The batch is validated as a whole before any state changes.
    fn update(&mut self, predictions: ArrayView1<f32>, labels: ArrayView1<f32>) -> Result<()>;

    /// Reduce the state seen so far. NaN means no data (or an undefined value).
    fn get(&self) -> f64;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Accuracy,
    RocAuc,
    FScore,
    ConfusionMatrix,
}

impl MetricKind {
    /// Label used in logs and summaries.
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Accuracy => "accuracy",
            MetricKind::RocAuc => "auc",
            MetricKind::FScore => "fscore",
            MetricKind::ConfusionMatrix => "agreement",
        }
    }
}

#[derive(Clone, Debug)]
pub enum Metric {
    Accuracy(Accuracy),
    RocAuc(RocAuc),
    FScore(FScore),
    ConfusionMatrix(ConfusionMatrix),
}

impl Metric {
    /// Fresh, empty accumulator of the given kind.
    pub fn new(kind: MetricKind, threshold: f32) -> Self {
        match kind {
            MetricKind::Accuracy => Metric::Accuracy(Accuracy::with_threshold(threshold)),
            MetricKind::RocAuc => Metric::RocAuc(RocAuc::new()),
            MetricKind::FScore => Metric::FScore(FScore::with_threshold(threshold)),
            MetricKind::ConfusionMatrix => Metric::ConfusionMatrix(ConfusionMatrix::with_threshold(threshold)),
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Accuracy(_) => MetricKind::Accuracy,
            Metric::RocAuc(_) => MetricKind::RocAuc,
            Metric::FScore(_) => MetricKind::FScore,
            Metric::ConfusionMatrix(_) => MetricKind::ConfusionMatrix,
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }
}

impl Accumulator for Metric {
    fn update(&mut self, predictions: ArrayView1<f32>, labels: ArrayView1<f32>) -> Result<()> {
        match self {
            Metric::Accuracy(m) => m.update(predictions, labels),
            Metric::RocAuc(m) => m.update(predictions, labels),
            Metric::FScore(m) => m.update(predictions, labels),
            Metric::ConfusionMatrix(m) => m.update(predictions, labels),
        }
    }

    fn get(&self) -> f64 {
        match self {
            Metric::Accuracy(m) => m.get(),
            Metric::RocAuc(m) => m.get(),
            Metric::FScore(m) => m.get(),
            Metric::ConfusionMatrix(m) => m.get(),
        }
    }
}

/// Rejects misaligned batches, labels outside {0, 1} and scores outside [0, 1].
pub(crate) fn validate_batch(predictions: ArrayView1<f32>, labels: ArrayView1<f32>) -> Result<()> {
    if predictions.len() != labels.len() {
        return Err(Error::ShapeMismatch {
            expected: labels.len(),
            found: predictions.len(),
        });
    }

    if let Some(label) = labels.iter().find(|&&l| l != 0.0 && l != 1.0) {
        return Err(Error::InvalidData(format!("label {label} is not 0 or 1")));
    }

    if let Some(score) = predictions.iter().find(|p| !(0.0..=1.0).contains(*p)) {
        return Err(Error::InvalidData(format!("prediction {score} is outside [0, 1]")));
    }

    Ok(())
}

#[inline]
pub(crate) fn is_positive(label: f32) -> bool {
    label == 1.0
}
