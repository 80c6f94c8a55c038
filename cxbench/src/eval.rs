use std::fmt;

use indexmap::IndexMap;
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::DataSource;
use crate::error::{Error, Result};
use crate::loss::Criterion;
use crate::metrics::{Accumulator, ConfusionMatrix, Metric, MetricKind, RocAuc};
use crate::model::Model;

/// Reduced values of one evaluation run, labelled by metric name in registration order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvalLogs {
    pub loss: f64,
    pub metrics: IndexMap<String, f64>,
}

impl EvalLogs {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// One-line summary, e.g. `loss=0.1234 accuracy=0.9000 auc=0.9500`.
    pub fn summary(&self) -> String {
        std::iter::once(("loss", self.loss))
            .chain(self.metrics.iter().map(|(k, v)| (k.as_str(), *v)))
            .map(|(k, v)| format!("{k}={v:.4}"))
            .join(" ")
    }
}

impl fmt::Display for EvalLogs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[derive(Debug)]
pub struct Evaluation {
    pub logs: EvalLogs,
    /// Final state of the registered confusion matrix, if any.
    pub confusion_matrix: Option<ConfusionMatrix>,
    /// Every other accumulator, in registration order.
    pub metrics: Vec<Metric>,
    pub n_examples: usize,
    pub n_batches: usize,
}

impl Evaluation {
    pub fn metric(&self, kind: MetricKind) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.kind() == kind)
    }

    pub fn roc_auc(&self) -> Option<&RocAuc> {
        self.metrics.iter().find_map(|m| match m {
            Metric::RocAuc(roc) => Some(roc),
            _ => None,
        })
    }
}

/// Run `model` once over every batch of `data`, in order, feeding a fresh accumulator
/// for each requested kind.
///
/// The reported loss is the example-weighted mean of the per-batch losses. The run is
/// deterministic: the same model and data always give the same result.
pub fn evaluate<M, D>(
    model: &M,
    data: &D,
    criterion: &Criterion,
    kinds: &[MetricKind],
    threshold: f32,
) -> Result<Evaluation>
where
    M: Model + ?Sized,
    D: DataSource + ?Sized,
{
    let mut metrics = kinds.iter().map(|&kind| Metric::new(kind, threshold)).collect_vec();

    let mut loss_sum = 0.0;
    let mut n_examples = 0;
    let mut n_batches = 0;

    for batch in data.batches() {
        let predictions = model.forward(batch.inputs)?;
        if predictions.len() != batch.len() {
            return Err(Error::ShapeMismatch {
                expected: batch.len(),
                found: predictions.len(),
            });
        }

        for metric in metrics.iter_mut() {
            metric.update(predictions.view(), batch.labels)?;
        }

        if !batch.is_empty() {
            let loss = criterion.compute(predictions.view(), batch.labels)?;
            loss_sum += loss * batch.len() as f64;
        }
        n_examples += batch.len();
        n_batches += 1;

        debug!("batch={n_batches} size={} examples={n_examples}", batch.len());
    }

    let loss = if n_examples == 0 {
        f64::NAN
    } else {
        loss_sum / n_examples as f64
    };

    let logs = EvalLogs {
        loss,
        metrics: metrics.iter().map(|m| (m.name().to_owned(), m.get())).collect(),
    };

    let mut confusion_matrix = None;
    let mut others = Vec::with_capacity(metrics.len());
    for metric in metrics {
        match metric {
            Metric::ConfusionMatrix(cm) if confusion_matrix.is_none() => confusion_matrix = Some(cm),
            other => others.push(other),
        }
    }

    Ok(Evaluation {
        logs,
        confusion_matrix,
        metrics: others,
        n_examples,
        n_batches,
    })
}
