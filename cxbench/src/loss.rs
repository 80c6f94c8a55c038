use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Log terms are clamped here so saturated scores give a finite loss.
const LOG_FLOOR: f64 = -100.0;

/// Loss applied to sigmoid scores. Tracked during evaluation only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Criterion {
    BinaryCrossEntropy,
    /// Cross entropy scaled by `(1 - p_t)^gamma`.
    Focal { gamma: f64 },
}

impl Default for Criterion {
    fn default() -> Self {
        Criterion::Focal { gamma: 2.0 }
    }
}

impl Criterion {
    /// Mean loss over the batch. NaN for an empty batch.
    pub fn compute(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Result<f64> {
        if predictions.len() != targets.len() {
            return Err(Error::ShapeMismatch {
                expected: targets.len(),
                found: predictions.len(),
            });
        }
        if predictions.is_empty() {
            return Ok(f64::NAN);
        }

        let total: f64 = predictions
            .iter()
            .zip(targets.iter())
            .map(|(&p, &t)| {
                let (p, t) = (f64::from(p), f64::from(t));
                let bce = binary_cross_entropy(p, t);
                match self {
                    Criterion::BinaryCrossEntropy => bce,
                    Criterion::Focal { gamma } => {
                        let pt = t * p + (1.0 - t) * (1.0 - p);
                        (1.0 - pt).powf(*gamma) * bce
                    }
                }
            })
            .sum();

        Ok(total / predictions.len() as f64)
    }
}

#[inline]
fn binary_cross_entropy(p: f64, t: f64) -> f64 {
    -(t * p.ln().max(LOG_FLOOR) + (1.0 - t) * (1.0 - p).ln().max(LOG_FLOOR))
}
