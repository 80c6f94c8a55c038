use ndarray::ArrayView1;

use super::{Accumulator, ConfusionMatrix};
use crate::error::Result;

/// Harmonic mean of precision and recall over binarized predictions.
///
/// Precision or recall with a zero denominator counts as 0, so the score stays a
/// well-defined number for degenerate cohorts. Only an accumulator that has seen no
/// data reports NaN.
#[derive(Clone, Debug, Default)]
pub struct FScore(ConfusionMatrix);

impl FScore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(threshold: f32) -> Self {
        Self(ConfusionMatrix::with_threshold(threshold))
    }

    /// TP / (TP + FP), or 0 without predicted positives.
    pub fn precision(&self) -> f64 {
        ratio_or_zero(self.0.true_positives(), self.0.true_positives() + self.0.false_positives())
    }

    /// TP / (TP + FN), or 0 without actual positives.
    pub fn recall(&self) -> f64 {
        ratio_or_zero(self.0.true_positives(), self.0.true_positives() + self.0.false_negatives())
    }
}

impl Accumulator for FScore {
    fn update(&mut self, predictions: ArrayView1<f32>, labels: ArrayView1<f32>) -> Result<()> {
        self.0.update(predictions, labels)
    }

    fn get(&self) -> f64 {
        if self.0.total() == 0 {
            return f64::NAN;
        }

        let precision = self.precision();
        let recall = self.recall();
        if precision + recall == 0.0 {
            return 0.0;
        }
        2.0 * precision * recall / (precision + recall)
    }
}

#[inline]
fn ratio_or_zero(num: u64, den: u64) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}
