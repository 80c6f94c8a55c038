use ndarray::ArrayView2;

use crate::error::{Error, Result};
use crate::metrics::ConfusionMatrix;

/// Within-class rates read off a row-normalized confusion matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClinicalMetrics {
    pub specificity: f64,
    pub fpr: f64,
    pub fnr: f64,
    pub sensitivity: f64,
}

impl ClinicalMetrics {
    /// Expects the 2x2 `[ground][predicted]` layout produced by [`ConfusionMatrix::normalized`].
    pub fn from_normalized(cm: ArrayView2<f64>) -> Result<Self> {
        if cm.dim() != (2, 2) {
            return Err(Error::ShapeMismatch {
                expected: 4,
                found: cm.len(),
            });
        }

        Ok(Self {
            specificity: cm[(0, 0)],
            fpr: cm[(0, 1)],
            fnr: cm[(1, 0)],
            sensitivity: cm[(1, 1)],
        })
    }

    /// Rates of a ground-truth class with no examples are NaN; the other class keeps its own.
    pub fn from_confusion_matrix(cm: &ConfusionMatrix) -> Self {
        let rows = cm.row_normalized();
        Self {
            specificity: rows[(0, 0)],
            fpr: rows[(0, 1)],
            fnr: rows[(1, 0)],
            sensitivity: rows[(1, 1)],
        }
    }

    /// Every rate NaN, for evaluations without a confusion matrix.
    pub fn undefined() -> Self {
        Self {
            specificity: f64::NAN,
            fpr: f64::NAN,
            fnr: f64::NAN,
            sensitivity: f64::NAN,
        }
    }

    pub fn balanced_accuracy(&self) -> f64 {
        (self.sensitivity + self.specificity) / 2.0
    }

    #[inline]
    pub fn missrate(&self) -> f64 {
        self.fnr
    }

    /// `(sens * spec) / ((1 - sens) * (1 - spec))`.
    ///
    /// A saturated rate zeroes the denominator: the ratio is then `+inf`, or NaN when the
    /// numerator is zero as well.
    pub fn diagnostic_odds_ratio(&self) -> f64 {
        let num = self.sensitivity * self.specificity;
        let den = (1.0 - self.sensitivity) * (1.0 - self.specificity);
        if den == 0.0 {
            return if num > 0.0 { f64::INFINITY } else { f64::NAN };
        }
        num / den
    }
}
