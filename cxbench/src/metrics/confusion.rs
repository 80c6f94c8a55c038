use ndarray::{Array2, ArrayView1};

use super::{Accumulator, DEFAULT_THRESHOLD, is_positive, validate_batch};
use crate::error::{Error, Result};

const NEGATIVE: usize = 0;
const POSITIVE: usize = 1;

/// Running 2x2 count grid indexed `[ground][predicted]`, negative class first.
#[derive(Clone, Debug)]
pub struct ConfusionMatrix {
    threshold: f32,
    counts: [[u64; 2]; 2],
}

impl Default for ConfusionMatrix {
    fn default() -> Self {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            threshold,
            counts: [[0; 2]; 2],
        }
    }

    /// Build from known counts, `[ground][predicted]`.
    pub fn from_counts(counts: [[u64; 2]; 2]) -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            counts,
        }
    }

    /// Raw counts; rows are the ground-truth class, columns the predicted class.
    pub fn counts(&self) -> Array2<u64> {
        Array2::from_shape_fn((2, 2), |(g, p)| self.counts[g][p])
    }

    /// Each row divided by its sum. Row-major the cells read specificity, FPR, FNR, sensitivity.
    pub fn normalized(&self) -> Result<Array2<f64>> {
        match self.empty_class() {
            Some(class) => Err(Error::EmptyClass { class }),
            None => Ok(self.row_normalized()),
        }
    }

    /// Like [`normalized`](Self::normalized), but a ground-truth row without examples
    /// becomes NaN instead of failing. The other row keeps its rates.
    pub fn row_normalized(&self) -> Array2<f64> {
        Array2::from_shape_fn((2, 2), |(g, p)| {
            let row_total: u64 = self.counts[g].iter().sum();
            if row_total == 0 {
                f64::NAN
            } else {
                self.counts[g][p] as f64 / row_total as f64
            }
        })
    }

    /// First ground-truth class with no examples, if any.
    pub fn empty_class(&self) -> Option<usize> {
        self.counts.iter().position(|row| row.iter().sum::<u64>() == 0)
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    #[inline]
    pub fn true_positives(&self) -> u64 {
        self.counts[POSITIVE][POSITIVE]
    }

    #[inline]
    pub fn false_positives(&self) -> u64 {
        self.counts[NEGATIVE][POSITIVE]
    }

    #[inline]
    pub fn true_negatives(&self) -> u64 {
        self.counts[NEGATIVE][NEGATIVE]
    }

    #[inline]
    pub fn false_negatives(&self) -> u64 {
        self.counts[POSITIVE][NEGATIVE]
    }
}

impl Accumulator for ConfusionMatrix {
    fn update(&mut self, predictions: ArrayView1<f32>, labels: ArrayView1<f32>) -> Result<()> {
        validate_batch(predictions, labels)?;

        for (&p, &l) in predictions.iter().zip(labels.iter()) {
            let ground = if is_positive(l) { POSITIVE } else { NEGATIVE };
            let predicted = if p >= self.threshold { POSITIVE } else { NEGATIVE };
            self.counts[ground][predicted] += 1;
        }
        Ok(())
    }

    /// Fraction of examples on the diagonal.
    fn get(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return f64::NAN;
        }
        (self.true_negatives() + self.true_positives()) as f64 / total as f64
    }
}
