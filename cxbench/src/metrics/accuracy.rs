use ndarray::ArrayView1;

use super::{Accumulator, DEFAULT_THRESHOLD, is_positive, validate_batch};
use crate::error::Result;

/// Running fraction of examples whose binarized score matches the label.
#[derive(Clone, Debug)]
pub struct Accuracy {
    threshold: f32,
    correct: u64,
    total: u64,
}

impl Default for Accuracy {
    fn default() -> Self {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }
}

impl Accuracy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            threshold,
            correct: 0,
            total: 0,
        }
    }

    #[inline]
    pub fn correct(&self) -> u64 {
        self.correct
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }
}

impl Accumulator for Accuracy {
    fn update(&mut self, predictions: ArrayView1<f32>, labels: ArrayView1<f32>) -> Result<()> {
        validate_batch(predictions, labels)?;

        let correct = predictions
            .iter()
            .zip(labels.iter())
            .filter(|&(&p, &l)| (p >= self.threshold) == is_positive(l))
            .count();

        self.correct += correct as u64;
        self.total += labels.len() as u64;
        Ok(())
    }

    fn get(&self) -> f64 {
        if self.total == 0 {
            return f64::NAN;
        }
        self.correct as f64 / self.total as f64
    }
}
