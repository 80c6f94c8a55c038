use itertools::Itertools;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use super::{Accumulator, is_positive, validate_batch};
use crate::error::Result;

/// Parallel sequences, one entry per swept threshold, ordered by decreasing threshold.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
}

impl RocCurve {
    #[inline]
    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    /// Trapezoidal area under TPR(FPR), starting from the origin.
    pub fn area(&self) -> f64 {
        let mut area = 0.0;
        let (mut x0, mut y0) = (0.0, 0.0);
        for (&x1, &y1) in self.fpr.iter().zip(&self.tpr) {
            area += (x1 - x0) * (y0 + y1) / 2.0;
            (x0, y0) = (x1, y1);
        }
        area
    }
}

/// Retains every raw score so the curve can be swept over the full empirical distribution.
#[derive(Clone, Debug, Default)]
pub struct RocAuc {
    scores: Vec<f32>,
    labels: Vec<bool>,
}

impl RocAuc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_positive(&self) -> usize {
        self.labels.iter().filter(|&&l| l).count()
    }

    pub fn n_negative(&self) -> usize {
        self.labels.len() - self.n_positive()
    }

    /// Sweep every distinct score plus 0 and 1 as thresholds, highest first.
    ///
    /// An example counts as positive at threshold `t` when its score is `>= t`. Rates for
    /// a class with no examples are NaN.
    pub fn get_curve(&self) -> RocCurve {
        if self.scores.is_empty() {
            return RocCurve::default();
        }

        let ranked = self
            .scores
            .iter()
            .zip(&self.labels)
            .map(|(&s, &l)| (f64::from(s), l))
            .sorted_by(|a, b| b.0.total_cmp(&a.0))
            .collect_vec();

        let thresholds = ranked
            .iter()
            .map(|&(s, _)| s)
            .chain([0.0, 1.0])
            .sorted_by(|a, b| b.total_cmp(a))
            .dedup()
            .collect_vec();

        let n_pos = self.n_positive() as f64;
        let n_neg = self.n_negative() as f64;

        let mut curve = RocCurve {
            fpr: Vec::with_capacity(thresholds.len()),
            tpr: Vec::with_capacity(thresholds.len()),
            thresholds: Vec::with_capacity(thresholds.len()),
        };

        let (mut tp, mut fp) = (0usize, 0usize);
        let mut next = 0;
        for t in thresholds {
            while next < ranked.len() && ranked[next].0 >= t {
                if ranked[next].1 {
                    tp += 1;
                } else {
                    fp += 1;
                }
                next += 1;
            }
            curve.fpr.push(fp as f64 / n_neg);
            curve.tpr.push(tp as f64 / n_pos);
            curve.thresholds.push(t);
        }

        curve
    }
}

impl Accumulator for RocAuc {
    fn update(&mut self, predictions: ArrayView1<f32>, labels: ArrayView1<f32>) -> Result<()> {
        validate_batch(predictions, labels)?;
        self.scores.extend(predictions.iter());
        self.labels.extend(labels.iter().map(|&l| is_positive(l)));
        Ok(())
    }

    /// NaN unless both classes have been seen.
    fn get(&self) -> f64 {
        if self.n_positive() == 0 || self.n_negative() == 0 {
            return f64::NAN;
        }
        self.get_curve().area()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::{Array1, array};

    fn fed(scores: &[f32], labels: &[f32], batch_size: usize) -> RocAuc {
        let mut roc = RocAuc::new();
        for (s, l) in scores.chunks(batch_size).zip(labels.chunks(batch_size)) {
            roc.update(Array1::from(s.to_vec()).view(), Array1::from(l.to_vec()).view())
                .unwrap();
        }
        roc
    }

    #[test]
    fn curve_sweeps_distinct_scores_and_bounds() {
        let roc = fed(&[0.1, 0.4, 0.35, 0.8], &[0.0, 0.0, 1.0, 1.0], 4);
        let curve = roc.get_curve();

        let expected = [1.0f32, 0.8, 0.4, 0.35, 0.1, 0.0].map(f64::from);
        assert_eq!(curve.thresholds, expected.to_vec());
        assert_eq!(curve.tpr, vec![0.0, 0.5, 0.5, 1.0, 1.0, 1.0]);
        assert_eq!(curve.fpr, vec![0.0, 0.0, 0.5, 0.5, 1.0, 1.0]);
        assert_approx_eq!(roc.get(), 0.75);
    }

    #[test]
    fn separable_scores_give_unit_area() {
        let roc = fed(&[0.1, 0.1, 0.9, 0.9], &[0.0, 0.0, 1.0, 1.0], 4);
        assert_approx_eq!(roc.get(), 1.0);

        let inverted = fed(&[0.9, 0.9, 0.1, 0.1], &[0.0, 0.0, 1.0, 1.0], 4);
        assert_approx_eq!(inverted.get(), 0.0);
    }

    #[test]
    fn tied_scores_give_chance_area() {
        let roc = fed(&[0.5, 0.5, 0.5, 0.5], &[0.0, 1.0, 0.0, 1.0], 4);
        assert_approx_eq!(roc.get(), 0.5);
    }

    #[test]
    fn saturated_scores_still_anchor_at_origin() {
        let roc = fed(&[1.0, 1.0, 0.0], &[1.0, 0.0, 0.0], 3);
        let curve = roc.get_curve();
        assert_eq!(curve.thresholds, vec![1.0, 0.0]);
        assert_approx_eq!(roc.get(), 0.75);
    }

    #[test]
    fn batching_does_not_change_the_result() {
        let scores = [0.05, 0.92, 0.33, 0.33, 0.61, 0.78, 0.12, 0.5, 0.49];
        let labels = [0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0];

        let whole = fed(&scores, &labels, scores.len());
        let single = fed(&scores, &labels, 1);

        assert_eq!(whole.get_curve(), single.get_curve());
        assert_eq!(whole.get().to_bits(), single.get().to_bits());
    }

    #[test]
    fn single_class_and_empty_are_undefined() {
        assert!(RocAuc::new().get().is_nan());
        assert!(RocAuc::new().get_curve().is_empty());

        let only_positive = fed(&[0.2, 0.7], &[1.0, 1.0], 2);
        assert!(only_positive.get().is_nan());
        assert!(only_positive.get_curve().fpr.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn empty_batch_is_accepted() {
        let mut roc = RocAuc::new();
        roc.update(array![0.4f32].view(), array![1.0f32].view()).unwrap();
        roc.update(Array1::<f32>::zeros(0).view(), Array1::<f32>::zeros(0).view())
            .unwrap();
        assert_eq!(roc.n_positive(), 1);
    }
}
