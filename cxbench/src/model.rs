use std::path::Path;

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::serde_utils::JSONReadWrite;

/// A trained classifier in inference mode: one positive-class score per input row.
pub trait Model {
    fn forward(&self, inputs: ArrayView2<f32>) -> Result<Array1<f32>>;
}

impl<F> Model for F
where
    F: Fn(ArrayView2<f32>) -> Array1<f32>,
{
    fn forward(&self, inputs: ArrayView2<f32>) -> Result<Array1<f32>> {
        Ok(self(inputs))
    }
}

/// Logistic head over preprocessed image features.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearClassifier {
    pub weights: Vec<f32>,
    pub bias: f32,
}

impl LinearClassifier {
    pub fn new(weights: Vec<f32>, bias: f32) -> Self {
        Self { weights, bias }
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.weights.len()
    }
}

impl Model for LinearClassifier {
    fn forward(&self, inputs: ArrayView2<f32>) -> Result<Array1<f32>> {
        if inputs.ncols() != self.n_features() {
            return Err(Error::ShapeMismatch {
                expected: self.n_features(),
                found: inputs.ncols(),
            });
        }

        let mut scores = inputs.dot(&ArrayView1::from(&self.weights[..]));
        scores.par_mapv_inplace(|z| sigmoid(z + self.bias));
        Ok(scores)
    }
}

#[inline]
fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Training epoch the weights were saved at.
    pub epoch: usize,
    pub model: LinearClassifier,
}

impl Checkpoint {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::MissingFile {
                kind: "checkpoint",
                path: path.to_path_buf(),
            });
        }
        Self::read_json(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::array;

    #[test]
    fn linear_scores_are_sigmoid_of_logits() {
        let model = LinearClassifier::new(vec![1.0, -2.0], 0.5);
        let scores = model.forward(array![[0.0f32, 0.0], [2.0, 0.25]].view()).unwrap();

        assert_approx_eq!(scores[0], 1.0 / (1.0 + (-0.5f32).exp()));
        assert_approx_eq!(scores[1], 1.0 / (1.0 + (-2.0f32).exp()));
    }

    #[test]
    fn wrong_feature_count_is_rejected() {
        let model = LinearClassifier::new(vec![1.0; 3], 0.0);
        assert!(matches!(
            model.forward(array![[1.0f32, 2.0]].view()),
            Err(Error::ShapeMismatch { expected: 3, found: 2 })
        ));
    }

    #[test]
    fn missing_checkpoint_is_reported() {
        let err = Checkpoint::load(Path::new("/nonexistent/cxbench/model.json")).unwrap_err();
        assert!(matches!(err, Error::MissingFile { kind: "checkpoint", .. }));
    }
}
