use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{Error, Result};

/// One step of evaluation: an input row per example and the aligned labels.
#[derive(Clone, Copy, Debug)]
pub struct Batch<'a> {
    pub inputs: ArrayView2<'a, f32>,
    pub labels: ArrayView1<'a, f32>,
}

impl Batch<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// A finite, ordered source of batches. Every call to `batches` restarts from the beginning.
pub trait DataSource {
    fn batches(&self) -> Box<dyn Iterator<Item = Batch<'_>> + '_>;

    /// Total number of examples across all batches.
    fn n_examples(&self) -> usize;
}

/// Fixed-size batches over an in-memory feature matrix. The last batch may be short.
#[derive(Clone, Debug)]
pub struct InMemoryDataSource {
    inputs: Array2<f32>,
    labels: Array1<f32>,
    batch_size: usize,
}

impl InMemoryDataSource {
    pub fn new(inputs: Array2<f32>, labels: Array1<f32>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".to_owned()));
        }
        if inputs.nrows() != labels.len() {
            return Err(Error::ShapeMismatch {
                expected: labels.len(),
                found: inputs.nrows(),
            });
        }

        Ok(Self {
            inputs,
            labels,
            batch_size,
        })
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[inline]
    pub fn n_batches(&self) -> usize {
        self.labels.len().div_ceil(self.batch_size)
    }
}

impl DataSource for InMemoryDataSource {
    fn batches(&self) -> Box<dyn Iterator<Item = Batch<'_>> + '_> {
        let inputs = self.inputs.axis_chunks_iter(Axis(0), self.batch_size);
        let labels = self.labels.axis_chunks_iter(Axis(0), self.batch_size);
        Box::new(inputs.zip(labels).map(|(inputs, labels)| Batch { inputs, labels }))
    }

    fn n_examples(&self) -> usize {
        self.labels.len()
    }
}
