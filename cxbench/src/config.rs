use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::cohort::CohortSpec;
use crate::error::{Error, Result};
use crate::loss::Criterion;
use crate::metrics::DEFAULT_THRESHOLD;

/// Encoder the checkpoint was trained with
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Resnet18,
    Resnet50,
}

impl Architecture {
    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::Resnet18 => "resnet18",
            Architecture::Resnet50 => "resnet50",
        }
    }
}

/// Dataset the encoder was pretrained on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Pretrain {
    Chestxray,
    Rsna,
    #[value(name = "none")]
    #[serde(rename = "none")]
    Scratch,
}

impl Pretrain {
    pub fn as_str(self) -> &'static str {
        match self {
            Pretrain::Chestxray => "chestxray",
            Pretrain::Rsna => "rsna",
            Pretrain::Scratch => "none",
        }
    }
}

/// Cohorts the classifier was trained on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum TrainMode {
    #[value(name = "corda")]
    #[serde(rename = "corda")]
    Corda,
    #[value(name = "corda+chest")]
    #[serde(rename = "corda+chest")]
    CordaChest,
    #[value(name = "corda+rsna")]
    #[serde(rename = "corda+rsna")]
    CordaRsna,
    #[value(name = "corda+cohen")]
    #[serde(rename = "corda+cohen")]
    CordaCohen,
    #[value(name = "cohen")]
    #[serde(rename = "cohen")]
    Cohen,
}

impl TrainMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TrainMode::Corda => "corda",
            TrainMode::CordaChest => "corda+chest",
            TrainMode::CordaRsna => "corda+rsna",
            TrainMode::CordaCohen => "corda+cohen",
            TrainMode::Cohen => "cohen",
        }
    }

    /// Sources whose test splits make up this mode's own test set.
    pub fn test_sources(self) -> &'static [&'static str] {
        match self {
            TrainMode::Corda | TrainMode::CordaChest | TrainMode::CordaRsna => &["corda"],
            TrainMode::CordaCohen => &["corda", "cohen"],
            TrainMode::Cohen => &["cohen"],
        }
    }

    /// Source drawn from to even out the classes of the test set, if any.
    pub fn balancing_source(self) -> Option<&'static str> {
        match self {
            TrainMode::CordaChest => Some("chestxray"),
            TrainMode::CordaRsna => Some("rsna"),
            TrainMode::Corda | TrainMode::CordaCohen | TrainMode::Cohen => None,
        }
    }
}

macro_rules! display_as_str {
    ($($t:ty),*) => {
        $(impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(Architecture, Pretrain, TrainMode);

/// Which trained model is being benchmarked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    pub arch: Architecture,
    pub pretrain: Pretrain,
    pub train: TrainMode,
}

impl RunIdentity {
    /// `arch/pretrain/train`, used for checkpoint and log paths.
    pub fn name(&self) -> String {
        format!("{}/{}/{}", self.arch, self.pretrain, self.train)
    }
}

/// Settings for a benchmark sweep
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Dataset release; selects the checkpoint and log subdirectories
    pub version: String,
    /// Directory holding one `<source>.json` manifest per source dataset
    pub data_dir: PathBuf,
    pub models_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub batch_size: usize,
    /// Scores at or above the threshold are predicted positive
    pub threshold: f32,
    /// Seed for cohort subsampling
    pub seed: u64,
    pub criterion: Criterion,
    /// Write confusion-matrix and ROC plots for every cohort
    pub plots: bool,
    /// Cohorts to evaluate. Defaults to the standard sweep for the train mode.
    pub cohorts: Option<Vec<CohortSpec>>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            version: "v4".to_owned(),
            data_dir: PathBuf::from("data"),
            models_dir: PathBuf::from("models"),
            logs_dir: PathBuf::from("logs"),
            batch_size: 10,
            threshold: DEFAULT_THRESHOLD,
            seed: 42,
            criterion: Criterion::default(),
            plots: true,
            cohorts: None,
        }
    }
}

impl BenchmarkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".to_owned()));
        }

        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "threshold must lie in (0, 1); found {}",
                self.threshold
            )));
        }

        if let Some(cohorts) = &self.cohorts {
            if cohorts.is_empty() {
                return Err(Error::InvalidConfig("cohort list is empty".to_owned()));
            }
            if let Some(spec) = cohorts.iter().find(|c| c.sources.is_empty()) {
                return Err(Error::InvalidConfig(format!("cohort '{}' has no sources", spec.name)));
            }
            if let Some(stem) = cohorts.iter().map(|c| &c.file_stem).duplicates().next() {
                return Err(Error::InvalidConfig(format!("duplicate cohort file stem '{stem}'")));
            }
        }

        Ok(())
    }

    pub fn checkpoint_path(&self, identity: &RunIdentity) -> PathBuf {
        self.models_dir
            .join(&self.version)
            .join(identity.arch.as_str())
            .join(identity.pretrain.as_str())
            .join(format!("{}.json", identity.train))
    }

    pub fn run_dir(&self, identity: &RunIdentity) -> PathBuf {
        self.logs_dir.join(&self.version).join(identity.name())
    }

    /// Configured cohorts, or the standard sweep for `train`.
    pub fn cohorts_for(&self, train: TrainMode) -> Vec<CohortSpec> {
        self.cohorts
            .clone()
            .unwrap_or_else(|| crate::cohort::default_cohorts(train))
    }
}
