/*! Held-out cohorts built from per-source manifests.
 *
 * A manifest is a JSON list of already preprocessed records for one source dataset
 * (`corda`, `chestxray`, `rsna`, `cohen`, ...). A cohort concatenates one or more sources,
 * may top up its minority class from another source, optionally filters on the
 * radiological finding, picks which field is the label, and may be subsampled. All random
 * draws use the run seed.
 */

use std::path::Path;

use indexmap::IndexMap;
use itertools::Itertools;
use log::info;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::TrainMode;
use crate::data::InMemoryDataSource;
use crate::error::{Error, Result};
use crate::serde_utils::JSONReadWrite;

/// One preprocessed chest X-ray.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub features: Vec<f32>,
    pub covid: u8,
    /// Radiological finding: 1 when the X-ray shows lung involvement
    #[serde(default)]
    pub rx: u8,
}

pub type Manifest = Vec<Record>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RxFilter {
    Positive,
    Negative,
}

impl RxFilter {
    #[inline]
    fn keeps(self, record: &Record) -> bool {
        match self {
            RxFilter::Positive => record.rx == 1,
            RxFilter::Negative => record.rx == 0,
        }
    }
}

/// Record field used as ground truth.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelField {
    #[default]
    Covid,
    Rx,
}

impl LabelField {
    #[inline]
    fn of(self, record: &Record) -> u8 {
        match self {
            LabelField::Covid => record.covid,
            LabelField::Rx => record.rx,
        }
    }

    /// Display names of the negative and positive class.
    pub fn class_names(self) -> [&'static str; 2] {
        match self {
            LabelField::Covid => ["covid-", "covid+"],
            LabelField::Rx => ["rx-", "rx+"],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CohortSpec {
    /// Value of the `test_cohort` column
    pub name: String,
    /// Plot title
    pub title: String,
    /// Prefix of the per-cohort artifact files
    pub file_stem: String,
    pub sources: Vec<String>,
    #[serde(default)]
    pub rx: Option<RxFilter>,
    #[serde(default)]
    pub label: LabelField,
    /// Source sampled to fill the gap between the positive and negative counts of
    /// `sources`. Applied before the RX filter.
    #[serde(default)]
    pub balance_with: Option<String>,
    /// Keep at most this many records, drawn with the run seed
    #[serde(default)]
    pub sample: Option<usize>,
}

impl CohortSpec {
    pub fn new(name: &str, title: &str, file_stem: &str, sources: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            title: title.to_owned(),
            file_stem: file_stem.to_owned(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            rx: None,
            label: LabelField::Covid,
            balance_with: None,
            sample: None,
        }
    }

    pub fn with_balance(mut self, source: &str) -> Self {
        self.balance_with = Some(source.to_owned());
        self
    }

    pub fn with_rx(mut self, rx: RxFilter) -> Self {
        self.rx = Some(rx);
        self
    }

    pub fn with_label(mut self, label: LabelField) -> Self {
        self.label = label;
        self
    }
}

/// The standard sweep: CORDA and its RX subsets, the train mode's own test set, Cohen,
/// CORDA mixed with each external source, and the external sources labelled by RX.
///
/// The train mode's test set is CORDA topped up from the external source for
/// `corda+chest` and `corda+rsna`, so its classes match in size.
pub fn default_cohorts(train: TrainMode) -> Vec<CohortSpec> {
    let train_upper = train.as_str().to_uppercase();

    let mut own = CohortSpec::new(
        &format!("{train_upper} RX+"),
        &format!("Test {train_upper} RX+"),
        &format!("test-{}-rx+", train.as_str()),
        train.test_sources(),
    )
    .with_rx(RxFilter::Positive);
    if let Some(source) = train.balancing_source() {
        own = own.with_balance(source);
    }

    vec![
        CohortSpec::new("CORDA", "CORDA", "corda", &["corda"]),
        CohortSpec::new("CORDA RX+", "CORDA RX+", "corda-rx+", &["corda"]).with_rx(RxFilter::Positive),
        CohortSpec::new("CORDA RX-", "CORDA RX-", "corda-rx-", &["corda"]).with_rx(RxFilter::Negative),
        own,
        CohortSpec::new("Cohen (All)", "Cohen (All)", "cohen-all", &["cohen-all"]),
        CohortSpec::new("Cohen", "Cohen (Test)", "cohen-test", &["cohen"]),
        CohortSpec::new("CORDA+ChestXRay", "CORDA+ChestXRay (Test)", "corda-chest", &["corda", "chestxray"]),
        CohortSpec::new("CORDA+RSNA", "CORDA+RSNA (Test)", "corda-rsna", &["corda", "rsna"]),
        CohortSpec::new("CORDA+Cohen", "CORDA+Cohen (Test)", "corda-cohen", &["corda", "cohen"]),
        CohortSpec::new("RSNA", "RSNA", "rsna", &["rsna"]).with_label(LabelField::Rx),
        CohortSpec::new("ChestXRay", "ChestXRay", "chestxray", &["chestxray"]).with_label(LabelField::Rx),
    ]
}

/// Manifests by source name.
#[derive(Clone, Debug, Default)]
pub struct Sources {
    manifests: IndexMap<String, Manifest>,
}

impl Sources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, manifest: Manifest) {
        self.manifests.insert(name.into(), manifest);
    }

    /// Read `<data_dir>/<name>.json` for every distinct name.
    pub fn load<'a>(data_dir: &Path, names: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut sources = Self::new();

        for name in names.into_iter().unique() {
            let path = data_dir.join(format!("{name}.json"));
            if !path.is_file() {
                return Err(Error::MissingFile { kind: "manifest", path });
            }

            let manifest = Manifest::read_json(&path)?;
            info!("Loaded source '{}' from '{}': records={}", name, path.display(), manifest.len());
            sources.insert(name, manifest);
        }

        Ok(sources)
    }

    pub fn get(&self, name: &str) -> Result<&[Record]> {
        self.manifests
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UnknownName {
                kind: "source",
                name: name.to_owned(),
            })
    }
}

/// Distinct source names referenced by `specs`, in first-use order.
pub fn referenced_sources(specs: &[CohortSpec]) -> Vec<&str> {
    specs
        .iter()
        .flat_map(|spec| spec.sources.iter().chain(&spec.balance_with).map(String::as_str))
        .unique()
        .collect_vec()
}

/// A materialized cohort: one feature row and one 0/1 label per record.
#[derive(Clone, Debug)]
pub struct Cohort {
    pub spec: CohortSpec,
    pub ids: Vec<String>,
    pub inputs: Array2<f32>,
    pub labels: Array1<f32>,
}

impl Cohort {
    pub fn build(spec: &CohortSpec, sources: &Sources, seed: u64) -> Result<Self> {
        let mut records: Vec<&Record> = Vec::new();
        for name in &spec.sources {
            records.extend(sources.get(name)?);
        }

        if let Some(name) = &spec.balance_with {
            let n_positive = records.iter().filter(|r| spec.label.of(r) == 1).count();
            let gap = n_positive.saturating_sub(records.len() - n_positive);
            let pool = sources.get(name)?;
            if gap > pool.len() {
                return Err(Error::InvalidData(format!(
                    "cohort '{}' needs {gap} records from '{name}' to balance its classes; found {}",
                    spec.name,
                    pool.len()
                )));
            }
            records.extend(sample_indices(pool.len(), gap, seed).into_iter().map(|i| &pool[i]));
        }

        if let Some(rx) = spec.rx {
            records.retain(|r| rx.keeps(r));
        }

        if let Some(n) = spec.sample {
            if n < records.len() {
                records = sample_indices(records.len(), n, seed)
                    .into_iter()
                    .map(|i| records[i])
                    .collect_vec();
            }
        }

        let Some(first) = records.first() else {
            return Err(Error::InvalidData(format!("cohort '{}' has no examples", spec.name)));
        };
        let n_features = first.features.len();

        let mut flat = Vec::with_capacity(records.len() * n_features);
        let mut labels = Vec::with_capacity(records.len());
        for record in &records {
            if record.features.len() != n_features {
                return Err(Error::InvalidData(format!(
                    "record '{}' in cohort '{}' has {} features; expected {}",
                    record.id,
                    spec.name,
                    record.features.len(),
                    n_features
                )));
            }

            let label = spec.label.of(record);
            if label > 1 {
                return Err(Error::InvalidData(format!(
                    "record '{}' has label {label}; expected 0 or 1",
                    record.id
                )));
            }

            flat.extend_from_slice(&record.features);
            labels.push(f32::from(label));
        }

        let inputs = Array2::from_shape_vec((records.len(), n_features), flat)
            .map_err(|e| Error::InvalidData(e.to_string()))?;

        Ok(Self {
            spec: spec.clone(),
            ids: records.iter().map(|r| r.id.clone()).collect(),
            inputs,
            labels: Array1::from(labels),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.inputs.ncols()
    }

    pub fn n_positive(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1.0).count()
    }

    pub fn data_source(&self, batch_size: usize) -> Result<InMemoryDataSource> {
        InMemoryDataSource::new(self.inputs.clone(), self.labels.clone(), batch_size)
    }
}

/// `n` distinct indices below `len` drawn with `seed`, ascending.
fn sample_indices(len: usize, n: usize, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut idxs = (0..len).collect_vec();
    idxs.shuffle(&mut rng);
    idxs.truncate(n);
    idxs.sort_unstable();
    idxs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, covid: u8, rx: u8) -> Record {
        Record {
            id: id.to_owned(),
            features: vec![covid as f32, rx as f32],
            covid,
            rx,
        }
    }

    fn sources() -> Sources {
        let mut sources = Sources::new();
        sources.insert(
            "corda",
            vec![record("c0", 0, 0), record("c1", 1, 1), record("c2", 1, 0), record("c3", 0, 1)],
        );
        sources.insert("rsna", vec![record("r0", 0, 1), record("r1", 0, 0)]);
        sources
    }

    #[test]
    fn concatenates_sources_in_order() {
        let spec = CohortSpec::new("CORDA+RSNA", "t", "corda-rsna", &["corda", "rsna"]);
        let cohort = Cohort::build(&spec, &sources(), 0).unwrap();

        assert_eq!(cohort.ids, vec!["c0", "c1", "c2", "c3", "r0", "r1"]);
        assert_eq!(cohort.labels.to_vec(), vec![0.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
        assert_eq!(cohort.n_features(), 2);
    }

    #[test]
    fn rx_filter_and_rx_labels() {
        let rx_pos = CohortSpec::new("CORDA RX+", "t", "x", &["corda"]).with_rx(RxFilter::Positive);
        assert_eq!(Cohort::build(&rx_pos, &sources(), 0).unwrap().ids, vec!["c1", "c3"]);

        let by_rx = CohortSpec::new("RSNA", "t", "rsna", &["rsna"]).with_label(LabelField::Rx);
        let cohort = Cohort::build(&by_rx, &sources(), 0).unwrap();
        assert_eq!(cohort.n_positive(), 1);
        assert_eq!(by_rx.label.class_names(), ["rx-", "rx+"]);
    }

    #[test]
    fn sampling_depends_only_on_seed() {
        let mut spec = CohortSpec::new("s", "t", "s", &["corda", "rsna"]);
        spec.sample = Some(3);

        let a = Cohort::build(&spec, &sources(), 7).unwrap();
        let b = Cohort::build(&spec, &sources(), 7).unwrap();
        assert_eq!(a.ids, b.ids);
        assert_eq!(a.len(), 3);

        spec.sample = Some(100);
        assert_eq!(Cohort::build(&spec, &sources(), 7).unwrap().len(), 6);
    }

    #[test]
    fn bad_cohorts_are_rejected() {
        let unknown = CohortSpec::new("x", "x", "x", &["padchest"]);
        assert!(matches!(
            Cohort::build(&unknown, &sources(), 0),
            Err(Error::UnknownName { kind: "source", .. })
        ));

        let mut src = sources();
        src.insert("empty", vec![]);
        let empty = CohortSpec::new("x", "x", "x", &["empty"]);
        assert!(matches!(Cohort::build(&empty, &src, 0), Err(Error::InvalidData(_))));

        let mut ragged = record("bad", 1, 0);
        ragged.features.push(3.0);
        src.insert("ragged", vec![record("ok", 0, 0), ragged]);
        let spec = CohortSpec::new("x", "x", "x", &["ragged"]);
        assert!(matches!(Cohort::build(&spec, &src, 0), Err(Error::InvalidData(_))));
    }

    #[test]
    fn default_sweep_references_train_test_sources() {
        let cohorts = default_cohorts(TrainMode::CordaChest);
        assert_eq!(cohorts.len(), 11);
        assert_eq!(cohorts[3].name, "CORDA+CHEST RX+");
        assert_eq!(cohorts[3].file_stem, "test-corda+chest-rx+");
        assert_eq!(cohorts[3].sources, vec!["corda"]);
        assert_eq!(cohorts[3].balance_with.as_deref(), Some("chestxray"));
        assert_eq!(
            referenced_sources(&cohorts),
            vec!["corda", "chestxray", "cohen-all", "cohen", "rsna"]
        );

        let cohen = default_cohorts(TrainMode::CordaCohen);
        assert_eq!(cohen[3].sources, vec!["corda", "cohen"]);
        assert_eq!(cohen[3].balance_with, None);
    }

    #[test]
    fn balancing_tops_up_the_class_gap() {
        let mut src = Sources::new();
        src.insert(
            "corda",
            vec![record("c0", 1, 1), record("c1", 1, 0), record("c2", 1, 1), record("c3", 0, 1)],
        );
        src.insert(
            "chestxray",
            (0..6).map(|i| record(&format!("x{i}"), 0, (i % 2) as u8)).collect(),
        );

        let spec = CohortSpec::new("CORDA+CHEST", "t", "t", &["corda"]).with_balance("chestxray");
        let a = Cohort::build(&spec, &src, 3).unwrap();
        let b = Cohort::build(&spec, &src, 3).unwrap();

        assert_eq!(a.len(), 6);
        assert_eq!(a.n_positive(), 3);
        assert_eq!(&a.ids[..4], ["c0", "c1", "c2", "c3"]);
        assert!(a.ids[4..].iter().all(|id| id.starts_with('x')));
        assert_eq!(a.ids, b.ids);

        // The RX filter applies to the balanced set.
        let rx_pos = spec.clone().with_rx(RxFilter::Positive);
        let c = Cohort::build(&rx_pos, &src, 3).unwrap();
        assert!(c.ids.starts_with(&["c0".to_owned(), "c2".to_owned(), "c3".to_owned()]));
        assert!(c.ids.len() <= 5);

        src.insert("chestxray", vec![record("x0", 0, 0)]);
        assert!(matches!(Cohort::build(&spec, &src, 3), Err(Error::InvalidData(_))));
    }
}
