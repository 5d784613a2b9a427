//! Similarity metrics
//!
//! Each metric scores one aspect of two contracts in `[0, weight]`. The
//! comparator sums them (threshold calibration) or feeds them to a linear
//! decision function (linear calibration).

use serde::{Deserialize, Serialize};

use crate::analyze::ContractMeta;
use crate::fingerprint::Section;

/// Metric identity; the order of [`MetricKind::ALL`] is the feature order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Manager,
    Language,
    Tags,
    FailStrings,
    Annotations,
    Entrypoints,
    FingerprintLength(Section),
    FingerprintEdit(Section),
}

impl MetricKind {
    pub const ALL: [MetricKind; 12] = [
        MetricKind::Manager,
        MetricKind::Language,
        MetricKind::Tags,
        MetricKind::FailStrings,
        MetricKind::Annotations,
        MetricKind::Entrypoints,
        MetricKind::FingerprintLength(Section::Parameter),
        MetricKind::FingerprintLength(Section::Storage),
        MetricKind::FingerprintLength(Section::Code),
        MetricKind::FingerprintEdit(Section::Parameter),
        MetricKind::FingerprintEdit(Section::Storage),
        MetricKind::FingerprintEdit(Section::Code),
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Language => "language",
            Self::Tags => "tags",
            Self::FailStrings => "fail_strings",
            Self::Annotations => "annotations",
            Self::Entrypoints => "entrypoints",
            Self::FingerprintLength(Section::Parameter) => "parameter_length",
            Self::FingerprintLength(Section::Storage) => "storage_length",
            Self::FingerprintLength(Section::Code) => "code_length",
            Self::FingerprintEdit(Section::Parameter) => "parameter_edit",
            Self::FingerprintEdit(Section::Storage) => "storage_edit",
            Self::FingerprintEdit(Section::Code) => "code_edit",
        }
    }
}

/// One number per metric, in metric order. Used for weights and for
/// classifier coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricTable {
    pub manager: f64,
    pub language: f64,
    pub tags: f64,
    pub fail_strings: f64,
    pub annotations: f64,
    pub entrypoints: f64,
    pub parameter_length: f64,
    pub storage_length: f64,
    pub code_length: f64,
    pub parameter_edit: f64,
    pub storage_edit: f64,
    pub code_edit: f64,
}

impl MetricTable {
    /// Hand-tuned weights; they sum to 1.0.
    pub const WEIGHTS: MetricTable = MetricTable {
        manager: 0.05,
        language: 0.05,
        tags: 0.05,
        fail_strings: 0.05,
        annotations: 0.10,
        entrypoints: 0.10,
        parameter_length: 0.05,
        storage_length: 0.05,
        code_length: 0.10,
        parameter_edit: 0.10,
        storage_edit: 0.10,
        code_edit: 0.20,
    };

    /// Trained linear classifier coefficients over unit-weight features.
    pub const COEFFICIENTS: MetricTable = MetricTable {
        manager: 1.2,
        language: 0.4,
        tags: 0.3,
        fail_strings: 1.1,
        annotations: 1.5,
        entrypoints: 1.8,
        parameter_length: 0.6,
        storage_length: 0.6,
        code_length: 1.4,
        parameter_edit: 1.9,
        storage_edit: 1.7,
        code_edit: 3.6,
    };

    /// Every metric at full weight
    pub const UNIT: MetricTable = MetricTable {
        manager: 1.0,
        language: 1.0,
        tags: 1.0,
        fail_strings: 1.0,
        annotations: 1.0,
        entrypoints: 1.0,
        parameter_length: 1.0,
        storage_length: 1.0,
        code_length: 1.0,
        parameter_edit: 1.0,
        storage_edit: 1.0,
        code_edit: 1.0,
    };

    pub fn get(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Manager => self.manager,
            MetricKind::Language => self.language,
            MetricKind::Tags => self.tags,
            MetricKind::FailStrings => self.fail_strings,
            MetricKind::Annotations => self.annotations,
            MetricKind::Entrypoints => self.entrypoints,
            MetricKind::FingerprintLength(Section::Parameter) => self.parameter_length,
            MetricKind::FingerprintLength(Section::Storage) => self.storage_length,
            MetricKind::FingerprintLength(Section::Code) => self.code_length,
            MetricKind::FingerprintEdit(Section::Parameter) => self.parameter_edit,
            MetricKind::FingerprintEdit(Section::Storage) => self.storage_edit,
            MetricKind::FingerprintEdit(Section::Code) => self.code_edit,
        }
    }

    /// Values in metric order
    pub fn values(&self) -> [f64; 12] {
        MetricKind::ALL.map(|kind| self.get(kind))
    }

    pub fn sum(&self) -> f64 {
        self.values().iter().sum()
    }
}

impl Default for MetricTable {
    fn default() -> Self {
        Self::WEIGHTS
    }
}

/// A weighted metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metric {
    pub kind: MetricKind,
    pub weight: f64,
}

impl Metric {
    pub fn new(kind: MetricKind, weight: f64) -> Self {
        Self { kind, weight }
    }

    /// Score `a` against `b`, in `[0, weight]`. `edit_threshold` bounds the
    /// fingerprint edit distance.
    pub fn compute(&self, a: &ContractMeta, b: &ContractMeta, edit_threshold: usize) -> f64 {
        let ratio = match self.kind {
            MetricKind::Manager => equality(&a.manager, &b.manager),
            MetricKind::Language => equality(&a.language, &b.language),
            MetricKind::Tags => overlap(&a.tags, &b.tags),
            MetricKind::FailStrings => overlap(&a.fail_strings, &b.fail_strings),
            MetricKind::Annotations => overlap(&a.annotations, &b.annotations),
            MetricKind::Entrypoints => overlap(&a.entrypoints, &b.entrypoints),
            MetricKind::FingerprintLength(section) => match (&a.fingerprint, &b.fingerprint) {
                (Some(fa), Some(fb)) => length_ratio(fa.section(section), fb.section(section)),
                _ => 0.0,
            },
            MetricKind::FingerprintEdit(section) => match (&a.fingerprint, &b.fingerprint) {
                (Some(fa), Some(fb)) => {
                    edit_ratio(fa.section(section), fb.section(section), edit_threshold)
                }
                _ => 0.0,
            },
        };
        self.weight * ratio
    }
}

fn equality<T: PartialEq>(a: &T, b: &T) -> f64 {
    if a == b {
        1.0
    } else {
        0.0
    }
}

/// `2 * matches / (|a| + |b|)` where every element of `a` found in `b`
/// counts, duplicates included. Two empty sets match. Inputs are expected
/// to be duplicate-free, as [`ContractMeta`] keeps them.
pub fn overlap(a: &[String], b: &[String]) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => {
            let matches = a.iter().filter(|x| b.contains(x)).count();
            2.0 * matches as f64 / (a.len() + b.len()) as f64
        }
    }
}

/// `min / max` of the two lengths; two empty fingerprints match.
pub fn length_ratio(a: &str, b: &str) -> f64 {
    let (short, long) = if a.len() <= b.len() {
        (a.len(), b.len())
    } else {
        (b.len(), a.len())
    };
    if long == 0 {
        return 1.0;
    }
    short as f64 / long as f64
}

/// `(threshold - distance) / threshold`, or 0 past the threshold.
pub fn edit_ratio(a: &str, b: &str, threshold: usize) -> f64 {
    let distance = bounded_distance(a, b, threshold);
    if distance > threshold {
        return 0.0;
    }
    if threshold == 0 {
        return 1.0;
    }
    (threshold - distance) as f64 / threshold as f64
}

/// Levenshtein distance that gives up once it exceeds `threshold`, returning
/// `threshold + 1` in that case.
pub fn bounded_distance(a: &str, b: &str, threshold: usize) -> usize {
    let too_far = threshold + 1;
    let (mut short, mut long) = (a.as_bytes(), b.as_bytes());
    if short.len() > long.len() {
        std::mem::swap(&mut short, &mut long);
    }
    if long.len() - short.len() > threshold {
        return too_far;
    }
    if short.is_empty() {
        return long.len();
    }

    let mut row: Vec<usize> = (0..=short.len()).collect();
    for (i, lc) in long.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        let mut row_min = row[0];
        for (j, sc) in short.iter().enumerate() {
            let cost = usize::from(sc != lc);
            let value = (row[j + 1] + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = row[j + 1];
            row[j + 1] = value;
            row_min = row_min.min(value);
        }
        if row_min > threshold {
            return too_far;
        }
    }

    let distance = row[short.len()];
    if distance > threshold {
        too_far
    } else {
        distance
    }
}
