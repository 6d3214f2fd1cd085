//! Accumulation of per-cell measures into per-fold and per-sample maps.
//!
//! Nothing here averages across repeats, folds or samples. Entries are created
//! on first write; a later cell at the same key replaces the earlier value.

use std::collections::BTreeMap;

/// measure → repeat → fold → value
pub type FoldEvaluations = BTreeMap<String, BTreeMap<u32, BTreeMap<u32, f64>>>;

/// measure → repeat → fold → sample → value
pub type SampleEvaluations = BTreeMap<String, BTreeMap<u32, BTreeMap<u32, BTreeMap<u32, f64>>>>;

/// Both evaluation maps, filled cell by cell during the sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationAggregator {
    per_fold: FoldEvaluations,
    per_sample: SampleEvaluations,
}

impl EvaluationAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every measure of one cell.
    ///
    /// The per-fold entry is overwritten by each sample of the fold, so after a
    /// full sweep it holds the value of the last (largest) sample.
    pub fn record<'a>(
        &mut self,
        repeat: u32,
        fold: u32,
        sample: u32,
        measures: impl IntoIterator<Item = (&'a String, &'a f64)>,
    ) {
        for (name, &value) in measures {
            self.per_fold
                .entry(name.clone())
                .or_default()
                .entry(repeat)
                .or_default()
                .insert(fold, value);
            self.per_sample
                .entry(name.clone())
                .or_default()
                .entry(repeat)
                .or_default()
                .entry(fold)
                .or_default()
                .insert(sample, value);
        }
    }

    pub fn per_fold(&self) -> &FoldEvaluations {
        &self.per_fold
    }

    pub fn per_sample(&self) -> &SampleEvaluations {
        &self.per_sample
    }

    pub fn fold_value(&self, measure: &str, repeat: u32, fold: u32) -> Option<f64> {
        self.per_fold.get(measure)?.get(&repeat)?.get(&fold).copied()
    }

    pub fn sample_value(&self, measure: &str, repeat: u32, fold: u32, sample: u32) -> Option<f64> {
        self.per_sample
            .get(measure)?
            .get(&repeat)?
            .get(&fold)?
            .get(&sample)
            .copied()
    }

    pub fn into_maps(self) -> (FoldEvaluations, SampleEvaluations) {
        (self.per_fold, self.per_sample)
    }
}
