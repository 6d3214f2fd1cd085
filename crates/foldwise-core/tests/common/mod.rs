//! Shared fixtures: small estimators, split builders and an in-memory service.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use foldwise_core::{
    ClassProbabilities, Estimator, FitInput, Flow, ParameterSetting, PredictInput, Predictions,
    RunFilter, RunRecord, RunService, RunSummary, SearchCandidate, SearchResults, ServiceError,
    ServiceResult, SplitAssignment, SplitRole, Splits, Targets, Task, TaskData, TaskKind, Trace,
};
use serde_json::json;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("foldwise_core=debug")
        .try_init();
}

// ---------------------------------------------------------------------------
// Estimators
// ---------------------------------------------------------------------------

/// Predicts the most frequent training class (ties go to the lower index).
#[derive(Debug, Clone, Default)]
pub struct MajorityClassifier {
    pub with_probabilities: bool,
    majority: Option<usize>,
    seen: Vec<usize>,
    train_rows: usize,
    pub report_train_size: bool,
}

impl MajorityClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probabilities() -> Self {
        Self {
            with_probabilities: true,
            ..Self::default()
        }
    }

    pub fn reporting_train_size() -> Self {
        Self {
            report_train_size: true,
            ..Self::default()
        }
    }
}

impl Estimator for MajorityClassifier {
    fn fit(&mut self, input: FitInput<'_>) -> anyhow::Result<()> {
        let FitInput::Supervised {
            y: Targets::Classes(y),
            ..
        } = input
        else {
            bail!("majority classifier needs class targets");
        };
        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for &class in y {
            *counts.entry(class).or_default() += 1;
        }
        let best = counts.values().copied().max().unwrap_or(0);
        self.majority = counts
            .iter()
            .find(|(_, count)| **count == best)
            .map(|(&class, _)| class);
        self.seen = counts.keys().copied().collect();
        self.train_rows = y.len();
        Ok(())
    }

    fn predict(&self, input: PredictInput<'_>) -> anyhow::Result<Predictions> {
        let majority = self.majority.ok_or_else(|| anyhow!("not fitted"))?;
        Ok(Predictions::Classes(vec![majority; input.len()]))
    }

    fn predict_proba(&self, input: PredictInput<'_>) -> anyhow::Result<Option<ClassProbabilities>> {
        if !self.with_probabilities {
            return Ok(None);
        }
        let majority = self.majority.ok_or_else(|| anyhow!("not fitted"))?;
        let row: Vec<f64> = self
            .seen
            .iter()
            .map(|&c| if c == majority { 1.0 } else { 0.0 })
            .collect();
        Ok(Some(ClassProbabilities {
            classes: self.seen.clone(),
            rows: vec![row; input.len()],
        }))
    }

    fn reported_measures(&self) -> BTreeMap<String, f64> {
        if self.report_train_size {
            BTreeMap::from([("train_size".to_string(), self.train_rows as f64)])
        } else {
            BTreeMap::new()
        }
    }
}

/// Predicts the mean training target.
#[derive(Debug, Clone, Default)]
pub struct MeanRegressor {
    mean: Option<f64>,
}

impl Estimator for MeanRegressor {
    fn fit(&mut self, input: FitInput<'_>) -> anyhow::Result<()> {
        let FitInput::Supervised {
            y: Targets::Values(y),
            ..
        } = input
        else {
            bail!("mean regressor needs continuous targets");
        };
        if y.is_empty() {
            bail!("empty training set");
        }
        self.mean = Some(y.iter().sum::<f64>() / y.len() as f64);
        Ok(())
    }

    fn predict(&self, input: PredictInput<'_>) -> anyhow::Result<Predictions> {
        let mean = self.mean.ok_or_else(|| anyhow!("not fitted"))?;
        Ok(Predictions::Values(vec![mean; input.len()]))
    }
}

/// Splits rows into two clusters around the training mean of the first feature.
#[derive(Debug, Clone, Default)]
pub struct ThresholdClusterer {
    threshold: Option<f64>,
}

impl Estimator for ThresholdClusterer {
    fn fit(&mut self, input: FitInput<'_>) -> anyhow::Result<()> {
        let FitInput::Clustering { data, indices } = input else {
            bail!("clusterer expects the full dataset");
        };
        let total: f64 = indices.iter().map(|&i| data[i][0]).sum();
        self.threshold = Some(total / indices.len().max(1) as f64);
        Ok(())
    }

    fn predict(&self, input: PredictInput<'_>) -> anyhow::Result<Predictions> {
        let threshold = self.threshold.ok_or_else(|| anyhow!("not fitted"))?;
        let PredictInput::Clustering { data, indices } = input else {
            bail!("clusterer expects the full dataset");
        };
        Ok(Predictions::Clusters(
            indices
                .iter()
                .map(|&i| i64::from(data[i][0] >= threshold))
                .collect(),
        ))
    }
}

/// Grid search over `k` wrapping a majority classifier.
///
/// Scores peak at `k == 2`, so the search selects the candidate for 2.
#[derive(Debug, Clone)]
pub struct GridSearch {
    pub grid: Vec<i64>,
    inner: MajorityClassifier,
    results: Option<SearchResults>,
}

impl GridSearch {
    pub fn new(grid: Vec<i64>) -> Self {
        Self {
            grid,
            inner: MajorityClassifier::new(),
            results: None,
        }
    }
}

impl Estimator for GridSearch {
    fn fit(&mut self, input: FitInput<'_>) -> anyhow::Result<()> {
        let candidates: Vec<SearchCandidate> = self
            .grid
            .iter()
            .map(|&k| SearchCandidate {
                parameters: BTreeMap::from([("k".to_string(), json!(k))]),
                mean_test_score: 1.0 / (1.0 + (k - 2).abs() as f64),
            })
            .collect();
        let best_index = candidates
            .iter()
            .enumerate()
            .fold(0, |best, (i, c)| {
                if c.mean_test_score > candidates[best].mean_test_score {
                    i
                } else {
                    best
                }
            });
        self.results = Some(SearchResults {
            candidates,
            best_index,
        });
        self.inner.fit(input)
    }

    fn predict(&self, input: PredictInput<'_>) -> anyhow::Result<Predictions> {
        self.inner.predict(input)
    }

    fn is_search(&self) -> bool {
        true
    }

    fn search_results(&self) -> Option<&SearchResults> {
        self.results.as_ref()
    }
}

/// Fails on the `fail_on`-th fit (1-based) across all clones.
#[derive(Debug, Clone)]
pub struct FailingEstimator {
    fits: Arc<AtomicUsize>,
    fail_on: usize,
}

impl FailingEstimator {
    pub fn new(fail_on: usize) -> Self {
        Self {
            fits: Arc::new(AtomicUsize::new(0)),
            fail_on,
        }
    }
}

impl Estimator for FailingEstimator {
    fn fit(&mut self, _input: FitInput<'_>) -> anyhow::Result<()> {
        let n = self.fits.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            bail!("singular matrix");
        }
        Ok(())
    }

    fn predict(&self, input: PredictInput<'_>) -> anyhow::Result<Predictions> {
        Ok(Predictions::Classes(vec![0; input.len()]))
    }
}

// ---------------------------------------------------------------------------
// Tasks and splits
// ---------------------------------------------------------------------------

fn assignment(role: SplitRole, row_id: usize, repeat: u32, fold: u32, sample: u32) -> SplitAssignment {
    SplitAssignment {
        role,
        row_id,
        repeat,
        fold,
        sample,
    }
}

/// Cross-validation splits; repeat `r` shifts rows by `r` before assigning folds.
pub fn kfold(n_rows: usize, folds: u32, repeats: u32) -> Splits {
    let mut assignments = Vec::new();
    for repeat in 0..repeats {
        for fold in 0..folds {
            for row in 0..n_rows {
                let role = if (row + repeat as usize) % folds as usize == fold as usize {
                    SplitRole::Test
                } else {
                    SplitRole::Train
                };
                assignments.push(assignment(role, row, repeat, fold, 0));
            }
        }
    }
    Splits::from_assignments(assignments).expect("valid k-fold splits")
}

/// Learning-curve splits: sample `s` trains on the first `s + 1` training rows of the fold.
pub fn learning_curve(n_rows: usize, folds: u32, samples: u32) -> Splits {
    let mut assignments = Vec::new();
    for fold in 0..folds {
        let (test, train): (Vec<usize>, Vec<usize>) =
            (0..n_rows).partition(|row| row % folds as usize == fold as usize);
        for sample in 0..samples {
            let size = (sample as usize + 1).min(train.len());
            for &row in &train[..size] {
                assignments.push(assignment(SplitRole::Train, row, 0, fold, sample));
            }
            for &row in &test {
                assignments.push(assignment(SplitRole::Test, row, 0, fold, sample));
            }
        }
    }
    Splits::from_assignments(assignments).expect("valid learning-curve splits")
}

pub fn labels() -> Vec<String> {
    vec!["setosa".into(), "versicolor".into(), "virginica".into()]
}

fn class_data(n_rows: usize) -> TaskData {
    TaskData::new(
        (0..n_rows).map(|i| vec![i as f64, (i % 3) as f64]).collect(),
        Targets::Classes((0..n_rows).map(|i| usize::from(i % 4 == 0)).collect()),
    )
}

pub fn classification_task(n_rows: usize, folds: u32, repeats: u32) -> Task {
    Task::new(
        31,
        61,
        TaskKind::Classification {
            class_labels: labels(),
        },
        class_data(n_rows),
        kfold(n_rows, folds, repeats),
    )
    .with_evaluation_measure("predictive_accuracy")
}

pub fn learning_curve_task(n_rows: usize, folds: u32, samples: u32) -> Task {
    Task::new(
        32,
        61,
        TaskKind::LearningCurve {
            class_labels: labels(),
        },
        class_data(n_rows),
        learning_curve(n_rows, folds, samples),
    )
}

pub fn regression_task(n_rows: usize, folds: u32) -> Task {
    Task::new(
        33,
        62,
        TaskKind::Regression,
        TaskData::new(
            (0..n_rows).map(|i| vec![i as f64]).collect(),
            Targets::Values((0..n_rows).map(|i| i as f64 * 2.0).collect()),
        ),
        kfold(n_rows, folds, 1),
    )
}

pub fn clustering_task(n_rows: usize, folds: u32) -> Task {
    Task::new(
        34,
        63,
        TaskKind::Clustering,
        TaskData::new(
            (0..n_rows).map(|i| vec![i as f64]).collect(),
            Targets::None,
        ),
        kfold(n_rows, folds, 1),
    )
}

// ---------------------------------------------------------------------------
// In-memory service
// ---------------------------------------------------------------------------

/// `RunService` backed by maps; listing calls are counted.
#[derive(Default)]
pub struct MemoryService {
    pub flows: BTreeMap<(String, String), i64>,
    pub setups: BTreeMap<i64, i64>,
    pub runs: BTreeMap<i64, RunSummary>,
    pub records: BTreeMap<i64, RunRecord>,
    pub traces: BTreeMap<i64, Trace>,
    pub list_calls: AtomicUsize,
    pub setup_calls: AtomicUsize,
    pub published: Mutex<Vec<RunRecord>>,
    pub published_flows: Mutex<Vec<(Flow, Vec<String>)>>,
}

impl MemoryService {
    pub fn with_flow(mut self, name: &str, version: &str, flow_id: i64) -> Self {
        self.flows
            .insert((name.to_string(), version.to_string()), flow_id);
        self
    }

    pub fn with_setup(mut self, flow_id: i64, setup_id: i64) -> Self {
        self.setups.insert(flow_id, setup_id);
        self
    }

    pub fn with_run(mut self, run_id: i64, task_id: i64, setup_id: i64) -> Self {
        self.runs.insert(
            run_id,
            RunSummary {
                run_id,
                task_id,
                setup_id,
                flow_id: 7,
                uploader: 16,
                upload_time: RunSummary::parse_upload_time("2019-03-14 09:26:53")
                    .expect("valid time"),
                error_message: String::new(),
            },
        );
        self
    }

    pub fn with_trace(mut self, run_id: i64, trace: Trace) -> Self {
        self.traces.insert(run_id, trace);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn setup_calls(&self) -> usize {
        self.setup_calls.load(Ordering::SeqCst)
    }

    pub fn published_flows(&self) -> Vec<(Flow, Vec<String>)> {
        self.published_flows.lock().expect("lock").clone()
    }
}

fn matches(ids: &[i64], value: i64) -> bool {
    ids.is_empty() || ids.contains(&value)
}

#[async_trait]
impl RunService for MemoryService {
    async fn list_runs(&self, filter: &RunFilter) -> ServiceResult<BTreeMap<i64, RunSummary>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let runs: BTreeMap<i64, RunSummary> = self
            .runs
            .iter()
            .filter(|(_, s)| {
                matches(&filter.ids, s.run_id)
                    && matches(&filter.tasks, s.task_id)
                    && matches(&filter.setups, s.setup_id)
                    && matches(&filter.flows, s.flow_id)
                    && matches(&filter.uploaders, s.uploader)
            })
            .map(|(id, s)| (*id, s.clone()))
            .collect();
        if runs.is_empty() {
            return Err(ServiceError::NoResults {
                message: "No results".into(),
            });
        }
        Ok(runs)
    }

    async fn get_run(&self, run_id: i64) -> ServiceResult<RunRecord> {
        self.records
            .get(&run_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound {
                resource: format!("run {}", run_id),
            })
    }

    async fn get_run_trace(&self, run_id: i64) -> ServiceResult<Trace> {
        self.traces
            .get(&run_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound {
                resource: format!("trace of run {}", run_id),
            })
    }

    async fn flow_exists(&self, name: &str, external_version: &str) -> ServiceResult<Option<i64>> {
        Ok(self
            .flows
            .get(&(name.to_string(), external_version.to_string()))
            .copied())
    }

    async fn setup_exists(
        &self,
        flow_id: i64,
        _parameters: &[ParameterSetting],
    ) -> ServiceResult<Option<i64>> {
        self.setup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.setups.get(&flow_id).copied())
    }

    async fn publish_flow(&self, flow: &Flow, tags: &[String]) -> ServiceResult<i64> {
        let mut published = self.published_flows.lock().expect("lock");
        published.push((flow.clone(), tags.to_vec()));
        Ok(500 + published.len() as i64)
    }

    async fn publish_run(&self, run: &RunRecord) -> ServiceResult<i64> {
        let mut published = self.published.lock().expect("lock");
        published.push(run.clone());
        Ok(1000 + published.len() as i64)
    }
}

pub fn run_ids(ids: &[i64]) -> BTreeSet<i64> {
    ids.iter().copied().collect()
}
