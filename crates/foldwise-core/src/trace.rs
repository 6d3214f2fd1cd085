//! Optimization traces of hyperparameter-search estimators.
//!
//! A trace holds one [`TraceIteration`] per candidate configuration per
//! (repeat, fold). Exactly one iteration per (repeat, fold) is flagged as
//! selected by the search.
//!
//! [`Trace::selected_iteration`] re-derives the best iteration independently of
//! that flag: the maximal evaluation wins, ties go to the lowest iteration
//! index, NaN evaluations never win. This is the rule used to reconstruct a
//! historical configuration when replaying a run.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::{CodecError, CodecResult, RunError, RunResult};
use crate::model::SearchResults;

/// One evaluated configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceIteration {
    pub repeat: u32,
    pub fold: u32,
    pub iteration: u32,
    pub evaluation: f64,
    pub selected: bool,
    pub parameters: BTreeMap<String, Value>,
}

/// Extract one iteration per search candidate for a single fold.
pub fn extract_trace_iterations(
    results: &SearchResults,
    repeat: u32,
    fold: u32,
) -> Vec<TraceIteration> {
    results
        .candidates
        .iter()
        .enumerate()
        .map(|(i, candidate)| TraceIteration {
            repeat,
            fold,
            iteration: i as u32,
            evaluation: candidate.mean_test_score,
            selected: i == results.best_index,
            parameters: candidate.parameters.clone(),
        })
        .collect()
}

/// A validated optimization trace.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trace {
    pub run_id: Option<i64>,
    iterations: BTreeMap<(u32, u32, u32), TraceIteration>,
}

impl Trace {
    /// Build a trace, keyed by (repeat, fold, iteration).
    ///
    /// A later iteration with the same key replaces an earlier one. Fails with
    /// `InvalidTrace` unless every (repeat, fold) has exactly one selected
    /// iteration.
    pub fn new(
        run_id: Option<i64>,
        iterations: impl IntoIterator<Item = TraceIteration>,
    ) -> RunResult<Self> {
        let iterations: BTreeMap<_, _> = iterations
            .into_iter()
            .map(|it| ((it.repeat, it.fold, it.iteration), it))
            .collect();

        let mut selected: BTreeMap<(u32, u32), usize> = BTreeMap::new();
        for it in iterations.values() {
            let count = selected.entry((it.repeat, it.fold)).or_insert(0);
            if it.selected {
                *count += 1;
            }
        }
        for ((repeat, fold), count) in selected {
            if count != 1 {
                return Err(RunError::invalid_trace(format!(
                    "repeat {}, fold {} has {} selected iterations, expected exactly one",
                    repeat, fold, count
                )));
            }
        }

        Ok(Self { run_id, iterations })
    }

    /// Build a trace from accumulated rows, checking them against the
    /// parameter names of a fitted search estimator.
    pub fn from_search(
        parameter_names: &BTreeSet<String>,
        iterations: impl IntoIterator<Item = TraceIteration>,
    ) -> RunResult<Self> {
        let trace = Self::new(None, iterations)?;
        for it in trace.iterations.values() {
            if !it.parameters.keys().eq(parameter_names.iter()) {
                return Err(RunError::invalid_trace(format!(
                    "iteration ({}, {}, {}) has parameters {:?}, expected {:?}",
                    it.repeat,
                    it.fold,
                    it.iteration,
                    it.parameters.keys().collect::<Vec<_>>(),
                    parameter_names
                )));
            }
        }
        Ok(trace)
    }

    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }

    /// Iterations in (repeat, fold, iteration) order.
    pub fn iterations(&self) -> impl Iterator<Item = &TraceIteration> {
        self.iterations.values()
    }

    pub fn get(&self, repeat: u32, fold: u32, iteration: u32) -> Option<&TraceIteration> {
        self.iterations.get(&(repeat, fold, iteration))
    }

    /// Iteration the search itself flagged as selected.
    pub fn flagged_iteration(&self, repeat: u32, fold: u32) -> Option<&TraceIteration> {
        self.fold_iterations(repeat, fold).find(|it| it.selected)
    }

    /// Best iteration for (repeat, fold) by evaluation; ties go to the lowest index.
    pub fn selected_iteration(&self, repeat: u32, fold: u32) -> RunResult<u32> {
        let mut best: Option<&TraceIteration> = None;
        for it in self.fold_iterations(repeat, fold) {
            if it.evaluation.is_nan() {
                continue;
            }
            // Iterations arrive in ascending index order, so strict > keeps the first maximum.
            if best.map_or(true, |b| it.evaluation > b.evaluation) {
                best = Some(it);
            }
        }
        best.map(|it| it.iteration)
            .ok_or(RunError::TraceIterationNotFound {
                repeat,
                fold,
                iteration: None,
            })
    }

    fn fold_iterations(&self, repeat: u32, fold: u32) -> impl Iterator<Item = &TraceIteration> {
        self.iterations
            .range((repeat, fold, 0)..=(repeat, fold, u32::MAX))
            .map(|(_, it)| it)
    }

    /// Encode as a trace document.
    pub fn to_document(&self) -> CodecResult<Value> {
        let iterations = self
            .iterations
            .values()
            .map(|it| {
                Ok(json!({
                    "repeat": it.repeat.to_string(),
                    "fold": it.fold.to_string(),
                    "iteration": it.iteration.to_string(),
                    "setup_string": serde_json::to_string(&it.parameters)?,
                    "evaluation": it.evaluation.to_string(),
                    "selected": it.selected.to_string(),
                }))
            })
            .collect::<CodecResult<Vec<_>>>()?;

        let mut trace = Map::new();
        if let Some(run_id) = self.run_id {
            trace.insert("run_id".into(), Value::String(run_id.to_string()));
        }
        trace.insert("trace_iteration".into(), Value::Array(iterations));
        Ok(json!({ "trace": trace }))
    }

    /// Decode a trace document.
    pub fn from_document(doc: &Value) -> RunResult<Self> {
        let trace = doc
            .get("trace")
            .and_then(Value::as_object)
            .ok_or_else(|| CodecError::missing("trace"))?;
        let run_id = match trace.get("run_id") {
            Some(v) => Some(parse_number::<i64>(v, "trace.run_id")?),
            None => None,
        };
        let rows = match trace.get("trace_iteration") {
            Some(Value::Array(rows)) => rows,
            Some(_) => {
                return Err(
                    CodecError::malformed("trace.trace_iteration", "expected a sequence").into(),
                )
            }
            None => return Err(CodecError::missing("trace.trace_iteration").into()),
        };

        let iterations = rows
            .iter()
            .map(decode_iteration)
            .collect::<CodecResult<Vec<_>>>()?;
        Self::new(run_id, iterations)
    }
}

fn decode_iteration(row: &Value) -> CodecResult<TraceIteration> {
    let field = |name: &str| {
        row.get(name)
            .ok_or_else(|| CodecError::missing(format!("trace_iteration.{}", name)))
    };
    let setup_string = field("setup_string")?
        .as_str()
        .ok_or_else(|| CodecError::malformed("trace_iteration.setup_string", "expected a string"))?;
    let parameters: BTreeMap<String, Value> = serde_json::from_str(setup_string)
        .map_err(|e| CodecError::malformed("trace_iteration.setup_string", e.to_string()))?;
    let selected = match field("selected")?.as_str() {
        Some("true") => true,
        Some("false") => false,
        _ => {
            return Err(CodecError::malformed(
                "trace_iteration.selected",
                "expected \"true\" or \"false\"",
            ))
        }
    };

    Ok(TraceIteration {
        repeat: parse_number(field("repeat")?, "trace_iteration.repeat")?,
        fold: parse_number(field("fold")?, "trace_iteration.fold")?,
        iteration: parse_number(field("iteration")?, "trace_iteration.iteration")?,
        evaluation: parse_number(field("evaluation")?, "trace_iteration.evaluation")?,
        selected,
        parameters,
    })
}

/// Parse a numeric field written as a decimal string. Bare JSON numbers are
/// accepted as well.
pub(crate) fn parse_number<T>(value: &Value, field: &str) -> CodecResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return Err(CodecError::malformed(field, "expected a decimal string")),
    };
    text.parse()
        .map_err(|e: T::Err| CodecError::malformed(field, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SearchCandidate;

    fn iteration(fold: u32, iteration: u32, evaluation: f64, selected: bool) -> TraceIteration {
        TraceIteration {
            repeat: 0,
            fold,
            iteration,
            evaluation,
            selected,
            parameters: BTreeMap::from([("max_depth".to_string(), json!(iteration + 1))]),
        }
    }

    #[test]
    fn selection_prefers_first_maximum() {
        let trace = Trace::new(
            None,
            vec![
                iteration(0, 0, 0.7, false),
                iteration(0, 1, 0.9, true),
                iteration(0, 2, 0.9, false),
                iteration(0, 3, 0.5, false),
            ],
        )
        .unwrap();
        assert_eq!(trace.selected_iteration(0, 0).unwrap(), 1);
    }

    #[test]
    fn selection_ignores_the_search_flag() {
        let trace = Trace::new(
            None,
            vec![iteration(0, 0, 0.4, true), iteration(0, 1, 0.6, false)],
        )
        .unwrap();
        assert_eq!(trace.selected_iteration(0, 0).unwrap(), 1);
        assert_eq!(trace.flagged_iteration(0, 0).unwrap().iteration, 0);
    }

    #[test]
    fn selection_skips_nan_and_reports_missing_fold() {
        let trace = Trace::new(
            None,
            vec![iteration(0, 0, f64::NAN, false), iteration(0, 1, 0.1, true)],
        )
        .unwrap();
        assert_eq!(trace.selected_iteration(0, 0).unwrap(), 1);
        assert!(matches!(
            trace.selected_iteration(0, 5),
            Err(RunError::TraceIterationNotFound { fold: 5, .. })
        ));
    }

    #[test]
    fn rejects_folds_without_exactly_one_selection() {
        let none = Trace::new(None, vec![iteration(0, 0, 0.3, false)]);
        assert!(matches!(none, Err(RunError::InvalidTrace { .. })));
        let two = Trace::new(
            None,
            vec![iteration(0, 0, 0.3, true), iteration(0, 1, 0.3, true)],
        );
        assert!(matches!(two, Err(RunError::InvalidTrace { .. })));
    }

    #[test]
    fn extraction_flags_the_search_choice() {
        let results = SearchResults {
            candidates: (0..3)
                .map(|i| SearchCandidate {
                    parameters: BTreeMap::from([("alpha".to_string(), json!(i))]),
                    mean_test_score: f64::from(i) / 10.0,
                })
                .collect(),
            best_index: 2,
        };
        let rows = extract_trace_iterations(&results, 1, 4);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.repeat == 1 && r.fold == 4));
        assert_eq!(
            rows.iter().filter(|r| r.selected).map(|r| r.iteration).collect::<Vec<_>>(),
            vec![2]
        );
    }

    #[test]
    fn from_search_checks_parameter_names() {
        let names = BTreeSet::from(["min_samples_leaf".to_string()]);
        let err = Trace::from_search(&names, vec![iteration(0, 0, 0.5, true)]).unwrap_err();
        assert!(matches!(err, RunError::InvalidTrace { .. }));
    }

    #[test]
    fn document_uses_decimal_strings() {
        let trace = Trace::new(Some(12), vec![iteration(0, 0, 0.25, true)]).unwrap();
        let doc = trace.to_document().unwrap();
        let row = &doc["trace"]["trace_iteration"][0];
        assert_eq!(row["evaluation"], "0.25");
        assert_eq!(row["selected"], "true");
        assert_eq!(row["setup_string"], r#"{"max_depth":1}"#);
        assert_eq!(Trace::from_document(&doc).unwrap(), trace);
    }

    #[test]
    fn document_requires_iteration_sequence() {
        let doc = json!({"trace": {"trace_iteration": {"repeat": "0"}}});
        assert!(matches!(
            Trace::from_document(&doc),
            Err(RunError::Codec(CodecError::MalformedField { .. }))
        ));
    }
}
