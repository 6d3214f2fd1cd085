//! Prediction table document.
//!
//! `{ "predictions": { "attributes": [[name, type], ...], "data": [[...], ...] } }`
//! with every cell written as a string. The row shape is recovered from the
//! attribute header on decode.

use serde_json::{json, Value};

use crate::engine::{PredictionLayout, PredictionRow};
use crate::errors::{CodecError, CodecResult};
use crate::trace::parse_number;

const NUMERIC: &str = "NUMERIC";
const CONFIDENCE_PREFIX: &str = "confidence.";

const CLASSIFICATION_LEAD: [&str; 4] = ["repeat", "fold", "sample", "row_id"];
const REGRESSION_HEADER: [&str; 5] = ["repeat", "fold", "row_id", "prediction", "truth"];
const CLUSTERING_HEADER: [&str; 2] = ["row_id", "cluster"];

/// Prediction rows of a run together with their column layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionTable {
    pub layout: PredictionLayout,
    pub rows: Vec<PredictionRow>,
}

impl PredictionTable {
    pub fn new(layout: PredictionLayout, rows: Vec<PredictionRow>) -> Self {
        Self { layout, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names and types, in row order.
    pub fn attributes(&self) -> Vec<(String, Value)> {
        let numeric = |name: &str| (name.to_string(), json!(NUMERIC));
        match &self.layout {
            PredictionLayout::Classification { class_labels } => {
                let mut columns: Vec<_> = CLASSIFICATION_LEAD.into_iter().map(numeric).collect();
                columns.extend(
                    class_labels
                        .iter()
                        .map(|label| numeric(&format!("{}{}", CONFIDENCE_PREFIX, label))),
                );
                columns.push(("prediction".into(), json!(class_labels)));
                columns.push(("correct".into(), json!(class_labels)));
                columns
            }
            PredictionLayout::Regression => REGRESSION_HEADER.into_iter().map(numeric).collect(),
            PredictionLayout::Clustering => CLUSTERING_HEADER.into_iter().map(numeric).collect(),
        }
    }

    pub fn to_document(&self) -> CodecResult<Value> {
        let data = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| self.encode_row(i, row))
            .collect::<CodecResult<Vec<_>>>()?;
        let attributes: Vec<Value> = self
            .attributes()
            .into_iter()
            .map(|(name, kind)| json!([name, kind]))
            .collect();
        Ok(json!({ "predictions": { "attributes": attributes, "data": data } }))
    }

    fn encode_row(&self, index: usize, row: &PredictionRow) -> CodecResult<Value> {
        let cells: Vec<String> = match (&self.layout, row) {
            (
                PredictionLayout::Classification { class_labels },
                PredictionRow::Classification {
                    repeat,
                    fold,
                    sample,
                    row_index,
                    probabilities,
                    predicted,
                    truth,
                },
            ) => {
                if probabilities.len() != class_labels.len() {
                    return Err(CodecError::malformed(
                        format!("predictions.data[{}]", index),
                        format!(
                            "{} probabilities for {} class labels",
                            probabilities.len(),
                            class_labels.len()
                        ),
                    ));
                }
                let mut cells = vec![
                    repeat.to_string(),
                    fold.to_string(),
                    sample.to_string(),
                    row_index.to_string(),
                ];
                cells.extend(probabilities.iter().map(f64::to_string));
                cells.push(predicted.clone());
                cells.push(truth.clone());
                cells
            }
            (
                PredictionLayout::Regression,
                PredictionRow::Regression {
                    repeat,
                    fold,
                    row_id,
                    prediction,
                    truth,
                },
            ) => vec![
                repeat.to_string(),
                fold.to_string(),
                row_id.to_string(),
                prediction.to_string(),
                truth.to_string(),
            ],
            (PredictionLayout::Clustering, PredictionRow::Clustering { row_id, cluster }) => {
                vec![row_id.to_string(), cluster.to_string()]
            }
            _ => {
                return Err(CodecError::malformed(
                    format!("predictions.data[{}]", index),
                    "row shape does not match the table layout",
                ))
            }
        };
        Ok(json!(cells))
    }

    pub fn from_document(doc: &Value) -> CodecResult<Self> {
        let table = doc
            .get("predictions")
            .ok_or_else(|| CodecError::missing("predictions"))?;
        let attributes = table
            .get("attributes")
            .ok_or_else(|| CodecError::missing("predictions.attributes"))?
            .as_array()
            .ok_or_else(|| CodecError::malformed("predictions.attributes", "expected a sequence"))?;
        let names = attributes
            .iter()
            .map(|attr| {
                attr.get(0).and_then(Value::as_str).ok_or_else(|| {
                    CodecError::malformed("predictions.attributes", "expected [name, type] pairs")
                })
            })
            .collect::<CodecResult<Vec<_>>>()?;
        let layout = infer_layout(&names)?;

        let data = table
            .get("data")
            .ok_or_else(|| CodecError::missing("predictions.data"))?
            .as_array()
            .ok_or_else(|| CodecError::malformed("predictions.data", "expected a sequence"))?;
        let rows = data
            .iter()
            .enumerate()
            .map(|(i, row)| decode_row(&layout, names.len(), i, row))
            .collect::<CodecResult<Vec<_>>>()?;

        Ok(Self { layout, rows })
    }
}

fn infer_layout(names: &[&str]) -> CodecResult<PredictionLayout> {
    if names == CLUSTERING_HEADER {
        return Ok(PredictionLayout::Clustering);
    }
    if names == REGRESSION_HEADER {
        return Ok(PredictionLayout::Regression);
    }
    if names.len() >= CLASSIFICATION_LEAD.len() + 2
        && names[..CLASSIFICATION_LEAD.len()] == CLASSIFICATION_LEAD
        && names[names.len() - 2..] == ["prediction", "correct"]
    {
        let class_labels = names[CLASSIFICATION_LEAD.len()..names.len() - 2]
            .iter()
            .map(|name| {
                name.strip_prefix(CONFIDENCE_PREFIX)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        CodecError::malformed(
                            "predictions.attributes",
                            format!("unexpected column {:?}", name),
                        )
                    })
            })
            .collect::<CodecResult<Vec<_>>>()?;
        return Ok(PredictionLayout::Classification { class_labels });
    }
    Err(CodecError::malformed(
        "predictions.attributes",
        format!("unrecognized header {:?}", names),
    ))
}

fn decode_row(
    layout: &PredictionLayout,
    width: usize,
    index: usize,
    row: &Value,
) -> CodecResult<PredictionRow> {
    let field = format!("predictions.data[{}]", index);
    let cells = row
        .as_array()
        .ok_or_else(|| CodecError::malformed(&field, "expected a sequence"))?;
    if cells.len() != width {
        return Err(CodecError::malformed(
            &field,
            format!("{} cells for {} columns", cells.len(), width),
        ));
    }
    let text = |i: usize| {
        cells[i]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CodecError::malformed(&field, format!("column {} is not a string", i)))
    };

    Ok(match layout {
        PredictionLayout::Classification { class_labels } => {
            let n = class_labels.len();
            let probabilities = cells[4..4 + n]
                .iter()
                .map(|cell| parse_number(cell, &field))
                .collect::<CodecResult<Vec<f64>>>()?;
            PredictionRow::Classification {
                repeat: parse_number(&cells[0], &field)?,
                fold: parse_number(&cells[1], &field)?,
                sample: parse_number(&cells[2], &field)?,
                row_index: parse_number(&cells[3], &field)?,
                probabilities,
                predicted: text(4 + n)?,
                truth: text(5 + n)?,
            }
        }
        PredictionLayout::Regression => PredictionRow::Regression {
            repeat: parse_number(&cells[0], &field)?,
            fold: parse_number(&cells[1], &field)?,
            row_id: parse_number(&cells[2], &field)?,
            prediction: parse_number(&cells[3], &field)?,
            truth: parse_number(&cells[4], &field)?,
        },
        PredictionLayout::Clustering => PredictionRow::Clustering {
            row_id: parse_number(&cells[0], &field)?,
            cluster: parse_number(&cells[1], &field)?,
        },
    })
}
