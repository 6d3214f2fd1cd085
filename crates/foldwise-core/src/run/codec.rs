//! Run description document codec.
//!
//! All fields live under a `run` root. Numbers are written as decimal strings
//! and repeated structures are always sequences, even with one element.

use serde_json::{json, Map, Value};

use super::{EvaluationValue, ParameterSetting, RunRecord, DESCRIPTION_OUTPUT, PREDICTIONS_OUTPUT};
use crate::engine::{FoldEvaluations, SampleEvaluations};
use crate::errors::{CodecError, CodecResult};
use crate::task::TaskKind;
use crate::trace::parse_number;

/// How absent fields are treated while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// The document comes from the tracking service: every required field must
    /// be present.
    Strict,
    /// The document was written locally: absent fields decode to `None` or empty.
    Lenient,
}

impl DecodeMode {
    pub fn for_source(authoritative: bool) -> Self {
        if authoritative {
            Self::Strict
        } else {
            Self::Lenient
        }
    }

    pub fn is_strict(self) -> bool {
        matches!(self, Self::Strict)
    }
}

/// Field access on one document object, aware of the decode mode.
struct Fields<'a> {
    object: &'a Map<String, Value>,
    path: String,
    mode: DecodeMode,
}

impl<'a> Fields<'a> {
    fn new(object: &'a Map<String, Value>, path: impl Into<String>, mode: DecodeMode) -> Self {
        Self {
            object,
            path: path.into(),
            mode,
        }
    }

    fn path_of(&self, name: &str) -> String {
        format!("{}.{}", self.path, name)
    }

    /// Explicit nulls count as absent.
    fn get(&self, name: &str) -> Option<&'a Value> {
        self.object.get(name).filter(|v| !v.is_null())
    }

    /// A field that strict documents must carry.
    fn expect(&self, name: &str) -> CodecResult<Option<&'a Value>> {
        match self.get(name) {
            Some(value) => Ok(Some(value)),
            None if self.mode.is_strict() => Err(CodecError::missing(self.path_of(name))),
            None => Ok(None),
        }
    }

    fn required(&self, name: &str) -> CodecResult<&'a Value> {
        self.get(name)
            .ok_or_else(|| CodecError::missing(self.path_of(name)))
    }

    fn int(&self, name: &str) -> CodecResult<Option<i64>> {
        self.expect(name)?
            .map(|v| parse_number(v, &self.path_of(name)))
            .transpose()
    }

    fn required_int(&self, name: &str) -> CodecResult<i64> {
        parse_number(self.required(name)?, &self.path_of(name))
    }

    fn optional_u32(&self, name: &str) -> CodecResult<Option<u32>> {
        self.get(name)
            .map(|v| parse_number(v, &self.path_of(name)))
            .transpose()
    }

    fn string(&self, name: &str) -> CodecResult<Option<String>> {
        self.expect(name)?.map(|v| self.text(name, v)).transpose()
    }

    fn optional_string(&self, name: &str) -> CodecResult<Option<String>> {
        self.get(name).map(|v| self.text(name, v)).transpose()
    }

    fn required_string(&self, name: &str) -> CodecResult<String> {
        self.text(name, self.required(name)?)
    }

    fn text(&self, name: &str, value: &Value) -> CodecResult<String> {
        match value {
            Value::String(text) => Ok(text.clone()),
            Value::Number(number) => Ok(number.to_string()),
            _ => Err(CodecError::malformed(self.path_of(name), "expected a string")),
        }
    }

    fn object(&self, name: &str) -> CodecResult<Option<Fields<'a>>> {
        match self.expect(name)? {
            Some(Value::Object(object)) => Ok(Some(Fields::new(object, self.path_of(name), self.mode))),
            Some(_) => Err(CodecError::malformed(self.path_of(name), "expected an object")),
            None => Ok(None),
        }
    }

    fn sequence(&self, name: &str) -> CodecResult<Option<&'a [Value]>> {
        self.expect(name)?
            .map(|v| self.as_sequence(name, v))
            .transpose()
    }

    fn optional_sequence(&self, name: &str) -> CodecResult<Option<&'a [Value]>> {
        self.get(name).map(|v| self.as_sequence(name, v)).transpose()
    }

    fn as_sequence(&self, name: &str, value: &'a Value) -> CodecResult<&'a [Value]> {
        value
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| CodecError::malformed(self.path_of(name), "expected a sequence"))
    }

    /// Element `index` of sequence `name`, which must be an object.
    fn element(&self, name: &str, index: usize, value: &'a Value) -> CodecResult<Fields<'a>> {
        let path = format!("{}[{}]", self.path_of(name), index);
        match value {
            Value::Object(object) => Ok(Fields::new(object, path, self.mode)),
            _ => Err(CodecError::malformed(path, "expected an object")),
        }
    }
}

fn insert_opt(object: &mut Map<String, Value>, name: &str, value: Option<String>) {
    if let Some(value) = value {
        object.insert(name.to_string(), Value::String(value));
    }
}

impl RunRecord {
    /// Encode the run description.
    ///
    /// Unset identifiers are omitted, except `flow_id`, which is written as an
    /// explicit null for runs whose flow the service does not know yet.
    pub fn to_document(&self) -> Value {
        let mut run = Map::new();
        insert_opt(&mut run, "run_id", self.run_id.map(|v| v.to_string()));
        insert_opt(&mut run, "uploader", self.uploader.map(|v| v.to_string()));
        insert_opt(&mut run, "uploader_name", self.uploader_name.clone());
        run.insert("task_id".into(), Value::String(self.task_id.to_string()));
        insert_opt(&mut run, "task_type", self.task_type.clone());
        insert_opt(
            &mut run,
            "task_evaluation_measure",
            self.task_evaluation_measure.clone(),
        );
        run.insert(
            "flow_id".into(),
            self.flow_id
                .map_or(Value::Null, |id| Value::String(id.to_string())),
        );
        insert_opt(&mut run, "flow_name", self.flow_name.clone());
        insert_opt(&mut run, "setup_id", self.setup_id.map(|v| v.to_string()));
        insert_opt(&mut run, "setup_string", self.setup_string.clone());

        if let Some(settings) = &self.parameter_settings {
            let settings = settings
                .iter()
                .map(|setting| {
                    let mut entry = Map::new();
                    entry.insert("name".into(), Value::String(setting.name.clone()));
                    entry.insert("value".into(), Value::String(setting.value.clone()));
                    insert_opt(&mut entry, "component", setting.component.clone());
                    Value::Object(entry)
                })
                .collect();
            run.insert("parameter_setting".into(), Value::Array(settings));
        }

        if let Some(did) = self.dataset_id {
            run.insert(
                "input_data".into(),
                json!({ "dataset": { "did": did.to_string() } }),
            );
        }

        let mut output = Map::new();
        if !self.output_files.is_empty() {
            let files = self
                .output_files
                .iter()
                .map(|(name, id)| json!({ "name": name, "file_id": id.to_string() }))
                .collect();
            output.insert("file".into(), Value::Array(files));
        }
        let evaluations = encode_evaluations(self);
        if !evaluations.is_empty() {
            output.insert("evaluation".into(), Value::Array(evaluations));
        }
        if !output.is_empty() {
            run.insert("output_data".into(), Value::Object(output));
        }

        if !self.tags.is_empty() {
            run.insert(
                "tag".into(),
                Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
            );
        }

        json!({ "run": run })
    }

    /// Decode a run description.
    ///
    /// The prediction table and trace live in their own documents and are
    /// left unset.
    pub fn from_document(doc: &Value, mode: DecodeMode) -> CodecResult<Self> {
        let root = doc
            .get("run")
            .and_then(Value::as_object)
            .ok_or_else(|| CodecError::missing("run"))?;
        let run = Fields::new(root, "run", mode);

        let parameter_settings = run
            .optional_sequence("parameter_setting")?
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let entry = run.element("parameter_setting", i, item)?;
                        Ok(ParameterSetting {
                            name: entry.required_string("name")?,
                            value: entry.required_string("value")?,
                            component: entry.optional_string("component")?,
                        })
                    })
                    .collect::<CodecResult<Vec<_>>>()
            })
            .transpose()?;

        let dataset_id = match run.object("input_data")? {
            Some(input) => match input.object("dataset")? {
                Some(dataset) => dataset.int("did")?,
                None => None,
            },
            None => None,
        };

        let mut record = RunRecord {
            run_id: run.int("run_id")?,
            uploader: run.int("uploader")?,
            uploader_name: run.string("uploader_name")?,
            task_id: run.required_int("task_id")?,
            task_type: run.string("task_type")?,
            task_evaluation_measure: run.optional_string("task_evaluation_measure")?,
            flow_id: run.int("flow_id")?,
            flow_name: run.string("flow_name")?,
            setup_id: run.int("setup_id")?,
            setup_string: run.string("setup_string")?,
            parameter_settings,
            dataset_id,
            ..RunRecord::default()
        };

        if let Some(output) = run.object("output_data")? {
            for (i, item) in output.sequence("file")?.unwrap_or_default().iter().enumerate() {
                let file = output.element("file", i, item)?;
                record
                    .output_files
                    .insert(file.required_string("name")?, file.required_int("file_id")?);
            }
            for (i, item) in output
                .optional_sequence("evaluation")?
                .unwrap_or_default()
                .iter()
                .enumerate()
            {
                decode_evaluation(&output.element("evaluation", i, item)?, &mut record)?;
            }
        }

        if mode.is_strict() {
            check_remote_files(&record)?;
        }

        record.tags = run
            .optional_sequence("tag")?
            .unwrap_or_default()
            .iter()
            .map(|tag| run.text("tag", tag))
            .collect::<CodecResult<_>>()?;

        Ok(record)
    }

    pub fn to_json_string(&self) -> CodecResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    pub fn from_json_str(text: &str, mode: DecodeMode) -> CodecResult<Self> {
        let doc: Value = serde_json::from_str(text)?;
        Self::from_document(&doc, mode)
    }
}

/// A run stored on the service always has its description and predictions files.
fn check_remote_files(record: &RunRecord) -> CodecResult<()> {
    if !record.output_files.contains_key(DESCRIPTION_OUTPUT) {
        return Err(CodecError::missing("run.output_data.file[description]"));
    }
    if !record.output_files.contains_key(PREDICTIONS_OUTPUT) {
        if record.task_type.as_deref() == Some(TaskKind::SUBGROUP_DISCOVERY) {
            return Err(CodecError::UnsupportedTaskType {
                task_type: TaskKind::SUBGROUP_DISCOVERY.to_string(),
            });
        }
        return Err(CodecError::missing("run.output_data.file[predictions]"));
    }
    Ok(())
}

fn encode_evaluations(run: &RunRecord) -> Vec<Value> {
    let mut entries = Vec::new();
    for (name, value) in &run.evaluations {
        entries.push(match value {
            EvaluationValue::Value(v) => json!({ "name": name, "value": v.to_string() }),
            EvaluationValue::ArrayData(data) => json!({ "name": name, "array_data": data }),
        });
    }
    for (name, repeats) in &run.fold_evaluations {
        for (repeat, folds) in repeats {
            for (fold, value) in folds {
                entries.push(json!({
                    "name": name,
                    "repeat": repeat.to_string(),
                    "fold": fold.to_string(),
                    "value": value.to_string(),
                }));
            }
        }
    }
    for (name, repeats) in &run.sample_evaluations {
        for (repeat, folds) in repeats {
            for (fold, samples) in folds {
                for (sample, value) in samples {
                    entries.push(json!({
                        "name": name,
                        "repeat": repeat.to_string(),
                        "fold": fold.to_string(),
                        "sample": sample.to_string(),
                        "value": value.to_string(),
                    }));
                }
            }
        }
    }
    entries
}

/// Route one evaluation entry to the run-level, per-fold or per-sample map.
fn decode_evaluation(entry: &Fields<'_>, record: &mut RunRecord) -> CodecResult<()> {
    let name = entry.required_string("name")?;
    let repeat = entry.optional_u32("repeat")?;
    let fold = entry.optional_u32("fold")?;
    let sample = entry.optional_u32("sample")?;

    match (repeat, fold, sample) {
        (Some(repeat), Some(fold), Some(sample)) => {
            let value = scalar(entry)?;
            insert_sample(&mut record.sample_evaluations, name, repeat, fold, sample, value);
        }
        (Some(repeat), Some(fold), None) => {
            let value = scalar(entry)?;
            insert_fold(&mut record.fold_evaluations, name, repeat, fold, value);
        }
        _ => {
            let value = match entry.get("value") {
                Some(v) => EvaluationValue::Value(parse_number(v, &entry.path_of("value"))?),
                None => EvaluationValue::ArrayData(entry.required_string("array_data")?),
            };
            record.evaluations.insert(name, value);
        }
    }
    Ok(())
}

/// Per-fold and per-sample entries hold a number, never an array payload.
fn scalar(entry: &Fields<'_>) -> CodecResult<f64> {
    if entry.get("value").is_none() && entry.get("array_data").is_some() {
        return Err(CodecError::malformed(
            entry.path_of("array_data"),
            "per-fold and per-sample evaluations must carry a scalar value",
        ));
    }
    parse_number(entry.required("value")?, &entry.path_of("value"))
}

fn insert_fold(map: &mut FoldEvaluations, name: String, repeat: u32, fold: u32, value: f64) {
    map.entry(name)
        .or_default()
        .entry(repeat)
        .or_default()
        .insert(fold, value);
}

fn insert_sample(
    map: &mut SampleEvaluations,
    name: String,
    repeat: u32,
    fold: u32,
    sample: u32,
    value: f64,
) {
    map.entry(name)
        .or_default()
        .entry(repeat)
        .or_default()
        .entry(fold)
        .or_default()
        .insert(sample, value);
}
