//! Local run directories.
//!
//! A stored run is a directory holding the description, the prediction table
//! and, for search estimators, the trace, each as a JSON document.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use super::{DecodeMode, PredictionTable, RunRecord};
use crate::errors::{CodecError, CodecResult, RunResult};
use crate::trace::Trace;

pub const DESCRIPTION_FILE: &str = "description.json";
pub const PREDICTIONS_FILE: &str = "predictions.json";
pub const TRACE_FILE: &str = "trace.json";

/// Reads and writes run directories.
pub struct RunStore;

impl RunStore {
    /// Write `run` into `dir`, creating the directory if needed.
    pub fn save(dir: &Path, run: &RunRecord) -> CodecResult<()> {
        fs::create_dir_all(dir).map_err(|source| CodecError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        write_document(&dir.join(DESCRIPTION_FILE), &run.to_document())?;
        if let Some(predictions) = &run.predictions {
            write_document(&dir.join(PREDICTIONS_FILE), &predictions.to_document()?)?;
        }
        if let Some(trace) = &run.trace {
            write_document(&dir.join(TRACE_FILE), &trace.to_document()?)?;
        }
        debug!(dir = %dir.display(), task_id = run.task_id, "run saved");
        Ok(())
    }

    /// Read a run directory written by [`RunStore::save`].
    ///
    /// The description is decoded leniently; absent prediction or trace files
    /// leave the corresponding field unset.
    pub fn load(dir: &Path) -> RunResult<RunRecord> {
        let description = read_document(&dir.join(DESCRIPTION_FILE))?
            .ok_or_else(|| CodecError::Io {
                path: dir.join(DESCRIPTION_FILE),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no run description"),
            })?;
        let mut run = RunRecord::from_document(&description, DecodeMode::Lenient)?;

        if let Some(doc) = read_document(&dir.join(PREDICTIONS_FILE))? {
            run.predictions = Some(PredictionTable::from_document(&doc)?);
        }
        if let Some(doc) = read_document(&dir.join(TRACE_FILE))? {
            run.trace = Some(Trace::from_document(&doc)?);
        }
        Ok(run)
    }
}

fn write_document(path: &Path, doc: &Value) -> CodecResult<()> {
    let text = serde_json::to_string_pretty(doc)?;
    fs::write(path, text).map_err(|source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_document(path: &Path) -> CodecResult<Option<Value>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(CodecError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
