//! What drivers print on stdout.
//!
//! *structured*: one JSON document, `{"logs": {level: [msg]}, "result": ..}`.
//!
//! *streamed*: one line at a time. A line is either plain text or a tagged
//! record, `{"record":"log","level":..,"message":..}` or
//! `{"record":"result","result":..}`. Exactly one result record is allowed.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginOutput<T> {
    #[serde(default)]
    pub logs: BTreeMap<String, Vec<String>>,
    pub result: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record")]
#[serde(rename_all = "snake_case")]
pub enum StreamRecord {
    Log { level: String, message: String },
    Result { result: Value },
}

/// Re-emits a driver log line at the matching level.
pub fn emit_log(source: &str, level: &str, message: &str) {
    match level.to_ascii_lowercase().as_str() {
        "error" | "fatal" => error!(source, "{}", message),
        "warn" | "warning" => warn!(source, "{}", message),
        "debug" => debug!(source, "{}", message),
        "trace" => trace!(source, "{}", message),
        _ => info!(source, "{}", message),
    }
}

fn decode<T: DeserializeOwned>(source: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::driver(format!("{source}: unexpected result type: {e}")))
}

/// Parses a structured document and replays its logs.
pub fn parse_structured<T: DeserializeOwned>(source: &str, stdout: &str) -> Result<T> {
    let output: PluginOutput<Value> = serde_json::from_str(stdout.trim())
        .map_err(|e| Error::driver(format!("{source}: malformed structured output: {e}")))?;
    for (level, messages) in &output.logs {
        for message in messages {
            emit_log(source, level, message);
        }
    }
    decode(source, output.result)
}

/// Consumes streamed stdout line by line while the driver runs.
#[derive(Debug)]
pub struct StreamCollector {
    source: String,
    result: Option<Value>,
    extra_results: usize,
}

impl StreamCollector {
    pub fn new<S: Into<String>>(source: S) -> Self {
        Self {
            source: source.into(),
            result: None,
            extra_results: 0,
        }
    }

    pub fn feed(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let source = self.source.as_str();
        match serde_json::from_str::<StreamRecord>(line) {
            Ok(StreamRecord::Log { level, message }) => emit_log(source, &level, &message),
            Ok(StreamRecord::Result { result }) => {
                if self.result.is_some() {
                    self.extra_results += 1;
                } else {
                    self.result = Some(result);
                }
            }
            Err(_) => info!(source, "{}", line),
        }
    }

    pub fn finish<T: DeserializeOwned>(self) -> Result<T> {
        if self.extra_results > 0 {
            return Err(Error::driver(format!(
                "{}: emitted {} result records, expected one",
                self.source,
                self.extra_results + 1
            )));
        }
        let result = self
            .result
            .ok_or_else(|| Error::driver(format!("{}: no result record on stdout", self.source)))?;
        decode(&self.source, result)
    }
}
