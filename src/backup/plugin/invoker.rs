//! Runs drivers as subprocesses.
//!
//! ```text
//! <bin> backup  <name> <json args>
//! <bin> restore <name> <artifact> <json args>
//! ```
//!
//! A non-zero exit status fails the call no matter what stdout holds.

use crate::backup::config::definition::BackupDefinition;
use crate::backup::plugin::output::{parse_structured, StreamCollector};
use crate::backup::plugin::registry::{Driver, OutputMode};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::storage::Tier;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

const STDERR_TAIL: usize = 5;

/// `{"path": <staging>, "Glaciermode": <bool>, "<type>": {...}}`
pub fn driver_args(definition: &BackupDefinition, tier: Tier) -> Value {
    let mut args = Map::new();
    args.insert(
        "path".to_string(),
        Value::String(definition.path.local.to_string_lossy().into_owned()),
    );
    args.insert("Glaciermode".to_string(), Value::Bool(tier.is_glacier()));
    args.insert(
        definition.source.type_name().to_string(),
        definition.source.payload(),
    );
    Value::Object(args)
}

/// Runs the backup verb and returns the raw artifact paths it produced.
pub fn invoke_backup(driver: &Driver, name: &str, args: &Value) -> Result<Vec<PathBuf>> {
    let argv = vec![
        OsString::from("backup"),
        OsString::from(name),
        OsString::from(args.to_string()),
    ];
    let paths: Vec<PathBuf> = run(driver, argv)?;
    info!(
        source = driver.manifest.name.as_str(),
        "Driver produced {} artifact(s) for {}",
        paths.len(),
        name
    );
    Ok(paths)
}

/// Runs the restore verb. A `false` result counts as a failure.
pub fn invoke_restore(driver: &Driver, name: &str, artifact: &Path, args: &Value) -> Result<()> {
    let argv = vec![
        OsString::from("restore"),
        OsString::from(name),
        artifact.as_os_str().to_owned(),
        OsString::from(args.to_string()),
    ];
    if run::<bool>(driver, argv)? {
        info!(source = driver.manifest.name.as_str(), "Restored {} from {:?}", name, artifact);
        Ok(())
    } else {
        Err(Error::driver(format!(
            "{}: restore of {name} from {artifact:?} reported failure",
            driver.manifest.name
        )))
    }
}

enum Captured {
    Document(String),
    Stream(StreamCollector),
}

fn drain_stdout<R: Read>(mode: OutputMode, source: &str, stdout: R) -> std::io::Result<Captured> {
    match mode {
        OutputMode::Structured => {
            let mut document = String::new();
            BufReader::new(stdout).read_to_string(&mut document)?;
            Ok(Captured::Document(document))
        }
        OutputMode::Streamed => {
            let mut collector = StreamCollector::new(source);
            for line in BufReader::new(stdout).lines() {
                collector.feed(&line?);
            }
            Ok(Captured::Stream(collector))
        }
    }
}

fn drain_stderr<R: Read>(source: &str, stderr: R) -> VecDeque<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL);
    for line in BufReader::new(stderr).lines().map_while(std::result::Result::ok) {
        debug!(source, stream = "stderr", "{}", line);
        if tail.len() == STDERR_TAIL {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail
}

fn run<T: DeserializeOwned>(driver: &Driver, argv: Vec<OsString>) -> Result<T> {
    let source = driver.manifest.name.as_str();
    let binary = driver.binary();
    debug!(source, "Running {:?} {:?}", binary, argv.first());

    let mut child = Command::new(&binary)
        .args(&argv)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::driver(format!("{source}: cannot start {binary:?}: {e}")))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::driver(format!("{source}: stdout not captured")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::driver(format!("{source}: stderr not captured")))?;

    let (captured, stderr_tail, status) = std::thread::scope(|s| {
        let out = s.spawn(|| drain_stdout(driver.manifest.output, source, stdout));
        let err = s.spawn(|| drain_stderr(source, stderr));
        let status = child.wait();
        (out.join(), err.join(), status)
    });
    let status = status?;
    let captured = captured.map_err(Error::from_panic)?;
    let stderr_tail = stderr_tail.map_err(Error::from_panic)?;

    if !status.success() {
        let detail = stderr_tail.into_iter().collect::<Vec<_>>().join("\n");
        return Err(Error::driver(format!(
            "{source}: {binary:?} exited with {status}{}{detail}",
            if detail.is_empty() { "" } else { ": " }
        )));
    }

    match captured? {
        Captured::Document(document) => parse_structured(source, &document),
        Captured::Stream(collector) => collector.finish(),
    }
}
