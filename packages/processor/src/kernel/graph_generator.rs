//! Graph generator adapter running an external executable.
//!
//! The tool is called as
//! `<bin> --search <name> --json_path <file> [--<option> <value> ...]`
//! and writes its `{nodes, edges, metadata}` document to `json_path`.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::str::FromStr;
use std::time::{Instant, SystemTime};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::traits::{BaseGraphGenerator, GraphWatch, Invocation, WatchUpdate};
use crate::common::{ProcessorError, Result};
use crate::domains::graph_searches::GraphResult;

/// The only provider the processor knows how to drive.
pub const SOCIAL_NETWORKS_GRAPH_GENERATOR: &str = "social-networks-graph-generator";

const OUTPUT_FILE: &str = "graph.json";
const STDERR_FILE: &str = "stderr.log";

/// How an invocation reports its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeneratorMode {
    /// Wait for the tool to exit, then read its output.
    #[default]
    Sync,
    /// Return immediately and let the caller poll the output file.
    Watched,
}

impl FromStr for GeneratorMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(GeneratorMode::Sync),
            "watched" | "watch" => Ok(GeneratorMode::Watched),
            other => Err(format!(
                "invalid graph generator mode {other:?}, expected \"sync\" or \"watched\""
            )),
        }
    }
}

impl std::fmt::Display for GeneratorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneratorMode::Sync => f.write_str("sync"),
            GeneratorMode::Watched => f.write_str("watched"),
        }
    }
}

/// Build the argument list for one invocation.
///
/// Scalar options become `--key value`; `true` becomes a bare `--key`; `false`,
/// `null`, arrays and objects are skipped. `search` and `json_path` cannot be
/// overridden through options.
pub fn command_args(name: &str, json_path: &Path, options: &Value) -> Vec<String> {
    let mut args = vec![
        "--search".to_string(),
        name.to_string(),
        "--json_path".to_string(),
        json_path.display().to_string(),
    ];

    let Some(options) = options.as_object() else {
        return args;
    };

    for (key, value) in options {
        if key == "search" || key == "json_path" {
            continue;
        }
        match value {
            Value::Bool(true) => args.push(format!("--{key}")),
            Value::Number(number) => {
                args.push(format!("--{key}"));
                args.push(number.to_string());
            }
            Value::String(text) => {
                args.push(format!("--{key}"));
                args.push(text.clone());
            }
            Value::Bool(false) | Value::Null | Value::Array(_) | Value::Object(_) => {}
        }
    }

    args
}

fn command_failed(command_line: &str, detail: impl std::fmt::Display) -> ProcessorError {
    ProcessorError::ExternalTool(format!("Command failed: {command_line}\n{detail}"))
}

fn parse_output(bytes: &[u8]) -> std::result::Result<GraphResult, serde_json::Error> {
    serde_json::from_slice(bytes)
}

pub struct CliGraphGenerator {
    provider: String,
    program: PathBuf,
    mode: GeneratorMode,
    version: String,
}

impl CliGraphGenerator {
    /// Create the adapter and ask the tool for its version once.
    pub async fn new(
        provider: impl Into<String>,
        program: impl Into<PathBuf>,
        mode: GeneratorMode,
    ) -> Self {
        let program = program.into();
        let version = match Self::query_version(&program).await {
            Ok(version) => version,
            Err(e) => {
                warn!(program = %program.display(), error = %e, "Could not read graph generator version");
                "unknown".to_string()
            }
        };

        info!(
            program = %program.display(),
            mode = %mode,
            version = %version,
            "Graph generator ready"
        );

        Self {
            provider: provider.into(),
            program,
            mode,
            version,
        }
    }

    async fn query_version(program: &Path) -> Result<String> {
        let output = Command::new(program)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| command_failed(&format!("{} --version", program.display()), e))?;

        if !output.status.success() {
            return Err(command_failed(
                &format!("{} --version", program.display()),
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn scratch_dir() -> Result<TempDir> {
        tempfile::Builder::new()
            .prefix("graph-search-")
            .tempdir()
            .map_err(|e| ProcessorError::ExternalTool(format!("could not create scratch dir: {e}")))
    }

    fn command_line(&self, args: &[String]) -> String {
        format!("{} {}", self.program.display(), args.join(" "))
    }

    async fn run_to_completion(&self, name: &str, options: &Value) -> Result<GraphResult> {
        let scratch = Self::scratch_dir()?;
        let json_path = scratch.path().join(OUTPUT_FILE);
        let args = command_args(name, &json_path, options);
        let command_line = self.command_line(&args);

        debug!(cmd = %command_line, "[CMD] running graph generator");
        let start = Instant::now();

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| command_failed(&command_line, e))?;

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            status = %output.status,
            "[CMD] command completed"
        );

        if !output.status.success() {
            return Err(command_failed(
                &command_line,
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        let bytes = tokio::fs::read(&json_path)
            .await
            .map_err(|e| command_failed(&command_line, format!("missing output: {e}")))?;

        parse_output(&bytes).map_err(|e| command_failed(&command_line, format!("invalid output: {e}")))
    }

    fn spawn_watched(&self, name: &str, options: &Value) -> Result<FileGraphWatch> {
        let scratch = Self::scratch_dir()?;
        let json_path = scratch.path().join(OUTPUT_FILE);
        let stderr_path = scratch.path().join(STDERR_FILE);
        let args = command_args(name, &json_path, options);
        let command_line = self.command_line(&args);

        let stderr = std::fs::File::create(&stderr_path)
            .map_err(|e| command_failed(&command_line, e))?;

        debug!(cmd = %command_line, "[CMD] spawning watched graph generator");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| command_failed(&command_line, e))?;

        Ok(FileGraphWatch {
            command_line,
            json_path,
            stderr_path,
            child: Some(child),
            exit_status: None,
            scratch: Some(scratch),
            last_seen: None,
        })
    }
}

#[async_trait]
impl BaseGraphGenerator for CliGraphGenerator {
    async fn invoke(&self, name: &str, options: &Value) -> Result<Invocation> {
        match self.mode {
            GeneratorMode::Sync => Ok(Invocation::Completed(
                self.run_to_completion(name, options).await?,
            )),
            GeneratorMode::Watched => Ok(Invocation::Watched(Box::new(
                self.spawn_watched(name, options)?,
            ))),
        }
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn provider(&self) -> &str {
        &self.provider
    }
}

// ============================================================================
// Watched invocation
// ============================================================================

/// Polls the output file of a running generator.
pub struct FileGraphWatch {
    command_line: String,
    json_path: PathBuf,
    stderr_path: PathBuf,
    child: Option<Child>,
    exit_status: Option<ExitStatus>,
    scratch: Option<TempDir>,
    /// Modification time and size of the last output handed out.
    last_seen: Option<(SystemTime, u64)>,
}

impl FileGraphWatch {
    async fn read_output(&self) -> Result<(GraphResult, (SystemTime, u64))> {
        let metadata = tokio::fs::metadata(&self.json_path)
            .await
            .map_err(|e| ProcessorError::TransientRead(format!("{}: {e}", self.json_path.display())))?;
        let stamp = (
            metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            metadata.len(),
        );

        let bytes = tokio::fs::read(&self.json_path)
            .await
            .map_err(|e| ProcessorError::TransientRead(format!("{}: {e}", self.json_path.display())))?;
        let result = parse_output(&bytes)
            .map_err(|e| ProcessorError::TransientRead(format!("{}: {e}", self.json_path.display())))?;

        Ok((result, stamp))
    }

    async fn stderr_tail(&self) -> String {
        tokio::fs::read_to_string(&self.stderr_path)
            .await
            .map(|text| text.trim().to_string())
            .unwrap_or_default()
    }

    fn check_exit(&mut self) -> Result<Option<ExitStatus>> {
        if self.exit_status.is_some() {
            return Ok(self.exit_status);
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };
        let status = child
            .try_wait()
            .map_err(|e| command_failed(&self.command_line, e))?;
        if status.is_some() {
            self.exit_status = status;
            self.child = None;
        }
        Ok(status)
    }
}

#[async_trait]
impl GraphWatch for FileGraphWatch {
    async fn poll(&mut self) -> Result<WatchUpdate> {
        match self.check_exit()? {
            Some(status) if !status.success() => {
                let stderr = self.stderr_tail().await;
                Err(command_failed(&self.command_line, stderr))
            }
            Some(_) => match self.read_output().await {
                Ok((result, _)) => Ok(WatchUpdate::Finished(result)),
                Err(e) => Err(command_failed(&self.command_line, format!("unreadable output: {e}"))),
            },
            None => {
                let (result, stamp) = self.read_output().await?;
                if self.last_seen == Some(stamp) {
                    return Ok(WatchUpdate::Pending);
                }
                self.last_seen = Some(stamp);
                Ok(WatchUpdate::Partial(result))
            }
        }
    }

    async fn release(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!(cmd = %self.command_line, error = %e, "Could not stop graph generator");
            }
        }
        if let Some(scratch) = self.scratch.take() {
            if let Err(e) = scratch.close() {
                warn!(error = %e, "Could not remove graph generator scratch dir");
            }
        }
    }
}
