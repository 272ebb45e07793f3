//! External process runner
//!
//! Spawns the downloader, pushes its stdout through [`ProgressParser`], forwards
//! progress events to an optional [`ProgressSink`] and enforces a hard timeout.
//! There are no retries here; callers decide whether a failure is worth another try.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::core::config;
use crate::download::progress::{ParsedLine, ProgressParser, ProgressSink};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Failures of a single process invocation
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Binary missing, not executable, bad working directory...
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Process exited with a non-zero status
    #[error("{}", failure_message(.code, .stderr))]
    Failed { code: Option<i32>, stderr: String },

    /// Process was still running when the timeout fired and has been killed
    #[error("Process timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },

    /// Reading the pipes or waiting for the process failed
    #[error("Process IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn failure_message(code: &Option<i32>, stderr: &str) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match code {
        Some(code) => format!("process exited with status {}", code),
        None => "process terminated by signal".to_string(),
    }
}

/// How stdout is accumulated while the process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Metadata query: stdout is the payload, never truncated
    InfoQuery,
    /// Long download: only success matters, stdout is capped at `max_output_bytes`
    MonitoredDownload,
}

/// One process to run
#[derive(Debug, Clone)]
pub struct ProcessInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub mode: RunMode,
    pub max_output_bytes: usize,
}

impl ProcessInvocation {
    /// Invocation with the default timeout and output cap, in info-query mode
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
            timeout: config::download::process_timeout(),
            mode: RunMode::InfoQuery,
            max_output_bytes: config::download::MAX_OUTPUT_BYTES,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }

    /// Command line for logs
    pub fn display(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

/// Accumulates non-progress stdout lines, optionally bounded.
#[derive(Debug)]
pub struct OutputBuffer {
    text: String,
    cap: Option<usize>,
    truncated: bool,
}

impl OutputBuffer {
    pub fn unbounded() -> Self {
        Self {
            text: String::new(),
            cap: None,
            truncated: false,
        }
    }

    pub fn capped(cap: usize) -> Self {
        Self {
            text: String::new(),
            cap: Some(cap),
            truncated: false,
        }
    }

    pub fn for_mode(mode: RunMode, cap: usize) -> Self {
        match mode {
            RunMode::InfoQuery => Self::unbounded(),
            RunMode::MonitoredDownload => Self::capped(cap),
        }
    }

    /// Appends a line plus `\n`. Once the cap is hit everything after is dropped.
    pub fn push_line(&mut self, line: &str) {
        if self.truncated {
            return;
        }
        if let Some(cap) = self.cap {
            if self.text.len() + line.len() + 1 > cap {
                self.truncated = true;
                log::debug!("Process output reached {} bytes cap, dropping the rest", cap);
                return;
            }
        }
        self.text.push_str(line);
        self.text.push('\n');
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Runs a process to completion.
///
/// In [`RunMode::MonitoredDownload`] with a `sink`, progress lines are forwarded to
/// it in emission order and left out of the returned output. Otherwise every stdout
/// line is kept, including ones that merely look like progress (a title containing
/// `[download] 100%` inside the metadata JSON, say). Output is collected according
/// to the invocation's [`RunMode`]. Stderr is captured in full
/// and becomes the message of [`ProcessError::Failed`].
///
/// The timeout starts at spawn and is not extended by output activity. When it fires
/// the child is killed and reaped before [`ProcessError::Timeout`] is returned.
pub async fn run(invocation: &ProcessInvocation, sink: Option<&dyn ProgressSink>) -> Result<String, ProcessError> {
    log::debug!("Running: {}", invocation.display());

    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &invocation.working_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: invocation.program.clone(),
        source,
    })?;

    let stdout = child.stdout.take();
    let stderr_task = child.stderr.take().map(|mut stderr| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Err(e) = stderr.read_to_end(&mut buf).await {
                log::debug!("Failed to read process stderr: {}", e);
            }
            String::from_utf8_lossy(&buf).into_owned()
        })
    });

    let mut output = OutputBuffer::for_mode(invocation.mode, invocation.max_output_bytes);

    let work = async {
        if let Some(stdout) = stdout {
            let sink = match invocation.mode {
                RunMode::MonitoredDownload => sink,
                RunMode::InfoQuery => None,
            };
            pump_stdout(stdout, &mut output, sink).await?;
        }
        child.wait().await
    };

    let status = match tokio::time::timeout(invocation.timeout, work).await {
        Ok(result) => result?,
        Err(_) => {
            log::warn!(
                "Process timed out after {}s, killing: {}",
                invocation.timeout.as_secs(),
                invocation.program
            );
            if let Err(e) = child.kill().await {
                log::error!("Failed to kill timed out process: {}", e);
            }
            if let Some(task) = stderr_task {
                task.abort();
            }
            return Err(ProcessError::Timeout {
                after: invocation.timeout,
            });
        }
    };

    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    if status.success() {
        if output.is_truncated() {
            log::debug!("Captured stdout truncated to {} bytes", output.len());
        }
        Ok(output.into_string())
    } else {
        log::warn!(
            "Process exited with {:?}: {}",
            status.code(),
            stderr.chars().take(500).collect::<String>()
        );
        Err(ProcessError::Failed {
            code: status.code(),
            stderr,
        })
    }
}

async fn pump_stdout<R>(
    mut stdout: R,
    output: &mut OutputBuffer,
    sink: Option<&dyn ProgressSink>,
) -> Result<(), std::io::Error>
where
    R: AsyncRead + Unpin,
{
    let mut parser = match sink {
        Some(_) => ProgressParser::new(),
        None => ProgressParser::lines_only(),
    };
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = stdout.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        for line in parser.feed(&chunk[..n]) {
            dispatch(line, output, sink);
        }
    }

    if let Some(line) = parser.finish() {
        dispatch(line, output, sink);
    }

    Ok(())
}

fn dispatch(line: ParsedLine, output: &mut OutputBuffer, sink: Option<&dyn ProgressSink>) {
    match line {
        // only a parser paired with a sink yields progress
        ParsedLine::Progress(event) => {
            if let Some(sink) = sink {
                sink.on_progress(&event);
            }
        }
        ParsedLine::Other(text) => output.push_line(&text),
    }
}
