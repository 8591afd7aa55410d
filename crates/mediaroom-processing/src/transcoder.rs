//! External transcoder invocation.
//!
//! Processors never spawn ffmpeg directly; they go through [`Transcoder`] so
//! tests can substitute a fake and so every invocation observes cancellation.

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{stderr_tail, ProcessingError, ProcessingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    Ffmpeg,
    Ffprobe,
}

impl Program {
    pub fn as_str(&self) -> &'static str {
        match self {
            Program::Ffmpeg => "ffmpeg",
            Program::Ffprobe => "ffprobe",
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Run `program` with `args` to completion, or until `cancel` fires.
    async fn execute(
        &self,
        program: Program,
        args: &[String],
        cancel: &CancellationToken,
    ) -> ProcessingResult<CommandOutput>;
}

/// Runs the real ffmpeg/ffprobe binaries.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    ffprobe_path: String,
    timeout: Option<Duration>,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            timeout: None,
        }
    }

    /// Per-command deadline. A zero duration disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn from_config(config: &mediaroom_core::ProcessorConfig) -> Self {
        Self::new(config.ffmpeg_path.clone(), config.ffprobe_path.clone())
            .with_timeout(Duration::from_secs(config.command_timeout_secs))
    }

    fn binary(&self, program: Program) -> &str {
        match program {
            Program::Ffmpeg => &self.ffmpeg_path,
            Program::Ffprobe => &self.ffprobe_path,
        }
    }

    /// Run an arbitrary executable with the same cancellation rules.
    pub(crate) async fn run(
        &self,
        program: Program,
        binary: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> ProcessingResult<CommandOutput> {
        let start = std::time::Instant::now();

        // Argument vector only; nothing is interpreted by a shell.
        let child = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessingError::Spawn { program, source })?;

        let deadline = async {
            match self.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            result = child.wait_with_output() => result?,
            _ = cancel.cancelled() => {
                tracing::warn!(program = %program, "Subprocess cancelled");
                return Err(ProcessingError::Cancelled);
            }
            _ = deadline => {
                let timeout = self.timeout.unwrap_or_default();
                tracing::warn!(
                    program = %program,
                    timeout_secs = timeout.as_secs(),
                    "Subprocess timed out"
                );
                return Err(ProcessingError::TimedOut(timeout));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProcessingError::CommandFailed {
                program,
                status: output.status.to_string(),
                stderr: stderr_tail(&stderr),
            });
        }

        tracing::debug!(
            program = %program,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Subprocess completed"
        );

        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    #[tracing::instrument(skip(self, args, cancel), fields(
        process.executable.name = %program,
        process.executable.path = %self.binary(program),
    ))]
    async fn execute(
        &self,
        program: Program,
        args: &[String],
        cancel: &CancellationToken,
    ) -> ProcessingResult<CommandOutput> {
        self.run(program, self.binary(program), args, cancel).await
    }
}
