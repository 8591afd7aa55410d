//! Test doubles for the processing pipeline.
//!
//! `FakeTranscoder` stands in for ffmpeg/ffprobe: probes return canned JSON,
//! encodes copy their input to the output path.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{ProcessingError, ProcessingResult};
use crate::transcoder::{CommandOutput, Program, Transcoder};

pub struct FakeTranscoder {
    probe: (u32, u32, Option<f64>),
    fail_on: Vec<String>,
    empty_output_on: Vec<String>,
    calls: Mutex<Vec<(Program, Vec<String>)>>,
}

impl Default for FakeTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTranscoder {
    pub fn new() -> Self {
        Self {
            probe: (1280, 720, Some(10.0)),
            fail_on: Vec::new(),
            empty_output_on: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Dimensions and duration reported by ffprobe.
    pub fn with_probe(mut self, width: u32, height: u32, duration: Option<f64>) -> Self {
        self.probe = (width, height, duration);
        self
    }

    /// Fail any ffmpeg call whose output path contains `pattern`.
    pub fn fail_on(mut self, pattern: &str) -> Self {
        self.fail_on.push(pattern.to_string());
        self
    }

    /// Succeed but leave an empty file for outputs containing `pattern`.
    pub fn empty_output_on(mut self, pattern: &str) -> Self {
        self.empty_output_on.push(pattern.to_string());
        self
    }

    /// Every invocation so far, in order.
    pub fn calls(&self) -> Vec<(Program, Vec<String>)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn probe_json(&self) -> Vec<u8> {
        let (width, height, duration) = self.probe;
        serde_json::json!({
            "streams": [{
                "width": width,
                "height": height,
                "duration": duration.map(|d| format!("{d:.6}")),
            }],
            "format": { "duration": duration.map(|d| d.to_string()) },
        })
        .to_string()
        .into_bytes()
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn execute(
        &self,
        program: Program,
        args: &[String],
        cancel: &CancellationToken,
    ) -> ProcessingResult<CommandOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((program, args.to_vec()));
        }
        if cancel.is_cancelled() {
            return Err(ProcessingError::Cancelled);
        }

        match program {
            Program::Ffprobe => Ok(CommandOutput {
                stdout: self.probe_json(),
                stderr: Vec::new(),
            }),
            Program::Ffmpeg => {
                let output = args.last().cloned().unwrap_or_default();
                if self.fail_on.iter().any(|p| output.contains(p.as_str())) {
                    return Err(ProcessingError::CommandFailed {
                        program,
                        status: "exit status: 1".to_string(),
                        stderr: format!("injected failure for {output}"),
                    });
                }
                if self.empty_output_on.iter().any(|p| output.contains(p.as_str())) {
                    tokio::fs::write(&output, b"").await?;
                    return Ok(CommandOutput::default());
                }

                let input = args
                    .iter()
                    .position(|a| a == "-i")
                    .and_then(|i| args.get(i + 1));
                match input {
                    Some(input) if Path::new(input).exists() => {
                        tokio::fs::copy(input, &output).await?;
                    }
                    _ => tokio::fs::write(&output, b"fake media").await?,
                }
                Ok(CommandOutput::default())
            }
        }
    }
}
