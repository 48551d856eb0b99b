use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::{Result, SiftError};

use super::CommandSpec;

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Runs a built command to completion.
///
/// Launch failures are reported as [`SiftError::Spawn`]; a non-zero exit is
/// not an error at this level and is reported through [`RunOutput::success`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec, cancel: &CancelToken) -> Result<RunOutput>;
    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec, cancel: &CancelToken) -> Result<RunOutput> {
        cancel.check()?;
        debug!("Running: {}", spec.display());

        let child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SiftError::Spawn {
                program: spec.program_name(),
                source: e,
            })?;

        // Losing the select drops the child, which kills it.
        tokio::select! {
            output = child.wait_with_output() => {
                let output = output?;
                Ok(RunOutput {
                    success: output.status.success(),
                    code: output.status.code(),
                    stdout: output.stdout,
                    stderr: output.stderr,
                })
            }
            err = cancel.cancelled() => {
                warn!("{} interrupted: {}", spec.program_name(), err);
                Err(err)
            }
        }
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

/// Check that a tool is installed by running `<tool> -version`.
pub async fn check_tool(runner: &dyn CommandRunner, program: &Path) -> Result<()> {
    let spec = CommandSpec::new(program).arg("-version");
    let output = runner.run(&spec, &CancelToken::new()).await?;

    if !output.success {
        return Err(SiftError::Config(format!(
            "{} -version exited with {:?}",
            program.display(),
            output.code
        )));
    }

    debug!("{} is available", program.display());
    Ok(())
}
