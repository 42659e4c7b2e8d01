//! Execution of the solver process.

use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::solver::backend::{SolverInvocation, SolverOutput};
use crate::solver::SolverError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs the solver process to completion and returns the text containing its result block.
///
/// Process stdout and stderr are redirected to files in the working directory. If the timeout is set and expires,
/// the process is killed.
pub fn run(invocation: &SolverInvocation, work_dir: &Path, timeout: Option<Duration>) -> Result<String, SolverError> {
    let stdout_path = work_dir.join("solver.out");
    let stderr_path = work_dir.join("solver.err");
    let io_error = |what: String| move |e: std::io::Error| SolverError::Io(what, e);

    let stdout = File::create(&stdout_path).map_err(io_error(format!("can't create {}", stdout_path.display())))?;
    let stderr = File::create(&stderr_path).map_err(io_error(format!("can't create {}", stderr_path.display())))?;

    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .spawn()
        .map_err(io_error(format!("can't start solver {}", invocation.program)))?;

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child
            .try_wait()
            .map_err(io_error("can't wait for solver process".to_string()))?
        {
            break status;
        }
        if let Some(timeout) = timeout {
            if start.elapsed() >= timeout {
                if let Err(e) = child.kill() {
                    log::warn!("can't kill solver process: {}", e);
                }
                if let Err(e) = child.wait() {
                    log::warn!("can't reap killed solver process: {}", e);
                }
                return Err(SolverError::Timeout(timeout.as_secs_f64()));
            }
        }
        thread::sleep(POLL_INTERVAL);
    };

    if !status.success() {
        let stderr = std::fs::read_to_string(&stderr_path).unwrap_or_default();
        return Err(SolverError::ProcessFailed {
            code: status.code(),
            stderr: stderr.trim().to_string(),
        });
    }

    let output_path = match &invocation.output {
        SolverOutput::Stdout => stdout_path,
        SolverOutput::File(path) => path.clone(),
    };
    std::fs::read_to_string(&output_path).map_err(io_error(format!("can't read {}", output_path.display())))
}
