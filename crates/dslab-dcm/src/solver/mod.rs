//! Bridge to external mathematical programming solvers.

pub mod backend;
pub mod backends;
pub mod problem;
pub mod result_parser;
pub mod runner;

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::core::config::{SolverBackendConfig, SolverConfig};
use crate::solver::backend::SolverBackend;
use crate::solver::backends::ampl::AmplBackend;
use crate::solver::backends::gams::GamsBackend;
use crate::solver::backends::neos::NeosProxyBackend;
use crate::solver::problem::OptimalPlacementProblem;
use crate::solver::result_parser::{parse_result, ProblemResult, SolverOutcome};

/// Errors of solver invocation.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("{0}: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("solver did not finish in {0} seconds")]
    Timeout(f64),
    #[error("solver process failed with exit code {code:?}: {stderr}")]
    ProcessFailed { code: Option<i32>, stderr: String },
    #[error("can't parse solver output: {0}")]
    Unparsable(String),
    #[error("solver did not produce usable solution: {0}")]
    NotSolved(SolverOutcome),
    #[error("solver result does not match the problem: {0}")]
    DimensionMismatch(String),
}

/// Runs the configured backend on placement problems.
pub struct Solver {
    backend: Box<dyn SolverBackend>,
    timeout: Option<Duration>,
    status_lines: Option<usize>,
    keep_files: bool,
    accept_suspect: bool,
}

impl Solver {
    pub fn new(backend: Box<dyn SolverBackend>) -> Self {
        Self {
            backend,
            timeout: None,
            status_lines: None,
            keep_files: false,
            accept_suspect: false,
        }
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        let backend: Box<dyn SolverBackend> = match &config.backend {
            SolverBackendConfig::Ampl {
                command,
                args,
                model,
                solver,
            } => Box::new(AmplBackend::new(command, args, model, solver)),
            SolverBackendConfig::Gams {
                command,
                args,
                options,
                model,
                solver,
            } => Box::new(GamsBackend::new(command, args, options, model, solver)),
            SolverBackendConfig::NeosProxy {
                command,
                args,
                model,
                solver,
                category,
                email,
            } => Box::new(NeosProxyBackend::new(
                command,
                args,
                model,
                solver,
                category,
                email.clone(),
            )),
        };
        let mut result = Self::new(backend);
        result.timeout = config.timeout.map(Duration::from_secs_f64);
        result.status_lines = config.status_lines;
        result.keep_files = config.keep_files;
        result.accept_suspect = config.accept_suspect;
        result
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Solves the problem and returns the result with solution matching the problem dimensions.
    pub fn solve(&self, problem: &OptimalPlacementProblem) -> Result<ProblemResult, SolverError> {
        let work_dir = tempfile::Builder::new()
            .prefix("dcm-solver-")
            .tempdir()
            .map_err(|e| SolverError::Io("can't create solver working directory".to_string(), e))?;
        if self.keep_files {
            let path: PathBuf = work_dir.into_path();
            log::info!("solver files are kept in {}", path.display());
            self.solve_in(problem, &path)
        } else {
            self.solve_in(problem, work_dir.path())
        }
    }

    fn solve_in(&self, problem: &OptimalPlacementProblem, work_dir: &Path) -> Result<ProblemResult, SolverError> {
        let invocation = self.backend.prepare(problem, work_dir)?;
        log::debug!(
            "running {} solver: {} {}",
            self.backend.name(),
            invocation.program,
            invocation.args.join(" ")
        );
        let output = runner::run(&invocation, work_dir, self.timeout)?;

        let mut protocol = self.backend.protocol();
        if let Some(lines) = self.status_lines {
            protocol.expected_status_lines = lines;
        }
        let result = parse_result(&output, &protocol)?;
        log::debug!(
            "{} solver finished with status {:?} ({})",
            self.backend.name(),
            result.solver_status,
            result.outcome
        );

        match result.outcome {
            SolverOutcome::Solved => {}
            SolverOutcome::SolvedButSuspect if self.accept_suspect => {
                log::warn!("applying solution reported as suspect by {} solver", self.backend.name());
            }
            outcome => return Err(SolverError::NotSolved(outcome)),
        }
        check_dimensions(problem, &result)?;
        Ok(result)
    }
}

fn check_dimensions(problem: &OptimalPlacementProblem, result: &ProblemResult) -> Result<(), SolverError> {
    let machines = problem.machines.len();
    let vms = problem.vms.len();
    if result.machine_selection.len() != machines {
        return Err(SolverError::DimensionMismatch(format!(
            "x has {} values for {} machines",
            result.machine_selection.len(),
            machines
        )));
    }
    for (name, rows) in [
        ("y", result.placement.iter().map(|r| r.len()).collect::<Vec<_>>()),
        ("s", result.shares.iter().map(|r| r.len()).collect::<Vec<_>>()),
    ] {
        if rows.len() != vms || rows.iter().any(|len| *len != machines) {
            return Err(SolverError::DimensionMismatch(format!(
                "{} is not a {}x{} matrix",
                name, vms, machines
            )));
        }
    }
    Ok(())
}
