//! Solver backend interface.

use std::path::{Path, PathBuf};

use crate::solver::problem::OptimalPlacementProblem;
use crate::solver::result_parser::ResultProtocol;
use crate::solver::SolverError;

/// Where the solver prints the result block.
#[derive(Clone, Debug, PartialEq)]
pub enum SolverOutput {
    Stdout,
    File(PathBuf),
}

/// Command line of the solver process prepared by the backend.
#[derive(Clone, Debug, PartialEq)]
pub struct SolverInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub output: SolverOutput,
}

/// Mathematical programming system used to solve the optimal placement problem.
///
/// Backend writes the problem data and scripts into the working directory, describes how to run the solver
/// and how to interpret the status lines of its output.
pub trait SolverBackend {
    fn name(&self) -> &str;

    fn prepare(&self, problem: &OptimalPlacementProblem, work_dir: &Path) -> Result<SolverInvocation, SolverError>;

    fn protocol(&self) -> ResultProtocol;
}

/// Returns absolute path of the file, so that it can be referenced from scripts run in another directory.
pub(crate) fn absolute_path(path: &str) -> Result<PathBuf, SolverError> {
    std::fs::canonicalize(path).map_err(|e| SolverError::Io(format!("can't resolve model file {}", path), e))
}

/// Formats the numeric value for solver input files.
pub(crate) fn format_number(value: f64) -> String {
    if value.is_finite() {
        format!("{}", value)
    } else {
        // solvers can't read infinite values, the share is unreachable anyway
        "1e9".to_string()
    }
}
