//! Parser of the textual result block printed by solver scripts.
//!
//! The block has the following structure, everything outside of it is ignored:
//!
//! ```text
//! -- [RESULT] --
//! <status key>=<value>        (backend specific keys, a fixed number of lines)
//! cost=<scalar>
//! x=[<v0> <v1> ...]           (machine selection vector)
//! y=[<r0c0> <r0c1>; ...]      (VM x machine placement matrix)
//! s=[<r0c0> <r0c1>; ...]      (VM x machine share matrix)
//! -- [/RESULT] --
//! ```

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::solver::SolverError;

pub const RESULT_BEGIN_MARKER: &str = "-- [RESULT] --";
pub const RESULT_END_MARKER: &str = "-- [/RESULT] --";

/// Solver outcome independent of the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverOutcome {
    Solved,
    SolvedButSuspect,
    Infeasible,
    Unbounded,
    ResourceLimitHit,
    SolverFailure,
    Unknown,
}

impl SolverOutcome {
    /// Returns true if the solver has produced a solution.
    pub fn has_solution(&self) -> bool {
        matches!(self, SolverOutcome::Solved | SolverOutcome::SolvedButSuspect)
    }
}

impl Display for SolverOutcome {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            SolverOutcome::Solved => write!(f, "solved"),
            SolverOutcome::SolvedButSuspect => write!(f, "solved but suspect"),
            SolverOutcome::Infeasible => write!(f, "infeasible"),
            SolverOutcome::Unbounded => write!(f, "unbounded"),
            SolverOutcome::ResourceLimitHit => write!(f, "resource limit hit"),
            SolverOutcome::SolverFailure => write!(f, "solver failure"),
            SolverOutcome::Unknown => write!(f, "unknown"),
        }
    }
}

/// Backend specific part of the result format.
#[derive(Clone, Debug)]
pub struct ResultProtocol {
    /// Keys of status lines.
    pub status_keys: Vec<String>,
    /// Number of status lines which must be read before the status is interpreted.
    pub expected_status_lines: usize,
    /// Maps the status values to outcome.
    pub interpret: fn(&BTreeMap<String, String>) -> SolverOutcome,
}

/// Parsed solver result.
#[derive(Clone, Debug, PartialEq)]
pub struct ProblemResult {
    /// Raw status values reported by the solver.
    pub solver_status: BTreeMap<String, String>,
    pub outcome: SolverOutcome,
    pub cost: f64,
    /// Whether each machine is selected (powered on).
    pub machine_selection: Vec<bool>,
    /// Whether VM (row) is placed on machine (column).
    pub placement: Vec<Vec<bool>>,
    /// CPU share of machine (column) assigned to VM (row).
    pub shares: Vec<Vec<f64>>,
}

impl ProblemResult {
    fn without_solution(solver_status: BTreeMap<String, String>, outcome: SolverOutcome) -> Self {
        Self {
            solver_status,
            outcome,
            cost: f64::NAN,
            machine_selection: Vec::new(),
            placement: Vec::new(),
            shares: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ParserState {
    Skip,
    OutAnalysis,
    Results,
    End,
}

/// Parses solver output.
///
/// Returns a result without solution if the solver status reports no usable solution, and an error if the output
/// does not contain a complete result block.
pub fn parse_result(output: &str, protocol: &ResultProtocol) -> Result<ProblemResult, SolverError> {
    let mut state = ParserState::Skip;
    let mut status = BTreeMap::<String, String>::new();
    let mut outcome = SolverOutcome::Unknown;
    let mut terminated = false;

    let mut cost = None;
    let mut x = None;
    let mut y = None;
    let mut s = None;

    for line in output.lines() {
        let line = line.trim();
        match state {
            ParserState::Skip => {
                if line == RESULT_BEGIN_MARKER {
                    state = ParserState::OutAnalysis;
                }
            }
            ParserState::OutAnalysis => {
                if line.contains(RESULT_END_MARKER) {
                    state = ParserState::End;
                    terminated = true;
                    continue;
                }
                let Some((key, value)) = split_key_value(line) else {
                    continue;
                };
                if protocol.status_keys.iter().any(|k| k == key) && !status.contains_key(key) {
                    status.insert(key.to_string(), value.to_string());
                    if status.len() == protocol.expected_status_lines {
                        outcome = (protocol.interpret)(&status);
                        state = if outcome.has_solution() {
                            ParserState::Results
                        } else {
                            ParserState::End
                        };
                    }
                }
            }
            ParserState::Results => {
                if line.contains(RESULT_END_MARKER) {
                    state = ParserState::End;
                    terminated = true;
                    continue;
                }
                let Some((key, value)) = split_key_value(line) else {
                    continue;
                };
                match key {
                    "cost" => cost = Some(parse_scalar(key, value)?),
                    "x" => x = Some(parse_vector(key, value)?),
                    "y" => y = Some(parse_matrix(key, value)?),
                    "s" => s = Some(parse_matrix(key, value)?),
                    _ => {}
                }
            }
            ParserState::End => break,
        }
    }

    if state == ParserState::Skip {
        return Err(SolverError::Unparsable(format!(
            "result marker {} not found",
            RESULT_BEGIN_MARKER
        )));
    }
    if status.len() < protocol.expected_status_lines {
        return Err(SolverError::Unparsable(format!(
            "expected {} status lines, found {}",
            protocol.expected_status_lines,
            status.len()
        )));
    }
    if !outcome.has_solution() {
        return Ok(ProblemResult::without_solution(status, outcome));
    }
    if !terminated {
        return Err(SolverError::Unparsable(format!(
            "result block is not terminated by {}",
            RESULT_END_MARKER
        )));
    }

    let missing = |key: &str| SolverError::Unparsable(format!("missing {} in result block", key));
    let cost = cost.ok_or_else(|| missing("cost"))?;
    let x = x.ok_or_else(|| missing("x"))?;
    let y = y.ok_or_else(|| missing("y"))?;
    let s = s.ok_or_else(|| missing("s"))?;

    Ok(ProblemResult {
        solver_status: status,
        outcome,
        cost,
        machine_selection: x.into_iter().map(as_flag).collect(),
        placement: y.into_iter().map(|row| row.into_iter().map(as_flag).collect()).collect(),
        shares: s,
    })
}

fn split_key_value(line: &str) -> Option<(&str, &str)> {
    line.split_once('=').map(|(key, value)| (key.trim(), value.trim()))
}

fn as_flag(value: f64) -> bool {
    value > 0.5
}

fn parse_scalar(key: &str, value: &str) -> Result<f64, SolverError> {
    value
        .parse::<f64>()
        .map_err(|_| SolverError::Unparsable(format!("invalid value of {}: {}", key, value)))
}

/// Parses `[v0 v1 ...]`, a single value without brackets is accepted as well.
fn parse_vector(key: &str, value: &str) -> Result<Vec<f64>, SolverError> {
    let inner = strip_brackets(key, value)?;
    parse_row(key, inner)
}

/// Parses `[r0c0 r0c1; r1c0 r1c1]` with rows separated by semicolons.
fn parse_matrix(key: &str, value: &str) -> Result<Vec<Vec<f64>>, SolverError> {
    let inner = strip_brackets(key, value)?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    let rows = inner
        .split(';')
        .filter(|row| !row.trim().is_empty())
        .map(|row| parse_row(key, row))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(first) = rows.first() {
        if rows.iter().any(|row| row.len() != first.len()) {
            return Err(SolverError::Unparsable(format!("rows of {} have different lengths", key)));
        }
    }
    Ok(rows)
}

fn strip_brackets<'a>(key: &str, value: &'a str) -> Result<&'a str, SolverError> {
    match (value.starts_with('['), value.ends_with(']')) {
        (true, true) => Ok(&value[1..value.len() - 1]),
        (false, false) => Ok(value),
        _ => Err(SolverError::Unparsable(format!("unbalanced brackets in {}: {}", key, value))),
    }
}

fn parse_row(key: &str, row: &str) -> Result<Vec<f64>, SolverError> {
    row.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|item| !item.is_empty())
        .map(|item| parse_scalar(key, item))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_rows_are_split_by_semicolons() {
        let matrix = parse_matrix("y", "[1 0 0; 0 1 0;]").unwrap();
        assert_eq!(matrix, vec![vec![1., 0., 0.], vec![0., 1., 0.]]);
    }

    #[test]
    fn ragged_matrix_is_rejected() {
        assert!(parse_matrix("s", "[0.5 0.5; 1]").is_err());
    }

    #[test]
    fn vector_without_brackets() {
        assert_eq!(parse_vector("x", "1").unwrap(), vec![1.]);
        assert!(parse_vector("x", "[1 0").is_err());
    }
}
