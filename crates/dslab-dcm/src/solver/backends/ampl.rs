//! AMPL backend.

use std::collections::BTreeMap;
use std::path::Path;

use crate::core::common::ResourceCategory;
use crate::solver::backend::{absolute_path, format_number, SolverBackend, SolverInvocation, SolverOutput};
use crate::solver::problem::OptimalPlacementProblem;
use crate::solver::result_parser::{ResultProtocol, SolverOutcome, RESULT_BEGIN_MARKER, RESULT_END_MARKER};
use crate::solver::SolverError;

pub const DATA_FILE: &str = "vm_placement.dat";
pub const RUN_FILE: &str = "vm_placement.run";

/// Runs AMPL with a generated run script, which solves the model and prints the result block to stdout.
pub struct AmplBackend {
    command: String,
    args: Vec<String>,
    model: String,
    solver: String,
}

impl AmplBackend {
    pub fn new(command: &str, args: &[String], model: &str, solver: &str) -> Self {
        Self {
            command: command.to_string(),
            args: args.to_vec(),
            model: model.to_string(),
            solver: solver.to_string(),
        }
    }
}

impl SolverBackend for AmplBackend {
    fn name(&self) -> &str {
        "AMPL"
    }

    fn prepare(&self, problem: &OptimalPlacementProblem, work_dir: &Path) -> Result<SolverInvocation, SolverError> {
        let model_path = absolute_path(&self.model)?;
        let data_path = work_dir.join(DATA_FILE);
        let run_path = work_dir.join(RUN_FILE);
        write_file(&data_path, &data_file(problem))?;

        let mut run = String::new();
        run.push_str(&format!("model '{}';\n", model_path.display()));
        run.push_str(&format!("data '{}';\n", data_path.display()));
        run.push_str(&format!("option solver {};\n", self.solver));
        run.push_str(&result_commands());
        write_file(&run_path, &run)?;

        let mut args = self.args.clone();
        args.push(run_path.display().to_string());
        Ok(SolverInvocation {
            program: self.command.clone(),
            args,
            output: SolverOutput::Stdout,
        })
    }

    fn protocol(&self) -> ResultProtocol {
        protocol()
    }
}

/// Result protocol of AMPL scripts: exit code, numeric and textual solve result.
pub fn protocol() -> ResultProtocol {
    ResultProtocol {
        status_keys: vec![
            "solve_exitcode".to_string(),
            "solve_result_num".to_string(),
            "solve_result".to_string(),
        ],
        expected_status_lines: 3,
        interpret: interpret_status,
    }
}

/// Maps AMPL status to outcome. Numeric result codes take precedence over the textual result.
pub fn interpret_status(status: &BTreeMap<String, String>) -> SolverOutcome {
    let exit_code = status.get("solve_exitcode").and_then(|v| v.parse::<i64>().ok());
    if matches!(exit_code, Some(code) if code != 0) {
        return SolverOutcome::SolverFailure;
    }
    if let Some(code) = status.get("solve_result_num").and_then(|v| v.parse::<i64>().ok()) {
        return match code {
            0..=99 => SolverOutcome::Solved,
            100..=199 => SolverOutcome::SolvedButSuspect,
            200..=299 => SolverOutcome::Infeasible,
            300..=399 => SolverOutcome::Unbounded,
            400..=499 => SolverOutcome::ResourceLimitHit,
            500..=599 => SolverOutcome::SolverFailure,
            _ => SolverOutcome::Unknown,
        };
    }
    match status.get("solve_result").map(|v| v.as_str()) {
        Some("solved") => SolverOutcome::Solved,
        Some("solved?") => SolverOutcome::SolvedButSuspect,
        Some("infeasible") => SolverOutcome::Infeasible,
        Some("unbounded") => SolverOutcome::Unbounded,
        Some("limit") => SolverOutcome::ResourceLimitHit,
        Some("failure") => SolverOutcome::SolverFailure,
        _ => SolverOutcome::Unknown,
    }
}

/// Writes AMPL data section of the problem.
pub fn data_file(problem: &OptimalPlacementProblem) -> String {
    let machines: Vec<String> = (0..problem.machines.len()).map(|i| problem.machine_label(i)).collect();
    let vms: Vec<String> = (0..problem.vms.len()).map(|i| problem.vm_label(i)).collect();

    let mut data = String::new();
    data.push_str(&format!("set H := {};\n", machines.join(" ")));
    data.push_str(&format!("set V := {};\n", vms.join(" ")));
    data.push_str(&format!("param wp := {};\n", format_number(problem.weights.power)));
    data.push_str(&format!("param wm := {};\n", format_number(problem.weights.migration)));
    data.push_str(&format!("param ws := {};\n", format_number(problem.weights.sla)));
    let categories: Vec<String> = problem.categories.iter().map(|c| c.to_string()).collect();
    data.push_str(&format!("set K := {};\n", categories.join(" ")));

    if !machines.is_empty() {
        data.push_str("param: C T Pidle Pmax Fc :=\n");
        for (j, (label, machine)) in machines.iter().zip(problem.machines.iter()).enumerate() {
            data.push_str(&format!(
                "  {} {} {} {} {} {}\n",
                label,
                format_number(machine.capacity),
                format_number(machine.threshold),
                format_number(machine.idle_power),
                format_number(machine.max_power),
                format_number(problem.free_share(j, ResourceCategory::Cpu))
            ));
        }
        data.push_str(";\n");
    }

    if !machines.is_empty() && !categories.is_empty() {
        data.push_str(&format!("param F: {} :=\n", categories.join(" ")));
        for (j, label) in machines.iter().enumerate() {
            let row: Vec<String> = problem
                .categories
                .iter()
                .map(|category| format_number(problem.free_share(j, *category)))
                .collect();
            data.push_str(&format!("  {} {}\n", label, row.join(" ")));
        }
        data.push_str(";\n");

        data.push_str("param r :=");
        for (i, vm) in vms.iter().enumerate() {
            for (j, machine) in machines.iter().enumerate() {
                for (category, name) in problem.categories.iter().zip(categories.iter()) {
                    let demand = problem.demand(i, j, *category);
                    if demand > 0. {
                        data.push_str(&format!("\n  {} {} {} {}", vm, machine, name, format_number(demand)));
                    }
                }
            }
        }
        data.push_str(";\n");
    }

    let current: Vec<(usize, usize)> = problem
        .vms
        .iter()
        .enumerate()
        .filter_map(|(i, vm)| vm.current_machine.map(|m| (i, m)))
        .collect();
    if !current.is_empty() {
        data.push_str("param y0 :=");
        for (vm, machine) in current {
            data.push_str(&format!("\n  {} {} 1", vms[vm], machines[machine]));
        }
        data.push_str(";\n");
    }

    if !vms.is_empty() && !machines.is_empty() {
        data.push_str(&format!("param smin: {} :=\n", machines.join(" ")));
        for (label, vm) in vms.iter().zip(problem.vms.iter()) {
            let row: Vec<String> = vm.min_shares.iter().map(|s| format_number(*s)).collect();
            data.push_str(&format!("  {} {}\n", label, row.join(" ")));
        }
        data.push_str(";\n");
    }
    data
}

/// AMPL commands solving the model and printing the result block.
pub fn result_commands() -> String {
    let mut commands = String::new();
    commands.push_str("solve;\n");
    commands.push_str(&format!("printf \"{}\\n\";\n", RESULT_BEGIN_MARKER));
    commands.push_str("printf \"solve_exitcode=%d\\n\", solve_exitcode;\n");
    commands.push_str("printf \"solve_result_num=%d\\n\", solve_result_num;\n");
    commands.push_str("printf \"solve_result=%s\\n\", solve_result;\n");
    commands.push_str("printf \"cost=%.6f\\n\", cost;\n");
    commands.push_str("printf \"x=[\";\n");
    commands.push_str("printf {h in H} \" %d\", round(x[h]);\n");
    commands.push_str("printf \" ]\\n\";\n");
    commands.push_str("printf \"y=[\";\n");
    commands.push_str("for {v in V} { if ord(v) > 1 then printf \";\"; printf {h in H} \" %d\", round(y[v,h]); }\n");
    commands.push_str("printf \" ]\\n\";\n");
    commands.push_str("printf \"s=[\";\n");
    commands.push_str("for {v in V} { if ord(v) > 1 then printf \";\"; printf {h in H} \" %.6f\", s[v,h]; }\n");
    commands.push_str("printf \" ]\\n\";\n");
    commands.push_str(&format!("printf \"{}\\n\";\n", RESULT_END_MARKER));
    commands
}

pub(crate) fn write_file(path: &Path, content: &str) -> Result<(), SolverError> {
    std::fs::write(path, content).map_err(|e| SolverError::Io(format!("can't write {}", path.display()), e))
}
