//! GAMS backend.

use std::collections::BTreeMap;
use std::path::Path;

use crate::core::common::ResourceCategory;
use crate::solver::backend::{absolute_path, format_number, SolverBackend, SolverInvocation, SolverOutput};
use crate::solver::backends::ampl::write_file;
use crate::solver::problem::OptimalPlacementProblem;
use crate::solver::result_parser::{ResultProtocol, SolverOutcome, RESULT_BEGIN_MARKER, RESULT_END_MARKER};
use crate::solver::SolverError;

pub const DATA_FILE: &str = "vm_placement_data.gms";
pub const RUN_FILE: &str = "vm_placement_run.gms";
pub const RESULT_FILE: &str = "result.txt";

/// Runs GAMS with a generated run file, which includes the data and the model and writes the result block
/// to a put file.
pub struct GamsBackend {
    command: String,
    args: Vec<String>,
    options: Vec<String>,
    model: String,
    solver: String,
}

impl GamsBackend {
    pub fn new(command: &str, args: &[String], options: &[String], model: &str, solver: &str) -> Self {
        Self {
            command: command.to_string(),
            args: args.to_vec(),
            options: options.to_vec(),
            model: model.to_string(),
            solver: solver.to_string(),
        }
    }
}

impl SolverBackend for GamsBackend {
    fn name(&self) -> &str {
        "GAMS"
    }

    fn prepare(&self, problem: &OptimalPlacementProblem, work_dir: &Path) -> Result<SolverInvocation, SolverError> {
        let model_path = absolute_path(&self.model)?;
        let data_path = work_dir.join(DATA_FILE);
        let run_path = work_dir.join(RUN_FILE);
        let result_path = work_dir.join(RESULT_FILE);
        write_file(&data_path, &data_file(problem))?;

        let mut run = String::new();
        run.push_str(&format!("$include \"{}\"\n", data_path.display()));
        run.push_str(&format!("$include \"{}\"\n", model_path.display()));
        run.push_str(&format!("option mip = {};\n", self.solver));
        run.push_str("solve vmplacement using mip minimizing cost;\n");
        run.push_str(&format!("file res / '{}' /;\n", result_path.display()));
        run.push_str("res.pw = 32767;\n");
        run.push_str("put res;\n");
        run.push_str(&format!("put '{}' /;\n", RESULT_BEGIN_MARKER));
        run.push_str("put 'solvestat=' vmplacement.solvestat:0:0 /;\n");
        run.push_str("put 'modelstat=' vmplacement.modelstat:0:0 /;\n");
        run.push_str("put 'cost=' cost.l:0:6 /;\n");
        run.push_str("put 'x=[';\n");
        run.push_str("loop(h, put ' ' x.l(h):0:0);\n");
        run.push_str("put ' ]' /;\n");
        run.push_str("put 'y=[';\n");
        run.push_str("loop(v, if(ord(v) > 1, put ';'); loop(h, put ' ' y.l(v,h):0:0));\n");
        run.push_str("put ' ]' /;\n");
        run.push_str("put 's=[';\n");
        run.push_str("loop(v, if(ord(v) > 1, put ';'); loop(h, put ' ' s.l(v,h):0:6));\n");
        run.push_str("put ' ]' /;\n");
        run.push_str(&format!("put '{}' /;\n", RESULT_END_MARKER));
        run.push_str("putclose res;\n");
        write_file(&run_path, &run)?;

        let mut args = self.args.clone();
        args.push(run_path.display().to_string());
        args.extend(self.options.iter().cloned());
        Ok(SolverInvocation {
            program: self.command.clone(),
            args,
            output: SolverOutput::File(result_path),
        })
    }

    fn protocol(&self) -> ResultProtocol {
        protocol()
    }
}

/// Result protocol of GAMS runs: solver status and model status.
pub fn protocol() -> ResultProtocol {
    ResultProtocol {
        status_keys: vec!["solvestat".to_string(), "modelstat".to_string()],
        expected_status_lines: 2,
        interpret: interpret_status,
    }
}

/// Maps GAMS solve and model status codes to outcome.
pub fn interpret_status(status: &BTreeMap<String, String>) -> SolverOutcome {
    let code = |key: &str| status.get(key).and_then(|v| v.trim().parse::<f64>().ok()).map(|v| v as i64);
    let model_status = code("modelstat");
    let solve_status = code("solvestat");

    let outcome = match model_status {
        Some(1) | Some(2) | Some(15) | Some(16) | Some(17) => SolverOutcome::Solved,
        Some(7) | Some(8) => SolverOutcome::SolvedButSuspect,
        Some(3) | Some(18) => SolverOutcome::Unbounded,
        Some(4) | Some(5) | Some(10) | Some(19) => SolverOutcome::Infeasible,
        Some(6) | Some(9) => SolverOutcome::ResourceLimitHit,
        Some(11..=14) => SolverOutcome::SolverFailure,
        _ => SolverOutcome::Unknown,
    };
    match (outcome, solve_status) {
        // normal completion
        (_, Some(1)) | (_, None) => outcome,
        // iteration or time limit with an integer solution found
        (SolverOutcome::Solved, Some(2)) | (SolverOutcome::Solved, Some(3)) => SolverOutcome::SolvedButSuspect,
        (SolverOutcome::SolvedButSuspect, Some(2..=3)) => SolverOutcome::SolvedButSuspect,
        (_, Some(2..=3)) => SolverOutcome::ResourceLimitHit,
        (SolverOutcome::Solved, Some(5)) | (SolverOutcome::SolvedButSuspect, Some(5)) => {
            SolverOutcome::SolvedButSuspect
        }
        _ => SolverOutcome::SolverFailure,
    }
}

/// Writes GAMS data declarations of the problem.
pub fn data_file(problem: &OptimalPlacementProblem) -> String {
    let machines: Vec<String> = (0..problem.machines.len()).map(|i| problem.machine_label(i)).collect();
    let vms: Vec<String> = (0..problem.vms.len()).map(|i| problem.vm_label(i)).collect();

    let categories: Vec<String> = problem.categories.iter().map(|c| c.to_string()).collect();

    let mut data = String::new();
    data.push_str("$onEmpty\n");
    data.push_str(&format!("Set h / {} /;\n", machines.join(", ")));
    data.push_str(&format!("Set v / {} /;\n", vms.join(", ")));
    data.push_str(&format!("Set k / {} /;\n", categories.join(", ")));
    data.push_str(&format!(
        "Scalar wp / {} /, wm / {} /, ws / {} /;\n",
        format_number(problem.weights.power),
        format_number(problem.weights.migration),
        format_number(problem.weights.sla)
    ));

    let machine_param = |name: &str, value: &dyn Fn(usize) -> f64| {
        let items: Vec<String> = machines
            .iter()
            .enumerate()
            .map(|(i, label)| format!("{} {}", label, format_number(value(i))))
            .collect();
        format!("Parameter {}(h) / {} /;\n", name, items.join(", "))
    };
    data.push_str(&machine_param("C", &|i| problem.machines[i].capacity));
    data.push_str(&machine_param("T", &|i| problem.machines[i].threshold));
    data.push_str(&machine_param("Pidle", &|i| problem.machines[i].idle_power));
    data.push_str(&machine_param("Pmax", &|i| problem.machines[i].max_power));
    data.push_str(&machine_param("Fc", &|i| problem.free_share(i, ResourceCategory::Cpu)));

    data.push_str("Parameter F(h,k);\n");
    data.push_str("F(h,k) = 1;\n");
    for (j, machine) in machines.iter().enumerate() {
        for (category, name) in problem.categories.iter().zip(categories.iter()) {
            let free = problem.free_share(j, *category);
            if free < 1. {
                data.push_str(&format!("F('{}','{}') = {};\n", machine, name, format_number(free)));
            }
        }
    }

    data.push_str("Parameter r(v,h,k);\n");
    data.push_str("r(v,h,k) = 0;\n");
    for (i, vm) in vms.iter().enumerate() {
        for (j, machine) in machines.iter().enumerate() {
            for (category, name) in problem.categories.iter().zip(categories.iter()) {
                let demand = problem.demand(i, j, *category);
                if demand > 0. {
                    data.push_str(&format!("r('{}','{}','{}') = {};\n", vm, machine, name, format_number(demand)));
                }
            }
        }
    }

    data.push_str("Parameter y0(v,h);\n");
    data.push_str("y0(v,h) = 0;\n");
    for (i, vm) in problem.vms.iter().enumerate() {
        if let Some(machine) = vm.current_machine {
            data.push_str(&format!("y0('{}','{}') = 1;\n", vms[i], machines[machine]));
        }
    }

    data.push_str("Parameter smin(v,h);\n");
    for (i, vm) in problem.vms.iter().enumerate() {
        for (j, share) in vm.min_shares.iter().enumerate() {
            data.push_str(&format!(
                "smin('{}','{}') = {};\n",
                vms[i],
                machines[j],
                format_number(*share)
            ));
        }
    }
    data
}
