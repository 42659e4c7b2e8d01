//! NEOS backend.
//!
//! The AMPL model, data and commands are packed into a NEOS job file. Submission and waiting for the results
//! are done by an external proxy program, which prints the job output to stdout.

use std::path::Path;

use crate::solver::backend::{absolute_path, SolverBackend, SolverInvocation, SolverOutput};
use crate::solver::backends::ampl;
use crate::solver::backends::ampl::write_file;
use crate::solver::problem::OptimalPlacementProblem;
use crate::solver::result_parser::ResultProtocol;
use crate::solver::SolverError;

pub const JOB_FILE: &str = "neos_job.xml";

pub struct NeosProxyBackend {
    command: String,
    args: Vec<String>,
    model: String,
    solver: String,
    category: String,
    email: Option<String>,
}

impl NeosProxyBackend {
    pub fn new(
        command: &str,
        args: &[String],
        model: &str,
        solver: &str,
        category: &str,
        email: Option<String>,
    ) -> Self {
        Self {
            command: command.to_string(),
            args: args.to_vec(),
            model: model.to_string(),
            solver: solver.to_string(),
            category: category.to_string(),
            email,
        }
    }

    /// Builds NEOS job XML for the problem.
    pub fn job(&self, model: &str, problem: &OptimalPlacementProblem) -> String {
        let mut job = String::new();
        job.push_str("<document>\n");
        job.push_str(&format!("<category>{}</category>\n", self.category));
        job.push_str(&format!("<solver>{}</solver>\n", self.solver));
        job.push_str("<inputMethod>AMPL</inputMethod>\n");
        if let Some(email) = &self.email {
            job.push_str(&format!("<email>{}</email>\n", email));
        }
        job.push_str(&format!("<model><![CDATA[\n{}]]></model>\n", model));
        job.push_str(&format!("<data><![CDATA[\n{}]]></data>\n", ampl::data_file(problem)));
        job.push_str(&format!("<commands><![CDATA[\n{}]]></commands>\n", ampl::result_commands()));
        job.push_str("</document>\n");
        job
    }
}

impl SolverBackend for NeosProxyBackend {
    fn name(&self) -> &str {
        "NEOS"
    }

    fn prepare(&self, problem: &OptimalPlacementProblem, work_dir: &Path) -> Result<SolverInvocation, SolverError> {
        let model_path = absolute_path(&self.model)?;
        let model = std::fs::read_to_string(&model_path)
            .map_err(|e| SolverError::Io(format!("can't read model file {}", model_path.display()), e))?;
        let job_path = work_dir.join(JOB_FILE);
        write_file(&job_path, &self.job(&model, problem))?;

        let mut args = self.args.clone();
        args.push(job_path.display().to_string());
        Ok(SolverInvocation {
            program: self.command.clone(),
            args,
            output: SolverOutput::Stdout,
        })
    }

    fn protocol(&self) -> ResultProtocol {
        ampl::protocol()
    }
}
