// All-jobs execution

use rayon::prelude::*;

use crate::pipeline::job_runner::{JobConfig, JobResult, run_job};
use crate::process::tools::ToolPaths;

/// Run multiple jobs in parallel, collecting results.
/// One job failure does NOT prevent other jobs from running.
pub fn run_all_jobs(
    jobs: &[JobConfig],
    tools: &ToolPaths,
) -> Vec<crate::error::Result<JobResult>> {
    jobs.par_iter().map(|job| run_job(job, tools)).collect()
}
