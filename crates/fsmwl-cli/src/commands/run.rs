use fsmwl_config::RunConfig;
use fsmwl_harness::{run_config, FinalCheck};
use tracing::{info, warn};

pub struct RunArgs {
    pub json: bool,
}

pub async fn run(config: &RunConfig, args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        workload = %config.workload,
        seed = config.seed,
        json = args.json,
        "running workload"
    );
    let report = run_config(config).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.summary_line());
        for worker in &report.workers {
            println!(
                "  worker {:<3} iterations={:<4} {}",
                worker.tid, worker.iterations_run, worker.summary
            );
        }
        for failure in &report.failures {
            let origin = if failure.injected { " [injected]" } else { "" };
            println!(
                "  FAIL worker {} iteration {} state {}{}: {}",
                failure.tid, failure.iteration, failure.state, origin, failure.message
            );
        }
        if let FinalCheck::Failed(message) = &report.final_check {
            println!("  FAIL final check: {}", message);
        }
    }

    if report.passed() {
        info!(duration_ms = report.duration_ms, "workload passed");
        Ok(())
    } else {
        warn!(failures = report.failures.len(), "workload failed");
        Err(format!("workload '{}' failed", report.workload).into())
    }
}
