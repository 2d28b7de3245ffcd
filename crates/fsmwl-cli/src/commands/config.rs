use fsmwl_config::{ConfigError, RunConfig};

/// Print the configuration with every default filled in.
pub fn run(config: &RunConfig) -> Result<(), Box<dyn std::error::Error>> {
    let defaults = fsmwl_workloads::defaults_for(&config.workload)
        .ok_or_else(|| ConfigError::UnknownWorkload(config.workload.clone()))?;
    let yaml = config.effective(defaults).to_yaml()?;
    println!("{}", yaml);
    Ok(())
}
