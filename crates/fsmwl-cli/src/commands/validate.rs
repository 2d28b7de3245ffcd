use fsmwl_config::{ConfigError, RunConfig};

pub fn run(config: &RunConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut errors = Vec::new();
    match fsmwl_workloads::defaults_for(&config.workload) {
        Some(defaults) => errors.extend(config.effective(defaults).validate()),
        None => {
            errors.push(ConfigError::UnknownWorkload(config.workload.clone()));
            errors.extend(config.validate());
        }
    }

    if errors.is_empty() {
        println!("Configuration is valid.");
        Ok(())
    } else {
        eprintln!("Configuration has {} error(s):", errors.len());
        for (i, err) in errors.iter().enumerate() {
            eprintln!("  {}: {}", i + 1, err);
        }
        Err(format!("{} validation error(s) found", errors.len()).into())
    }
}
