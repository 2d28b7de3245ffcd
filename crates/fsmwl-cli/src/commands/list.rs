pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    for info in fsmwl_workloads::WORKLOADS {
        println!(
            "{:<16} threads={:<3} iterations={:<4} {}",
            info.name, info.defaults.thread_count, info.defaults.iterations, info.description
        );
    }
    Ok(())
}
