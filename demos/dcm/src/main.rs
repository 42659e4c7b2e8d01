use std::time::Instant;

use clap::Parser;
use serde_json::json;

use dslab_core::simulation::Simulation;
use dslab_dcm::core::config::DataCenterConfig;
use dslab_dcm::data_center_manager::DataCenterManager;

fn init_logger() {
    use env_logger::Builder;
    use std::io::Write;
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to data center config
    #[clap(short, long, default_value = "config.yaml")]
    config: String,

    /// Simulated time in seconds
    #[clap(short, long, default_value_t = 100.)]
    duration: f64,

    /// Seed of the simulation
    #[clap(long, default_value_t = 123)]
    seed: u64,

    /// Path to CSV file for migration controller history
    #[clap(long)]
    history: Option<String>,
}

fn main() {
    init_logger();
    let args = Args::parse();

    let config = match DataCenterConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid config: {}", e);
            std::process::exit(1);
        }
    };
    let mut dcm = match DataCenterManager::new(Simulation::new(args.seed), config) {
        Ok(dcm) => dcm,
        Err(e) => {
            eprintln!("Can't build data center: {}", e);
            std::process::exit(1);
        }
    };

    let simulation_start = Instant::now();
    if let Err(e) = dcm.on_system_init() {
        eprintln!("Can't start applications: {}", e);
        std::process::exit(1);
    }
    dcm.step_for_duration(args.duration);
    dcm.on_system_finalize();

    let stats = dcm.migration_stats();
    let placement = dcm.placement();
    let placement = placement.borrow();
    let summary = json!({
        "time": dcm.current_time(),
        "placed_vms": placement.vm_count(),
        "used_machines": placement.used_machines().len(),
        "power": dcm.power_consumption(),
        "control_runs": stats.runs(),
        "migrations": stats.total_migrations(),
        "failed_migrations": stats.failed_migrations(),
        "failed_decisions": stats.failed_decisions(),
        "migration_rate": stats.migration_rate(),
        "placement": placement.assignments(),
    });
    println!("{}", serde_json::to_string_pretty(&summary).unwrap_or_default());

    if let Some(path) = args.history {
        if let Err(e) = stats.save_csv(&path) {
            eprintln!("Can't save history to {}: {}", path, e);
        }
    }
    println!("Simulation process time {:.2?}", simulation_start.elapsed());
}
