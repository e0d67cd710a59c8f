use clap::Parser;
use ranexec::config::{CuUpConfig, DuHighConfig, DuLowConfig, RuDummyConfig};
use ranexec::logging::init_logging;
use ranexec::{ExecutionContext, ExecutorRef, TaskExecutorExt, WorkerManager, WorkerManagerConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "ranexec")]
#[command(about = "Build the RAN worker topology and push a sample load through it", long_about = None)]
struct Args {
    /// JSON worker manager configuration (a DU with a dummy RU if omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of cells of the built-in configuration
    #[arg(long, default_value = "1")]
    cells: usize,

    /// Tasks submitted to each executor under test
    #[arg(long, default_value = "1000")]
    tasks: usize,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn demo_config(nof_cells: usize) -> WorkerManagerConfig {
    WorkerManagerConfig {
        cu_up: Some(CuUpConfig::default()),
        du_high: Some(DuHighConfig {
            nof_cells,
            ..Default::default()
        }),
        du_low: Some(DuLowConfig {
            nof_cells,
            ..Default::default()
        }),
        ru_dummy: Some(RuDummyConfig {
            nof_cells,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = match &args.config {
        Some(path) => match WorkerManagerConfig::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Error: {}: {}", path.display(), err);
                std::process::exit(1);
            }
        },
        None => demo_config(args.cells),
    };

    let mut workers = WorkerManager::new(config);
    println!("ranexec - RAN task execution core\n");

    let mut targets: Vec<ExecutorRef> = vec![
        workers.high_prio_executor(),
        workers.medium_prio_executor(),
        workers.low_prio_executor(),
    ];
    if let Some(du_high) = workers.du_high_mapper() {
        for cell in 0..du_high.nof_cells() {
            targets.push(du_high.cell_executor(cell).clone());
            targets.push(du_high.ue_executor(cell).clone());
        }
    }
    if let Some(du_low) = workers.du_low_mapper() {
        for cell in 0..du_low.nof_cells() {
            targets.push(du_low.pdsch_executor(cell).clone());
            targets.push(du_low.pusch_executor(cell).clone());
        }
    }
    if let Some(cu_up) = workers.cu_up_mapper() {
        targets.push(cu_up.create_ue_executors().dl);
    }

    let completed = Arc::new(AtomicUsize::new(0));
    let mut accepted = 0;
    let mut rejected = 0;
    let start = Instant::now();
    for executor in &targets {
        for _ in 0..args.tasks {
            let completed = completed.clone();
            let result = executor.defer_fn(move || {
                std::hint::black_box((0..100u64).sum::<u64>());
                completed.fetch_add(1, Ordering::Relaxed);
            });
            match result {
                Ok(()) => accepted += 1,
                Err(_) => rejected += 1,
            }
        }
    }

    let deadline = Duration::from_secs(10);
    while completed.load(Ordering::Relaxed) < accepted && start.elapsed() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    println!(
        "Executed {}/{} tasks on {} executors in {:?} ({} rejected by back-pressure)\n",
        completed.load(Ordering::Relaxed),
        accepted,
        targets.len(),
        start.elapsed(),
        rejected
    );

    println!("Execution contexts:");
    for context in workers.task_execution_manager().contexts() {
        let names: Vec<&str> = context.executors().iter().map(|(name, _)| name.as_str()).collect();
        println!(
            "  {:<16} {} worker(s): {}",
            context.name(),
            context.nof_workers(),
            names.join(", ")
        );
    }

    workers.stop();
    println!("\nAll workers stopped");
}
