//! Binary entrypoint for the post-operative follow-up call orchestrator.
//!
//! Commands:
//! - `serve` - run the scheduler + worker pool + reaper against the
//!   configured Atomic Store and adapters
//! - `schedule --patient-id <id> --patient-phone <e164> --discharge-time <rfc3339>`
//!   - generate and persist the always-emitted wellness check (and any
//!   orders passed via `--orders-file`) for one patient, then exit
//! - `status --patient-id <id>` - print that patient's scheduled calls
//!
//! See the library crate docs for module-level details: `postop_followup::`.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use postop_followup::config::AppConfig;
use postop_followup::executor::CallExecutor;
use postop_followup::fabric::HttpCallFabric;
use postop_followup::model::DischargeOrder;
use postop_followup::scheduler::{Patient, Scheduler};
use postop_followup::store::SledStore;
use postop_followup::worker::{WorkerPool, WorkerPoolConfig};

#[derive(Parser)]
#[command(name = "postop-followup")]
#[command(about = "Post-operative care follow-up call scheduling and execution orchestrator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v, -vv for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler's worker pool until a shutdown signal arrives
    Serve,
    /// Schedule follow-up calls for one patient
    Schedule {
        #[arg(long)]
        patient_id: String,
        #[arg(long)]
        patient_phone: String,
        #[arg(long)]
        patient_name: String,
        /// RFC 3339 discharge instant, e.g. 2025-01-15T15:30:00Z
        #[arg(long)]
        discharge_time: String,
        /// Optional path to a JSON file containing a `DischargeOrder[]`
        #[arg(long)]
        orders_file: Option<String>,
    },
    /// Show scheduled calls for one patient
    Status {
        #[arg(long)]
        patient_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = AppConfig::from_env().context("loading configuration from the environment")?;
    let store = Arc::new(SledStore::open(&config.store.path).context("opening the atomic store")?);

    match cli.command {
        Commands::Serve => serve(config, store).await,
        Commands::Schedule { patient_id, patient_phone, patient_name, discharge_time, orders_file } => {
            schedule(store, patient_id, patient_phone, patient_name, discharge_time, orders_file).await
        }
        Commands::Status { patient_id } => status(store, patient_id).await,
    }
}

async fn serve(config: AppConfig, store: Arc<SledStore>) -> Result<()> {
    let fabric = Arc::new(HttpCallFabric::new(config.fabric.base_url.clone()));
    let executor = Arc::new(CallExecutor::new(
        store.clone(),
        fabric,
        config.fabric.agent_name.clone(),
        config.fabric.sip_outbound_trunk_id.clone(),
        config.worker.call_timeout,
    ));

    let pool = WorkerPool::spawn(
        store,
        executor,
        WorkerPoolConfig {
            tick_interval: config.worker.tick_interval,
            max_batch: config.worker.max_batch,
            concurrency: config.worker.concurrency,
        },
        config.worker.call_timeout,
        config.worker.reaper_grace,
    );

    info!("worker pool running; awaiting ctrl-c");
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown requested, draining in-flight calls");
    pool.shutdown(config.worker.drain_timeout).await;
    Ok(())
}

async fn schedule(
    store: Arc<SledStore>,
    patient_id: String,
    patient_phone: String,
    patient_name: String,
    discharge_time: String,
    orders_file: Option<String>,
) -> Result<()> {
    let discharge_time = chrono::DateTime::parse_from_rfc3339(&discharge_time)
        .context("parsing --discharge-time as RFC 3339")?
        .with_timezone(&chrono::Utc);

    let orders: Vec<DischargeOrder> = match orders_file {
        Some(path) => {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            serde_json::from_str(&raw).context("parsing orders file as JSON")?
        }
        None => Vec::new(),
    };

    let scheduler = Scheduler::new(store);
    let patient = Patient { id: patient_id, phone: patient_phone, name: patient_name };
    let items = scheduler
        .schedule_from_orders(&patient, discharge_time, &orders)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    println!("scheduled {} call(s) for patient {}", items.len(), patient.id);
    for item in items {
        println!("  {} {} at {}", item.call_type, item.id, item.scheduled_time.to_rfc3339());
    }
    Ok(())
}

async fn status(store: Arc<SledStore>, patient_id: String) -> Result<()> {
    let scheduler = Scheduler::new(store);
    let items = scheduler
        .list_by_patient(&patient_id)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    if items.is_empty() {
        println!("no scheduled calls for patient {patient_id}");
        return Ok(());
    }

    for item in items {
        println!(
            "{} {} status={} attempts={}/{} due={}",
            item.call_type, item.id, item.status, item.attempt_count, item.max_attempts, item.scheduled_time.to_rfc3339()
        );
    }
    Ok(())
}

fn init_logging(verbosity: u8) {
    let base_level = match verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(base_level).init();
}
