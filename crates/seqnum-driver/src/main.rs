#![doc = include_str!("../README.md")]

mod config;
mod telemetry;

use anyhow::bail;
use clap::Parser;
use config::{CliArgs, Policy, RunConfig};
use seqnum::{
    CountAllocator, Driver, MaxAllocator, MemoryStore, NumberAllocator, OrderCreator, RunReport,
};
use telemetry::init_telemetry;
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = RunConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let store = MemoryStore::new(config.store.clone());
    let result = match config.policy {
        Policy::Max => run(store, MaxAllocator, &config, cancel).await,
        Policy::Count => run(store, CountAllocator, &config, cancel).await,
    };

    if let Ok(report) = &result {
        telemetry::record_run(report);
    }
    providers.shutdown();
    let report = result?;

    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }

    if !report.is_consistent() {
        bail!(
            "numbering is inconsistent: {} duplicate numbers, {} day mismatches",
            report.consistency.duplicates.len(),
            report.consistency.day_mismatches.len()
        );
    }
    Ok(())
}

async fn run<A>(
    store: MemoryStore,
    allocator: A,
    config: &RunConfig,
    cancel: CancellationToken,
) -> anyhow::Result<RunReport>
where
    A: NumberAllocator + 'static,
{
    let creator = OrderCreator::new(store, allocator);
    let driver = Driver::new(creator, config.driver).with_cancellation(cancel);
    Ok(driver.run().await?)
}

fn log_startup_info(_config: &RunConfig) {
    #[cfg(feature = "tracing")]
    {
        use seqnum::{LockScope, MAX_DAILY_SEQUENCE};

        if cfg!(debug_assertions) {
            tracing::info!("Starting run with full config: {:#?}", _config);
        } else {
            tracing::info!(
                "Starting run of {} orders with {} creators in flight",
                _config.driver.total_count(),
                _config.driver.max_parallelism()
            );
        }

        if _config.policy == Policy::Count && _config.store.lock_scope == LockScope::Day {
            tracing::warn!("The count policy reads later days; a day-scoped lock does not cover it");
        }
        if matches!(_config.driver.day_offsets(), seqnum::DayOffsets::Fixed(_))
            && _config.driver.total_count() > u64::from(MAX_DAILY_SEQUENCE)
        {
            tracing::info!(
                "{} orders on a single day exceed its {} numbers; expect overflow failures",
                _config.driver.total_count(),
                MAX_DAILY_SEQUENCE
            );
        }
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Failed to install SIGTERM handler: {}", _err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(_err) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::warn!("Failed to install Ctrl+C handler: {}", _err);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Stopping admission, waiting for in-flight orders...");
    cancel.cancel();
}
