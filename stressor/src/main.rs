use anyhow::Context;
use clap::Parser;
use stressor::client::HttpClient;
use stressor::config::{self, normalize_args, CliArgs, RunConfig};
use stressor::controller::RunController;
use stressor::report::Report;
use stressor::signals::StopSignals;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    if running_as_root() {
        println!("Refusing to run as root");
        std::process::exit(2);
    }

    let program = std::env::args().next().unwrap_or_else(|| config::NAME.to_string());
    let available_cpus = std::thread::available_parallelism().map_or(1, usize::from);
    let args = match CliArgs::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            print!("{}", config::usage(&program, available_cpus));
            std::process::exit(1);
        }
    };
    if args.version {
        println!("{}", config::version());
        std::process::exit(0);
    }
    if args.license {
        println!("{}", config::license());
        std::process::exit(0);
    }
    if args.help || args.url.is_none() {
        print!("{}", config::usage(&program, available_cpus));
        std::process::exit(1);
    }
    let config = match args.into_run_config(available_cpus) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stressor=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.vcpus)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to build runtime: {e}");
            std::process::exit(1);
        }
    };
    let _guard = rt.enter();
    if let Err(e) = rt.block_on(run_stress(config)) {
        println!("Error making requests, {e:#}");
        std::process::exit(1);
    }
}

async fn run_stress(config: RunConfig) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    tokio::spawn(listen_signals(cancel.clone()));

    let concurrency = config.concurrency;
    let output = config.output;
    let outcome = RunController::new(config, HttpClient::new())
        .run(cancel)
        .await
        .context("Failed to start run")?;
    info!(
        reason = ?outcome.stop_reason,
        dispatched = outcome.dispatched,
        elapsed = ?outcome.elapsed,
        "run finished"
    );
    print!("{}", Report::from_stats(&outcome.stats, concurrency).render(output));
    Ok(())
}

/// First stop signal ends the run gracefully, a second one exits.
async fn listen_signals(cancel: CancellationToken) {
    let mut signals = match StopSignals::register() {
        Ok(signals) => signals,
        Err(e) => {
            warn!(error = %e, "failed to listen for stop signals");
            return;
        }
    };
    signals.recv().await;
    info!("stop signal received, finishing in-flight requests");
    cancel.cancel();
    signals.recv().await;
    warn!("second stop signal received, exiting without a report");
    std::process::exit(130);
}

#[cfg(unix)]
fn running_as_root() -> bool {
    // SAFETY: getuid has no preconditions and cannot fail
    unsafe { libc::getuid() == 0 }
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    false
}
