use anyhow::Context;
use clap::Parser;
use http_test_util::target::{serve, TargetBehavior};
use http_test_util::HitCounter;
use hyper::StatusCode;
use mimalloc::MiMalloc;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Fixed-response HTTP server to point stressor at
#[derive(Parser, Debug)]
#[command(name = "target-server")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Delay before every response, in milliseconds
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Size of every response body, in bytes
    #[arg(long, default_value_t = 1024)]
    body_size: usize,

    /// Status code of every response
    #[arg(long, default_value_t = 200)]
    status: u16,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "target_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    let _guard = rt.enter();
    rt.block_on(run_app(args))
}

async fn run_app(args: Args) -> anyhow::Result<()> {
    let behavior = TargetBehavior {
        delay: Duration::from_millis(args.delay_ms),
        body_len: args.body_size,
        status: StatusCode::from_u16(args.status).context("Invalid status code")?,
    };
    let sock = tokio::net::TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("Failed to bind {}", args.addr))?;
    info!(addr = %args.addr, ?behavior, "serving");

    let counter = HitCounter::new();
    tokio::select! {
        res = serve(sock, behavior, counter.clone()) => res?,
        _ = tokio::signal::ctrl_c() => {}
    }
    info!(served = counter.served(), peak_in_flight = counter.max_in_flight(), "shutting down");
    Ok(())
}
