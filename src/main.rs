use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rategate::config::RateLimiterConfig;
use rategate::ratelimit::{Algorithm, Backend, RateLimiter};

#[derive(Parser, Debug)]
#[command(name = "rategate", version, about = "Exercise rate limiters from the command line")]
struct Cli {
    /// YAML configuration file (RATEGATE__* variables override it)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Issue a burst of decisions against one key and print each outcome
    Check(CheckArgs),
}

#[derive(clap::Args, Debug)]
struct CheckArgs {
    /// Limiter key
    #[arg(long, default_value = "")]
    key: String,

    /// FIXED_WINDOW, TOKEN_BUCKET, LEAKY_BUCKET, SLIDING_LOG or SLIDING_COUNTER
    #[arg(long)]
    algorithm: Option<Algorithm>,

    /// LOCAL or REMOTE
    #[arg(long)]
    backend: Option<Backend>,

    #[arg(long)]
    limit: Option<i64>,

    #[arg(long)]
    window_seconds: Option<i64>,

    #[arg(long)]
    capacity: Option<i64>,

    #[arg(long)]
    refill_amount: Option<i64>,

    #[arg(long)]
    refill_interval_seconds: Option<i64>,

    #[arg(long)]
    leak_rate: Option<i64>,

    #[arg(long)]
    sub_windows: Option<i64>,

    #[arg(long)]
    permits: Option<i64>,

    /// Number of decisions to make
    #[arg(long, short = 'n', default_value_t = 10)]
    requests: u32,

    /// Pause between decisions
    #[arg(long, default_value_t = 0)]
    interval_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
    let config = RateLimiterConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Check(args) => check(config, args).await,
    }
}

async fn check(config: RateLimiterConfig, args: CheckArgs) -> anyhow::Result<()> {
    let mut spec = config.spec(args.algorithm.unwrap_or(config.defaults.algorithm));
    spec.identity = "rategate-cli".to_string();
    if let Some(backend) = args.backend {
        spec.backend = backend;
    }
    if let Some(v) = args.limit {
        spec.limit = v;
    }
    if let Some(v) = args.window_seconds {
        spec.window_seconds = v;
    }
    if let Some(v) = args.capacity {
        spec.capacity = v;
    }
    if let Some(v) = args.refill_amount {
        spec.refill_amount = v;
    }
    if let Some(v) = args.refill_interval_seconds {
        spec.refill_interval_seconds = v;
    }
    if let Some(v) = args.leak_rate {
        spec.leak_rate = v;
    }
    if let Some(v) = args.sub_windows {
        spec.sub_windows = v;
    }
    if let Some(v) = args.permits {
        spec.permits = v;
    }

    let limiter = if spec.backend == Backend::Remote {
        RateLimiter::connect(config).await
    } else {
        RateLimiter::new(config)
    };

    info!(
        algorithm = %spec.algorithm,
        backend = %spec.backend,
        "Issuing {} requests",
        args.requests
    );

    let mut admitted = 0;
    for i in 1..=args.requests {
        let allowed = limiter.decide(&args.key, &spec).await?;
        if allowed {
            admitted += 1;
        }
        println!("{:>4}  {}", i, if allowed { "ADMIT" } else { "REJECT" });

        if args.interval_ms > 0 && i < args.requests {
            tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        }
    }

    println!("{} of {} admitted", admitted, args.requests);
    Ok(())
}
