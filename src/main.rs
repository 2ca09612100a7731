//! sitewatch - website availability and certificate monitor.

use clap::Parser;
use sitewatch::report::{run_reporter, JsonReporter, LogReporter};
use sitewatch::{Monitor, MonitorConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sitewatch", version, about = "Monitor websites and their TLS certificates")]
struct Args {
    /// The website you want to monitor (repeatable)
    #[arg(short = 'w', long = "website", value_name = "URL", default_value = "https://example.com")]
    websites: Vec<String>,

    /// Seconds between checks
    #[arg(short = 't', long = "interval", value_name = "SECONDS", default_value_t = 10)]
    interval: u64,

    /// Print results as JSON lines on stdout instead of log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("sitewatch=info".parse()?))
        .init();

    let args = Args::parse();

    // Load configuration
    let cfg = MonitorConfig::load();
    tracing::info!(
        "Client timeout {:?}, sink capacity {}",
        cfg.client_timeout,
        cfg.sink_capacity
    );

    let mut monitor = Monitor::new(cfg)?;
    for website in &args.websites {
        monitor.add_website(website, args.interval)?;
    }

    let stream = monitor.drain().ok_or("result stream already taken")?;
    monitor.start();

    let reporter = if args.json {
        tokio::spawn(async move {
            let (_, count) = run_reporter(stream, JsonReporter::new(std::io::stdout())).await;
            count
        })
    } else {
        tokio::spawn(async move {
            let (reporter, count) = run_reporter(stream, LogReporter::default()).await;
            tracing::info!("Raised {} alerts", reporter.alerts());
            count
        })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    monitor.shutdown().await;
    let reported = reporter.await?;
    tracing::info!(
        "Reported {} results, dropped {}",
        reported,
        monitor.dropped()
    );

    Ok(())
}
