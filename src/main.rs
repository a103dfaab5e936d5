use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use search_feeder::config::Args;
use search_feeder::{pipeline, store};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    // ── 1. Configuration ─────────────────────────────────────────
    let config = args.into_config()?;
    info!(
        store = %config.store_url,
        collection = %config.collection_name,
        roster = ?config.roster_names,
        burst = config.burst_count,
        interval_secs = config.interval_secs,
        "search-feeder starting"
    );

    // ── 2. Backend ───────────────────────────────────────────────
    let store = store::connect(&config.store_url).await?;

    // ── 3. Ctrl-C stops the steady phase ─────────────────────────
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupt received, stopping");
                on_signal.cancel();
            }
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C; stop the process externally"),
        }
    });

    // ── 4. Run ───────────────────────────────────────────────────
    let summary = pipeline::run(&config, store, cancel).await?;
    info!(
        burst = summary.burst.written,
        steady = summary.steady_written,
        last_id = summary.last_id,
        "stopped"
    );
    Ok(())
}
