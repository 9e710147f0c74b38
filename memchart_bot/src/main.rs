//! Memchart Bot

mod config;

use anyhow::{Context, Result}; // alias std::result::Result with dynamic error type
use futures::channel::oneshot;
use futures::stream::StreamExt;
use std::cell::Cell;
use std::time::Instant;

use memchart_core::chart::{load_font, PngChart};
use memchart_core::client::PanelClient;
use memchart_core::debug::DEBUG;
use memchart_core::error::{debug_error, debug_error_enabled};
use memchart_core::sampler::{Sampler, TickOutcome};
use memchart_core::series::SeriesFile;

use crate::config::Config;

/// The program's main entry point.
fn main() -> Result<()> {
    let (send_shutdown, recv_shutdown) = oneshot::channel::<()>();

    // When we receive a SIGINT (or SIGTERM) signal, begin exiting.
    let signal_once = Cell::new(Some(send_shutdown));
    ctrlc::set_handler(move || {
        // The first time we receive the signal, shutdown gracefully
        if let Some(sender) = signal_once.take() {
            sender.send(()).expect("failed to shutdown");
        }
        // The second time we receive the signal, shutdown immediately
        else {
            std::process::exit(1);
        }
    })?;

    // Start the main event loop
    async_std::task::block_on(run(recv_shutdown))
}

/// The main thread's event loop
async fn run(shutdown: oneshot::Receiver<()>) -> Result<()> {
    // Load configuration from arguments and environment variables
    let config = Config::load()?;
    debug_error_enabled(config.debug);

    // The series file must already exist; it is never created
    let file = SeriesFile::open(&config.series_path)
        .await
        .context("opening series file")?;
    println!("Series: {}", file.path().display());

    let client = PanelClient::new(
        &config.api_url,
        config.credentials.clone(),
        config.request_timeout,
    );
    // Without a font the chart is still drawn, just without axis labels or a legend
    let font = load_font(config.chart_font.as_deref())
        .context("loading chart font")?;
    match &font {
        Some(path) => println!("Font: {}", path.display()),
        None => println!("No font found; drawing charts without labels"),
    }
    let renderer = PngChart::new(&config.chart_path).with_text(font.is_some());
    let mut sampler = Sampler::new(config.server_id.clone(), client, renderer, file)
        .with_gap_label(config.gap_label)
        .with_retention(config.retention);

    // Fetch the memory ceiling once; on failure the chart's axis stays at zero
    let ceiling = sampler.init_ceiling().await;
    println!("Server {}: memory ceiling {}", sampler.server_id(), ceiling);

    // Every debug interval, log debug information
    let debug_interval = match config.debug_interval {
        Some(duration) => Some(async_std::task::spawn(async move {
            let mut interval = async_std::stream::interval(duration);
            while interval.next().await.is_some() {
                DEBUG.publish();
            }
        })),
        None => None,
    };

    // Every SAMPLE_INTERVAL (at most), sample memory usage and redraw the chart.
    //
    // The task owns the sampler, so a slow tick delays the next one rather than overlapping it.
    let sample_interval = config.sample_interval;
    let chart_path = config.chart_path.clone();
    let sampling = async_std::task::spawn(async move {
        // The first sample is taken one interval after startup
        async_std::task::sleep(sample_interval).await;
        loop {
            let start = Instant::now();

            match sampler.tick().await {
                Ok(TickOutcome::Sampled(used)) => {
                    DEBUG.tick_succeeded();
                    println!("Updated {} ({:.1} MiB)", chart_path.display(), used);
                }
                Ok(TickOutcome::Gap) => {
                    DEBUG.tick_succeeded();
                    println!("Updated {} (gap)", chart_path.display());
                }
                // Failures always end up in the log, with the full cause chain
                Err(err) => {
                    DEBUG.tick_failed();
                    eprintln!("Warn: sample failed: {:#}", err);
                }
            }

            // Sleep until the next sample interval
            match sample_interval.checked_sub(start.elapsed()) {
                Some(delay) => async_std::task::sleep(delay).await,
                None => debug_error(anyhow::format_err!(
                    "tick took longer than the sample interval ({:?})",
                    sample_interval
                )),
            }
        }
    });

    // Shutdown when the process is killed
    shutdown.await?;
    sampling.cancel().await;
    if let Some(debug_interval) = debug_interval {
        debug_interval.cancel().await;
    }

    Ok(())
}
