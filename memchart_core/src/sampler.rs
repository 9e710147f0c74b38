//! # Sampler
//!
//! The body of one sampling tick: read a snapshot, append it to the
//! server's series, persist the series file, then render the chart.
//!
//! A `Sampler` is driven by a single task and every tick takes `&mut self`,
//! so the read-modify-write of the series file can never overlap itself.

use anyhow::{Context, Result};
use std::str::FromStr;

use crate::chart::{Chart, ChartRenderer};
use crate::client::MetricsSource;
use crate::debug::DEBUG;
use crate::error::debug_error;
use crate::series::{bytes_to_mib, format_uptime, SeriesFile, ServerSeries, UNKNOWN_UPTIME};

/// Which label to record for a sample that couldn't be fetched.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GapLabel {
    /// Record `"unknown"`
    Unknown,
    /// Repeat the previous label, or `"unknown"` for an empty series
    RepeatLast,
}

impl GapLabel {
    pub fn label_for(&self, series: &ServerSeries) -> String {
        match self {
            GapLabel::Unknown => UNKNOWN_UPTIME.to_owned(),
            GapLabel::RepeatLast => series.last_label().unwrap_or(UNKNOWN_UPTIME).to_owned(),
        }
    }
}

impl Default for GapLabel {
    fn default() -> Self {
        GapLabel::Unknown
    }
}

impl FromStr for GapLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(GapLabel::Unknown),
            "repeat" => Ok(GapLabel::RepeatLast),
            _ => Err(anyhow::format_err!(
                "unknown gap label policy '{}' (expected 'unknown' or 'repeat')",
                s
            )),
        }
    }
}

/// What a completed tick appended to the series.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// A sample, in MiB
    Sampled(f64),
    /// A gap, because the snapshot couldn't be fetched
    Gap,
}

/// Fetch the server's memory ceiling, falling back to zero on failure.
pub async fn resolve_ceiling<S: MetricsSource>(source: &S, server_id: &str) -> u64 {
    match source.memory_ceiling(server_id).await {
        Ok(ceiling) => ceiling,
        Err(err) => {
            DEBUG.ceiling_failed();
            debug_error(anyhow::Error::new(err).context("fetching memory ceiling"));
            0
        }
    }
}

pub struct Sampler<S, R> {
    server_id: String,
    source: S,
    renderer: R,
    file: SeriesFile,

    /// The top of the chart's y axis; zero if it couldn't be fetched
    ceiling: u64,

    gap_label: GapLabel,

    /// The maximum number of samples to keep per server; unbounded if `None`
    retention: Option<usize>,
}

impl<S, R> Sampler<S, R>
where
    S: MetricsSource,
    R: ChartRenderer,
{
    pub fn new(server_id: String, source: S, renderer: R, file: SeriesFile) -> Self {
        Sampler {
            server_id,
            source,
            renderer,
            file,
            ceiling: 0,
            gap_label: GapLabel::default(),
            retention: None,
        }
    }

    pub fn with_gap_label(mut self, gap_label: GapLabel) -> Self {
        self.gap_label = gap_label;
        self
    }

    pub fn with_retention(mut self, retention: Option<usize>) -> Self {
        self.retention = retention;
        self
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Fetch the memory ceiling once; it is not retried if it fails.
    pub async fn init_ceiling(&mut self) -> u64 {
        self.ceiling = resolve_ceiling(&self.source, &self.server_id).await;
        self.ceiling
    }

    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let snapshot = self.source.resource_snapshot(&self.server_id).await;

        // An unreadable series file ends the tick before anything is written
        let mut store = self.file.load().await.context("loading series")?;
        let series = store.series_mut(&self.server_id);
        let outcome = match snapshot {
            Ok(snapshot) => {
                let used = bytes_to_mib(snapshot.memory_bytes);
                series.push(Some(used), format_uptime(snapshot.uptime_ms));
                DEBUG.sample_recorded();
                TickOutcome::Sampled(used)
            }
            Err(err) => {
                let label = self.gap_label.label_for(series);
                series.push(None, label);
                DEBUG.gap_recorded();
                eprintln!("Warn: no snapshot for server {}: {}", self.server_id, err);
                TickOutcome::Gap
            }
        };
        if let Some(max_len) = self.retention {
            series.retain_last(max_len);
        }
        let chart = Chart::from_series(series, self.ceiling);

        match self.file.save(&store).await {
            Ok(()) => DEBUG.persist_succeeded(),
            Err(err) => {
                DEBUG.persist_failed();
                return Err(anyhow::Error::new(err).context("saving series"));
            }
        }

        match self.renderer.render(chart).await {
            Ok(()) => DEBUG.render_succeeded(),
            Err(err) => {
                DEBUG.render_failed();
                return Err(err.context("rendering chart"));
            }
        }

        Ok(outcome)
    }
}
