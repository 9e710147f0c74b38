//! # Chart Renderer
//!
//! Draws a server's memory history as a filled line chart and writes it as a PNG.
//!

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::ImageEncoder;
use plotters::coord::Shift;
use plotters::drawing::{DrawingArea, DrawingAreaErrorKind};
use plotters::prelude::*;
use std::path::{Path, PathBuf};

use crate::series::{replace_file, ServerSeries};

pub const CHART_WIDTH: u32 = 800;
pub const CHART_HEIGHT: u32 = 600;

const SERIES_NAME: &str = "Memory used";
const STROKE: RGBColor = RGBColor(255, 99, 132);
const FILL_OPACITY: f64 = 0.2;

/// Everything needed to draw one chart.
#[derive(Clone, Debug, PartialEq)]
pub struct Chart {
    /// Category labels, drawn in order; duplicates are distinct categories.
    pub labels: Vec<String>,

    /// One value per label; `None` is a gap which the line spans.
    pub values: Vec<Option<f64>>,

    /// The top of the y axis (the bottom is always zero).
    pub y_max: u64,
}

impl Chart {
    pub fn from_series(series: &ServerSeries, y_max: u64) -> Self {
        Chart {
            labels: series.labels().to_vec(),
            values: series.values().to_vec(),
            y_max,
        }
    }

    /// The points to be connected by the line, skipping gaps.
    pub fn points(&self) -> Vec<(usize, f64)> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, value)| value.map(|v| (i, v)))
            .collect()
    }
}

/// Renders a `Chart`; completes only once the output is fully written.
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    async fn render(&self, chart: Chart) -> Result<()>;
}

/// Fonts tried, in order, when no font file is configured
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Registers the font used for axis labels and the legend.
///
/// Uses `path` if given, otherwise the first of a few well-known system fonts.
/// Returns the font that was loaded, or `None` if no font could be found;
/// charts are then drawn without any text.
pub fn load_font(path: Option<&Path>) -> Result<Option<PathBuf>> {
    let candidates = match path {
        Some(path) => vec![path.to_path_buf()],
        None => FONT_CANDIDATES.iter().map(PathBuf::from).collect(),
    };
    for candidate in candidates {
        let bytes = match std::fs::read(&candidate) {
            Ok(bytes) => bytes,
            Err(_) if path.is_none() => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("reading font {}", candidate.display()))
            }
        };

        // Registered fonts live for the rest of the process
        let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
        plotters::style::register_font("sans-serif", FontStyle::Normal, bytes)
            .map_err(|_| anyhow::format_err!("invalid font {}", candidate.display()))?;
        return Ok(Some(candidate));
    }
    Ok(None)
}

/// Renders charts to a PNG file at a fixed path.
pub struct PngChart {
    path: PathBuf,
    width: u32,
    height: u32,

    /// Whether to draw axis labels and the legend; requires a loaded font.
    text: bool,
}

impl PngChart {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        PngChart {
            path: path.into(),
            width: CHART_WIDTH,
            height: CHART_HEIGHT,
            text: false,
        }
    }

    pub fn with_text(mut self, enabled: bool) -> Self {
        self.text = enabled;
        self
    }
}

#[async_trait]
impl ChartRenderer for PngChart {
    async fn render(&self, chart: Chart) -> Result<()> {
        let (width, height, text) = (self.width, self.height, self.text);
        let png = async_std::task::spawn_blocking(move || rasterize(&chart, width, height, text))
            .await
            .context("rendering chart")?;
        replace_file(&self.path, &png)
            .await
            .with_context(|| format!("writing chart to {}", self.path.display()))?;
        Ok(())
    }
}

/// Draw the chart and encode it as a PNG
pub fn rasterize(chart: &Chart, width: u32, height: u32, text: bool) -> Result<Vec<u8>> {
    let mut pixels = vec![0u8; (width * height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (width, height)).into_drawing_area();
        draw(chart, &root, text)
            .map_err(|err| anyhow::format_err!("failed to draw chart: {}", err))?;
    }

    let mut png = Vec::new();
    image::codecs::png::PngEncoder::new(&mut png)
        .write_image(&pixels, width, height, image::ColorType::Rgb8)
        .context("encoding chart as png")?;
    Ok(png)
}

type DrawResult<'a> =
    std::result::Result<(), DrawingAreaErrorKind<<BitMapBackend<'a> as DrawingBackend>::ErrorType>>;

fn draw<'a>(chart: &Chart, root: &DrawingArea<BitMapBackend<'a>, Shift>, text: bool) -> DrawResult<'a> {
    root.fill(&WHITE)?;

    // A zero-height axis can't be mapped to pixels, so an unset ceiling is drawn as 0..1
    let y_max = if chart.y_max > 0 { chart.y_max as f64 } else { 1.0 };
    let x_max = std::cmp::max(chart.labels.len().saturating_sub(1), 1);
    let (x_label_area, y_label_area) = if text { (40, 70) } else { (0, 0) };
    let mut ctx = ChartBuilder::on(root)
        .margin(20)
        .x_label_area_size(x_label_area)
        .y_label_area_size(y_label_area)
        .build_cartesian_2d(0usize..x_max, 0f64..y_max)?;

    let labels = &chart.labels;
    let label_category = |i: &usize| labels.get(*i).cloned().unwrap_or_default();
    if text {
        ctx.configure_mesh()
            .x_labels(std::cmp::min(labels.len(), 12))
            .x_label_formatter(&label_category)
            .draw()?;
    } else {
        ctx.plotting_area().draw(&Rectangle::new(
            [(0, 0.0), (x_max, y_max)],
            BLACK.stroke_width(1),
        ))?;
    }

    let points = chart.points();
    if !points.is_empty() {
        let series = ctx.draw_series(
            AreaSeries::new(points, 0.0, STROKE.mix(FILL_OPACITY)).border_style(STROKE),
        )?;
        if text {
            series
                .label(SERIES_NAME)
                .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], STROKE.filled()));
            ctx.configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()?;
        }
    }

    root.present()?;
    Ok(())
}
