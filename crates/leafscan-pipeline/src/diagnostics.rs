//! Pipeline diagnostics: timing and parameters for each preprocessing
//! stage.
//!
//! These are permanent instrumentation for parameter tuning. The bench
//! CLI prints [`PipelineDiagnostics::report`] or the JSON form.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::deadline::Deadline;
use crate::pipeline::{Pipeline, PipelineStage};
use crate::types::{PipelineError, PreprocessConfig, StagedResult};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single preprocessing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: image decoding.
    pub decode: StageDiagnostics,
    /// Stage 2: gray-world white balance.
    pub white_balance: StageDiagnostics,
    /// Stage 3: CLAHE contrast enhancement.
    pub contrast: StageDiagnostics,
    /// Stage 4: non-local-means denoising.
    pub denoise: StageDiagnostics,
    /// Stage 5: unsharp mask.
    pub sharpen: StageDiagnostics,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Photo size.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Image decoding metrics.
    Decode {
        /// Size of the input image bytes.
        input_bytes: usize,
        /// Decoded image width in pixels.
        width: u32,
        /// Decoded image height in pixels.
        height: u32,
        /// Total pixel count (`width * height`).
        pixel_count: u64,
    },
    /// White balance metrics.
    WhiteBalance {
        /// Gains applied to R, G, B.
        gains: [f64; 3],
    },
    /// CLAHE parameters.
    Contrast {
        /// Clip limit.
        clip_limit: f32,
        /// Tiles per axis.
        grid: u32,
    },
    /// Non-local-means parameters.
    Denoise {
        /// Luminance strength.
        h: f32,
        /// Chrominance strength.
        h_color: f32,
        /// Patch side length.
        template_window: u32,
        /// Search area side length.
        search_window: u32,
    },
    /// Unsharp mask parameters.
    Sharpen {
        /// Blur sigma.
        sigma: f32,
        /// Weight of the original image.
        amount: f32,
    },
}

/// High-level summary for the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Photo width in pixels.
    pub image_width: u32,
    /// Photo height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Decode", &self.decode),
            ("White Balance", &self.white_balance),
            ("Contrast (CLAHE)", &self.contrast),
            ("Denoise (NLM)", &self.denoise),
            ("Sharpen", &self.sharpen),
        ];
        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
            ..
        } => format!("{input_bytes} bytes -> {width}x{height}"),
        StageMetrics::WhiteBalance { gains: [r, g, b] } => {
            format!("gains r={r:.3} g={g:.3} b={b:.3}")
        }
        StageMetrics::Contrast { clip_limit, grid } => {
            format!("clip={clip_limit:.2} grid={grid}x{grid}")
        }
        StageMetrics::Denoise {
            h,
            h_color,
            template_window,
            search_window,
        } => format!("h={h:.1} h_color={h_color:.1} template={template_window} search={search_window}"),
        StageMetrics::Sharpen { sigma, amount } => format!("sigma={sigma:.2} amount={amount:.2}"),
    }
}

/// Time one stage transition and read its metrics.
fn timed<S: PipelineStage>(
    step: impl FnOnce() -> Result<S, PipelineError>,
) -> Result<(S, StageDiagnostics), PipelineError> {
    let start = Instant::now();
    let stage = step()?;
    let duration = start.elapsed();
    tracing::debug!(stage = S::NAME, ms = duration_ms(duration), "stage finished");
    let metrics = stage.metrics();
    Ok((stage, StageDiagnostics { duration, metrics }))
}

/// Run the full preprocessing pipeline, timing every stage.
///
/// # Errors
///
/// Same as [`Pending::decode`](crate::pipeline::Pending::decode) and
/// the later fallible stages: invalid configuration, unreadable image,
/// or [`PipelineError::Timeout`] when `deadline` passes.
pub fn process_staged_with_diagnostics(
    image_bytes: &[u8],
    config: &PreprocessConfig,
    deadline: &Deadline,
) -> Result<(StagedResult, PipelineDiagnostics), PipelineError> {
    let total_start = Instant::now();
    let pending = Pipeline::with_deadline(image_bytes.to_vec(), config.clone(), *deadline);

    let (decoded, decode) = timed(|| pending.decode())?;
    let (balanced, white_balance) = timed(|| Ok(decoded.balance()))?;
    let (enhanced, contrast) = timed(|| Ok(balanced.enhance()))?;
    let (denoised, denoise) = timed(|| enhanced.denoise())?;
    let (sharpened, sharpen) = timed(|| denoised.sharpen())?;

    let dimensions = sharpened.dimensions();
    let result = sharpened.into_result();
    let diagnostics = PipelineDiagnostics {
        decode,
        white_balance,
        contrast,
        denoise,
        sharpen,
        total_duration: total_start.elapsed(),
        summary: PipelineSummary {
            image_width: dimensions.width,
            image_height: dimensions.height,
            pixel_count: dimensions.pixel_count(),
        },
    };
    tracing::info!(
        width = dimensions.width,
        height = dimensions.height,
        total_ms = duration_ms(diagnostics.total_duration),
        "preprocessing finished"
    );
    Ok((result, diagnostics))
}
