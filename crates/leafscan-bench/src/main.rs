//! leafscan-bench: CLI tool for preprocessing parameter experimentation
//! and mask inspection.
//!
//! Runs the preprocessing pipeline on one or more photos with
//! configurable parameters, printing per-stage diagnostics. Useful for:
//!
//! - Tuning CLAHE, denoising, and sharpening parameters
//! - Measuring per-stage durations to identify bottlenecks
//! - Checking whether a photo passes the leaf-green check
//! - Decoding a saved model output tensor into mask, statistics, and
//!   overlay images
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin leafscan-bench -- [OPTIONS] <IMAGES>...
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use leafscan_pipeline::diagnostics::PipelineDiagnostics;
use leafscan_pipeline::{
    Deadline, DenoiseParams, InferenceTensor, Mask, MaskStats, PreprocessConfig, RgbImage,
    StagedResult,
};
use serde::{Deserialize, Serialize};

/// Preprocessing diagnostics and mask inspection for leafscan.
///
/// Each photo is decoded, white balanced, contrast enhanced, denoised,
/// and sharpened; per-stage timings are printed. A batch keeps going
/// when one photo fails and exits with failure at the end.
#[derive(Parser)]
#[command(name = "leafscan-bench", version)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input photos (PNG, JPEG, BMP, WebP).
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// CLAHE clip limit.
    #[arg(long, default_value_t = PreprocessConfig::DEFAULT_CLAHE_CLIP_LIMIT)]
    clahe_clip_limit: f32,

    /// CLAHE tiles per axis.
    #[arg(long, default_value_t = PreprocessConfig::DEFAULT_CLAHE_GRID, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    clahe_grid: u32,

    /// Non-local-means strength for luminance.
    #[arg(long, default_value_t = DenoiseParams::DEFAULT_H)]
    denoise_h: f32,

    /// Non-local-means strength for chrominance.
    #[arg(long, default_value_t = DenoiseParams::DEFAULT_H_COLOR)]
    denoise_h_color: f32,

    /// Non-local-means patch side length (odd).
    #[arg(long, default_value_t = DenoiseParams::DEFAULT_TEMPLATE_WINDOW)]
    template_window: u32,

    /// Non-local-means search area side length (odd).
    #[arg(long, default_value_t = DenoiseParams::DEFAULT_SEARCH_WINDOW)]
    search_window: u32,

    /// Unsharp-mask blur sigma.
    #[arg(long, default_value_t = PreprocessConfig::DEFAULT_SHARPEN_SIGMA)]
    sharpen_sigma: f32,

    /// Unsharp-mask weight of the original image (at least 1.0).
    #[arg(long, default_value_t = PreprocessConfig::DEFAULT_SHARPEN_AMOUNT)]
    sharpen_amount: f32,

    /// Full preprocessing config as a JSON string.
    ///
    /// When provided, all other preprocessing flags are ignored. Missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Time budget per run, in seconds.
    #[arg(long, allow_negative_numbers = true)]
    timeout_secs: Option<f64>,

    /// Number of runs per photo for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Print one JSON report per photo instead of the human-readable
    /// report.
    #[arg(long)]
    json: bool,

    /// Directory for output images (`<stem>_preprocessed.png`, ...).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Also write every intermediate stage image to `--output-dir`.
    #[arg(long, requires = "output_dir")]
    dump_stages: bool,

    /// Report whether each photo passes the leaf-green check.
    #[arg(long)]
    leaf_check: bool,

    /// Minimum green share, in percent, for the leaf check.
    #[arg(long, default_value_t = leafscan_pipeline::leaf::DEFAULT_MIN_GREEN_PERCENT)]
    min_green_percent: f64,

    /// Saved model output: JSON `{ "shape": [...], "data": [...] }`.
    ///
    /// The tensor is decoded into a mask, resized to each photo's
    /// resolution, and summarized.
    #[arg(long)]
    tensor_json: Option<PathBuf>,

    /// Mask opacity for the overlay image.
    #[arg(long, default_value_t = leafscan_pipeline::visualize::DEFAULT_OVERLAY_ALPHA)]
    overlay_alpha: f32,
}

/// On-disk form of a model output tensor.
#[derive(Deserialize)]
struct TensorFile {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// Leaf check outcome for the JSON report.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LeafVerdict {
    is_leaf: bool,
    green_percent: f64,
}

/// Everything reported for one photo with `--json`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageReport<'a> {
    image: String,
    diagnostics: &'a PipelineDiagnostics,
    #[serde(skip_serializing_if = "Option::is_none")]
    leaf: Option<LeafVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mask_stats: Option<MaskStats>,
}

/// Build a [`PreprocessConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<PreprocessConfig, String> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        PreprocessConfig {
            clahe_clip_limit: cli.clahe_clip_limit,
            clahe_grid: cli.clahe_grid,
            denoise: DenoiseParams {
                h: cli.denoise_h,
                h_color: cli.denoise_h_color,
                template_window: cli.template_window,
                search_window: cli.search_window,
            },
            sharpen_sigma: cli.sharpen_sigma,
            sharpen_amount: cli.sharpen_amount,
        }
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn timeout_from_cli(cli: &Cli) -> Result<Option<Duration>, String> {
    cli.timeout_secs
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .map_err(|_| format!("--timeout-secs must be a non-negative number, got {secs}"))
        })
        .transpose()
}

fn leaf_verdict(photo: &RgbImage, min_green_percent: f64) -> LeafVerdict {
    let green_percent = leafscan_pipeline::leaf::green_percent(photo);
    LeafVerdict {
        is_leaf: leafscan_pipeline::leaf::meets_threshold(green_percent, min_green_percent),
        green_percent,
    }
}

/// Load and decode `--tensor-json` once for the whole batch.
fn load_mask(path: &Path) -> Result<Mask, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    let file: TensorFile = serde_json::from_str(&text)
        .map_err(|e| format!("Error parsing tensor {}: {e}", path.display()))?;
    let tensor = InferenceTensor::new(file.shape, file.data).map_err(|e| e.to_string())?;
    let mask = leafscan_pipeline::mask_decode::decode(&tensor).map_err(|e| e.to_string())?;
    tracing::info!(
        width = mask.width(),
        height = mask.height(),
        shape = ?tensor.shape(),
        "decoded tensor"
    );
    Ok(mask)
}

fn main() -> ExitCode {
    // `leafscan` matches both `leafscan_pipeline` and `leafscan_bench`.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("leafscan=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let (config, timeout) = match (config_from_cli(&cli), timeout_from_cli(&cli)) {
        (Ok(config), Ok(timeout)) => (config, timeout),
        (Err(msg), _) | (_, Err(msg)) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let mask = match cli.tensor_json.as_deref().map(load_mask).transpose() {
        Ok(mask) => mask,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(ref dir) = cli.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("Error creating {}: {e}", dir.display());
        return ExitCode::FAILURE;
    }

    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut failed = Vec::new();
    for path in &cli.images {
        if let Err(msg) = run_image(&cli, &config, timeout, mask.as_ref(), path) {
            eprintln!("{}: {msg}", path.display());
            tracing::warn!(image = %path.display(), error = %msg, "photo skipped");
            failed.push(path);
        }
    }

    if cli.images.len() > 1 {
        eprintln!(
            "Processed {} of {} photos",
            cli.images.len() - failed.len(),
            cli.images.len(),
        );
    }
    if failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        for path in &failed {
            eprintln!("  failed: {}", path.display());
        }
        ExitCode::FAILURE
    }
}

/// Process one photo: diagnostics runs, optional leaf check, optional
/// mask, and output files.
fn run_image(
    cli: &Cli,
    config: &PreprocessConfig,
    timeout: Option<Duration>,
    mask: Option<&Mask>,
    path: &Path,
) -> Result<(), String> {
    let image_bytes =
        std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    eprintln!("Image: {} ({} bytes)", path.display(), image_bytes.len());

    let mut all_diagnostics = Vec::with_capacity(cli.runs);
    let mut staged: Option<StagedResult> = None;
    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }
        let deadline = Deadline::from_budget(timeout);
        let (result, diagnostics) = leafscan_pipeline::diagnostics::process_staged_with_diagnostics(
            &image_bytes,
            config,
            &deadline,
        )
        .map_err(|e| format!("Pipeline error: {e}"))?;
        if !cli.json {
            println!("{}", diagnostics.report());
        }
        if staged.is_none() {
            staged = Some(result);
        }
        all_diagnostics.push(diagnostics);
    }

    let (Some(staged), Some(first)) = (staged, all_diagnostics.first()) else {
        return Err("no pipeline runs were performed".to_owned());
    };

    let leaf = cli
        .leaf_check
        .then(|| leaf_verdict(&staged.original, cli.min_green_percent));

    let full_mask = mask
        .map(|m| {
            leafscan_pipeline::mask::resize_nearest(
                m,
                staged.dimensions.width,
                staged.dimensions.height,
            )
        })
        .transpose()
        .map_err(|e| e.to_string())?;
    let mask_stats = full_mask.as_ref().map(leafscan_pipeline::stats::summarize);

    if cli.json {
        let report = ImageReport {
            image: path.display().to_string(),
            diagnostics: first,
            leaf,
            mask_stats,
        };
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Error serializing report: {e}"))?;
        println!("{json}");
    } else {
        if let Some(ref verdict) = leaf {
            println!(
                "Leaf check: {} ({:.1}% green, threshold {:.1}%)",
                if verdict.is_leaf { "leaf" } else { "not a leaf" },
                verdict.green_percent,
                cli.min_green_percent,
            );
        }
        if let Some(ref stats) = mask_stats {
            let json = serde_json::to_string_pretty(stats)
                .map_err(|e| format!("Error serializing mask stats: {e}"))?;
            println!("Mask stats: {json}");
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    if let Some(ref dir) = cli.output_dir {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("photo");
        write_outputs(cli, dir, stem, &staged, full_mask.as_ref())?;
    }

    eprintln!();
    Ok(())
}

fn save_rgb(img: &RgbImage, path: &Path) -> Result<(), String> {
    img.save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}

/// Write the preprocessed photo and, if requested, stage and mask images.
fn write_outputs(
    cli: &Cli,
    dir: &Path,
    stem: &str,
    staged: &StagedResult,
    mask: Option<&Mask>,
) -> Result<(), String> {
    save_rgb(&staged.sharpened, &dir.join(format!("{stem}_preprocessed.png")))?;

    if cli.dump_stages {
        for (name, image) in [
            ("balanced", &staged.balanced),
            ("enhanced", &staged.enhanced),
            ("denoised", &staged.denoised),
        ] {
            save_rgb(image, &dir.join(format!("{stem}_{name}.png")))?;
        }
    }

    if let Some(mask) = mask {
        let mask_path = dir.join(format!("{stem}_mask.png"));
        mask.as_gray()
            .save_with_format(&mask_path, image::ImageFormat::Png)
            .map_err(|e| format!("Error writing {}: {e}", mask_path.display()))?;
        eprintln!("Wrote {}", mask_path.display());

        let photo = &staged.original;
        save_rgb(
            &leafscan_pipeline::visualize::colorize(mask),
            &dir.join(format!("{stem}_colored.png")),
        )?;
        let overlay = leafscan_pipeline::visualize::overlay(photo, mask, cli.overlay_alpha)
            .map_err(|e| e.to_string())?;
        save_rgb(&overlay, &dir.join(format!("{stem}_overlay.png")))?;
        let diseased = leafscan_pipeline::visualize::extract_diseased(photo, mask)
            .map_err(|e| e.to_string())?;
        save_rgb(&diseased, &dir.join(format!("{stem}_diseased.png")))?;
    }
    Ok(())
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&PipelineDiagnostics) -> Duration;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Decode", |d| d.decode.duration),
        ("White Balance", |d| d.white_balance.duration),
        ("Contrast (CLAHE)", |d| d.contrast.duration),
        ("Denoise (NLM)", |d| d.denoise.duration),
        ("Sharpen", |d| d.sharpen.duration),
    ];

    for (name, extractor) in stage_extractors {
        let stage_mean = all_diagnostics
            .iter()
            .map(|d| extractor(d).as_secs_f64() * 1000.0)
            .sum::<f64>()
            / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}
