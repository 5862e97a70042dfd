use clap::Parser;
use pivcorr::load_gray_image;
use pivcorr::{
    CorrelationMode, CpuBackend, FieldMetadata, Interpolation, NeighbourTest, PassConfig,
    PassSummary, PeakConfig, PeakFit, PivConfig, PivOutput, PivProcessor, ReplaceMethod,
    ShiftScheme, SnrMethod, ValidationConfig,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "pivcorr CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for per-pass diagnostics.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
enum CorrelationConfig {
    Direct,
    Fft,
    Auto,
}

impl From<CorrelationConfig> for CorrelationMode {
    fn from(value: CorrelationConfig) -> Self {
        match value {
            CorrelationConfig::Direct => CorrelationMode::Direct,
            CorrelationConfig::Fft => CorrelationMode::Fft,
            CorrelationConfig::Auto => CorrelationMode::Auto,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PeakFitConfig {
    Gaussian,
    Parabolic,
    Centroid,
}

impl From<PeakFitConfig> for PeakFit {
    fn from(value: PeakFitConfig) -> Self {
        match value {
            PeakFitConfig::Gaussian => PeakFit::Gaussian,
            PeakFitConfig::Parabolic => PeakFit::Parabolic,
            PeakFitConfig::Centroid => PeakFit::Centroid,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SnrMethodConfig {
    PeakToPeak,
    PeakToMean,
}

impl From<SnrMethodConfig> for SnrMethod {
    fn from(value: SnrMethodConfig) -> Self {
        match value {
            SnrMethodConfig::PeakToPeak => SnrMethod::PeakToPeak,
            SnrMethodConfig::PeakToMean => SnrMethod::PeakToMean,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum NeighbourTestConfig {
    Median,
    Mean,
    Rms,
}

impl From<NeighbourTestConfig> for NeighbourTest {
    fn from(value: NeighbourTestConfig) -> Self {
        match value {
            NeighbourTestConfig::Median => NeighbourTest::Median,
            NeighbourTestConfig::Mean => NeighbourTest::Mean,
            NeighbourTestConfig::Rms => NeighbourTest::Rms,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ReplaceConfig {
    WeightedMean,
    Median,
}

impl From<ReplaceConfig> for ReplaceMethod {
    fn from(value: ReplaceConfig) -> Self {
        match value {
            ReplaceConfig::WeightedMean => ReplaceMethod::WeightedMean,
            ReplaceConfig::Median => ReplaceMethod::Median,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum InterpolationConfig {
    Nearest,
    Bilinear,
}

impl From<InterpolationConfig> for Interpolation {
    fn from(value: InterpolationConfig) -> Self {
        match value {
            InterpolationConfig::Nearest => Interpolation::Nearest,
            InterpolationConfig::Bilinear => Interpolation::Bilinear,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ShiftSchemeConfig {
    Forward,
    Central,
}

impl From<ShiftSchemeConfig> for ShiftScheme {
    fn from(value: ShiftSchemeConfig) -> Self {
        match value {
            ShiftSchemeConfig::Forward => ShiftScheme::Forward,
            ShiftSchemeConfig::Central => ShiftScheme::Central,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PassJson {
    window_size: usize,
    overlap: f32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct PeakJson {
    fit: PeakFitConfig,
    snr_method: SnrMethodConfig,
    exclusion_radius: usize,
}

impl Default for PeakJson {
    fn default() -> Self {
        let cfg = PeakConfig::default();
        Self {
            fit: PeakFitConfig::Gaussian,
            snr_method: SnrMethodConfig::PeakToPeak,
            exclusion_radius: cfg.exclusion_radius,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ValidationJson {
    snr_threshold: f32,
    neighbour_test: NeighbourTestConfig,
    median_tolerance: f32,
    median_epsilon: f32,
    neighborhood_radius: usize,
    replace: ReplaceConfig,
    iterations: usize,
}

impl Default for ValidationJson {
    fn default() -> Self {
        let cfg = ValidationConfig::default();
        Self {
            snr_threshold: cfg.snr_threshold,
            neighbour_test: NeighbourTestConfig::Median,
            median_tolerance: cfg.median_tolerance,
            median_epsilon: cfg.median_epsilon,
            neighborhood_radius: cfg.neighborhood_radius,
            replace: ReplaceConfig::WeightedMean,
            iterations: cfg.iterations,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
#[serde(default)]
struct MetadataJson {
    pixel_scale: f32,
    origin: (f32, f32),
    dt: f32,
}

impl Default for MetadataJson {
    fn default() -> Self {
        let meta = FieldMetadata::default();
        Self {
            pixel_scale: meta.pixel_scale,
            origin: meta.origin,
            dt: meta.dt,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Config {
    frame_a: String,
    frame_b: String,
    output_path: Option<String>,
    passes: Vec<PassJson>,
    max_passes: usize,
    correlation: CorrelationConfig,
    memory_budget_mb: usize,
    batch_size: Option<usize>,
    parallel: bool,
    peak: PeakJson,
    validation: ValidationJson,
    interpolation: InterpolationConfig,
    shift_scheme: ShiftSchemeConfig,
    deform: bool,
    smoothing: Option<f32>,
    trust_first_pass: bool,
    early_stop_tolerance: Option<f32>,
    metadata: MetadataJson,
}

impl Default for Config {
    fn default() -> Self {
        let cfg = PivConfig::default();
        Self {
            frame_a: String::new(),
            frame_b: String::new(),
            output_path: None,
            passes: cfg
                .passes
                .iter()
                .map(|p| PassJson {
                    window_size: p.window_size,
                    overlap: p.overlap,
                })
                .collect(),
            max_passes: cfg.max_passes,
            correlation: CorrelationConfig::Auto,
            memory_budget_mb: 256,
            batch_size: cfg.batch_size,
            parallel: cfg.parallel,
            peak: PeakJson::default(),
            validation: ValidationJson::default(),
            interpolation: InterpolationConfig::Bilinear,
            shift_scheme: ShiftSchemeConfig::Central,
            deform: cfg.deform,
            smoothing: cfg.smoothing,
            trust_first_pass: cfg.trust_first_pass,
            early_stop_tolerance: cfg.early_stop_tolerance,
            metadata: MetadataJson::default(),
        }
    }
}

impl Config {
    fn piv_config(self) -> PivConfig {
        PivConfig {
            passes: self
                .passes
                .into_iter()
                .map(|p| PassConfig::new(p.window_size, p.overlap))
                .collect(),
            max_passes: self.max_passes,
            peak: PeakConfig {
                fit: self.peak.fit.into(),
                snr_method: self.peak.snr_method.into(),
                exclusion_radius: self.peak.exclusion_radius,
            },
            validation: ValidationConfig {
                snr_threshold: self.validation.snr_threshold,
                neighbour_test: self.validation.neighbour_test.into(),
                median_tolerance: self.validation.median_tolerance,
                median_epsilon: self.validation.median_epsilon,
                neighborhood_radius: self.validation.neighborhood_radius,
                replace: self.validation.replace.into(),
                iterations: self.validation.iterations,
            },
            interpolation: self.interpolation.into(),
            shift_scheme: self.shift_scheme.into(),
            deform: self.deform,
            smoothing: self.smoothing,
            trust_first_pass: self.trust_first_pass,
            early_stop_tolerance: self.early_stop_tolerance,
            batch_size: self.batch_size,
            parallel: self.parallel,
            metadata: FieldMetadata {
                pixel_scale: self.metadata.pixel_scale,
                origin: self.metadata.origin,
                dt: self.metadata.dt,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct GridRecord {
    window_size: usize,
    overlap: f32,
    spacing: usize,
    rows: usize,
    cols: usize,
}

#[derive(Debug, Serialize)]
struct PassRecord {
    pass: usize,
    window_size: usize,
    overlap: f32,
    rows: usize,
    cols: usize,
    residual: f32,
    invalid: usize,
    replaced: usize,
    unresolved: usize,
    degenerate: usize,
}

impl From<&PassSummary> for PassRecord {
    fn from(value: &PassSummary) -> Self {
        Self {
            pass: value.pass,
            window_size: value.window_size,
            overlap: value.overlap,
            rows: value.rows,
            cols: value.cols,
            residual: value.residual,
            invalid: value.invalid,
            replaced: value.replaced,
            unresolved: value.unresolved,
            degenerate: value.degenerate,
        }
    }
}

#[derive(Debug, Serialize)]
struct VectorRecord {
    row: usize,
    col: usize,
    x: f32,
    y: f32,
    dx: f32,
    dy: f32,
    u: f32,
    v: f32,
    snr: f32,
    valid: bool,
    replaced: bool,
    unresolved: bool,
    low_confidence: bool,
}

#[derive(Debug, Serialize)]
struct Output {
    grid: GridRecord,
    metadata: MetadataJson,
    passes: Vec<PassRecord>,
    unresolved: Vec<(usize, usize)>,
    vectors: Vec<VectorRecord>,
}

impl From<&PivOutput> for Output {
    fn from(out: &PivOutput) -> Self {
        let vectors = out
            .field
            .iter()
            .map(|(row, col, vec)| {
                let (x, y) = out.coordinates(row, col).unwrap_or_default();
                let (u, v) = out.velocity(row, col).unwrap_or_default();
                VectorRecord {
                    row,
                    col,
                    x,
                    y,
                    dx: vec.dx,
                    dy: vec.dy,
                    u,
                    v,
                    snr: vec.snr,
                    valid: vec.status.valid,
                    replaced: vec.status.replaced,
                    unresolved: vec.status.unresolved,
                    low_confidence: vec.status.low_confidence,
                }
            })
            .collect();
        Self {
            grid: GridRecord {
                window_size: out.grid.window_size(),
                overlap: out.grid.overlap(),
                spacing: out.grid.spacing(),
                rows: out.grid.rows(),
                cols: out.grid.cols(),
            },
            metadata: MetadataJson {
                pixel_scale: out.metadata.pixel_scale,
                origin: out.metadata.origin,
                dt: out.metadata.dt,
            },
            passes: out.passes.iter().map(PassRecord::from).collect(),
            unresolved: out.unresolved.clone(),
            vectors,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("pivcorr=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.frame_a.is_empty() || config.frame_b.is_empty() {
        return Err("frame_a and frame_b must be set in the config".into());
    }

    let frame_a = load_gray_image(&config.frame_a)?;
    let frame_b = load_gray_image(&config.frame_b)?;

    let backend = CpuBackend::new()
        .with_mode(config.correlation.into())
        .with_parallel(config.parallel)
        .with_memory_budget(config.memory_budget_mb.saturating_mul(1024 * 1024));
    let output_path = config.output_path.clone();
    let processor = PivProcessor::with_backend(config.piv_config(), backend);

    let result = processor.process(frame_a.view(), frame_b.view())?;
    if !result.unresolved.is_empty() {
        tracing::warn!(count = result.unresolved.len(), "unresolved vectors in output");
    }
    let json = serde_json::to_string_pretty(&Output::from(&result))?;

    match output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
