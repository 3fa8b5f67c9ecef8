use std::{fs, path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand, ValueEnum};
use design_fidelity::{
    ComparisonInputs, FidelityEngine,
    cancel::CancellationToken,
    config::FidelityConfig,
    error::Result,
    input::{
        ImageSource,
        layout::{LayoutMetadata, RegionSpec},
    },
    iteration::{IterationState, IterationStatus},
    report::{
        FidelityReport, MetricExport, TrendSummary,
        visualization::{DiffStyle, VisualizationConfig, Visualizer},
    },
};
use log::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "design-fidelity")]
#[command(version, about = "Compare a UI implementation screenshot against its design", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one implementation attempt and advance the refinement loop
    Compare(CompareArgs),
}

#[derive(Args)]
struct CompareArgs {
    /// Reference design image
    #[arg(value_name = "DESIGN")]
    design: PathBuf,

    /// Implementation screenshot
    #[arg(value_name = "IMPL")]
    implementation: PathBuf,

    /// Region boxes (JSON array or {"regions": [...]})
    #[arg(long, value_name = "FILE")]
    regions: Option<PathBuf>,

    /// Layout metadata ({"elements": [...]})
    #[arg(long, value_name = "FILE")]
    layout: Option<PathBuf>,

    /// Engine configuration (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Fraction of differing pixels still considered a match, e.g. 0.005
    #[arg(long, value_name = "FRACTION")]
    tolerance: Option<f64>,

    #[arg(long, value_name = "N")]
    max_iterations: Option<u32>,

    /// Score (0-100) at which the loop converges
    #[arg(long, value_name = "SCORE")]
    convergence: Option<u32>,

    /// Iteration state to resume and update
    #[arg(long, value_name = "FILE")]
    state: Option<PathBuf>,

    /// Write the full JSON report here
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Append one JSON line of metrics per iteration
    #[arg(long, value_name = "FILE")]
    trend: Option<PathBuf>,

    /// Write a diff visualization PNG
    #[arg(long, value_name = "FILE")]
    diff_output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = DiffStyleArg::Overlay)]
    diff_style: DiffStyleArg,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum DiffStyleArg {
    /// Heat map over the design
    Overlay,
    /// Design, implementation and heat map in one strip
    SideBySide,
}

impl From<DiffStyleArg> for DiffStyle {
    fn from(arg: DiffStyleArg) -> Self {
        match arg {
            DiffStyleArg::Overlay => DiffStyle::Overlay,
            DiffStyleArg::SideBySide => DiffStyle::SideBySide,
        }
    }
}

const EXIT_INPUT_ERROR: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Compare(args) => run_compare(&args),
    };

    match result {
        Ok(status) => ExitCode::from(exit_code(status)),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(EXIT_INPUT_ERROR)
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code(status: IterationStatus) -> u8 {
    match status {
        IterationStatus::Converged => 0,
        IterationStatus::MaxIterationsReached | IterationStatus::Stalled | IterationStatus::Escalated => 1,
        IterationStatus::Running => 3,
    }
}

fn build_config(args: &CompareArgs) -> Result<FidelityConfig> {
    let mut config = match &args.config {
        Some(path) => FidelityConfig::from_json_file(path)?,
        None => FidelityConfig::default(),
    };

    if let Some(tolerance) = args.tolerance {
        config.thresholds = config.thresholds.with_pixel_tolerance(tolerance)?;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.iteration.max_iterations = max_iterations;
    }
    if let Some(convergence) = args.convergence {
        config.iteration.convergence_threshold = convergence;
    }

    Ok(config)
}

fn run_compare(args: &CompareArgs) -> Result<IterationStatus> {
    let engine = FidelityEngine::with_config(build_config(args)?)?;

    let mut controller = match &args.state {
        Some(path) if path.exists() => engine.resume_controller(IterationState::load(path)?)?,
        _ => engine.controller()?,
    };

    let state = controller.state();
    if state.status.is_terminal() {
        warn!(
            "refinement loop already finished with status {:?} after {} iterations; nothing compared",
            state.status, state.iteration
        );
        match args.format {
            OutputFormat::Text => println!(
                "Refinement loop already finished: {:?} after {} iterations",
                state.status, state.iteration
            ),
            OutputFormat::Json => println!("{}", state.to_json()?),
        }
        return Ok(state.status);
    }

    let inputs = ComparisonInputs {
        regions: args.regions.as_ref().map(RegionSpec::load_list).transpose()?,
        layout: args.layout.as_ref().map(LayoutMetadata::from_json_file).transpose()?,
        retain_images: args.diff_output.is_some(),
    };

    let outcome = engine.run_iteration(
        &mut controller,
        &ImageSource::path(&args.design),
        &ImageSource::path(&args.implementation),
        &inputs,
        &CancellationToken::new(),
    )?;

    let state = controller.state();
    info!("iteration {} finished with status {:?}", state.iteration, state.status);

    if let Some(path) = &args.state {
        state.save(path)?;
    }

    let report = FidelityReport::new(&outcome.comparison, state);
    if let Some(path) = &args.report {
        report.write_json(path)?;
    }

    if let Some(path) = &args.trend {
        MetricExport::from_report(&report).append(path)?;
        let summary = TrendSummary::from_exports(&MetricExport::read_all(path)?);
        info!(
            "trend over {} iterations: {} -> {} (mean {:.1}, sd {:.1})",
            summary.iterations, summary.first, summary.last, summary.mean, summary.std_dev
        );
    }

    if let Some(path) = &args.diff_output {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Visualizer::with_config(VisualizationConfig {
            style: args.diff_style.into(),
            ..Default::default()
        })
        .save(&outcome.comparison, path)?;
    }

    match args.format {
        OutputFormat::Text => print!("{}", report.render_text()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    Ok(state.status)
}
