//! MCL: run Monte Carlo Localization scenarios in synthetic occupancy-grid rooms.
//!
//! - `run`: load a scenario configuration (TOML/JSON/YAML), run the particle filter against it, and write one
//!   CSV row per filter cycle.
//! - `config`: write a template scenario configuration to start from.
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{LevelFilter, error, info};
use mcl::config::ConfigFile;
use mcl::sim::{LocalizationRecord, SimulationConfig, run_simulation};
use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};

const LONG_ABOUT: &str = "MCL: Monte Carlo Localization in occupancy-grid maps.

A population of pose hypotheses is scored by comparing the range scan each would see, computed by ray casting
through the grid, against the observed scan, and is then resampled in proportion to score.

Scenarios (room layout, ground-truth trajectory, filter settings) are loaded from a configuration file
(TOML/JSON/YAML). Use the `config` subcommand to write a template.";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "Monte Carlo Localization in occupancy-grid maps.", long_about = LONG_ABOUT)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log verbosity
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}
impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> LevelFilter {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand, Clone)]
enum Command {
    #[command(about = "Run a localization scenario from a configuration file")]
    Run(RunArgs),
    #[command(about = "Write a template scenario configuration")]
    Config(ConfigArgs),
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Scenario configuration file (TOML/JSON/YAML)
    #[arg(short, long)]
    config: PathBuf,
    /// Output CSV file for per-cycle results
    #[arg(short, long)]
    output: PathBuf,
    /// Override the number of particles
    #[arg(long)]
    particles: Option<usize>,
    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,
    /// Log a population summary after every update
    #[arg(long)]
    diagnostics: bool,
}

#[derive(Args, Clone, Debug)]
struct ConfigArgs {
    /// Where to write the template; the extension selects the format
    #[arg(short, long, default_value = "mcl.toml")]
    output: PathBuf,
}

/// Route `log` records to stderr, or append them to `log_file` when one is given.
///
/// Lines carry a millisecond local timestamp, the level and the emitting module.
fn init_logger(level: LevelFilter, log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let target = match log_file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            env_logger::Target::Pipe(Box::new(file))
        }
        None => env_logger::Target::Stderr,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .target(target)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}: {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()?;
    Ok(())
}

fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    info!("Loading configuration from {}", args.config.display());
    let mut config = SimulationConfig::from_file(&args.config)?;
    if let Some(n) = args.particles {
        config.filter.n_particles = n;
    }
    if let Some(seed) = args.seed {
        config.filter.seed = seed;
    }
    config.filter.diagnostics |= args.diagnostics;
    info!(
        "Running {} iterations with {} particles in a {} x {} m room",
        config.iterations, config.filter.n_particles, config.room.width, config.room.height
    );

    let records = run_simulation(&config)?;
    if let Some(parent) = args.output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    LocalizationRecord::to_csv(&records, &args.output)?;
    info!("Results written to {}", args.output.display());

    if let Some(last) = records.last() {
        let tail = &records[records.len() - (records.len() / 4).max(1)..];
        let mean_error = tail.iter().map(|r| r.position_error).sum::<f64>() / tail.len() as f64;
        info!(
            "Final position error {:.3} m, heading error {:.3} rad; mean position error over last {} cycles {:.3} m",
            last.position_error,
            last.heading_error,
            tail.len(),
            mean_error
        );
    }
    Ok(())
}

fn write_template(args: &ConfigArgs) -> Result<(), Box<dyn Error>> {
    SimulationConfig::default().to_file(&args.output)?;
    info!("Template configuration written to {}", args.output.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logger(cli.log_level.into(), cli.log_file.as_deref())?;

    let result = match &cli.command {
        Command::Run(args) => run(args),
        Command::Config(args) => write_template(args),
    };
    if let Err(e) = &result {
        error!("{}", e);
    }
    result
}
