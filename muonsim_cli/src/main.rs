//! Muon monitor simulation CLI.
//!
//! Subcommands mirror the monitor's batch workflows: plain simulation
//! with table/raw/JSON output, comparison against experimental
//! frequency data, directional efficiency scans and sky-map
//! reconstruction.

mod output;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use muonsim_core::experiment::{compare, read_data};
use muonsim_core::skymap::{load_map, reconstruct};
use muonsim_core::{
    efficiency, EmpiricalDistribution, Geometry, SimError, SimulationRun, TrackGenerator,
};

/// Cosmic-ray muon simulation for the pixelated monitor.
#[derive(Parser, Debug)]
#[command(name = "muonsim")]
#[command(about = "Simulate cosmic-ray muons through the multi-layer monitor", long_about = None)]
struct Args {
    /// Detector map file
    #[arg(short, long)]
    geometry: PathBuf,

    /// Efficiency calibration file
    #[arg(short, long)]
    efficiencies: Option<PathBuf>,

    /// Master seed for reproducible runs
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate a batch of muons and summarize it per hit pattern
    Simulate {
        /// Number of simulated muons
        #[arg(short, long, default_value = "100000")]
        num: u64,

        /// Output format
        #[arg(short = 'F', long, value_enum, default_value = "table")]
        format: Format,

        /// Keep only counters with this pixel multiplicity
        #[arg(short, long)]
        multiplicity: Option<usize>,

        /// Sample directions from a sky-map file instead of the uniform
        /// distribution
        #[arg(long)]
        distribution: Option<PathBuf>,
    },

    /// Compare a simulated batch against experimental frequency data
    EvalData {
        /// Experiment data file
        #[arg(short, long)]
        data_file: PathBuf,

        /// Number of simulated muons
        #[arg(short, long, default_value = "100000")]
        num: u64,

        /// Keep only counters with this pixel multiplicity
        #[arg(short, long)]
        multiplicity: Option<usize>,
    },

    /// Scan directional detection efficiency over the upper hemisphere
    Efficiency {
        /// Muons per grid direction
        #[arg(short, long, default_value = "10000")]
        num: u64,

        /// Multiplicity threshold for a detected crossing
        #[arg(short, long, default_value = "3")]
        min_multiplicity: usize,
    },

    /// Reconstruct the angular flux map
    SkyMap {
        /// Number of simulated muons per pass
        #[arg(short, long, default_value = "100000")]
        num: u64,

        /// Experiment data file for reweighting
        #[arg(short, long)]
        data_file: Option<PathBuf>,

        /// Angular bin size in degrees
        #[arg(short, long, default_value = "1.0")]
        bin_size: f64,

        /// Run a second pass seeded by the first map
        #[arg(long)]
        second_iteration: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Table,
    Raw,
    Json,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if let Err(e) = run(args) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), SimError> {
    let geometry = Geometry::from_files(&args.geometry, args.efficiencies.as_deref())?;
    info!(pixels = geometry.len(), seed = args.seed, "geometry loaded");

    let mut out = open_output(args.out.as_ref())?;

    match args.command {
        Command::Simulate {
            num,
            format,
            multiplicity,
            distribution,
        } => {
            let generator = match distribution {
                Some(path) => {
                    info!(path = %path.display(), "using muon angle distribution from file");
                    let rows = load_map(BufReader::new(File::open(path)?))?;
                    TrackGenerator::Empirical(EmpiricalDistribution::new(rows, 1.0)?)
                }
                None => TrackGenerator::uniform(),
            };
            let run = SimulationRun::new(&geometry, &generator, args.seed);
            info!(num, "starting simulation");

            match format {
                Format::Table => {
                    let registry = run.simulate_n(num)?;
                    output::write_table(&mut out, &registry, multiplicity)?;
                }
                Format::Raw => {
                    let events = run.simulate_events(num)?;
                    output::write_raw(&mut out, &events)?;
                }
                Format::Json => {
                    let events = run.simulate_events(num)?;
                    output::write_json(&mut out, &events)?;
                }
            }
        }

        Command::EvalData {
            data_file,
            num,
            multiplicity,
        } => {
            info!(path = %data_file.display(), "reading experiment data");
            let data = read_data(BufReader::new(File::open(data_file)?))?;

            let generator = TrackGenerator::uniform();
            let run = SimulationRun::new(&geometry, &generator, args.seed);
            info!(num, "starting simulation");
            let registry = run.simulate_n(num)?;

            let (rows, sim_total, data_total) = compare(&data, &registry, multiplicity);
            output::write_comparison(&mut out, &rows)?;
            info!(sim_total, data_total, "comparison complete");
        }

        Command::Efficiency {
            num,
            min_multiplicity,
        } => {
            info!(num, min_multiplicity, "starting efficiency scan");
            let points = efficiency::efficiency_scan(&geometry, num, args.seed, min_multiplicity)?;
            output::write_efficiency(&mut out, &points)?;
        }

        Command::SkyMap {
            num,
            data_file,
            bin_size,
            second_iteration,
        } => {
            let data = match data_file {
                Some(path) => {
                    info!(path = %path.display(), "reading experiment data");
                    Some(read_data(BufReader::new(File::open(path)?))?)
                }
                None => None,
            };

            info!(num, bin_size, second_iteration, "reconstructing sky map");
            let map = reconstruct(
                &geometry,
                num,
                args.seed,
                data.as_ref(),
                bin_size,
                second_iteration,
            )?;
            output::write_skymap(&mut out, &map, num, second_iteration)?;
        }
    }

    out.flush()?;
    Ok(())
}

fn open_output(path: Option<&PathBuf>) -> Result<Box<dyn Write>, SimError> {
    match path {
        Some(path) => Ok(Box::new(BufWriter::new(File::create(path)?))),
        None => Ok(Box::new(BufWriter::new(std::io::stdout()))),
    }
}
