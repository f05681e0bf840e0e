use std::collections::BTreeMap;
use std::fs::{File, read_to_string};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use serde::Serialize;

use tierpack::catalog::MACHINE_TYPES;
use tierpack::config::RunConfig;
use tierpack::emit::{self, Format};
use tierpack::model::{ConstraintKind, ModelStats};
use tierpack::symmetry;
use tierpack::{Backend, ConstraintModel, ModelInput, Problem};

#[derive(Parser)]
#[command(name = "tierpack")]
#[command(about = "Place hot and cold partitions on the cheapest set of machines", long_about = None)]
struct Cli {
    /// Log more (-v info, -vv debug, -vvv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a problem and print the placement as YAML
    Solve {
        /// The problem file
        problem: PathBuf,
        #[arg(short, long, value_enum, default_value_t)]
        backend: Backend,
    },
    /// Write the model of a problem in a solver exchange format
    Emit {
        /// The problem file
        problem: PathBuf,
        #[arg(short, long, value_enum, default_value = "lp")]
        format: Format,
        /// Defaults to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print tier ranges and model statistics as YAML
    Inspect {
        /// The problem file
        problem: PathBuf,
    },
    /// Build, and optionally solve, a model for every configured partition count
    Run {
        /// The run configuration file
        config: PathBuf,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TierReport {
    name: &'static str,
    capacity: u32,
    machines: String,
    hot_machines: usize,
}

#[derive(Serialize)]
struct Inspection {
    tiers: Vec<TierReport>,
    stats: ModelStats,
    constraints: BTreeMap<ConstraintKind, usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::init_from_env(env_logger::Env::default().default_filter_or(level));

    match cli.command {
        Commands::Solve { problem, backend } => {
            let problem = read_problem(&problem)?;
            let solution = problem.solve(&*backend.create(None))?;
            println!("{}", serde_yaml::to_string(&solution)?);
        }
        Commands::Emit {
            problem,
            format,
            output,
        } => {
            let model = read_problem(&problem)?.build()?;
            let emitter = format.emitter();
            match output {
                Some(path) => {
                    let mut out = BufWriter::new(File::create(&path)?);
                    emitter.write_model(&model, &mut out)?;
                    out.flush()?;
                }
                None => {
                    let mut out = std::io::stdout().lock();
                    emitter.write_model(&model, &mut out)?;
                }
            }
        }
        Commands::Inspect { problem } => {
            let model = read_problem(&problem)?.build()?;
            println!("{}", serde_yaml::to_string(&inspect(&model))?);
        }
        Commands::Run { config } => run(&RunConfig::load(&config)?)?,
    }
    Ok(())
}

fn read_problem(path: &Path) -> Result<Problem, Box<dyn std::error::Error>> {
    let buf = read_to_string(path)?;
    Ok(serde_yaml::from_str(&buf)?)
}

fn inspect(model: &ConstraintModel) -> Inspection {
    let hot = model.layout().hot();
    let tiers = model
        .fleet()
        .tiers()
        .iter()
        .map(|bucket| {
            let range = bucket.machines();
            TierReport {
                name: MACHINE_TYPES[bucket.tier()].name,
                capacity: bucket.capacity(),
                machines: format!("{}..{}", range.start, range.end),
                hot_machines: symmetry::hot_machine_count(bucket, hot),
            }
        })
        .collect();

    let mut constraints = BTreeMap::new();
    for c in model.constraints() {
        *constraints.entry(c.kind).or_insert(0) += 1;
    }

    Inspection {
        tiers,
        stats: model.stats(),
        constraints,
    }
}

fn run(config: &RunConfig) -> Result<(), Box<dyn std::error::Error>> {
    let prices = config.price_source()?;
    let backend = config.backend.create(config.time_limit());

    for &partitions in &config.partitions {
        let costs = prices.cost_per_tier()?;
        for (machine_type, cost) in MACHINE_TYPES.iter().zip(costs) {
            log::info!("{}: {cost}", machine_type.name);
        }

        let model = ConstraintModel::build(&ModelInput::standard(partitions, costs))?;
        for format in &config.output.formats {
            emit::write_model_file(format.emitter(), &model, &config.output.directory)?;
        }

        if config.solve {
            let started = Instant::now();
            let placement = backend.solve(&model)?;
            let elapsed = started.elapsed();
            log::info!("{} partitions solved by {} in {elapsed:?}", partitions, backend.name());
            println!(
                "{partitions} partitions: cost {} on {} machines ({:.3}s)",
                placement.cost,
                placement.used_machines.len(),
                elapsed.as_secs_f64()
            );
        }
    }
    Ok(())
}
