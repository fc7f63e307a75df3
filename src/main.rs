use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, warn};

use constrained_lcs::instance::Instance;
use constrained_lcs::nnet::{Activation, Mlp};
use constrained_lcs::report::SolveReport;
use constrained_lcs::search::{BeamSearch, FeatureConfig};
use constrained_lcs::training::{GaVariant, Incumbent, Trainer, TrainerConfig, TrainingObserver};

const MAX_THREADS: usize = 20;

#[derive(Parser)]
#[command(
    name = "constrained-lcs",
    about = "Learned beam search for the constrained longest common subsequence problem"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evolve scoring-network weights on a bank of training instances
    Train(TrainArgs),
    /// Solve one instance with trained weights
    Solve(SolveArgs),
}

#[derive(Args)]
struct NetArgs {
    /// Number of hidden layers
    #[arg(long, default_value_t = 0)]
    hidden_layers: usize,
    /// Hidden layer widths, one value per hidden layer
    #[arg(long, num_args = 0..)]
    units: Vec<usize>,
    /// 1 = tanh, 2 = relu, 3 = sigmoid; anything else leaves layers linear
    #[arg(long, default_value_t = 0)]
    activation_function: u32,
    /// Feature set 1-4 (9, 10, 12 or 14 features)
    #[arg(long, default_value_t = 1)]
    feature_configuration: u32,
}

#[derive(Args)]
struct TrainArgs {
    #[command(flatten)]
    net: NetArgs,
    /// Beam width of every fitness evaluation
    #[arg(long, default_value_t = 10)]
    training_beam_width: usize,
    /// Training wall clock in seconds
    #[arg(long, default_value_t = 3600.0)]
    training_time_limit: f64,
    /// Time limit of each fitness beam search in seconds
    #[arg(long, default_value_t = 10.0)]
    training_bs_time_limit: f64,
    /// 1 = RKGA, 2 = BRKGA, 3 = lexicase
    #[arg(long, default_value_t = 1)]
    ga_configuration: u32,
    #[arg(long, default_value_t = 20)]
    population_size: usize,
    #[arg(long, default_value_t = 1)]
    n_elites: usize,
    #[arg(long, default_value_t = 7)]
    n_mutants: usize,
    /// Elite inheritance probability of BRKGA crossover
    #[arg(long, default_value_t = 0.5)]
    rho: f64,
    /// Half-range of the uniform weight initialisation
    #[arg(long, default_value_t = 1.0)]
    weight_limit: f64,
    /// Optional generation cap for reproducible runs
    #[arg(long)]
    max_generations: Option<usize>,
    /// Seed of the evolution RNG; drawn from the OS when absent
    #[arg(long)]
    seed: Option<u64>,
    /// Evaluate the instances of a fitness sum in parallel
    #[arg(long)]
    parallel: bool,
    /// Worker threads for --parallel; 0 = one per training instance
    #[arg(long, default_value_t = 0)]
    num_threads: usize,
    /// File whose first line is the base path of all listed instances
    #[arg(long, default_value = "instances_path.txt")]
    instances_path_file: PathBuf,
    /// One training instance path per line, relative to the base path
    #[arg(long, default_value = "training_instances.txt")]
    training_instances: PathBuf,
    /// One validation instance path per line, relative to the base path
    #[arg(long, default_value = "validation_instances.txt")]
    validation_instances: PathBuf,
}

#[derive(Args)]
struct SolveArgs {
    #[command(flatten)]
    net: NetArgs,
    /// Instance file
    #[arg(short = 'i', long)]
    instance: PathBuf,
    /// Output file; the report goes to stdout when absent
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
    /// Trained weights file
    #[arg(long, default_value = "weights.txt")]
    weights: PathBuf,
    #[arg(long, default_value_t = 100)]
    beam_width: usize,
    /// Search time limit in seconds
    #[arg(long, default_value_t = 600.0)]
    time_limit: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    match Cli::parse().command {
        Command::Train(args) => train(args),
        Command::Solve(args) => solve(args),
    }
}

fn train(args: TrainArgs) -> Result<()> {
    let (net, feature_config) = build_net(&args.net)?;
    let ga = match GaVariant::from_id(args.ga_configuration) {
        Some(ga) => ga,
        None => {
            warn!(
                "GA configuration {} not recognised, defaulting to RKGA",
                args.ga_configuration
            );
            GaVariant::Rkga
        }
    };
    let weight_limit = if args.weight_limit == 0.0 {
        warn!("weight limit not set, defaulting to 1");
        1.0
    } else {
        args.weight_limit
    };
    if args.population_size < 2 {
        bail!("population size must be at least 2");
    }
    if args.n_elites == 0 || args.n_elites + args.n_mutants > args.population_size {
        bail!(
            "a population of {} cannot hold {} elites and {} mutants",
            args.population_size,
            args.n_elites,
            args.n_mutants
        );
    }

    let base = read_base_path(&args.instances_path_file)?;
    let training = load_instances(&base, &args.training_instances)?;
    let validation = load_instances(&base, &args.validation_instances)?;
    if training.is_empty() || validation.is_empty() {
        bail!("the training and validation instance lists must both be non-empty");
    }

    if args.parallel {
        let threads = if args.num_threads == 0 {
            if training.len() > MAX_THREADS {
                bail!(
                    "more training instances than the {MAX_THREADS}-thread default allows; \
                     pass --num-threads"
                );
            }
            training.len()
        } else {
            args.num_threads
        };
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("cannot initialise the worker pool")?;
        info!("training in parallel with {threads} threads");
    } else {
        info!("training in single-threaded mode");
    }

    let config = TrainerConfig {
        population_size: args.population_size,
        n_elites: args.n_elites,
        n_mutants: args.n_mutants,
        elite_inheritance_probability: args.rho,
        weight_limit,
        time_limit: args.training_time_limit,
        bs_time_limit: args.training_bs_time_limit,
        beam_width: args.training_beam_width,
        ga,
        parallel: args.parallel,
        max_generations: args.max_generations,
    };
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => rand::make_rng(),
    };
    let mut logs = ValueLogs::create()?;
    let mut trainer = Trainer::new(config, net, feature_config, &training, &validation);
    let best = trainer.train(&mut rng, &mut logs);

    write_weights(Path::new("last_weights.txt"), &best)
        .context("cannot write last_weights.txt")?;
    info!("training finished");
    Ok(())
}

fn solve(args: SolveArgs) -> Result<()> {
    let (mut net, feature_config) = build_net(&args.net)?;
    let weights = read_weights(&args.weights)?;
    net.store_weights(&weights).with_context(|| {
        format!(
            "weights in {} do not fit the configured architecture",
            args.weights.display()
        )
    })?;

    let inst = Instance::from_path(&args.instance)
        .with_context(|| format!("cannot load instance {}", args.instance.display()))?;
    let outcome = BeamSearch {
        inst: &inst,
        net: &net,
        feature_config,
        beam_width: args.beam_width,
        time_limit: args.time_limit,
    }
    .solve();
    let report = SolveReport::new(&inst, &outcome);
    match &args.output {
        Some(path) => fs::write(path, report.to_string())
            .with_context(|| format!("cannot write {}", path.display()))?,
        None => print!("{report}"),
    }
    Ok(())
}

fn build_net(args: &NetArgs) -> Result<(Mlp, FeatureConfig)> {
    if args.units.len() != args.hidden_layers {
        bail!(
            "--hidden-layers is {} but {} --units values were given",
            args.hidden_layers,
            args.units.len()
        );
    }
    let feature_config = FeatureConfig::from_id(args.feature_configuration).with_context(|| {
        format!(
            "feature configuration must be 1..4, got {}",
            args.feature_configuration
        )
    })?;
    if !(1..=3).contains(&args.activation_function) {
        warn!("no activation function set; layers stay linear (use --activation-function 1..3)");
    }
    let activation = Activation::from_id(args.activation_function);

    let mut units = vec![feature_config.feature_count()];
    units.extend(&args.units);
    units.push(1);
    Ok((Mlp::new(units, activation), feature_config))
}

fn read_base_path(path: &Path) -> Result<PathBuf> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .with_context(|| format!("{} does not name a base path", path.display()))?;
    Ok(PathBuf::from(line))
}

fn load_instances(base: &Path, list: &Path) -> Result<Vec<Instance>> {
    let text = fs::read_to_string(list)
        .with_context(|| format!("cannot read {}", list.display()))?;
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| {
            let path = base.join(l);
            Instance::from_path(&path)
                .with_context(|| format!("cannot load instance {}", path.display()))
        })
        .collect()
}

fn read_weights(path: &Path) -> Result<Vec<f64>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read weights file {}", path.display()))?;
    text.split_whitespace()
        .map(|t| {
            t.parse::<f64>()
                .with_context(|| format!("invalid weight {t:?} in {}", path.display()))
        })
        .collect()
}

fn write_weights(path: &Path, weights: &[f64]) -> std::io::Result<()> {
    let text = weights
        .iter()
        .map(|w| w.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    fs::write(path, text)
}

/// Persists every incumbent: a `weights_<time>.txt` snapshot plus one row
/// in each of the value logs.
struct ValueLogs {
    training_values: fs::File,
    validation_values: fs::File,
}

impl ValueLogs {
    fn create() -> Result<Self> {
        let mut training_values =
            fs::File::create("training_values.txt").context("cannot create training_values.txt")?;
        let mut validation_values = fs::File::create("validation_values.txt")
            .context("cannot create validation_values.txt")?;
        writeln!(training_values, "Time\tGenerations\tTraining value")?;
        writeln!(validation_values, "Time\tGenerations\tValidation value")?;
        Ok(ValueLogs {
            training_values,
            validation_values,
        })
    }

    fn record(&mut self, event: &Incumbent) -> std::io::Result<()> {
        let snapshot = format!("weights_{}.txt", event.elapsed);
        write_weights(Path::new(&snapshot), event.weights)?;
        writeln!(
            self.training_values,
            "{}\t{}\t{}",
            event.elapsed, event.generation, event.fitness
        )?;
        writeln!(
            self.validation_values,
            "{}\t{}\t{}",
            event.elapsed, event.generation, event.validation_value
        )
    }
}

impl TrainingObserver for ValueLogs {
    fn incumbent(&mut self, event: &Incumbent) {
        info!(
            "new best: fitness {:.4} | time {:.1}s | generation {} | validation {:.4}",
            event.fitness, event.elapsed, event.generation, event.validation_value
        );
        if let Err(e) = self.record(event) {
            error!("cannot write the training logs: {e}");
            process::exit(1);
        }
    }
}
