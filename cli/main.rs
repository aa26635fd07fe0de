#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::error::Error;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};

use pathscan::catalog::{CatalogSource, GmtCatalog};
use pathscan::config::HarnessConfig;
use pathscan::output::{write_cohort, write_run};
use pathscan::pipeline::{run_harness, simulate_cohorts};
use pathscan::progress::{RunProgressObserver, TaskOutcomeKind};

#[derive(Parser)]
#[command(
    name = "pathscan",
    about = "Simulation harness for pathway signal detection",
    long_about = "Embeds a correlated expression signal in one truth pathway of a simulated \
                 cohort, then trains and scores a ridge logistic classifier for every pathway \
                 in a catalog to see whether the truth pathway stands out."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct HarnessArgs {
    /// Pathway catalog in GMT format (term, description, genes; may be .gz)
    #[arg(value_name = "CATALOG")]
    catalog: PathBuf,

    /// TOML run configuration; flags below override its values
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Catalog term whose genes carry the simulated signal
    #[arg(long, value_name = "TERM")]
    truth: Option<String>,

    /// Comma-separated rows per group, one scenario each
    #[arg(long, value_delimiter = ',', value_name = "N,N,...")]
    sample_sizes: Option<Vec<usize>>,

    /// Cross-validation folds
    #[arg(long)]
    k_folds: Option<usize>,

    /// Cross-validation repeats
    #[arg(long)]
    repeats: Option<usize>,

    /// Comma-separated, strictly ascending ridge penalties
    #[arg(long, value_delimiter = ',', value_name = "L,L,...")]
    lambda_grid: Option<Vec<f64>>,

    /// Fraction of each class used for training
    #[arg(long)]
    split_fraction: Option<f64>,

    /// Train AUC a pathway must exceed to enter the overlap table
    #[arg(long)]
    overlap_threshold: Option<f64>,

    /// Worker threads (0 = all cores)
    #[arg(long)]
    workers: Option<usize>,

    /// Base random seed
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full harness over a pathway catalog
    #[command(
        about = "Simulate, train and score every pathway (outputs: results.tsv, overlaps.tsv, detection.tsv, diagnostics.tsv)"
    )]
    Run {
        #[command(flatten)]
        harness: HarnessArgs,

        /// Directory that receives the output tables
        #[arg(long, value_name = "DIR", default_value = "pathscan_out")]
        out: PathBuf,
    },

    /// Generate the simulated cohorts without training anything
    #[command(about = "Write simulated cohorts for inspection (outputs: cohort_<N>.tsv)")]
    Simulate {
        #[command(flatten)]
        harness: HarnessArgs,

        /// Directory that receives one TSV per sample size
        #[arg(long, value_name = "DIR", default_value = "pathscan_cohorts")]
        out: PathBuf,
    },

    /// Display version information
    #[command(about = "Display version information")]
    Version,
}

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };

    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    let style = ProgressStyle::with_template(
        "\n> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ");
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

/// Progress bar over (pathway, sample size) tasks.
struct TaskProgressBar {
    bar: ProgressBar,
    failed: AtomicUsize,
    excluded: AtomicUsize,
}

impl TaskProgressBar {
    fn new() -> Self {
        Self {
            bar: create_progress_bar(0, "training pathways"),
            failed: AtomicUsize::new(0),
            excluded: AtomicUsize::new(0),
        }
    }
}

impl RunProgressObserver for TaskProgressBar {
    fn on_dispatch(&self, total_tasks: usize) {
        self.bar.set_length(total_tasks as u64);
        self.bar.set_position(0);
    }

    fn on_task_complete(&self, pathway_id: &str, sample_size: usize, outcome: TaskOutcomeKind) {
        match outcome {
            TaskOutcomeKind::Scored => {}
            TaskOutcomeKind::NotApplicable => {
                self.excluded.fetch_add(1, Ordering::Relaxed);
            }
            TaskOutcomeKind::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.bar.set_message(format!(
            "{pathway_id} (n={sample_size}) {outcome}; {} excluded, {} failed",
            self.excluded.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed)
        ));
        self.bar.inc(1);
    }

    fn on_finish(&self) {
        self.bar.finish_with_message("all tasks complete");
    }
}

/// Loads the optional TOML file and applies command-line overrides.
fn resolve_config(args: &HarnessArgs) -> Result<HarnessConfig, Box<dyn Error>> {
    let mut config = match (&args.config, &args.truth) {
        (Some(path), _) => HarnessConfig::from_toml_file(path)?,
        (None, Some(truth)) => HarnessConfig::new(truth.clone()),
        (None, None) => {
            return Err("either --config or --truth must name the truth pathway".into());
        }
    };
    if let Some(truth) = &args.truth {
        config.truth_pathway_id = truth.clone();
    }
    if let Some(sizes) = &args.sample_sizes {
        config.sample_sizes = sizes.clone();
    }
    if let Some(k) = args.k_folds {
        config.k_folds = k;
    }
    if let Some(repeats) = args.repeats {
        config.repeats = repeats;
    }
    if let Some(grid) = &args.lambda_grid {
        config.lambda_grid = grid.clone();
    }
    if let Some(fraction) = args.split_fraction {
        config.split_fraction = fraction;
    }
    if let Some(threshold) = args.overlap_threshold {
        config.overlap_threshold = threshold;
    }
    if let Some(workers) = args.workers {
        config.worker_count = workers;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.validate()?;
    Ok(config)
}

fn run(harness: HarnessArgs, out: PathBuf) -> Result<(), Box<dyn Error>> {
    let config = resolve_config(&harness)?;
    let catalog = GmtCatalog::new(&harness.catalog).load()?;
    println!(
        "Running {} pathways x {} sample sizes on {} workers",
        catalog.len(),
        config.sample_sizes.len(),
        config.resolved_worker_count()
    );

    let progress = TaskProgressBar::new();
    let output = run_harness(&catalog, &config, &progress)?;

    let written = write_run(&out, &output)?;
    config.save(out.join("config.toml"))?;
    for row in &output.detection {
        match (row.train_rank, row.test_rank) {
            (Some(train_rank), Some(test_rank)) => println!(
                "n={}: '{}' train AUC {:.3} (rank {}/{}), test AUC {:.3} (rank {}/{})",
                row.sample_size,
                row.truth_pathway_id,
                row.train_auc.unwrap_or(f64::NAN),
                train_rank,
                row.pathways_scored,
                row.test_auc.unwrap_or(f64::NAN),
                test_rank,
                row.pathways_scored
            ),
            _ => println!(
                "n={}: '{}' could not be scored",
                row.sample_size, row.truth_pathway_id
            ),
        }
    }
    if !output.diagnostics.is_empty() {
        eprintln!(
            "{} diagnostics recorded (failed tasks or skipped sample sizes); see {}",
            output.diagnostics.len(),
            display_path(&out.join(pathscan::output::DIAGNOSTICS_FILE))
        );
    }
    for path in written {
        println!("Wrote {}", display_path(&path));
    }
    Ok(())
}

fn simulate(harness: HarnessArgs, out: PathBuf) -> Result<(), Box<dyn Error>> {
    let config = resolve_config(&harness)?;
    let catalog = GmtCatalog::new(&harness.catalog).load()?;
    let simulated = simulate_cohorts(&catalog, &config)?;

    fs::create_dir_all(&out)?;
    for cohort in &simulated.cohorts {
        let path = out.join(format!("cohort_{}.tsv", cohort.sample_size()));
        write_cohort(&path, cohort)?;
        println!(
            "Wrote {} ({} rows x {} genes)",
            display_path(&path),
            cohort.n_rows(),
            cohort.schema().len()
        );
    }
    Ok(())
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

fn print_version_info() {
    println!("pathscan {}", env!("CARGO_PKG_VERSION"));
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Run { harness, out }) => run(harness, out),
        Some(Commands::Simulate { harness, out }) => simulate(harness, out),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(|e| e.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
