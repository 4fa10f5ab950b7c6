// ========================================================================================
//
//                      The command line front end of rarepred
//
// ========================================================================================
//
// Parses arguments, assembles the analysis settings and hands them to the library.
// `describe` explores the raw table; `predict` runs the full clean, featurize, fit and
// evaluate pipeline and prints its report. Results go to stdout, logs to stderr.

use clap::{Parser, Subcommand, ValueEnum};
use rarepred::config::{AnalysisConfig, ModelChoice};
use rarepred::data::{describe, load_raw_records};
use rarepred::pipeline::run_pipeline;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(
    name = "rarepred",
    version,
    about = "Predict the result of a rare medical test from commonly taken tests",
    long_about = "Cleans a headerless TSV of (test id, test date, birth date, result, patient id) \
                 records, builds per-patient features from common tests and fits a model that \
                 predicts a rarer test."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the raw table without cleaning it
    Describe {
        /// Path to the TSV file
        file: PathBuf,

        /// Number of most common tests to list
        #[arg(long, default_value = "20")]
        top: usize,
    },

    /// Clean, build features, fit a model and report its error
    Predict {
        /// Path to the TSV file
        file: PathBuf,

        /// TOML file with analysis settings; flags below override it
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Minimum record count for a test to be tracked or picked as the rare test
        #[arg(long, value_name = "N")]
        rareness: Option<usize>,

        /// Fraction of patients held out for testing
        #[arg(long, value_name = "F")]
        test_fraction: Option<f64>,

        /// Seed for the train/test shuffle
        #[arg(long, value_name = "S")]
        seed: Option<u64>,

        /// Model to fit
        #[arg(long, value_enum)]
        model: Option<ModelArg>,

        /// L1 penalty weight for the lasso
        #[arg(long, value_name = "A")]
        lasso_alpha: Option<f64>,

        /// Largest number of distinct whole-valued labels treated as classes
        #[arg(long, value_name = "N")]
        max_classes: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModelArg {
    Auto,
    Logistic,
    Lasso,
    Linear,
}

impl From<ModelArg> for ModelChoice {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Auto => ModelChoice::Auto,
            ModelArg::Logistic => ModelChoice::Logistic,
            ModelArg::Lasso => ModelChoice::Lasso,
            ModelArg::Linear => ModelChoice::Linear,
        }
    }
}

/// Command-line values that replace whatever the config file says.
struct Overrides {
    rareness: Option<usize>,
    test_fraction: Option<f64>,
    seed: Option<u64>,
    model: Option<ModelArg>,
    lasso_alpha: Option<f64>,
    max_classes: Option<usize>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Describe { file, top } => describe_command(&file, top),
        Commands::Predict {
            file,
            config,
            rareness,
            test_fraction,
            seed,
            model,
            lasso_alpha,
            max_classes,
        } => predict_command(
            &file,
            config.as_deref(),
            Overrides {
                rareness,
                test_fraction,
                seed,
                model,
                lasso_alpha,
                max_classes,
            },
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn describe_command(file: &Path, top: usize) -> Result<(), Box<dyn Error>> {
    let table = load_raw_records(file)?;
    println!("{}", describe(&table, top));
    Ok(())
}

fn predict_command(
    file: &Path,
    config_path: Option<&Path>,
    overrides: Overrides,
) -> Result<(), Box<dyn Error>> {
    let mut config = match config_path {
        Some(path) => {
            log::info!("Loading settings from {}", path.display());
            AnalysisConfig::load(path)?
        }
        None => AnalysisConfig::default(),
    };

    if let Some(rareness) = overrides.rareness {
        config.rareness = rareness;
    }
    if let Some(test_fraction) = overrides.test_fraction {
        config.test_fraction = test_fraction;
    }
    if let Some(seed) = overrides.seed {
        config.seed = seed;
    }
    if let Some(model) = overrides.model {
        config.model = model.into();
    }
    if let Some(alpha) = overrides.lasso_alpha {
        config.lasso_alpha = alpha;
    }
    if let Some(max_classes) = overrides.max_classes {
        config.max_discrete_classes = max_classes;
    }
    config.validate()?;
    log::debug!("Effective settings:\n{}", toml::to_string(&config)?);

    let report = run_pipeline(file, &config)?;
    println!("{report}");
    Ok(())
}
