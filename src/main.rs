//! EWC Classifier - continual learning experiments on synthetic tasks

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ewc_classifier::data::rotation_similarity;
use ewc_classifier::{
    Activation, ContinualLearner, EvaluationResult, Loss, Mlp, Model, SyntheticConfig,
    SyntheticTaskGenerator, TaskReport, TracingProgress, TrainingConfig,
};

#[derive(Parser)]
#[command(name = "ewc-classifier")]
#[command(about = "Continual learning with Elastic Weight Consolidation", long_about = None)]
struct Cli {
    /// TOML config file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train on a sequence of synthetic tasks and report forgetting
    Run {
        /// Number of tasks in the sequence
        #[arg(short, long, default_value = "3")]
        tasks: usize,

        /// Classes per task (2 = binary)
        #[arg(long, default_value = "2")]
        classes: usize,

        /// Samples per task
        #[arg(long, default_value = "256")]
        samples: usize,

        /// Hidden layer width
        #[arg(long, default_value = "32")]
        hidden: usize,

        /// Override the epoch count from the config
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Fixed similarity for every task; derived from task rotation when omitted
        #[arg(short, long)]
        similarity: Option<f32>,

        /// Train sequentially without consolidation
        #[arg(long)]
        no_ewc: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show configuration
    Config,
}

#[derive(Serialize)]
struct RunSummary {
    tasks: Vec<TaskReport>,
    /// Row i holds scores on every task after learning task i
    evaluations: Vec<Vec<EvaluationResult>>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => TrainingConfig::load(path)?,
        None => TrainingConfig::default(),
    };

    match cli.command {
        Commands::Run { tasks, classes, samples, hidden, epochs, similarity, no_ewc, json } => {
            if let Some(epochs) = epochs {
                config.epochs = epochs;
            }
            config.validate()?;

            let data_config = SyntheticConfig { classes, samples_per_task: samples, ..Default::default() };
            let mut generator = SyntheticTaskGenerator::new(data_config.clone(), config.seed)?;
            let sequence = generator.sequence(tasks);

            let (output, loss) = if generator.target_width() == 1 {
                (Activation::Sigmoid, Loss::BinaryCrossEntropy)
            } else {
                (Activation::Softmax, Loss::CrossEntropy)
            };
            let net = Mlp::new(
                &[data_config.features, hidden, hidden, generator.target_width()],
                Activation::Relu,
                output,
                config.seed,
            )?;
            let model = Model::new(net, loss, &config);
            let mut learner = ContinualLearner::new(model, config.clone())?;
            if no_ewc {
                learner = learner.without_ewc();
            }

            let mut summary = RunSummary { tasks: Vec::new(), evaluations: Vec::new() };
            for (i, task) in sequence.iter().enumerate() {
                let sim = similarity
                    .unwrap_or_else(|| rotation_similarity(&data_config, i, i.saturating_sub(1)));
                let report = learner.learn_task(task, sim, &mut TracingProgress)?;
                summary.tasks.push(report);
                let scores = learner.evaluate_tasks(&sequence[..=i])?;
                if !json {
                    println!("After {}:", task.name);
                    for (seen, score) in sequence.iter().zip(scores.iter()) {
                        println!("  {:<10} {}", seen.name, score);
                    }
                }
                summary.evaluations.push(scores);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                info!("Finished {} tasks (ewc={})", tasks, !no_ewc);
            }
        }

        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
