//! CLI entry point for rlwsd.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rlwsd::classifier::Model;
use rlwsd::config::{ClassifierKind, ClusterMethod, ResourcesConfig, WeightingMode};
use rlwsd::context::{ContextVectorBuilder, Weighting};
use rlwsd::embedding::InMemoryEmbeddings;
use rlwsd::evaluation::{evaluate, evaluate_dictionary, ErrorReport, RunSummary, WordEvaluator, WordReport};
use rlwsd::weights::DEFAULT_MIN_COUNT;
use rlwsd::{
    ContextArtifact, LabeledData, LanguageResources, Result, SenseInventory, WeightingTable,
    WsdConfig, WsdError,
};

#[derive(Parser)]
#[command(name = "rlwsd")]
#[command(about = "Word-sense disambiguation with context vectors")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    Validate {
        /// Path to configuration file
        config: PathBuf,
    },
    /// Evaluate a classifier on labeled files with repeated random splits
    Evaluate {
        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Classifier (spherical, knn, mixture, ensemble)
        #[arg(long)]
        classifier: Option<String>,
        /// Number of runs per word
        #[arg(long)]
        n_runs: Option<usize>,
        /// Score on training data
        #[arg(long)]
        perplexity: bool,
        /// Write error reports next to the input files
        #[arg(long)]
        write_errors: bool,
        /// Labeled files, one per word
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Train on dictionary examples and test on a labeled file
    DictionaryEval {
        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Classifier (spherical, knn, mixture, ensemble)
        #[arg(long)]
        classifier: Option<String>,
        /// Sense inventory JSON
        #[arg(long)]
        inventory: PathBuf,
        /// Write an error report next to the labeled file
        #[arg(long)]
        write_errors: bool,
        /// Labeled file
        labeled: PathBuf,
    },
    /// Vectorize corpus contexts of one word into an artifact
    BuildVectors {
        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Target word
        #[arg(long)]
        word: String,
        /// File with one whitespace-tokenized context per line
        contexts: PathBuf,
        /// Output artifact
        #[arg(long)]
        output: PathBuf,
    },
    /// Cluster the contexts of an artifact
    Cluster {
        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Method (kmeans, skmeans, skmeans-dict-init, skmeans-dict-mapping)
        #[arg(long)]
        method: Option<String>,
        /// Number of clusters
        #[arg(long)]
        n_clusters: Option<usize>,
        /// Recompute a cached result
        #[arg(long)]
        rebuild: bool,
        /// Sense inventory JSON, required by dictionary methods
        #[arg(long)]
        inventory: Option<PathBuf>,
        /// Labeled file to score the mapped clusters on
        #[arg(long)]
        labeled: Option<PathBuf>,
        /// Top words shown per cluster
        #[arg(long, default_value_t = 10)]
        n_words: usize,
        /// Closest contexts shown per cluster
        #[arg(long, default_value_t = 7)]
        n_contexts: usize,
        /// Artifact built by `build-vectors`
        artifact: PathBuf,
    },
    /// Compute the weighting table of one word
    BuildWeights {
        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Target word
        #[arg(long)]
        word: String,
        /// Minimum local count of a weighted word
        #[arg(long, default_value_t = DEFAULT_MIN_COUNT)]
        min_count: usize,
        /// Output file, defaults to `<weights_dir>/<word>.txt`
        #[arg(long)]
        output: Option<PathBuf>,
        /// File with one whitespace-tokenized context per line
        contexts: PathBuf,
    },
    /// Generate a default configuration file
    Init {
        /// Output path for config file
        #[arg(default_value = "config.yaml")]
        output: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<WsdConfig> {
    let config = match path {
        Some(path) => {
            tracing::info!("Loading configuration: {:?}", path);
            WsdConfig::from_file(path)?
        }
        None => WsdConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn load_embeddings(resources: &ResourcesConfig) -> Result<InMemoryEmbeddings> {
    let path = resources
        .embeddings
        .as_ref()
        .ok_or_else(|| WsdError::Config("resources.embeddings is not set".into()))?;
    let mut embeddings = InMemoryEmbeddings::from_word2vec_text(path)?;
    if let Some(counts) = &resources.counts {
        embeddings.load_counts(counts)?;
    }
    tracing::info!("Loaded {} embeddings from {:?}", embeddings.len(), path);
    Ok(embeddings)
}

fn load_language(resources: &ResourcesConfig) -> Result<LanguageResources> {
    let mut language = LanguageResources::new();
    if let Some(path) = &resources.stopwords {
        language = language.load_stopwords(path)?;
    }
    if let Some(path) = &resources.lemmas {
        language = language.load_lemmas(path)?;
    }
    Ok(language)
}

fn weighting_for(config: &WsdConfig, word: &str) -> Result<Weighting> {
    let table = match config.vectors.weighting {
        WeightingMode::Table => WeightingTable::load_for_word(&config.resources.weights_dir, word)?,
        _ => None,
    };
    Ok(Weighting::from_mode(config.vectors.weighting, table))
}

fn file_word(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    Ok(std::fs::read_to_string(path)?
        .lines()
        .map(String::from)
        .collect())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => {
            tracing::info!("Validating configuration: {:?}", config);
            let config = load_config(Some(config.as_path()))?;
            println!("✓ Configuration is valid");
            println!("  Classifier: {}", config.classifier.kind);
            println!("  Clustering: {}", config.clustering.method);
            println!("  Weighting: {:?}", config.vectors.weighting);
        }
        Commands::Evaluate {
            config,
            classifier,
            n_runs,
            perplexity,
            write_errors,
            files,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(kind) = classifier {
                config.classifier.kind = kind.parse::<ClassifierKind>()?;
            }
            if let Some(n) = n_runs {
                config.evaluation.n_runs = n;
            }
            config.evaluation.perplexity |= perplexity;
            config.evaluation.write_errors |= write_errors;
            config.validate()?;

            let embeddings = load_embeddings(&config.resources)?;
            let language = load_language(&config.resources)?;
            tracing::info!(
                "Evaluating {} classifier on {} files",
                config.classifier.kind,
                files.len()
            );

            let mut reports: Vec<WordReport> = Vec::with_capacity(files.len());
            for path in &files {
                let word = file_word(path);
                let builder =
                    ContextVectorBuilder::new(&embeddings, &language, config.vectors.clone())
                        .with_weighting(weighting_for(&config, &word)?);
                let evaluator =
                    WordEvaluator::new(&builder, &config.classifier, &config.evaluation);
                match evaluator.evaluate_file(path) {
                    Ok(report) => reports.push(report),
                    Err(WsdError::InsufficientData(reason)) => {
                        tracing::warn!("Skipping {}: {}", word, reason);
                    }
                    Err(e) => return Err(e),
                }
            }

            println!("{}", WordReport::header());
            for report in &reports {
                println!("{report}");
            }
            let baselines: Vec<f64> = reports.iter().map(|r| r.baseline).collect();
            let tests: Vec<f64> = reports.iter().map(|r| r.test_accuracy().mean).collect();
            println!(
                "avg\t\t{:.2}\t\t{}",
                RunSummary::from_values(&baselines).mean,
                RunSummary::from_values(&tests)
            );
        }
        Commands::DictionaryEval {
            config,
            classifier,
            inventory,
            write_errors,
            labeled,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(kind) = classifier {
                config.classifier.kind = kind.parse::<ClassifierKind>()?;
            }
            config.validate()?;
            let embeddings = load_embeddings(&config.resources)?;
            let language = load_language(&config.resources)?;
            let inventory = SenseInventory::from_file(&inventory)?;
            let data = LabeledData::from_file(&labeled)?;
            let builder = ContextVectorBuilder::new(&embeddings, &language, config.vectors.clone())
                .with_weighting(weighting_for(&config, &inventory.word)?);

            let report = evaluate_dictionary(&builder, &inventory, &data, &config.classifier)?;
            if write_errors {
                let path = ErrorReport::path_for(&labeled, 0);
                report
                    .errors
                    .write_file(&path, &inventory.senses(), &data.sense_counts())?;
                println!("✓ Errors written to: {}", path.display());
            }
            println!("word\tsenses\tdict\tb-line\ttest\tfreq\tjsd\testimate");
            println!(
                "{}\t{}\t{}\t{:.2}\t{:.2}\t{:.2}\t{:.3}\t{:.2}",
                inventory.word,
                inventory.len(),
                report.n_train,
                rlwsd::dataset::majority_baseline(&data.examples),
                report.result.accuracy,
                report.result.max_frequency_error,
                report.result.js_divergence,
                report.result.estimate
            );
        }
        Commands::BuildVectors {
            config,
            word,
            contexts,
            output,
        } => {
            let config = load_config(config.as_deref())?;
            let embeddings = load_embeddings(&config.resources)?;
            let language = load_language(&config.resources)?;
            let builder = ContextVectorBuilder::new(&embeddings, &language, config.vectors.clone())
                .with_weighting(weighting_for(&config, &word)?);

            let artifact = ContextArtifact::build(&word, read_lines(&contexts)?, &builder);
            artifact.save(&output)?;
            println!(
                "✓ {} contexts ({} with vectors) saved to: {}",
                artifact.contexts.len(),
                artifact.vectors().len(),
                output.display()
            );
        }
        Commands::Cluster {
            config,
            method,
            n_clusters,
            rebuild,
            inventory,
            labeled,
            n_words,
            n_contexts,
            artifact: artifact_path,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(method) = method {
                config.clustering.method = method.parse::<ClusterMethod>()?;
            }
            if let Some(n) = n_clusters {
                config.clustering.n_clusters = n;
            }
            config.clustering.rebuild |= rebuild;
            config.validate()?;
            let method = config.clustering.method;

            let embeddings = load_embeddings(&config.resources)?;
            let language = load_language(&config.resources)?;
            let mut artifact = ContextArtifact::load(&artifact_path)?;
            let builder = ContextVectorBuilder::new(&embeddings, &language, config.vectors.clone())
                .with_weighting(weighting_for(&config, &artifact.word)?);

            let centers = match &inventory {
                Some(path) => SenseInventory::from_file(path)?.sense_centers(&builder),
                None if method.needs_dictionary() => {
                    return Err(WsdError::Config(format!(
                        "{method} needs --inventory"
                    )));
                }
                None => Vec::new(),
            };
            artifact.cluster(&config.clustering, &centers)?;
            artifact.save(&artifact_path)?;

            for summary in artifact
                .report(method, &language, n_words, n_contexts)
                .unwrap_or_default()
            {
                println!("{summary}");
            }

            if let Some(path) = labeled {
                let result = artifact.clustering(method).ok_or_else(|| {
                    WsdError::Clustering(format!("no {method} result in artifact"))
                })?;
                let data = LabeledData::from_file(&path)?;
                let model = Model::from_clustering(&builder, result)?;
                let scored = evaluate(&model, &data.examples)?;
                println!(
                    "accuracy {:.2} (baseline {:.2}), freq {:.2}, jsd {:.3}",
                    scored.accuracy,
                    rlwsd::dataset::majority_baseline(&data.examples),
                    scored.max_frequency_error,
                    scored.js_divergence
                );
            }
        }
        Commands::BuildWeights {
            config,
            word,
            min_count,
            output,
            contexts,
        } => {
            let config = load_config(config.as_deref())?;
            let embeddings = load_embeddings(&config.resources)?;
            let table = WeightingTable::build(read_lines(&contexts)?, &embeddings, min_count);
            let output = output
                .unwrap_or_else(|| WeightingTable::path_for_word(&config.resources.weights_dir, &word));
            if let Some(dir) = output.parent() {
                std::fs::create_dir_all(dir)?;
            }
            table.write_to(&output)?;
            println!("✓ {} weights written to: {}", table.len(), output.display());
        }
        Commands::Init { output } => {
            tracing::info!("Generating default configuration");
            WsdConfig::default().to_file(&output)?;
            println!("✓ Configuration written to: {}", output.display());
        }
    }

    Ok(())
}
