//! # rlwsd
//!
//! Word-sense disambiguation over word embeddings.
//!
//! A context (the words before and after an occurrence of a target word) is
//! turned into a unit [`ContextVector`] by averaging weighted embeddings.
//! Supervised classifiers learn senses from labeled contexts, and a k-means
//! engine discovers senses from unlabeled ones, optionally anchored to a
//! dictionary. The evaluation harness scores both against hand-labeled data.
//!
//! ## Features
//!
//! - **Context vectors** - Lemmatized, filtered, weighted and normalized
//! - **Classifiers** - Spherical centroids, k-NN, Gaussian mixture, MLP ensemble
//! - **Clustering** - k-means and spherical k-means with dictionary seeding
//! - **Evaluation** - Repeated seeded splits, frequency divergence, error reports
//!
//! ## Quick Start (CLI)
//!
//! ```bash
//! # Write a default configuration
//! rlwsd init config.yaml
//!
//! # Evaluate labeled files
//! rlwsd evaluate --config config.yaml data/bank.txt data/key.txt
//!
//! # Cluster corpus contexts of one word
//! rlwsd cluster --config config.yaml bank.json
//! ```
//!
//! ## Quick Start (Library)
//!
//! ```rust
//! use rlwsd::classifier::train_model;
//! use rlwsd::config::{ClassifierConfig, ClassifierKind, ContextVectorOptions, WeightingMode};
//! use rlwsd::context::ContextVectorBuilder;
//! use rlwsd::embedding::InMemoryEmbeddings;
//! use rlwsd::{Context, LabeledExample, LanguageResources, SenseId};
//!
//! # fn main() -> rlwsd::Result<()> {
//! let mut embeddings = InMemoryEmbeddings::new(2);
//! embeddings.insert("money", vec![1.0, 0.0])?;
//! embeddings.insert("river", vec![0.0, 1.0])?;
//!
//! let language = LanguageResources::new();
//! let options = ContextVectorOptions::default().with_weighting(WeightingMode::Uniform);
//! let builder = ContextVectorBuilder::new(&embeddings, &language, options);
//!
//! let examples = vec![
//!     LabeledExample::new(Context::new("money in the", "bank", ""), "1"),
//!     LabeledExample::new(Context::new("the river", "bank", ""), "2"),
//! ];
//! let model = train_model(&builder, &examples, &ClassifierConfig::new(ClassifierKind::Spherical))?;
//! let prediction = model.classify(&Context::new("", "bank", "by the river"));
//! assert_eq!(prediction.sense, SenseId::from("2"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod classifier;
pub mod clustering;
pub mod config;
pub mod context;
pub mod dataset;
pub mod embedding;
pub mod error;
pub mod evaluation;
pub mod inventory;
pub mod language;
pub mod sense;
pub mod vector;
pub mod weights;

pub use classifier::{Model, Prediction};
pub use clustering::{ClusteringResult, ContextArtifact};
pub use config::WsdConfig;
pub use context::ContextVectorBuilder;
pub use dataset::LabeledData;
pub use error::{Result, WsdError};
pub use evaluation::{EvaluationResult, WordEvaluator, WordReport};
pub use inventory::SenseInventory;
pub use language::LanguageResources;
pub use sense::{Context, LabeledExample, SenseId};
pub use vector::ContextVector;
pub use weights::WeightingTable;
