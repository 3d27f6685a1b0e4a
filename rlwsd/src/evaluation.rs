//! Scoring models against labeled data.
//!
//! [`evaluate`] scores one trained model on one test set. [`WordEvaluator`]
//! repeats seeded train/test splits for a word and summarizes the runs, and
//! [`evaluate_dictionary`] trains on dictionary examples and tests on every
//! labeled row.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::classifier::{train_model, Model};
use crate::config::{ClassifierConfig, EvaluationConfig};
use crate::context::ContextVectorBuilder;
use crate::dataset::LabeledData;
use crate::error::{Result, WsdError};
use crate::inventory::SenseInventory;
use crate::sense::{Context, LabeledExample, SenseId};

pub use crate::dataset::majority_baseline;

/// One scored test example.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// The context.
    pub context: Context,
    /// Gold sense.
    pub gold: SenseId,
    /// Model sense.
    pub predicted: SenseId,
    /// Model confidence.
    pub confidence: f32,
}

impl Answer {
    /// Whether the prediction is right.
    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.gold == self.predicted
    }
}

/// Metrics of one model on one test set.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    /// Fraction of correct predictions.
    pub accuracy: f64,
    /// Largest per-sense gap between gold and predicted frequency.
    pub max_frequency_error: f64,
    /// Jensen-Shannon divergence (base 2) of the two sense distributions.
    pub js_divergence: f64,
    /// Fraction of confidences above the model's abstention threshold.
    pub estimate: f64,
    /// Every scored example.
    pub answers: Vec<Answer>,
}

impl EvaluationResult {
    /// Mispredicted examples.
    pub fn errors(&self) -> impl Iterator<Item = &Answer> {
        self.answers.iter().filter(|a| !a.is_correct())
    }
}

/// Occurrences of each sense.
pub fn sense_counts<'a, I>(senses: I) -> BTreeMap<SenseId, usize>
where
    I: IntoIterator<Item = &'a SenseId>,
{
    let mut counts = BTreeMap::new();
    for sense in senses {
        *counts.entry(sense.clone()).or_insert(0) += 1;
    }
    counts
}

/// Largest `|gold(s) - predicted(s)| / n` over senses seen on either side.
///
/// ```
/// use std::collections::BTreeMap;
/// use rlwsd::evaluation::max_frequency_error;
/// use rlwsd::SenseId;
///
/// let gold = BTreeMap::from([(SenseId::from("1"), 6), (SenseId::from("2"), 4)]);
/// let predicted = BTreeMap::from([(SenseId::from("1"), 5), (SenseId::from("2"), 5)]);
/// assert!((max_frequency_error(&gold, &predicted, 10) - 0.1).abs() < 1e-12);
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn max_frequency_error(
    gold: &BTreeMap<SenseId, usize>,
    predicted: &BTreeMap<SenseId, usize>,
    n: usize,
) -> f64 {
    if n == 0 {
        return 0.0;
    }
    gold.keys()
        .chain(predicted.keys())
        .map(|s| {
            let g = gold.get(s).copied().unwrap_or(0);
            let p = predicted.get(s).copied().unwrap_or(0);
            g.abs_diff(p)
        })
        .max()
        .unwrap_or(0) as f64
        / n as f64
}

/// Jensen-Shannon divergence in bits between two aligned count or
/// probability vectors. Inputs are normalized; an all-zero input gives 0.
#[must_use]
pub fn jensen_shannon_divergence(p: &[f64], q: &[f64]) -> f64 {
    let normalize = |v: &[f64]| -> Option<Vec<f64>> {
        let total: f64 = v.iter().sum();
        (total > 0.0).then(|| v.iter().map(|x| x / total).collect())
    };
    let (Some(p), Some(q)) = (normalize(p), normalize(q)) else {
        return 0.0;
    };
    let kl = |a: &[f64], m: &[f64]| -> f64 {
        a.iter()
            .zip(m)
            .filter(|(x, _)| **x > 0.0)
            .map(|(x, y)| x * (x / y).log2())
            .sum()
    };
    let m: Vec<f64> = p.iter().zip(&q).map(|(a, b)| 0.5 * (a + b)).collect();
    (0.5 * kl(&p, &m) + 0.5 * kl(&q, &m)).max(0.0)
}

/// Fraction of `confidences` strictly above `threshold`; 0 when empty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn abstention_estimate(confidences: &[f32], threshold: f32) -> f64 {
    if confidences.is_empty() {
        return 0.0;
    }
    let known = confidences.iter().filter(|&&c| c > threshold).count();
    known as f64 / confidences.len() as f64
}

/// Score `model` on `test`.
///
/// # Errors
///
/// [`WsdError::EmptyInput`] for an empty test set.
#[allow(clippy::cast_precision_loss)]
pub fn evaluate(model: &Model<'_>, test: &[LabeledExample]) -> Result<EvaluationResult> {
    if test.is_empty() {
        return Err(WsdError::EmptyInput("no test examples".into()));
    }
    let answers: Vec<Answer> = test
        .iter()
        .map(|example| {
            let prediction = model.classify(&example.context);
            Answer {
                context: example.context.clone(),
                gold: example.sense.clone(),
                predicted: prediction.sense,
                confidence: prediction.confidence,
            }
        })
        .collect();

    let n = answers.len();
    let correct = answers.iter().filter(|a| a.is_correct()).count();
    let gold = sense_counts(answers.iter().map(|a| &a.gold));
    let predicted = sense_counts(answers.iter().map(|a| &a.predicted));
    let senses: Vec<&SenseId> = {
        let mut all: Vec<&SenseId> = gold.keys().chain(predicted.keys()).collect();
        all.sort();
        all.dedup();
        all
    };
    let as_vector = |counts: &BTreeMap<SenseId, usize>| -> Vec<f64> {
        senses
            .iter()
            .map(|s| counts.get(*s).copied().unwrap_or(0) as f64)
            .collect()
    };
    let confidences: Vec<f32> = answers.iter().map(|a| a.confidence).collect();

    Ok(EvaluationResult {
        accuracy: correct as f64 / n as f64,
        max_frequency_error: max_frequency_error(&gold, &predicted, n),
        js_divergence: jensen_shannon_divergence(&as_vector(&gold), &as_vector(&predicted)),
        estimate: abstention_estimate(&confidences, model.abstention_threshold()),
        answers,
    })
}

/// Mispredictions aggregated for inspection.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    /// Predictions per sense, errors and hits alike.
    pub predicted_counts: BTreeMap<SenseId, usize>,
    /// `(gold, predicted)` pairs with their error count, most frequent first.
    pub confusions: Vec<((SenseId, SenseId), usize)>,
    /// Mispredicted answers ordered by `(gold, predicted)`.
    pub errors: Vec<Answer>,
}

impl ErrorReport {
    /// Aggregate `answers`.
    #[must_use]
    pub fn new(answers: &[Answer]) -> Self {
        let predicted_counts = sense_counts(answers.iter().map(|a| &a.predicted));
        let mut errors: Vec<Answer> = answers.iter().filter(|a| !a.is_correct()).cloned().collect();
        errors.sort_by(|a, b| (&a.gold, &a.predicted).cmp(&(&b.gold, &b.predicted)));

        let mut pairs: BTreeMap<(SenseId, SenseId), usize> = BTreeMap::new();
        for e in &errors {
            *pairs.entry((e.gold.clone(), e.predicted.clone())).or_insert(0) += 1;
        }
        let mut confusions: Vec<_> = pairs.into_iter().collect();
        // stable: equal counts stay in pair order
        confusions.sort_by(|a, b| b.1.cmp(&a.1));
        Self {
            predicted_counts,
            confusions,
            errors,
        }
    }

    /// `<dir>/<stem>.errors<run + 1>.tsv` for the labeled file `input`.
    #[must_use]
    pub fn path_for(input: &Path, run: usize) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        input.with_file_name(format!("{stem}.errors{}.tsv", run + 1))
    }

    /// Write the three tab-separated sections: senses, confusions, errors.
    ///
    /// # Errors
    ///
    /// IO errors.
    pub fn write_tsv<W: Write>(
        &self,
        out: &mut W,
        senses: &BTreeMap<SenseId, String>,
        counts: &BTreeMap<SenseId, usize>,
    ) -> Result<()> {
        writeln!(out, "ans\tcount\tmodel_count\tmeaning")?;
        for (sense, meaning) in senses {
            let count = counts.get(sense).copied().unwrap_or(0);
            let model_count = self.predicted_counts.get(sense).copied().unwrap_or(0);
            writeln!(out, "{sense}\t{count}\t{model_count}\t{meaning}")?;
        }
        writeln!(out)?;
        writeln!(out, "ans\tmodel_ans\tn_errors")?;
        for ((gold, predicted), n) in &self.confusions {
            writeln!(out, "{gold}\t{predicted}\t{n}")?;
        }
        writeln!(out)?;
        writeln!(out, "ans\tmodel_ans\tbefore\tword\tafter")?;
        for e in &self.errors {
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}",
                e.gold, e.predicted, e.context.before, e.context.word, e.context.after
            )?;
        }
        Ok(())
    }

    /// Write the report to `path`.
    ///
    /// # Errors
    ///
    /// IO errors.
    pub fn write_file<P: AsRef<Path>>(
        &self,
        path: P,
        senses: &BTreeMap<SenseId, String>,
        counts: &BTreeMap<SenseId, usize>,
    ) -> Result<()> {
        let mut out = BufWriter::new(File::create(path.as_ref())?);
        self.write_tsv(&mut out, senses, counts)?;
        out.flush()?;
        tracing::debug!("Wrote error report {:?}", path.as_ref());
        Ok(())
    }
}

/// Mean and population standard deviation of per-run values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunSummary {
    /// Mean.
    pub mean: f64,
    /// Standard deviation.
    pub std_dev: f64,
}

impl RunSummary {
    /// Summarize `values`; zeros when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        Self {
            mean,
            std_dev: var.sqrt(),
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} ± {:.2}", self.mean, self.std_dev)
    }
}

/// Metrics of one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunMetrics {
    /// Accuracy on the scored set.
    pub accuracy: f64,
    /// Accuracy on the training set.
    pub train_accuracy: f64,
    /// Max frequency error.
    pub max_frequency_error: f64,
    /// JS divergence.
    pub js_divergence: f64,
    /// Abstention estimate.
    pub estimate: f64,
}

/// Summary of all runs for one word.
#[derive(Debug, Clone)]
pub struct WordReport {
    /// The word.
    pub word: String,
    /// Declared senses.
    pub n_senses: usize,
    /// Most-frequent-sense accuracy over all labeled examples.
    pub baseline: f64,
    /// Per-run metrics.
    pub runs: Vec<RunMetrics>,
}

impl WordReport {
    fn summary(&self, metric: impl Fn(&RunMetrics) -> f64) -> RunSummary {
        let values: Vec<f64> = self.runs.iter().map(metric).collect();
        RunSummary::from_values(&values)
    }

    /// Train accuracy over runs.
    #[must_use]
    pub fn train_accuracy(&self) -> RunSummary {
        self.summary(|r| r.train_accuracy)
    }

    /// Test accuracy over runs.
    #[must_use]
    pub fn test_accuracy(&self) -> RunSummary {
        self.summary(|r| r.accuracy)
    }

    /// Max frequency error over runs.
    #[must_use]
    pub fn frequency_error(&self) -> RunSummary {
        self.summary(|r| r.max_frequency_error)
    }

    /// JS divergence over runs.
    #[must_use]
    pub fn js_divergence(&self) -> RunSummary {
        self.summary(|r| r.js_divergence)
    }

    /// Abstention estimate over runs.
    #[must_use]
    pub fn estimate(&self) -> RunSummary {
        self.summary(|r| r.estimate)
    }

    /// Tab-separated header matching [`fmt::Display`].
    #[must_use]
    pub fn header() -> &'static str {
        "word\tsenses\tb-line\ttrain\ttest\tfreq\tjsd\testimate"
    }
}

impl fmt::Display for WordReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{:.2}\t{}\t{}\t{}\t{}\t{}",
            self.word,
            self.n_senses,
            self.baseline,
            self.train_accuracy(),
            self.test_accuracy(),
            self.frequency_error(),
            self.js_divergence(),
            self.estimate()
        )
    }
}

/// Repeated seeded train/test evaluation of one word.
pub struct WordEvaluator<'a> {
    builder: &'a ContextVectorBuilder<'a>,
    classifier: &'a ClassifierConfig,
    evaluation: &'a EvaluationConfig,
}

impl<'a> WordEvaluator<'a> {
    /// Create an evaluator. The builder carries the word's weighting.
    #[must_use]
    pub fn new(
        builder: &'a ContextVectorBuilder<'a>,
        classifier: &'a ClassifierConfig,
        evaluation: &'a EvaluationConfig,
    ) -> Self {
        Self {
            builder,
            classifier,
            evaluation,
        }
    }

    /// Evaluate a labeled-data file; the word is the file stem.
    ///
    /// # Errors
    ///
    /// Parse, split, training and IO errors.
    pub fn evaluate_file(&self, path: &Path) -> Result<WordReport> {
        let data = LabeledData::from_file(path)?;
        let word = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.evaluate_data(&word, &data, Some(path))
    }

    /// Evaluate parsed labeled data. Error files are written next to
    /// `source` when enabled.
    ///
    /// # Errors
    ///
    /// [`WsdError::InsufficientData`] when a split leaves the training set, or
    /// the test set outside perplexity mode, empty. Training and IO errors.
    pub fn evaluate_data(
        &self,
        word: &str,
        data: &LabeledData,
        source: Option<&Path>,
    ) -> Result<WordReport> {
        let strategy = self.evaluation.split_strategy()?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.evaluation.seed);
        let counts = data.sense_counts();
        let mut runs = Vec::with_capacity(self.evaluation.n_runs);

        for run in 0..self.evaluation.n_runs {
            let split = data.split(strategy, &mut rng)?;
            if split.train.is_empty() || (split.test.is_empty() && !self.evaluation.perplexity) {
                return Err(WsdError::InsufficientData(format!(
                    "{} examples give {} train and {} test",
                    data.examples.len(),
                    split.train.len(),
                    split.test.len()
                )));
            }
            let model = train_model(self.builder, &split.train, self.classifier)?;
            let scored = if self.evaluation.perplexity {
                &split.train
            } else {
                &split.test
            };
            let result = evaluate(&model, scored)?;
            if self.evaluation.write_errors {
                if let Some(source) = source {
                    ErrorReport::new(&result.answers).write_file(
                        ErrorReport::path_for(source, run),
                        &data.senses,
                        &counts,
                    )?;
                }
            }
            let metrics = RunMetrics {
                accuracy: result.accuracy,
                train_accuracy: model.train_accuracy(&split.train),
                max_frequency_error: result.max_frequency_error,
                js_divergence: result.js_divergence,
                estimate: result.estimate,
            };
            tracing::debug!("{} run {}: {:?}", word, run + 1, metrics);
            runs.push(metrics);
        }

        let report = WordReport {
            word: word.to_string(),
            n_senses: data.senses.len(),
            baseline: majority_baseline(&data.examples),
            runs,
        };
        tracing::info!(
            "{}: baseline {:.2}, test {}",
            word,
            report.baseline,
            report.test_accuracy()
        );
        Ok(report)
    }
}

/// Result of training on dictionary examples.
#[derive(Debug, Clone)]
pub struct DictionaryReport {
    /// Dictionary examples the model was trained on.
    pub n_train: usize,
    /// Metrics on the labeled data.
    pub result: EvaluationResult,
    /// Aggregated errors.
    pub errors: ErrorReport,
}

/// Train on the inventory's example sentences and test on every labeled row.
///
/// # Errors
///
/// [`WsdError::EmptyInput`] when no dictionary example contains the word,
/// and training errors.
pub fn evaluate_dictionary(
    builder: &ContextVectorBuilder<'_>,
    inventory: &SenseInventory,
    data: &LabeledData,
    classifier: &ClassifierConfig,
) -> Result<DictionaryReport> {
    let train = inventory.dictionary_examples(builder.language());
    if train.is_empty() {
        return Err(WsdError::EmptyInput(format!(
            "no dictionary example of {:?} contains the word",
            inventory.word
        )));
    }
    let model = train_model(builder, &train, classifier)?;
    let result = evaluate(&model, &data.examples)?;
    let errors = ErrorReport::new(&result.answers);
    tracing::info!(
        "{}: dictionary-trained accuracy {:.2} on {} rows",
        inventory.word,
        result.accuracy,
        result.answers.len()
    );
    Ok(DictionaryReport {
        n_train: train.len(),
        result,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[(&str, usize)]) -> BTreeMap<SenseId, usize> {
        values.iter().map(|(s, n)| (SenseId::from(*s), *n)).collect()
    }

    #[test]
    fn test_frequency_error_union_of_senses() {
        let gold = ids(&[("1", 10)]);
        let predicted = ids(&[("1", 7), ("2", 3)]);
        assert!((max_frequency_error(&gold, &predicted, 10) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_js_divergence_properties() {
        let p = [6.0, 4.0, 0.0];
        let q = [5.0, 3.0, 2.0];
        assert!(jensen_shannon_divergence(&p, &p).abs() < 1e-12);
        let pq = jensen_shannon_divergence(&p, &q);
        let qp = jensen_shannon_divergence(&q, &p);
        assert!(pq > 0.0);
        assert!((pq - qp).abs() < 1e-12);
        // disjoint supports reach the 1-bit maximum
        assert!((jensen_shannon_divergence(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_abstention_estimate_strict() {
        assert!((abstention_estimate(&[0.0, 0.05, 0.5, 1.0], 0.05) - 0.5).abs() < 1e-12);
        assert_eq!(abstention_estimate(&[], 0.5), 0.0);
    }

    #[test]
    fn test_run_summary() {
        let s = RunSummary::from_values(&[0.5, 0.7]);
        assert!((s.mean - 0.6).abs() < 1e-12);
        assert!((s.std_dev - 0.1).abs() < 1e-12);
        assert_eq!(s.to_string(), "0.60 ± 0.10");
    }

    fn answer(gold: &str, predicted: &str, before: &str) -> Answer {
        Answer {
            context: Context::new(before, "bank", ""),
            gold: SenseId::from(gold),
            predicted: SenseId::from(predicted),
            confidence: 0.0,
        }
    }

    #[test]
    fn test_error_report_sections() {
        let answers = vec![
            answer("1", "1", "a"),
            answer("2", "1", "b"),
            answer("2", "1", "c"),
            answer("1", "2", "d"),
        ];
        let report = ErrorReport::new(&answers);
        assert_eq!(report.errors.len(), 3);
        assert_eq!(
            report.confusions[0],
            ((SenseId::from("2"), SenseId::from("1")), 2)
        );

        let senses = BTreeMap::from([
            (SenseId::from("1"), "money".to_string()),
            (SenseId::from("2"), "river".to_string()),
        ]);
        let counts = ids(&[("1", 2), ("2", 2)]);
        let mut out = Vec::new();
        report.write_tsv(&mut out, &senses, &counts).unwrap();
        let text = String::from_utf8(out).unwrap();
        let sections: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(sections.len(), 3);
        assert!(sections[0].contains("1\t2\t3\tmoney"));
        assert!(sections[1].starts_with("ans\tmodel_ans\tn_errors\n2\t1\t2"));
        assert!(sections[2].lines().nth(1).unwrap().starts_with("1\t2\td"));
    }

    #[test]
    fn test_error_path() {
        let path = ErrorReport::path_for(Path::new("/data/bank.txt"), 0);
        assert_eq!(path, PathBuf::from("/data/bank.errors1.tsv"));
    }
}
