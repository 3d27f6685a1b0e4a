//! Labeled data loading and train/test splitting.
//!
//! The labeled-data format is tab separated:
//!
//! ```text
//! \t<description>\t<sense>[\t<sense>]          header row (leading tab)
//! <before>\t<word>\t<after>\t<label>[\t<label2>]  data row
//! ```
//!
//! Header rows with two annotator columns must agree. Data rows where the
//! annotators disagree, or whose label is reserved (see
//! [`SenseId::is_reserved`]), are skipped silently.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::SplitStrategy;
use crate::error::{Result, WsdError};
use crate::sense::{Context, LabeledExample, SenseId};

/// Senses and agreed-upon examples of one word.
#[derive(Debug, Clone, Default)]
pub struct LabeledData {
    /// Sense descriptions from the header rows, reserved ids excluded.
    pub senses: BTreeMap<SenseId, String>,
    /// Examples in file order.
    pub examples: Vec<LabeledExample>,
    /// Rows dropped because annotators disagreed.
    pub disagreements: usize,
}

impl LabeledData {
    /// Parse a labeled-data file.
    ///
    /// # Errors
    ///
    /// IO errors, and [`WsdError::Parse`] naming the first malformed line.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = Self::from_reader(BufReader::new(File::open(path.as_ref())?))?;
        tracing::debug!(
            "Read {} examples, {} senses from {:?} ({} disagreements)",
            data.examples.len(),
            data.senses.len(),
            path.as_ref(),
            data.disagreements
        );
        Ok(data)
    }

    /// Parse labeled data from any reader.
    ///
    /// # Errors
    ///
    /// See [`LabeledData::from_file`].
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut data = Self::default();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = i + 1;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with('\t') {
                data.parse_header(line_no, line)?;
            } else {
                data.parse_row(line_no, line)?;
            }
        }
        Ok(data)
    }

    fn parse_header(&mut self, line_no: usize, line: &str) -> Result<()> {
        let fields: Vec<&str> = line
            .split('\t')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect();
        let (description, sense) = match fields.as_slice() {
            [description, sense] => (*description, *sense),
            [description, sense, sense2] => {
                if sense != sense2 {
                    return Err(WsdError::parse(
                        line_no,
                        format!("header annotators disagree: {sense} vs {sense2}"),
                    ));
                }
                (*description, *sense)
            }
            other => {
                return Err(WsdError::parse(
                    line_no,
                    format!("header must have 2 or 3 columns, got {}", other.len()),
                ))
            }
        };
        let sense = SenseId::from(sense);
        if !sense.is_reserved() {
            self.senses.insert(sense, description.to_string());
        }
        Ok(())
    }

    fn parse_row(&mut self, line_no: usize, line: &str) -> Result<()> {
        let mut fields: Vec<&str> = line.split('\t').collect();
        while fields.last().is_some_and(|f| f.trim().is_empty()) {
            fields.pop();
        }
        let (before, word, after, label) = match fields.as_slice() {
            [before, word, after, label] => (*before, *word, *after, *label),
            [before, word, after, label, label2] => {
                if label.trim() != label2.trim() {
                    self.disagreements += 1;
                    return Ok(());
                }
                (*before, *word, *after, *label)
            }
            other => {
                return Err(WsdError::parse(
                    line_no,
                    format!("expected 4 or 5 columns, got {}", other.len()),
                ))
            }
        };
        let sense = SenseId::from(label);
        if sense.is_reserved() {
            return Ok(());
        }
        if !self.senses.contains_key(&sense) {
            return Err(WsdError::parse(
                line_no,
                format!("label {sense} is not declared in the header"),
            ));
        }
        self.examples.push(LabeledExample::new(
            Context::new(before.trim(), word.trim(), after.trim()),
            sense,
        ));
        Ok(())
    }

    /// Number of examples per sense, every header sense included.
    #[must_use]
    pub fn sense_counts(&self) -> BTreeMap<SenseId, usize> {
        let mut counts: BTreeMap<SenseId, usize> =
            self.senses.keys().map(|s| (s.clone(), 0)).collect();
        for example in &self.examples {
            if let Some(count) = counts.get_mut(&example.sense) {
                *count += 1;
            }
        }
        counts
    }

    /// Shuffle a copy of the examples and split it.
    ///
    /// # Errors
    ///
    /// See [`split_examples`].
    pub fn split<R: Rng + ?Sized>(&self, strategy: SplitStrategy, rng: &mut R) -> Result<Split> {
        split_examples(&self.examples, strategy, rng)
    }
}

/// Disjoint train and test sets of one run.
#[derive(Debug, Clone)]
pub struct Split {
    /// Training examples.
    pub train: Vec<LabeledExample>,
    /// Held-out examples.
    pub test: Vec<LabeledExample>,
}

/// Uniformly shuffle `examples` and split them per `strategy`.
///
/// The test set is taken from the front of the shuffled sequence.
///
/// # Errors
///
/// Returns [`WsdError::InsufficientData`] when a training count exceeds the
/// number of examples, and [`WsdError::Config`] when the ratio is outside
/// `(0, 1)`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn split_examples<R: Rng + ?Sized>(
    examples: &[LabeledExample],
    strategy: SplitStrategy,
    rng: &mut R,
) -> Result<Split> {
    let n_test = match strategy {
        SplitStrategy::TrainCount(n_train) => {
            if n_train > examples.len() {
                return Err(WsdError::InsufficientData(format!(
                    "n_train = {n_train} but only {} examples",
                    examples.len()
                )));
            }
            examples.len() - n_train
        }
        SplitStrategy::TestRatio(ratio) => {
            if !(ratio > 0.0 && ratio < 1.0) {
                return Err(WsdError::Config(format!("test_ratio must be in (0, 1), got {ratio}")));
            }
            (examples.len() as f32 * ratio) as usize
        }
    };
    let mut shuffled = examples.to_vec();
    shuffled.shuffle(rng);
    let train = shuffled.split_off(n_test);
    Ok(Split {
        train,
        test: shuffled,
    })
}

/// Accuracy of always predicting the most frequent sense of `examples`.
///
/// Returns 0 for an empty set.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn majority_baseline(examples: &[LabeledExample]) -> f64 {
    if examples.is_empty() {
        return 0.0;
    }
    let mut counts: BTreeMap<&SenseId, usize> = BTreeMap::new();
    for example in examples {
        *counts.entry(&example.sense).or_insert(0) += 1;
    }
    let max = counts.values().copied().max().unwrap_or(0);
    max as f64 / examples.len() as f64
}
