//! Human-readable cluster summaries.

use std::collections::HashMap;
use std::fmt;

use super::ClusteringResult;
use crate::language::LanguageResources;
use crate::sense::SenseId;

/// Summary of one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    /// Cluster id.
    pub cluster: usize,
    /// Fraction of clustered contexts in this cluster.
    pub share: f64,
    /// Mapped sense, if any.
    pub sense: Option<SenseId>,
    /// Most frequent context words, stopwords and the target excluded.
    pub best_words: Vec<(String, usize)>,
    /// Contexts nearest to the centroid, with their distance.
    pub closest: Vec<(f32, String)>,
}

impl fmt::Display for ClusterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}: {:.2}", self.cluster + 1, self.share)?;
        if let Some(sense) = &self.sense {
            write!(f, " -> {sense}")?;
        }
        writeln!(f)?;
        for (word, count) in &self.best_words {
            writeln!(f, "{count} {word}")?;
        }
        for (dist, ctx) in &self.closest {
            writeln!(f, "{dist:.2}: {ctx}")?;
        }
        Ok(())
    }
}

/// Summarize every non-empty cluster.
///
/// `contexts[i]` are the tokens of the i-th clustered context.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn cluster_report(
    result: &ClusteringResult,
    contexts: &[&[String]],
    word: &str,
    language: &LanguageResources,
    n_words: usize,
    n_contexts: usize,
) -> Vec<ClusterSummary> {
    let total = result.assignment.len().max(1) as f64;
    let mut members: Vec<Vec<(f32, usize)>> = vec![Vec::new(); result.n_clusters()];
    for (i, (&c, &d)) in result.assignment.iter().zip(&result.distances).enumerate() {
        if let Some(m) = members.get_mut(c) {
            m.push((d, i));
        }
    }

    members
        .into_iter()
        .enumerate()
        .filter(|(_, m)| !m.is_empty())
        .map(|(cluster, mut elements)| {
            elements.sort_by(|a, b| a.0.total_cmp(&b.0));
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for &(_, i) in &elements {
                for w in contexts.get(i).copied().unwrap_or_default() {
                    if w != word && !language.is_stopword(w) {
                        *counts.entry(w.as_str()).or_insert(0) += 1;
                    }
                }
            }
            let mut best_words: Vec<(String, usize)> =
                counts.into_iter().map(|(w, c)| (w.to_string(), c)).collect();
            best_words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            best_words.truncate(n_words);

            let closest = elements
                .iter()
                .take(n_contexts)
                .map(|&(d, i)| (d, contexts.get(i).map(|t| t.join(" ")).unwrap_or_default()))
                .collect();
            ClusterSummary {
                cluster,
                share: elements.len() as f64 / total,
                sense: result.sense_of(cluster).cloned(),
                best_words,
                closest,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::Metric;
    use crate::config::ClusterMethod;

    #[test]
    fn test_report_words_and_order() {
        let result = ClusteringResult {
            method: ClusterMethod::SphericalKMeans,
            metric: Metric::Cosine,
            centroids: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            assignment: vec![0, 0, 1],
            distances: vec![0.3, 0.1, 0.0],
            iterations: 1,
            converged: true,
            mapping: None,
        };
        let tokens: Vec<Vec<String>> = [
            "the bank robbery",
            "bank heist robbery",
            "river bank water",
        ]
        .iter()
        .map(|s| s.split_whitespace().map(String::from).collect())
        .collect();
        let contexts: Vec<&[String]> = tokens.iter().map(Vec::as_slice).collect();
        let lang = LanguageResources::new().with_stopwords(["the"]);

        let report = cluster_report(&result, &contexts, "bank", &lang, 10, 7);
        assert_eq!(report.len(), 2);
        assert!((report[0].share - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(report[0].best_words[0], ("robbery".to_string(), 2));
        assert!(report[0].best_words.iter().all(|(w, _)| w != "the" && w != "bank"));
        // closest context first
        assert_eq!(report[0].closest[0].1, "bank heist robbery");
        assert!(report[1].to_string().starts_with("#2: 0.33"));
    }
}
