pub mod vocabulary;
pub mod corpus;
pub mod gibbs;
pub mod serde;
pub mod evaluate;

use ::serde::{Deserialize, Serialize};

use crate::error::{Result, TopicError};
use crate::lda::corpus::Corpus;
use crate::utils::math::RowMatrix;
use crate::utils::sort::argsort_desc;

/// LDA training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LdaConfig {
    /// Number of topics (K >= 2)
    pub n_topics: usize,
    /// Document-topic prior (alpha > 0)
    pub alpha: f64,
    /// Topic-word prior (beta > 0)
    pub beta: f64,
    /// Seed for every random draw of a training run
    pub random_seed: u64,
    /// Upper bound on sampling sweeps
    pub max_iterations: usize,
    /// Sweeps before the convergence check kicks in
    pub burn_in: usize,
    /// Documents per parallel work unit
    pub batch_size: usize,
}

impl Default for LdaConfig {
    fn default() -> Self {
        Self {
            n_topics: 10,
            alpha: 0.1,
            beta: 0.01,
            random_seed: 0,
            max_iterations: 1000,
            burn_in: 50,
            batch_size: 64,
        }
    }
}

impl LdaConfig {
    /// Create a new configuration with specified number of topics
    pub fn new(n_topics: usize) -> Self {
        Self {
            n_topics,
            ..Default::default()
        }
    }

    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn burn_in(mut self, n: usize) -> Self {
        self.burn_in = n;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    /// Same hyperparameters with a different topic count (used by the K sweep)
    pub fn with_topics(&self, n_topics: usize) -> Self {
        Self {
            n_topics,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_topics < 2 {
            return Err(TopicError::invalid_hyperparameter(format!(
                "number of topics must be at least 2, got {}",
                self.n_topics
            )));
        }
        if !(self.alpha > 0.0 && self.alpha.is_finite()) {
            return Err(TopicError::invalid_hyperparameter(format!(
                "alpha must be positive, got {}",
                self.alpha
            )));
        }
        if !(self.beta > 0.0 && self.beta.is_finite()) {
            return Err(TopicError::invalid_hyperparameter(format!(
                "beta must be positive, got {}",
                self.beta
            )));
        }
        if self.max_iterations < 1 {
            return Err(TopicError::invalid_range("max_iterations must be at least 1"));
        }
        if self.batch_size < 1 {
            return Err(TopicError::invalid_range("batch_size must be at least 1"));
        }
        Ok(())
    }
}

/// A trained LDA model
///
/// Produced by one training run and never mutated afterwards; retraining with
/// another K or other priors yields a new value.
/// - `theta`: documents x topics, rows sum to 1
/// - `phi`: topics x vocabulary, rows sum to 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicModel {
    n_topics: usize,
    alpha: f64,
    beta: f64,
    seed: u64,
    theta: RowMatrix,
    phi: RowMatrix,
    iterations: usize,
    converged: bool,
    log_likelihood: Vec<f64>,
}

impl TopicModel {
    #[inline]
    pub fn n_topics(&self) -> usize {
        self.n_topics
    }

    #[inline]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    #[inline]
    pub fn beta(&self) -> f64 {
        self.beta
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// document-topic distribution (θ)
    #[inline]
    pub fn theta(&self) -> &RowMatrix {
        &self.theta
    }

    /// topic-term distribution (φ)
    #[inline]
    pub fn phi(&self) -> &RowMatrix {
        &self.phi
    }

    pub fn vocab_size(&self) -> usize {
        self.phi.cols()
    }

    pub fn num_documents(&self) -> usize {
        self.theta.rows()
    }

    /// Sweeps actually run
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Whether training stopped on the log-likelihood threshold rather than the cap
    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn log_likelihood_history(&self) -> &[f64] {
        &self.log_likelihood
    }

    /// Highest-φ term ids of one topic, ties by lower id
    pub fn top_terms(&self, topic: usize, n: usize) -> Vec<(u32, f64)> {
        if topic >= self.n_topics {
            return Vec::new();
        }
        let row = self.phi.row(topic);
        argsort_desc(row, Some(n))
            .into_iter()
            .map(|id| (id as u32, row[id]))
            .collect()
    }

    /// Share of all corpus tokens attributed to each topic
    /// Falls back to the unweighted mean of θ when the corpus has no tokens.
    pub fn topic_prevalence(&self, corpus: &Corpus) -> Result<Vec<f64>> {
        self.check_corpus(corpus)?;
        let mut prevalence = vec![0.0; self.n_topics];
        let total = corpus.total_tokens();
        for (doc, row) in corpus.documents().iter().zip(self.theta.iter_rows()) {
            let weight = if total == 0 { 1.0 } else { doc.len() as f64 };
            for (p, &t) in prevalence.iter_mut().zip(row) {
                *p += weight * t;
            }
        }
        let denom = if total == 0 { corpus.len() as f64 } else { total as f64 };
        if denom > 0.0 {
            prevalence.iter_mut().for_each(|p| *p /= denom);
        }
        Ok(prevalence)
    }

    /// exp(-log p(corpus) / N); lower is a better fit
    pub fn perplexity(&self, corpus: &Corpus) -> Result<f64> {
        self.check_corpus(corpus)?;
        let mut log_likelihood = 0.0;
        let mut total = 0.0;
        for (doc, theta_row) in corpus.documents().iter().zip(self.theta.iter_rows()) {
            for &(id, count) in doc.entries() {
                // p(w|d) = Σ_t θ_dt φ_tw
                let prob: f64 = theta_row
                    .iter()
                    .enumerate()
                    .map(|(t, &theta)| theta * self.phi.get(t, id as usize))
                    .sum();
                log_likelihood += count as f64 * prob.ln();
                total += count as f64;
            }
        }
        if total == 0.0 {
            return Err(TopicError::empty_corpus("perplexity of a corpus without tokens"));
        }
        Ok((-log_likelihood / total).exp())
    }

    /// θ is documents x K and φ is K x V
    pub(crate) fn check_shape(&self) -> Result<()> {
        if self.theta.cols() != self.n_topics || self.phi.rows() != self.n_topics {
            return Err(TopicError::invalid_input(format!(
                "model with {} topics has theta {} x {} and phi {} x {}",
                self.n_topics,
                self.theta.rows(),
                self.theta.cols(),
                self.phi.rows(),
                self.phi.cols()
            )));
        }
        Ok(())
    }

    /// The corpus must be the one (or shaped like the one) the model was trained on
    pub(crate) fn check_corpus(&self, corpus: &Corpus) -> Result<()> {
        if corpus.len() != self.num_documents() {
            return Err(TopicError::invalid_input(format!(
                "corpus has {} documents, model was trained on {}",
                corpus.len(),
                self.num_documents()
            )));
        }
        if corpus.vocab_size() != self.vocab_size() {
            return Err(TopicError::invalid_input(format!(
                "corpus vocabulary size {} differs from model vocabulary size {}",
                corpus.vocab_size(),
                self.vocab_size()
            )));
        }
        Ok(())
    }
}
