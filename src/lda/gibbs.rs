//! Collapsed Gibbs sampling for LDA
//!
//! Every sweep resamples all documents in parallel batches against a frozen
//! snapshot of the global topic-term counts. Each document keeps a private
//! delta on top of the snapshot while it is being resampled; the batches then
//! emit partial count tables that are summed at the barrier and become the
//! snapshot for the next sweep. Each document draws from its own ChaCha stream
//! derived from (seed, sweep, document index), so results do not depend on the
//! batch size or on how rayon schedules the batches.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{Result, TopicError};
use crate::lda::corpus::{Corpus, EncodedDocument};
use crate::lda::{LdaConfig, TopicModel};
use crate::utils::cancel::CancelToken;
use crate::utils::math::RowMatrix;

/// Relative log-likelihood change below which training stops early
pub const CONVERGENCE_TOLERANCE: f64 = 1e-6;

/// Per-document sampler state
#[derive(Debug, Clone)]
struct DocState {
    /// topic of each token position (same order as `EncodedDocument::sequence`)
    topics: Vec<u32>,
    /// entry slot of each token position (index into `EncodedDocument::entries`)
    slots: Vec<u32>,
    /// n_dt
    doc_topic: Vec<u32>,
}

/// Sufficient statistics shared by all documents
/// word-major: `word_topic[w * k + t]`
#[derive(Debug, Clone)]
struct Counts {
    word_topic: Vec<u32>,
    topic_totals: Vec<u64>,
}

impl Counts {
    fn zeros(vocab_size: usize, n_topics: usize) -> Self {
        Self {
            word_topic: vec![0; vocab_size * n_topics],
            topic_totals: vec![0; n_topics],
        }
    }

    fn add_document(&mut self, state: &DocState, doc: &EncodedDocument, n_topics: usize) {
        for (&w, &t) in doc.sequence().iter().zip(state.topics.iter()) {
            self.word_topic[w as usize * n_topics + t as usize] += 1;
            self.topic_totals[t as usize] += 1;
        }
    }

    /// barrier: partial tables are summed (integer, so order independent)
    fn merge(mut self, other: Counts) -> Counts {
        for (a, b) in self.word_topic.iter_mut().zip(other.word_topic) {
            *a += b;
        }
        for (a, b) in self.topic_totals.iter_mut().zip(other.topic_totals) {
            *a += b;
        }
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Priors {
    n_topics: usize,
    vocab_size: usize,
    alpha: f64,
    beta: f64,
}

impl Priors {
    #[inline]
    fn beta_sum(&self) -> f64 {
        self.beta * self.vocab_size as f64
    }

    #[inline]
    fn alpha_sum(&self) -> f64 {
        self.alpha * self.n_topics as f64
    }
}

impl TopicModel {
    /// Fit an LDA model by collapsed Gibbs sampling
    ///
    /// # Arguments
    /// * `corpus` - encoded documents; V is taken from `corpus.vocab_size()`
    /// * `config` - K, priors, seed and termination policy
    ///
    /// # Returns
    /// * `TopicModel` - or `InvalidHyperparameter` / `InvalidRange` / `EmptyCorpus`
    pub fn train(corpus: &Corpus, config: &LdaConfig) -> Result<Self> {
        Self::train_with_cancel(corpus, config, &CancelToken::new())
    }

    /// Same as `train`, polling `cancel` between sweeps
    /// A cancelled run returns `Cancelled` and drops all intermediate state.
    pub fn train_with_cancel(
        corpus: &Corpus,
        config: &LdaConfig,
        cancel: &CancelToken,
    ) -> Result<Self> {
        config.validate()?;
        if corpus.is_empty() {
            return Err(TopicError::empty_corpus("corpus has no documents"));
        }
        if corpus.vocab_size() == 0 {
            return Err(TopicError::empty_corpus("vocabulary has no tokens"));
        }

        let priors = Priors {
            n_topics: config.n_topics,
            vocab_size: corpus.vocab_size(),
            alpha: config.alpha,
            beta: config.beta,
        };
        let documents = corpus.documents();
        let seed = config.random_seed;

        info!(
            k = priors.n_topics,
            documents = documents.len(),
            vocab = priors.vocab_size,
            tokens = corpus.total_tokens(),
            seed,
            "training LDA"
        );

        let mut states: Vec<DocState> = documents
            .par_iter()
            .map(|doc| init_state(doc, priors.n_topics, seed))
            .collect::<Result<_>>()?;
        let mut counts = accumulate(&states, documents, priors);

        let mut history: Vec<f64> = Vec::with_capacity(config.max_iterations);
        let mut converged = false;
        let mut iterations = 0;

        while iterations < config.max_iterations {
            cancel.check(iterations)?;
            let sweep = iterations as u64 + 1;

            let snapshot = &counts;
            // 部分集計テーブルは rayon の分割ごとに 1 つ (バッチごとではない)
            let next = states
                .par_chunks_mut(config.batch_size)
                .zip(documents.par_chunks(config.batch_size))
                .fold(
                    || Counts::zeros(priors.vocab_size, priors.n_topics),
                    |mut partial, (batch_states, batch_docs)| {
                        for (state, doc) in batch_states.iter_mut().zip(batch_docs) {
                            let mut rng = document_rng(seed, sweep, doc.index());
                            sample_document(state, doc, snapshot, priors, &mut rng);
                            partial.add_document(state, doc, priors.n_topics);
                        }
                        partial
                    },
                )
                .reduce(
                    || Counts::zeros(priors.vocab_size, priors.n_topics),
                    Counts::merge,
                );
            counts = next;
            iterations += 1;

            let ll = log_likelihood(&states, documents, &counts, priors);
            debug!(iteration = iterations, log_likelihood = ll, "sweep done");
            let previous = history.last().copied();
            history.push(ll);

            if iterations > config.burn_in {
                if let Some(prev) = previous {
                    let change = (ll - prev).abs() / prev.abs().max(f64::MIN_POSITIVE);
                    if change < CONVERGENCE_TOLERANCE {
                        converged = true;
                        break;
                    }
                }
            }
        }

        let theta = estimate_theta(&states, priors);
        let phi = estimate_phi(&counts, priors);

        info!(
            k = priors.n_topics,
            iterations,
            converged,
            log_likelihood = history.last().copied().unwrap_or(f64::NAN),
            "LDA training finished"
        );

        Ok(TopicModel {
            n_topics: priors.n_topics,
            alpha: priors.alpha,
            beta: priors.beta,
            seed,
            theta,
            phi,
            iterations,
            converged,
            log_likelihood: history,
        })
    }
}

/// splitmix64 で (seed, sweep, doc) を 1 本のストリームに畳み込む
fn document_rng(seed: u64, sweep: u64, doc_index: usize) -> ChaCha8Rng {
    let mut z = seed
        ^ sweep.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (doc_index as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    ChaCha8Rng::seed_from_u64(z)
}

fn init_state(doc: &EncodedDocument, n_topics: usize, seed: u64) -> Result<DocState> {
    let mut rng = document_rng(seed, 0, doc.index());
    let entries = doc.entries();
    let mut topics = Vec::with_capacity(doc.len());
    let mut slots = Vec::with_capacity(doc.len());
    let mut doc_topic = vec![0u32; n_topics];
    for &w in doc.sequence() {
        let slot = entries
            .binary_search_by_key(&w, |&(id, _)| id)
            .map_err(|_| {
                TopicError::invalid_input(format!(
                    "document {} sequence holds id {} missing from its entries",
                    doc.index(),
                    w
                ))
            })?;
        let topic = rng.gen_range(0..n_topics);
        topics.push(topic as u32);
        slots.push(slot as u32);
        doc_topic[topic] += 1;
    }
    Ok(DocState {
        topics,
        slots,
        doc_topic,
    })
}

fn accumulate(states: &[DocState], documents: &[EncodedDocument], priors: Priors) -> Counts {
    states
        .par_iter()
        .zip(documents.par_iter())
        .fold(
            || Counts::zeros(priors.vocab_size, priors.n_topics),
            |mut acc, (state, doc)| {
                acc.add_document(state, doc, priors.n_topics);
                acc
            },
        )
        .reduce(
            || Counts::zeros(priors.vocab_size, priors.n_topics),
            Counts::merge,
        )
}

/// Resample every token of one document against the frozen snapshot
fn sample_document(
    state: &mut DocState,
    doc: &EncodedDocument,
    snapshot: &Counts,
    priors: Priors,
    rng: &mut ChaCha8Rng,
) {
    if doc.is_empty() {
        return;
    }
    let k = priors.n_topics;
    let beta_sum = priors.beta_sum();
    // snapshot からの差分 (この文書の中でだけ有効)
    let mut local_word_topic = vec![0i64; doc.entries().len() * k];
    let mut local_totals = vec![0i64; k];
    let mut cumulative = vec![0.0f64; k];

    for (pos, &w) in doc.sequence().iter().enumerate() {
        let slot = state.slots[pos] as usize;
        let old = state.topics[pos] as usize;
        state.doc_topic[old] -= 1;
        local_word_topic[slot * k + old] -= 1;
        local_totals[old] -= 1;

        let base = w as usize * k;
        let mut total = 0.0;
        for t in 0..k {
            let n_wt = snapshot.word_topic[base + t] as i64 + local_word_topic[slot * k + t];
            let n_t = snapshot.topic_totals[t] as i64 + local_totals[t];
            // P(topic | doc) * P(word | topic)
            let p = (state.doc_topic[t] as f64 + priors.alpha) * (n_wt.max(0) as f64 + priors.beta)
                / (n_t.max(0) as f64 + beta_sum);
            total += p;
            cumulative[t] = total;
        }

        let threshold = rng.gen::<f64>() * total;
        let new = cumulative
            .iter()
            .position(|&c| threshold < c)
            .unwrap_or(k - 1);

        state.doc_topic[new] += 1;
        local_word_topic[slot * k + new] += 1;
        local_totals[new] += 1;
        state.topics[pos] = new as u32;
    }
}

/// Σ_t Σ_w n_wt ln φ_tw + Σ_d Σ_t n_dt ln θ_dt
/// Per-document terms are summed in document order so the value is
/// identical across thread counts.
fn log_likelihood(
    states: &[DocState],
    documents: &[EncodedDocument],
    counts: &Counts,
    priors: Priors,
) -> f64 {
    let k = priors.n_topics;
    let beta_sum = priors.beta_sum();
    let mut ll = 0.0;
    for w in 0..priors.vocab_size {
        for t in 0..k {
            let n_wt = counts.word_topic[w * k + t];
            if n_wt > 0 {
                let p = (n_wt as f64 + priors.beta) / (counts.topic_totals[t] as f64 + beta_sum);
                ll += n_wt as f64 * p.ln();
            }
        }
    }

    let alpha_sum = priors.alpha_sum();
    let per_doc: Vec<f64> = states
        .par_iter()
        .zip(documents.par_iter())
        .map(|(state, doc)| {
            let n_d = doc.len() as f64;
            state
                .doc_topic
                .iter()
                .filter(|&&n| n > 0)
                .map(|&n| n as f64 * ((n as f64 + priors.alpha) / (n_d + alpha_sum)).ln())
                .sum::<f64>()
        })
        .collect();
    ll + per_doc.iter().sum::<f64>()
}

fn estimate_theta(states: &[DocState], priors: Priors) -> RowMatrix {
    let k = priors.n_topics;
    let alpha_sum = priors.alpha_sum();
    let mut theta = RowMatrix::zeros(states.len(), k);
    for (d, state) in states.iter().enumerate() {
        let n_d = state.topics.len() as f64;
        let row = theta.row_mut(d);
        for (t, value) in row.iter_mut().enumerate() {
            *value = (state.doc_topic[t] as f64 + priors.alpha) / (n_d + alpha_sum);
        }
    }
    theta.normalize_rows();
    theta
}

fn estimate_phi(counts: &Counts, priors: Priors) -> RowMatrix {
    let k = priors.n_topics;
    let beta_sum = priors.beta_sum();
    let mut phi = RowMatrix::zeros(k, priors.vocab_size);
    for t in 0..k {
        let denom = counts.topic_totals[t] as f64 + beta_sum;
        let row = phi.row_mut(t);
        for (w, value) in row.iter_mut().enumerate() {
            *value = (counts.word_topic[w * k + t] as f64 + priors.beta) / denom;
        }
    }
    phi.normalize_rows();
    phi
}
