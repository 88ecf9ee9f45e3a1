use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, TopicError};
use crate::lda::corpus::Corpus;
use crate::lda::evaluate::cooccurrence::{CooccurrenceStats, CooccurrenceWindow};
use crate::lda::vocabulary::Vocabulary;
use crate::lda::{LdaConfig, TopicModel};
use crate::utils::cancel::CancelToken;
use crate::utils::math::vector::sparse_cosine;

/// Smoothing constant for the smoothed PMI variants
const EPSILON: f64 = 1e-12;

/// Coherence measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoherenceMetric {
    /// Mean pairwise cosine between NPMI context vectors over the vocabulary
    #[default]
    CV,
    /// Document co-occurrence log conditional probability (Mimno et al.)
    UMass,
    /// Smoothed pointwise mutual information
    CUci,
    /// Smoothed normalized pointwise mutual information
    CNpmi,
}

/// Coherence scoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoherenceConfig {
    pub metric: CoherenceMetric,
    /// Top φ terms taken from every topic
    pub top_n_terms: usize,
    /// Window policy (UMass always uses whole documents)
    pub window: CooccurrenceWindow,
}

impl Default for CoherenceConfig {
    fn default() -> Self {
        Self {
            metric: CoherenceMetric::CV,
            top_n_terms: 20,
            window: CooccurrenceWindow::Sliding(110),
        }
    }
}

impl CoherenceConfig {
    pub fn new(metric: CoherenceMetric) -> Self {
        Self {
            metric,
            ..Default::default()
        }
    }

    pub fn top_n_terms(mut self, n: usize) -> Self {
        self.top_n_terms = n;
        self
    }

    pub fn window(mut self, window: CooccurrenceWindow) -> Self {
        self.window = window;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_n_terms < 2 {
            return Err(TopicError::invalid_range("top_n_terms must be at least 2"));
        }
        self.window.validate()
    }

    fn effective_window(&self) -> CooccurrenceWindow {
        match self.metric {
            CoherenceMetric::UMass => CooccurrenceWindow::Document,
            _ => self.window,
        }
    }
}

/// Coherence of a single topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicCoherence {
    pub topic: usize,
    pub score: f64,
    /// true when the topic's terms had no usable co-occurrence and scored 0
    pub degenerate: bool,
}

/// Per-topic coherence and the model mean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceReport {
    pub metric: CoherenceMetric,
    pub topics: Vec<TopicCoherence>,
    pub mean: f64,
}

/// Mean coherence of a trained model
///
/// # Arguments
/// * `model` - trained model
/// * `corpus` - corpus providing co-occurrence statistics
/// * `vocabulary` - vocabulary the corpus was encoded with
/// * `config` - metric, number of top terms and window
pub fn score(
    model: &TopicModel,
    corpus: &Corpus,
    vocabulary: &Vocabulary,
    config: &CoherenceConfig,
) -> Result<f64> {
    score_topics(model, corpus, vocabulary, config).map(|report| report.mean)
}

/// Per-topic coherence
/// Degenerate topics are reported with score 0 rather than failing the model.
pub fn score_topics(
    model: &TopicModel,
    corpus: &Corpus,
    vocabulary: &Vocabulary,
    config: &CoherenceConfig,
) -> Result<CoherenceReport> {
    config.validate()?;
    check_shapes(model, corpus, vocabulary)?;

    let top_n = config.top_n_terms.min(model.vocab_size());
    let top_terms: Vec<Vec<u32>> = (0..model.n_topics())
        .map(|t| model.top_terms(t, top_n).into_iter().map(|(id, _)| id).collect())
        .collect();

    let mut targets: Vec<u32> = top_terms.iter().flatten().copied().collect();
    targets.sort_unstable();
    targets.dedup();
    let stats = CooccurrenceStats::collect(corpus, &targets, config.effective_window())?;

    let mut topics = Vec::with_capacity(top_terms.len());
    for (topic, terms) in top_terms.iter().enumerate() {
        let entry = match topic_coherence(topic, terms, &stats, config.metric) {
            Ok(score) => TopicCoherence {
                topic,
                score,
                degenerate: false,
            },
            Err(err @ TopicError::InsufficientCooccurrence { .. }) => {
                let tokens: Vec<&str> = terms.iter().filter_map(|&id| vocabulary.token(id)).collect();
                warn!(topic, error = %err, ?tokens, "topic coherence degenerate, scored as 0");
                TopicCoherence {
                    topic,
                    score: 0.0,
                    degenerate: true,
                }
            }
            Err(err) => return Err(err),
        };
        topics.push(entry);
    }

    let mean = topics.iter().map(|t| t.score).sum::<f64>() / topics.len() as f64;
    debug!(metric = ?config.metric, k = model.n_topics(), mean, "coherence scored");
    Ok(CoherenceReport {
        metric: config.metric,
        topics,
        mean,
    })
}

/// Coherence of one topic's ranked terms
/// Returns `InsufficientCooccurrence` when no two of the terms share a window,
/// or when no term pair yields a defined value.
pub fn topic_coherence(
    topic: usize,
    terms: &[u32],
    stats: &CooccurrenceStats,
    metric: CoherenceMetric,
) -> Result<f64> {
    // どの組も一度も共起しないトピックは測れない
    let any_cooccurrence = terms
        .iter()
        .enumerate()
        .any(|(i, &a)| terms[i + 1..].iter().any(|&b| stats.joint(a, b) > 0));
    if !any_cooccurrence {
        return Err(TopicError::InsufficientCooccurrence { topic });
    }
    let pairs: Vec<Option<f64>> = match metric {
        CoherenceMetric::CV => cv_pairs(terms, stats),
        CoherenceMetric::UMass => umass_pairs(terms, stats),
        CoherenceMetric::CUci => pmi_pairs(terms, stats, false),
        CoherenceMetric::CNpmi => pmi_pairs(terms, stats, true),
    };
    if pairs.iter().all(Option::is_none) {
        return Err(TopicError::InsufficientCooccurrence { topic });
    }
    // 未定義のペアは 0 として平均に含める
    Ok(pairs.iter().map(|p| p.unwrap_or(0.0)).sum::<f64>() / pairs.len() as f64)
}

/// NPMI of a co-occurring pair; `None` if either term never appears
fn npmi(p_a: f64, p_b: f64, p_ab: f64) -> Option<f64> {
    if p_a <= 0.0 || p_b <= 0.0 || p_ab <= 0.0 {
        return None;
    }
    if p_ab >= 1.0 {
        return Some(1.0);
    }
    Some((p_ab / (p_a * p_b)).ln() / -p_ab.ln())
}

/// NPMI context vector of `target` over the vocabulary
///
/// Holds the target itself (NPMI(w, w) = 1) and every term that shares at
/// least one window with it. Terms that never co-occur with the target are
/// left out, i.e. their NPMI is taken as 0 rather than the ε-smoothed value
/// near -1.
fn context_vector(target: u32, stats: &CooccurrenceStats) -> Vec<(u32, f64)> {
    let p_target = stats.probability(target);
    if p_target <= 0.0 {
        return Vec::new();
    }
    let row = stats.joint_row(target);
    let mut vector = Vec::with_capacity(row.len() + 1);
    let mut pending_self = true;
    for &(other, _) in row {
        if pending_self && other > target {
            vector.push((target, 1.0));
            pending_self = false;
        }
        if let Some(v) = npmi(p_target, stats.probability(other), stats.joint_probability(target, other)) {
            vector.push((other, v));
        }
    }
    if pending_self {
        vector.push((target, 1.0));
    }
    vector
}

fn cv_pairs(terms: &[u32], stats: &CooccurrenceStats) -> Vec<Option<f64>> {
    let vectors: Vec<Vec<(u32, f64)>> = terms.iter().map(|&t| context_vector(t, stats)).collect();
    let mut pairs = Vec::new();
    for i in 0..vectors.len() {
        for j in (i + 1)..vectors.len() {
            pairs.push(sparse_cosine(&vectors[i], &vectors[j]));
        }
    }
    pairs
}

/// ln((D(w_i, w_j) + 1) / D(w_j)) for every higher-ranked w_j
fn umass_pairs(terms: &[u32], stats: &CooccurrenceStats) -> Vec<Option<f64>> {
    let mut pairs = Vec::new();
    for i in 1..terms.len() {
        for j in 0..i {
            let d_j = stats.occurrences(terms[j]);
            if d_j == 0 {
                pairs.push(None);
                continue;
            }
            let d_ij = stats.joint(terms[i], terms[j]);
            pairs.push(Some(((d_ij as f64 + 1.0) / d_j as f64).ln()));
        }
    }
    pairs
}

fn pmi_pairs(terms: &[u32], stats: &CooccurrenceStats, normalize: bool) -> Vec<Option<f64>> {
    let mut pairs = Vec::new();
    for i in 0..terms.len() {
        for j in (i + 1)..terms.len() {
            let p_i = stats.probability(terms[i]);
            let p_j = stats.probability(terms[j]);
            if p_i <= 0.0 || p_j <= 0.0 {
                pairs.push(None);
                continue;
            }
            let p_ij = stats.joint_probability(terms[i], terms[j]);
            if normalize && p_ij >= 1.0 {
                pairs.push(Some(1.0));
                continue;
            }
            let smoothed = p_ij + EPSILON;
            let pmi = (smoothed / (p_i * p_j)).ln();
            pairs.push(Some(if normalize { pmi / -smoothed.ln() } else { pmi }));
        }
    }
    pairs
}

/// Share of distinct terms among all topics' top terms (1.0 = no overlap)
pub fn topic_diversity(model: &TopicModel, top_n: usize) -> f64 {
    let mut unique = HashSet::new();
    let mut total = 0usize;
    for t in 0..model.n_topics() {
        for (id, _) in model.top_terms(t, top_n) {
            unique.insert(id);
            total += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    unique.len() as f64 / total as f64
}

/// Train one isolated model per candidate K and score each
///
/// Results come back in the order of `k_values`. No K is picked here: near
/// ties between neighbouring K are common and the choice is left to the
/// analyst.
pub fn sweep(
    corpus: &Corpus,
    vocabulary: &Vocabulary,
    k_values: &[usize],
    base: &LdaConfig,
    coherence: &CoherenceConfig,
) -> Result<Vec<(usize, f64)>> {
    sweep_with_cancel(corpus, vocabulary, k_values, base, coherence, &CancelToken::new())
}

/// `sweep` with cooperative cancellation shared by every training run
pub fn sweep_with_cancel(
    corpus: &Corpus,
    vocabulary: &Vocabulary,
    k_values: &[usize],
    base: &LdaConfig,
    coherence: &CoherenceConfig,
    cancel: &CancelToken,
) -> Result<Vec<(usize, f64)>> {
    if k_values.is_empty() {
        return Err(TopicError::invalid_input("k_values is empty"));
    }
    // 設定エラーは学習を始める前に全部弾く
    for &k in k_values {
        base.with_topics(k).validate()?;
    }
    coherence.validate()?;
    if vocabulary.len() != corpus.vocab_size() {
        return Err(TopicError::invalid_input(format!(
            "vocabulary size {} differs from corpus vocabulary size {}",
            vocabulary.len(),
            corpus.vocab_size()
        )));
    }

    info!(candidates = ?k_values, metric = ?coherence.metric, "coherence sweep");
    k_values
        .par_iter()
        .map(|&k| {
            let model = TopicModel::train_with_cancel(corpus, &base.with_topics(k), cancel)?;
            let value = score(&model, corpus, vocabulary, coherence)?;
            info!(k, coherence = value, iterations = model.iterations(), "sweep candidate scored");
            Ok((k, value))
        })
        .collect()
}

fn check_shapes(model: &TopicModel, corpus: &Corpus, vocabulary: &Vocabulary) -> Result<()> {
    if model.vocab_size() != corpus.vocab_size() || vocabulary.len() != corpus.vocab_size() {
        return Err(TopicError::invalid_input(format!(
            "vocabulary sizes disagree: model {}, corpus {}, vocabulary {}",
            model.vocab_size(),
            corpus.vocab_size(),
            vocabulary.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lda::vocabulary::VocabularyConfig;

    fn documents() -> Vec<Vec<&'static str>> {
        vec![
            vec!["bitcoin", "trading", "price", "bitcoin", "trading"],
            vec!["trading", "price", "bitcoin", "price"],
            vec!["price", "bitcoin", "trading", "price", "bitcoin"],
            vec!["bitcoin", "price", "trading", "market"],
            vec!["ethereum", "contract", "smart", "contract"],
            vec!["smart", "contract", "ethereum", "ethereum"],
            vec!["contract", "ethereum", "smart", "smart", "contract"],
            vec!["ethereum", "smart", "contract", "market"],
        ]
    }

    fn setup() -> (Vocabulary, Corpus) {
        let docs = documents();
        let vocab = Vocabulary::build(&docs, &VocabularyConfig::default()).unwrap();
        let corpus = Corpus::encode(&docs, &vocab);
        (vocab, corpus)
    }

    #[test]
    fn scores_are_finite_for_every_metric() {
        let (vocab, corpus) = setup();
        let model = TopicModel::train(&corpus, &LdaConfig::new(2).random_seed(42).max_iterations(200)).unwrap();
        for metric in [CoherenceMetric::CV, CoherenceMetric::UMass, CoherenceMetric::CUci, CoherenceMetric::CNpmi] {
            let config = CoherenceConfig::new(metric).top_n_terms(3);
            let report = score_topics(&model, &corpus, &vocab, &config).unwrap();
            assert_eq!(report.topics.len(), 2);
            assert!(report.mean.is_finite(), "{:?}", metric);
            assert_eq!(score(&model, &corpus, &vocab, &config).unwrap(), report.mean);
        }
    }

    #[test]
    fn isolated_terms_contribute_zero() {
        // every document holds exactly one distinct term
        let docs = vec![vec!["a"], vec!["b"], vec!["c"], vec!["a", "a"]];
        let vocab = Vocabulary::build(&docs, &VocabularyConfig::default()).unwrap();
        let corpus = Corpus::encode(&docs, &vocab);
        let model = TopicModel::train(&corpus, &LdaConfig::new(2).max_iterations(20)).unwrap();

        let report = score_topics(&model, &corpus, &vocab, &CoherenceConfig::default()).unwrap();
        assert_eq!(report.mean, 0.0);
        assert!(report.topics.iter().all(|t| t.degenerate && t.score == 0.0));
    }

    #[test]
    fn topic_coherence_reports_degenerate_topic() {
        let corpus = Corpus::from_sparse(vec![vec![(0, 1)], vec![(1, 1)]], 2).unwrap();
        let stats = CooccurrenceStats::collect(&corpus, &[0, 1], CooccurrenceWindow::Document).unwrap();
        let err = topic_coherence(4, &[0, 1], &stats, CoherenceMetric::CV).unwrap_err();
        assert_eq!(err, TopicError::InsufficientCooccurrence { topic: 4 });
    }

    #[test]
    fn perfectly_cooccurring_terms_are_coherent() {
        // 0 and 1 always together with 2, 3 appears alone
        let corpus = Corpus::from_sparse(
            vec![vec![(0, 1), (1, 1), (2, 1)], vec![(0, 1), (1, 1), (2, 1)], vec![(3, 1)]],
            4,
        )
        .unwrap();
        let stats = CooccurrenceStats::collect(&corpus, &[0, 1], CooccurrenceWindow::Document).unwrap();
        let cv = topic_coherence(0, &[0, 1], &stats, CoherenceMetric::CV).unwrap();
        assert!(cv > 0.0 && cv <= 1.0 + 1e-12);
    }

    #[test]
    fn exclusive_pair_is_fully_coherent() {
        // 0 and 1 only ever appear together, as do 2 and 3
        let corpus = Corpus::from_sparse(
            vec![vec![(0, 1), (1, 1)], vec![(0, 1), (1, 1)], vec![(2, 1), (3, 1)], vec![(2, 1), (3, 1)]],
            4,
        )
        .unwrap();
        let stats = CooccurrenceStats::collect(&corpus, &[0, 1, 2], CooccurrenceWindow::Document).unwrap();
        let cv = topic_coherence(0, &[0, 1], &stats, CoherenceMetric::CV).unwrap();
        assert!((cv - 1.0).abs() < 1e-12, "c_v = {}", cv);

        let err = topic_coherence(1, &[0, 2], &stats, CoherenceMetric::CV).unwrap_err();
        assert_eq!(err, TopicError::InsufficientCooccurrence { topic: 1 });
    }

    #[test]
    fn context_vector_holds_self_and_cooccurring_terms_only() {
        // 1 co-occurs with 0 and 2, never with 3
        let corpus = Corpus::from_sparse(
            vec![vec![(0, 1), (1, 1)], vec![(1, 1), (2, 1)], vec![(3, 1)]],
            4,
        )
        .unwrap();
        let stats = CooccurrenceStats::collect(&corpus, &[1], CooccurrenceWindow::Document).unwrap();
        let vector = context_vector(1, &stats);
        let ids: Vec<u32> = vector.iter().map(|&(id, _)| id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(vector[1], (1, 1.0));

        // a term that never occurs has no vector at all
        let empty = Corpus::from_sparse(vec![vec![(0, 1)]], 2).unwrap();
        let stats = CooccurrenceStats::collect(&empty, &[1], CooccurrenceWindow::Document).unwrap();
        assert!(context_vector(1, &stats).is_empty());
    }

    #[test]
    fn sweep_preserves_order_and_is_reproducible() {
        let (vocab, corpus) = setup();
        let base = LdaConfig::default().random_seed(11).max_iterations(60);
        let coherence = CoherenceConfig::default().top_n_terms(4);
        let results = sweep(&corpus, &vocab, &[2, 3, 4], &base, &coherence).unwrap();

        assert_eq!(results.iter().map(|(k, _)| *k).collect::<Vec<_>>(), vec![2, 3, 4]);
        for (k, value) in results {
            let model = TopicModel::train(&corpus, &base.with_topics(k)).unwrap();
            assert_eq!(score(&model, &corpus, &vocab, &coherence).unwrap(), value);
        }
    }

    #[test]
    fn sweep_rejects_bad_configuration_up_front() {
        let (vocab, corpus) = setup();
        let err = sweep(&corpus, &vocab, &[3, 1], &LdaConfig::default(), &CoherenceConfig::default()).unwrap_err();
        assert!(matches!(err, TopicError::InvalidHyperparameter { .. }));
        let err = sweep(&corpus, &vocab, &[], &LdaConfig::default(), &CoherenceConfig::default()).unwrap_err();
        assert!(matches!(err, TopicError::InvalidInput { .. }));
    }

    #[test]
    fn cancelled_sweep() {
        let (vocab, corpus) = setup();
        let token = CancelToken::new();
        token.cancel();
        let err = sweep_with_cancel(&corpus, &vocab, &[2, 3], &LdaConfig::default(), &CoherenceConfig::default(), &token)
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn diversity_of_disjoint_topics() {
        let (_, corpus) = setup();
        let model = TopicModel::train(&corpus, &LdaConfig::new(2).random_seed(42).max_iterations(200)).unwrap();
        let diversity = topic_diversity(&model, 3);
        assert!(diversity > 0.0 && diversity <= 1.0);
    }
}
