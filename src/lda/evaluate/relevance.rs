use serde::{Deserialize, Serialize};

use crate::error::{Result, TopicError};
use crate::lda::corpus::Corpus;
use crate::lda::vocabulary::Vocabulary;
use crate::lda::TopicModel;
use crate::utils::math::vector::argmax;
use crate::utils::sort::argsort_desc;

/// Dominant topic of one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicAssignment {
    /// corpus position of the document
    pub document: usize,
    /// argmax of the θ row, lowest id on ties
    pub topic: usize,
    /// full θ row
    pub distribution: Vec<f64>,
}

/// Assign every document its dominant topic
///
/// # Arguments
/// * `model` - trained model
/// * `corpus` - the corpus the model was trained on
///
/// # Returns
/// * one assignment per document in corpus order
pub fn assign(model: &TopicModel, corpus: &Corpus) -> Result<Vec<TopicAssignment>> {
    model.check_corpus(corpus)?;
    Ok(corpus
        .documents()
        .iter()
        .zip(model.theta().iter_rows())
        .map(|(doc, row)| TopicAssignment {
            document: doc.index(),
            // θ 行は常に正規化済みなので空にはならない
            topic: argmax(row).unwrap_or(0),
            distribution: row.to_vec(),
        })
        .collect())
}

/// Indices of the documents whose dominant topic is `topic`, ascending
pub fn documents_for_topic(assignments: &[TopicAssignment], topic: usize) -> Vec<usize> {
    assignments
        .iter()
        .filter(|a| a.topic == topic)
        .map(|a| a.document)
        .collect()
}

/// Source metadata of a document, held by the caller in corpus order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub title: String,
    pub identifier: String,
    pub doi: Option<String>,
    pub review: bool,
}

/// Join the documents of one topic against a parallel metadata slice
pub fn select_with_metadata<'a, M>(
    assignments: &[TopicAssignment],
    metadata: &'a [M],
    topic: usize,
) -> Result<Vec<(usize, &'a M)>> {
    if metadata.len() != assignments.len() {
        return Err(TopicError::invalid_input(format!(
            "metadata has {} records for {} documents",
            metadata.len(),
            assignments.len()
        )));
    }
    Ok(documents_for_topic(assignments, topic)
        .into_iter()
        .map(|idx| (idx, &metadata[idx]))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTerm {
    pub id: u32,
    pub token: String,
    pub score: f64,
}

/// Terms of one topic by descending relevance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermRanking {
    pub topic: usize,
    pub terms: Vec<RankedTerm>,
}

/// Rank every topic's terms by relevance
///
/// relevance(t, w) = λ·ln φ[t,w] + (1-λ)·ln(φ[t,w] / p(w))
///
/// λ = 1 reduces to plain φ order. Terms with p(w) = 0 never occur in the
/// corpus; their lift is undefined and only the λ-weighted part is used.
///
/// # Arguments
/// * `model` - trained model
/// * `vocabulary` - vocabulary the model's ids refer to
/// * `marginal` - corpus-wide p(w), see `Corpus::marginal_term_distribution`
/// * `lambda` - blend weight in [0, 1]
pub fn rank_terms(
    model: &TopicModel,
    vocabulary: &Vocabulary,
    marginal: &[f64],
    lambda: f64,
) -> Result<Vec<TermRanking>> {
    if !(0.0..=1.0).contains(&lambda) {
        return Err(TopicError::invalid_range(format!(
            "lambda must lie in [0, 1], got {}",
            lambda
        )));
    }
    let vocab_size = model.vocab_size();
    if marginal.len() != vocab_size || vocabulary.len() != vocab_size {
        return Err(TopicError::invalid_input(format!(
            "vocabulary sizes disagree: model {}, marginal {}, vocabulary {}",
            vocab_size,
            marginal.len(),
            vocabulary.len()
        )));
    }

    let mut rankings = Vec::with_capacity(model.n_topics());
    for (topic, phi_row) in model.phi().iter_rows().enumerate() {
        let scores: Vec<f64> = phi_row
            .iter()
            .zip(marginal)
            .map(|(&phi, &p)| relevance(phi, p, lambda))
            .collect();
        let terms = argsort_desc(&scores, None)
            .into_iter()
            .map(|id| RankedTerm {
                id: id as u32,
                token: vocabulary.token(id as u32).unwrap_or_default().to_string(),
                score: scores[id],
            })
            .collect();
        rankings.push(TermRanking { topic, terms });
    }
    Ok(rankings)
}

#[inline]
fn relevance(phi: f64, marginal: f64, lambda: f64) -> f64 {
    let log_phi = phi.ln();
    if lambda >= 1.0 || marginal <= 0.0 {
        return lambda * log_phi;
    }
    lambda * log_phi + (1.0 - lambda) * (log_phi - marginal.ln())
}

/// Mapping between model topic ids and the visualization numbering
///
/// Visualization ids are 1-based and follow descending topic prevalence,
/// ties by lower model id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicOrder {
    /// visual position (0-based) -> model id
    order: Vec<usize>,
    /// model id -> visual id (1-based)
    visual: Vec<usize>,
}

impl TopicOrder {
    pub fn from_prevalence(prevalence: &[f64]) -> Self {
        let order = argsort_desc(prevalence, None);
        let mut visual = vec![0; order.len()];
        for (pos, &model_id) in order.iter().enumerate() {
            visual[model_id] = pos + 1;
        }
        Self { order, visual }
    }

    pub fn by_prevalence(model: &TopicModel, corpus: &Corpus) -> Result<Self> {
        Ok(Self::from_prevalence(&model.topic_prevalence(corpus)?))
    }

    /// 1-based visualization id of a model topic
    pub fn visual_id(&self, model_id: usize) -> Option<usize> {
        self.visual.get(model_id).copied()
    }

    /// model topic id behind a 1-based visualization id
    pub fn model_id(&self, visual_id: usize) -> Option<usize> {
        visual_id.checked_sub(1).and_then(|pos| self.order.get(pos).copied())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
